// #![deny(warnings)]

#![warn(unused_extern_crates)]
// Enable some groups of clippy lints.
#![deny(clippy::suspicious)]
#![deny(clippy::perf)]
// Specific lints to enforce.
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::disallowed_types)]
#![deny(clippy::manual_let_else)]
#![allow(clippy::unreachable)]

mod asn1;
pub(crate) mod constants;
pub(crate) mod crypto;

pub mod client;
pub mod config;
pub mod creds;
pub mod error;
pub mod keys;
pub mod principal;
pub mod proto;
pub mod transport;

pub use asn1::constants::{EncryptionType, PrincipalNameType};
pub use asn1::kerberos_flags::{KerberosFlags, TicketFlags};
