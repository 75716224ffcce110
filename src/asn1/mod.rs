pub(crate) mod ap_req;
pub(crate) mod authenticator;
pub(crate) mod authorization_data;
pub(crate) mod checksum;
pub mod constants;
pub(crate) mod enc_kdc_rep_part;
pub(crate) mod encrypted_data;
pub(crate) mod encryption_key;
pub(crate) mod etype_info2;
pub(crate) mod host_addresses;
pub(crate) mod kdc_rep;
pub(crate) mod kdc_req;
pub(crate) mod kerberos_flags;
pub(crate) mod kerberos_string;
pub(crate) mod kerberos_time;
pub(crate) mod krb_cred;
pub(crate) mod krb_error;
pub(crate) mod krb_kdc_rep;
pub(crate) mod krb_kdc_req;
pub(crate) mod last_req;
pub(crate) mod pa_data;
pub(crate) mod pa_enc_ts_enc;
pub(crate) mod principal_name;
pub(crate) mod tagged_ticket;

pub(crate) use der::asn1::{Ia5String, OctetString};
