// Key usage numbers from RFC 4120 section 7.5.1. Using the wrong constant
// produces a key that decrypts nothing, so these are never computed.
pub(crate) const KEY_USAGE_AS_REQ_PA_ENC_TS: i32 = 1;
pub(crate) const KEY_USAGE_AS_REP_ENC_PART: i32 = 3;
pub(crate) const KEY_USAGE_TGS_REQ_AUTH_DATA_SESSION: i32 = 4;
pub(crate) const KEY_USAGE_TGS_REQ_AUTH_DATA_SUBKEY: i32 = 5;
pub(crate) const KEY_USAGE_TGS_REQ_CHECKSUM: i32 = 6;
pub(crate) const KEY_USAGE_TGS_REQ_AUTHENTICATOR: i32 = 7;
pub(crate) const KEY_USAGE_TGS_REP_SESSION: i32 = 8;
pub(crate) const KEY_USAGE_TGS_REP_SUBKEY: i32 = 9;
pub(crate) const KEY_USAGE_KRB_CRED: i32 = 14;

// RFC 3961 section 8 checksum type numbers.
pub(crate) const CHECKSUM_HMAC_SHA1_96_AES128: i32 = 15;
pub(crate) const CHECKSUM_HMAC_SHA1_96_AES256: i32 = 16;

pub(crate) const AES_BLOCK_SIZE: usize = 16;
pub(crate) const AES_128_KEY_LEN: usize = 16;
pub(crate) const AES_256_KEY_LEN: usize = 32;
pub(crate) const SHA1_HMAC_LEN: usize = 12;

pub(crate) const IV_ZERO: [u8; AES_BLOCK_SIZE] = [0u8; AES_BLOCK_SIZE];

/// The default number of pbkdf2 rounds from RFC 3962. This *default value* is
/// INSECURE against modern hardware - server supplied s2kparams should always
/// raise it.
pub(crate) const RFC_PBKDF2_SHA1_ITER: u32 = 0x1000;

pub(crate) const DEFAULT_KDC_PORT: u16 = 88;
pub(crate) const DEFAULT_KDC_RETRIES: u32 = 3;
pub(crate) const DEFAULT_KDC_TIMEOUT_MS: u64 = 30_000;

/// Requests encoded larger than this go straight to TCP (RFC 4120 section
/// 7.2.1 leaves the limit to the client; this matches the common MTU-derived
/// default).
pub(crate) const DEFAULT_UDP_PREFERENCE_LIMIT: usize = 1465;

pub(crate) const DEFAULT_IO_MAX_SIZE: usize = 4 * 1024 * 1024;
