use crate::asn1;
use crate::asn1::constants::EncryptionType;
use crate::asn1::OctetString;
use crate::config::Config;
use crate::crypto;
use crate::error::KrbError;

use tracing::{error, trace};

/// A symmetric key with its etype and optional key version number. Owns the
/// buffer exclusively; [`EncryptionKey::destroy`] zeroes it in place and any
/// later use of the key material reads zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    etype: EncryptionType,
    key: Vec<u8>,
    kvno: Option<u32>,
}

impl EncryptionKey {
    pub fn new(etype: EncryptionType, key: Vec<u8>, kvno: Option<u32>) -> Self {
        EncryptionKey { etype, key, kvno }
    }

    /// The well-known null key, for KRB-CRED parts sent without encryption.
    pub fn null() -> Self {
        EncryptionKey {
            etype: EncryptionType::NULL,
            key: Vec::new(),
            kvno: None,
        }
    }

    /// Derive a long-term key from a passphrase and salt.
    pub fn derive(
        etype: EncryptionType,
        passphrase: &[u8],
        salt: &str,
        iter_count: Option<u32>,
    ) -> Result<Self, KrbError> {
        let key = crypto::string_to_key(etype, passphrase, salt.as_bytes(), iter_count)?;
        Ok(EncryptionKey {
            etype,
            key,
            kvno: None,
        })
    }

    pub fn etype(&self) -> EncryptionType {
        self.etype
    }

    pub fn kvno(&self) -> Option<u32> {
        self.kvno
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn is_zeroed(&self) -> bool {
        self.key.iter().all(|b| *b == 0)
    }

    /// Zero the key material. The key remains structurally valid but
    /// cryptographically useless; callers must not use it afterwards.
    pub fn destroy(&mut self) {
        self.key.fill(0);
    }

    pub fn encrypt(&self, plaintext: &[u8], key_usage: i32) -> Result<Vec<u8>, KrbError> {
        crypto::encrypt_data(self.etype, &self.key, plaintext, key_usage)
    }

    pub fn decrypt(&self, ciphertext: &[u8], key_usage: i32) -> Result<Vec<u8>, KrbError> {
        crypto::decrypt_data(self.etype, &self.key, ciphertext, key_usage)
    }

    pub fn checksum(&self, data: &[u8], key_usage: i32) -> Result<Vec<u8>, KrbError> {
        crypto::checksum_data(self.etype, &self.key, data, key_usage)
    }

    pub(crate) fn asn1(&self) -> Result<asn1::encryption_key::EncryptionKey, KrbError> {
        Ok(asn1::encryption_key::EncryptionKey {
            key_type: self.etype.into(),
            key_value: OctetString::new(self.key.clone())
                .map_err(|_| KrbError::DerEncodeOctetString)?,
        })
    }

    pub(crate) fn from_asn1(value: &asn1::encryption_key::EncryptionKey) -> Result<Self, KrbError> {
        let etype = EncryptionType::try_from(value.key_type)
            .map_err(|_| KrbError::UnsupportedEncryption)?;
        Ok(EncryptionKey {
            etype,
            key: value.key_value.as_bytes().to_vec(),
            kvno: None,
        })
    }
}

/// Derive the candidate long-term keys for an exchange. When preauth has
/// named a concrete etype, exactly that one key is derived; otherwise one
/// key per entry of the configured (or built-in) etype list, skipping any
/// the cipher layer does not carry.
pub fn acquire_secret_keys(
    passphrase: &[u8],
    salt: &str,
    preauth_etype: Option<EncryptionType>,
    s2k_iter_count: Option<u32>,
    config: &Config,
) -> Result<Vec<EncryptionKey>, KrbError> {
    match preauth_etype {
        Some(etype) if etype != EncryptionType::NULL => {
            let key = EncryptionKey::derive(etype, passphrase, salt, s2k_iter_count)?;
            Ok(vec![key])
        }
        _ => {
            let keys: Vec<EncryptionKey> = config
                .default_tkt_enctypes()
                .into_iter()
                .filter(|etype| crypto::etype_supported(*etype))
                .map(|etype| EncryptionKey::derive(etype, passphrase, salt, s2k_iter_count))
                .collect::<Result<_, _>>()?;
            if keys.is_empty() {
                error!("no supported etype in the configured enctype list");
                return Err(KrbError::NoUsableKey);
            }
            Ok(keys)
        }
    }
}

/// Select a key by etype and kvno. A missing or zero kvno on either side is
/// a wildcard. When the requested etype is one DES variant and only the
/// other is held, the key is relabeled and returned - the two share key
/// structure and strength. An etype match whose kvno disagrees raises
/// [`KrbError::BadKeyVersion`] so the caller may retry without the kvno
/// constraint.
pub fn find_key(
    etype: EncryptionType,
    kvno: Option<u32>,
    keys: &[EncryptionKey],
) -> Result<EncryptionKey, KrbError> {
    let kvno_matches = |key: &EncryptionKey| match (kvno, key.kvno) {
        (Some(want), Some(have)) if want != 0 && have != 0 => want == have,
        _ => true,
    };

    let mut etype_seen = false;
    for key in keys {
        if key.etype == etype {
            etype_seen = true;
            if kvno_matches(key) {
                return Ok(key.clone());
            }
        }
    }

    let des_sibling = match etype {
        EncryptionType::DES_CBC_CRC => Some(EncryptionType::DES_CBC_MD5),
        EncryptionType::DES_CBC_MD5 => Some(EncryptionType::DES_CBC_CRC),
        _ => None,
    };
    if let Some(sibling) = des_sibling {
        for key in keys {
            if key.etype == sibling && kvno_matches(key) {
                trace!(?etype, ?sibling, "relabeling same-strength des key");
                let mut key = key.clone();
                key.etype = etype;
                return Ok(key);
            }
        }
    }

    if etype_seen {
        Err(KrbError::BadKeyVersion)
    } else {
        Err(KrbError::NoUsableKey)
    }
}

/// Holds the keys of one exchange and guarantees the material is zeroed on
/// every exit path, including errors and panics.
#[derive(Debug)]
pub struct KeyVault {
    keys: Vec<EncryptionKey>,
}

impl KeyVault {
    pub fn new(keys: Vec<EncryptionKey>) -> Self {
        KeyVault { keys }
    }

    pub fn keys(&self) -> &[EncryptionKey] {
        &self.keys
    }

    pub fn find(&self, etype: EncryptionType, kvno: Option<u32>) -> Result<EncryptionKey, KrbError> {
        find_key(etype, kvno, &self.keys)
    }
}

impl Drop for KeyVault {
    fn drop(&mut self) {
        for key in &mut self.keys {
            key.destroy();
        }
    }
}
