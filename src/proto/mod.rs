pub mod reply;
pub mod request;

use crate::asn1::constants::{EncryptionType, KrbErrorCode, PaDataType};
use crate::asn1::encrypted_data::EncryptedData;
use crate::asn1::etype_info2::{ETypeInfo2 as Asn1EtypeInfo2, ETypeInfo2Entry};
use crate::asn1::pa_data::PaData;
use crate::asn1::OctetString;
use crate::error::KrbError;

use der::{Decode, Encode};
use tracing::trace;

pub use reply::{AsReply, ErrorReply, KdcReplyPart, KerberosReply, TgsReply};
pub use request::{AsRequest, AsRequestBuilder, TgsRequest, TgsRequestBuilder};

/// One entry of the KDC's PA-ETYPE-INFO2 hint: the etype it will accept,
/// with the salt and pbkdf2 iteration count to derive the matching key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtypeInfo2 {
    pub etype: EncryptionType,
    pub salt: Option<String>,
    pub s2k_iter_count: Option<u32>,
}

impl EtypeInfo2 {
    fn try_from_entry(entry: &ETypeInfo2Entry) -> Result<Self, KrbError> {
        let etype =
            EncryptionType::try_from(entry.etype).map_err(|_| KrbError::UnsupportedEncryption)?;
        let salt = entry.salt.as_ref().map(|s| s.as_str().to_string());
        // RFC 3962 section 4: s2kparams for the AES etypes is a 4-octet big
        // endian iteration count.
        let s2k_iter_count = entry
            .s2kparams
            .as_ref()
            .map(|params| {
                let bytes: [u8; 4] = params
                    .as_bytes()
                    .try_into()
                    .map_err(|_| KrbError::PreauthInvalidS2KParams)?;
                Ok::<_, KrbError>(u32::from_be_bytes(bytes))
            })
            .transpose()?;
        Ok(EtypeInfo2 {
            etype,
            salt,
            s2k_iter_count,
        })
    }
}

/// The preauth hints accumulated from KRB-ERROR e-data and reply padata
/// across the rounds of an AS exchange.
#[derive(Debug, Clone, Default)]
pub struct PreauthData {
    pub pa_fx_cookie: Option<Vec<u8>>,
    pub enc_timestamp: bool,
    pub etype_info2: Vec<EtypeInfo2>,
}

impl TryFrom<&[PaData]> for PreauthData {
    type Error = KrbError;

    fn try_from(padata: &[PaData]) -> Result<Self, Self::Error> {
        let mut pa_fx_cookie = None;
        let mut enc_timestamp = false;
        let mut etype_info2 = Vec::new();

        for pa in padata {
            match PaDataType::try_from(pa.padata_type) {
                Ok(PaDataType::PaEncTimestamp) => enc_timestamp = true,
                Ok(PaDataType::PaFxCookie) => {
                    pa_fx_cookie = Some(pa.padata_value.as_bytes().to_vec())
                }
                Ok(PaDataType::PaEtypeInfo2) => {
                    let entries = Asn1EtypeInfo2::from_der(pa.padata_value.as_bytes())
                        .map_err(|_| KrbError::DerDecodeEtypeInfo2)?;
                    for entry in &entries {
                        // Hints for etypes we cannot derive are skipped, not
                        // fatal - the KDC lists everything it accepts.
                        match EtypeInfo2::try_from_entry(entry) {
                            Ok(info) => etype_info2.push(info),
                            Err(_) => trace!(etype = entry.etype, "skipping unknown etype hint"),
                        }
                    }
                }
                _ => trace!(padata_type = pa.padata_type, "ignoring padata"),
            }
        }

        sort_cryptographic_strength(&mut etype_info2);

        Ok(PreauthData {
            pa_fx_cookie,
            enc_timestamp,
            etype_info2,
        })
    }
}

impl PreauthData {
    /// Fold a later round's hints into this one. Fresh values win; hints the
    /// new round omitted are retained.
    pub(crate) fn merge(&mut self, newer: PreauthData) {
        if newer.pa_fx_cookie.is_some() {
            self.pa_fx_cookie = newer.pa_fx_cookie;
        }
        self.enc_timestamp |= newer.enc_timestamp;
        if !newer.etype_info2.is_empty() {
            self.etype_info2 = newer.etype_info2;
        }
    }

    /// The KDC's most preferred etype that we can actually derive a key for.
    pub(crate) fn preferred_etype_info2(&self) -> Result<&EtypeInfo2, KrbError> {
        self.etype_info2
            .iter()
            .find(|info| crate::crypto::etype_supported(info.etype))
            .ok_or(KrbError::PreauthMissingEtypeInfo2)
    }
}

/// Strongest first.
fn sort_cryptographic_strength(entries: &mut [EtypeInfo2]) {
    let strength = |etype: EncryptionType| match etype {
        EncryptionType::AES256_CTS_HMAC_SHA1_96 => 3,
        EncryptionType::AES128_CTS_HMAC_SHA1_96 => 2,
        EncryptionType::DES3_CBC_SHA1_KD => 1,
        _ => 0,
    };
    entries.sort_by(|a, b| strength(b.etype).cmp(&strength(a.etype)));
}

/// The PA-DATA a request carries, in the fixed order the KDC expects.
#[derive(Debug, Default)]
pub(crate) struct Preauth {
    pub(crate) tgs_req: Option<Vec<u8>>,
    pub(crate) enc_timestamp: Option<EncryptedData>,
    pub(crate) pa_fx_cookie: Option<Vec<u8>>,
}

impl Preauth {
    pub(crate) fn to_padata(&self) -> Result<Option<Vec<PaData>>, KrbError> {
        let mut padata = Vec::new();

        if let Some(tgs_req) = &self.tgs_req {
            padata.push(PaData {
                padata_type: PaDataType::PaTgsReq as u32,
                padata_value: OctetString::new(tgs_req.clone())
                    .map_err(|_| KrbError::DerEncodeOctetString)?,
            });
        }

        if let Some(enc_timestamp) = &self.enc_timestamp {
            let value = enc_timestamp
                .to_der()
                .and_then(OctetString::new)
                .map_err(|_| KrbError::DerEncodeOctetString)?;
            padata.push(PaData {
                padata_type: PaDataType::PaEncTimestamp as u32,
                padata_value: value,
            });
        }

        if let Some(cookie) = &self.pa_fx_cookie {
            padata.push(PaData {
                padata_type: PaDataType::PaFxCookie as u32,
                padata_value: OctetString::new(cookie.clone())
                    .map_err(|_| KrbError::DerEncodeOctetString)?,
            });
        }

        if padata.is_empty() {
            Ok(None)
        } else {
            Ok(Some(padata))
        }
    }
}

/// Map a KDC-signalled error code onto the crate error taxonomy.
pub(crate) fn kdc_error_to_krb(code: i32) -> KrbError {
    match KrbErrorCode::try_from(code) {
        Ok(KrbErrorCode::KdcErrPreauthRequired) => KrbError::PreauthRequired,
        Ok(KrbErrorCode::KdcErrPreauthFailed) => KrbError::PreauthFailed,
        Ok(KrbErrorCode::KrbErrResponseTooBig) => KrbError::ResponseTooBig,
        _ => KrbError::KdcRefusal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::krb_error::MethodData;

    #[test]
    fn test_preauth_data_from_method_data() {
        // The e-data of a KDC_ERR_PREAUTH_REQUIRED answer: etype-info2 with
        // an aes256 salt, enc-timestamp, and two pkinit entries we ignore.
        let blob = "30483025a103020113a21e041c301a3018a003020112a1111b0f41464f524553542e414475736572313009a103020102a20204003009a103020110a20204003009a10302010fa2020400";
        let blob = hex::decode(blob).unwrap();
        let method_data = MethodData::from_der(&blob).unwrap();

        let pd = PreauthData::try_from(method_data.as_slice()).unwrap();
        assert!(pd.enc_timestamp);
        assert!(pd.pa_fx_cookie.is_none());
        assert_eq!(pd.etype_info2.len(), 1);

        let info = pd.preferred_etype_info2().unwrap();
        assert_eq!(info.etype, EncryptionType::AES256_CTS_HMAC_SHA1_96);
        assert_eq!(info.salt.as_deref(), Some("AFOREST.ADuser1"));
        assert!(info.s2k_iter_count.is_none());
    }

    #[test]
    fn test_sort_cryptographic_strength() {
        let mut entries = vec![
            EtypeInfo2 {
                etype: EncryptionType::RC4_HMAC,
                salt: None,
                s2k_iter_count: None,
            },
            EtypeInfo2 {
                etype: EncryptionType::AES128_CTS_HMAC_SHA1_96,
                salt: None,
                s2k_iter_count: None,
            },
            EtypeInfo2 {
                etype: EncryptionType::AES256_CTS_HMAC_SHA1_96,
                salt: None,
                s2k_iter_count: None,
            },
        ];
        sort_cryptographic_strength(&mut entries);
        let etypes: Vec<_> = entries.iter().map(|e| e.etype).collect();
        assert_eq!(
            etypes,
            vec![
                EncryptionType::AES256_CTS_HMAC_SHA1_96,
                EncryptionType::AES128_CTS_HMAC_SHA1_96,
                EncryptionType::RC4_HMAC
            ]
        );
    }

    #[test]
    fn test_preauth_data_merge() {
        let mut base = PreauthData {
            pa_fx_cookie: Some(vec![1, 2, 3]),
            enc_timestamp: true,
            etype_info2: vec![EtypeInfo2 {
                etype: EncryptionType::AES256_CTS_HMAC_SHA1_96,
                salt: Some("OLD".to_string()),
                s2k_iter_count: None,
            }],
        };
        base.merge(PreauthData {
            pa_fx_cookie: None,
            enc_timestamp: false,
            etype_info2: vec![EtypeInfo2 {
                etype: EncryptionType::AES256_CTS_HMAC_SHA1_96,
                salt: Some("NEW".to_string()),
                s2k_iter_count: Some(32768),
            }],
        });
        // The cookie survives, the fresh etype hints replace the stale ones.
        assert_eq!(base.pa_fx_cookie, Some(vec![1, 2, 3]));
        assert!(base.enc_timestamp);
        assert_eq!(base.etype_info2[0].salt.as_deref(), Some("NEW"));
        assert_eq!(base.etype_info2[0].s2k_iter_count, Some(32768));
    }
}
