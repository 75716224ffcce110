use crate::asn1::constants::EncryptionType;
use crate::constants::{DEFAULT_KDC_RETRIES, DEFAULT_KDC_TIMEOUT_MS, DEFAULT_UDP_PREFERENCE_LIMIT};
use crate::error::KrbError;

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::error;

/// How the transport treats KDCs that recently failed. `TryLast` moves them
/// to the end of the candidate list; `TryLess` keeps the order but clamps
/// their retry/timeout budget; `None` ignores past failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadKdcPolicy {
    TryLast,
    TryLess,
    #[default]
    None,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LibDefaults {
    default_realm: Option<String>,
    udp_preference_limit: Option<usize>,
    /// Milliseconds per send attempt.
    kdc_timeout: Option<u64>,
    max_retries: Option<u32>,
    noaddresses: Option<bool>,
    default_tkt_enctypes: Option<Vec<String>>,
    bad_kdc_policy: Option<BadKdcPolicy>,
    try_less_retries: Option<u32>,
    try_less_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RealmEntry {
    #[serde(default)]
    kdc: Vec<String>,
    kdc_timeout: Option<u64>,
    max_retries: Option<u32>,
}

/// The client profile, a TOML rendition of the classic krb5.conf sections.
/// Absence of a value is a meaningful signal (fall through to the built-in
/// default), not an error - only the accessors that genuinely cannot proceed
/// without a value return one.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    libdefaults: LibDefaults,
    #[serde(default)]
    realms: BTreeMap<String, RealmEntry>,
    #[serde(default)]
    domain_realm: BTreeMap<String, String>,
    /// capaths[client][server] = ordered intermediary realms, or ["."] for
    /// "no path via hierarchy".
    #[serde(default)]
    capaths: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Config {
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self, KrbError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|err| {
            error!(?err, path = %path.as_ref().display(), "unable to read profile");
            KrbError::ConfigParse
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_overrides(
            std::env::var("KRB5_REALM").ok(),
            std::env::var("KRB5_KDC").ok(),
        )?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, KrbError> {
        toml::from_str(contents).map_err(|err| {
            error!(?err, "toml parse failure");
            KrbError::ConfigParse
        })
    }

    /// Apply the `KRB5_REALM`/`KRB5_KDC` pair. Setting exactly one of the two
    /// is rejected rather than half-applied; the error does not reflect which
    /// was missing.
    pub(crate) fn apply_overrides(
        &mut self,
        realm: Option<String>,
        kdc: Option<String>,
    ) -> Result<(), KrbError> {
        match (realm, kdc) {
            (Some(realm), Some(kdc)) => {
                let kdcs: Vec<String> = kdc
                    .split([' ', ','])
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                self.realms.insert(
                    realm.clone(),
                    RealmEntry {
                        kdc: kdcs,
                        kdc_timeout: None,
                        max_retries: None,
                    },
                );
                self.libdefaults.default_realm = Some(realm);
                Ok(())
            }
            (None, None) => Ok(()),
            _ => Err(KrbError::ConfigOverrideIncomplete),
        }
    }

    pub fn default_realm(&self) -> Result<&str, KrbError> {
        self.libdefaults
            .default_realm
            .as_deref()
            .ok_or(KrbError::ConfigDefaultRealmMissing)
    }

    pub fn kdc_list(&self, realm: &str) -> Result<Vec<String>, KrbError> {
        let kdcs = self
            .realms
            .get(realm)
            .map(|entry| entry.kdc.clone())
            .unwrap_or_default();
        if kdcs.is_empty() {
            error!(realm, "no kdc configured for realm");
            return Err(KrbError::ConfigKdcUnresolvable);
        }
        Ok(kdcs)
    }

    pub fn udp_preference_limit(&self) -> usize {
        self.libdefaults
            .udp_preference_limit
            .unwrap_or(DEFAULT_UDP_PREFERENCE_LIMIT)
    }

    /// Per-attempt timeout: realm-specific value, else global, else 30s.
    pub fn kdc_timeout(&self, realm: &str) -> Duration {
        let ms = self
            .realms
            .get(realm)
            .and_then(|entry| entry.kdc_timeout)
            .or(self.libdefaults.kdc_timeout)
            .unwrap_or(DEFAULT_KDC_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    /// UDP attempts per candidate: realm-specific value, else global, else 3.
    pub fn max_retries(&self, realm: &str) -> u32 {
        self.realms
            .get(realm)
            .and_then(|entry| entry.max_retries)
            .or(self.libdefaults.max_retries)
            .unwrap_or(DEFAULT_KDC_RETRIES)
    }

    pub fn noaddresses(&self) -> bool {
        self.libdefaults.noaddresses.unwrap_or(true)
    }

    pub fn bad_kdc_policy(&self) -> BadKdcPolicy {
        self.libdefaults.bad_kdc_policy.unwrap_or_default()
    }

    /// Clamped budget applied to a currently-bad candidate under
    /// [`BadKdcPolicy::TryLess`].
    pub fn try_less_budget(&self) -> (u32, Duration) {
        let retries = self.libdefaults.try_less_retries.unwrap_or(1);
        let timeout = Duration::from_millis(self.libdefaults.try_less_timeout.unwrap_or(5_000));
        (retries, timeout)
    }

    /// The etypes offered in requests when preauth has not yet named one.
    /// Unknown names are skipped so a profile listing legacy types still
    /// works against the ciphers we carry.
    pub fn default_tkt_enctypes(&self) -> Vec<EncryptionType> {
        match self.libdefaults.default_tkt_enctypes.as_ref() {
            Some(names) => names
                .iter()
                .filter_map(|name| etype_from_name(name))
                .collect(),
            None => vec![
                EncryptionType::AES256_CTS_HMAC_SHA1_96,
                EncryptionType::AES128_CTS_HMAC_SHA1_96,
            ],
        }
    }

    /// Map a hostname to its realm via the domain_realm section: exact host
    /// match first, then the longest matching `.domain` suffix.
    pub fn realm_for_host(&self, host: &str) -> Option<&str> {
        let host = host.to_lowercase();
        if let Some(realm) = self.domain_realm.get(host.as_str()) {
            return Some(realm.as_str());
        }
        let mut rest = host.as_str();
        while let Some(idx) = rest.find('.') {
            rest = &rest[idx..];
            if let Some(realm) = self.domain_realm.get(rest) {
                return Some(realm.as_str());
            }
            rest = &rest[1..];
        }
        None
    }

    pub fn capath(&self, client_realm: &str, server_realm: &str) -> Option<&[String]> {
        self.capaths
            .get(client_realm)
            .and_then(|paths| paths.get(server_realm))
            .map(|path| path.as_slice())
    }

    pub fn has_capaths_for(&self, client_realm: &str) -> bool {
        self.capaths.contains_key(client_realm)
    }
}

fn etype_from_name(name: &str) -> Option<EncryptionType> {
    match name.to_lowercase().as_str() {
        "aes256-cts-hmac-sha1-96" | "aes256-cts" | "aes256-sha1" => {
            Some(EncryptionType::AES256_CTS_HMAC_SHA1_96)
        }
        "aes128-cts-hmac-sha1-96" | "aes128-cts" | "aes128-sha1" => {
            Some(EncryptionType::AES128_CTS_HMAC_SHA1_96)
        }
        "des3-cbc-sha1" | "des3-hmac-sha1" => Some(EncryptionType::DES3_CBC_SHA1_KD),
        "rc4-hmac" | "arcfour-hmac" => Some(EncryptionType::RC4_HMAC),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
    [libdefaults]
    default_realm = "EXAMPLE.COM"
    udp_preference_limit = 1465
    kdc_timeout = 10000
    max_retries = 2
    noaddresses = true
    default_tkt_enctypes = ["aes256-cts-hmac-sha1-96", "aes128-cts", "camellia256-cts"]
    bad_kdc_policy = "try_last"

    [realms."EXAMPLE.COM"]
    kdc = ["kdc1.example.com:88", "kdc2.example.com"]
    kdc_timeout = 5000

    [realms."DEV.EXAMPLE.COM"]
    kdc = ["kdc.dev.example.com"]

    [domain_realm]
    "dc1.example.com" = "SPECIAL.EXAMPLE.COM"
    ".example.com" = "EXAMPLE.COM"

    [capaths."A.EXAMPLE.COM"]
    "B.EXAMPLE.COM" = ["EXAMPLE.COM"]
    "C.EXAMPLE.COM" = ["."]
    "#;

    #[test]
    fn test_config_profile_parse() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.default_realm().unwrap(), "EXAMPLE.COM");
        assert_eq!(
            config.kdc_list("EXAMPLE.COM").unwrap(),
            vec!["kdc1.example.com:88", "kdc2.example.com"]
        );
        assert_eq!(config.udp_preference_limit(), 1465);
        assert_eq!(
            config.kdc_timeout("EXAMPLE.COM"),
            Duration::from_millis(5000)
        );
        // No realm override, fall back to the libdefaults value.
        assert_eq!(
            config.kdc_timeout("DEV.EXAMPLE.COM"),
            Duration::from_millis(10000)
        );
        assert_eq!(config.max_retries("EXAMPLE.COM"), 2);
        assert_eq!(config.bad_kdc_policy(), BadKdcPolicy::TryLast);
        // The unknown camellia name is skipped.
        assert_eq!(
            config.default_tkt_enctypes(),
            vec![
                EncryptionType::AES256_CTS_HMAC_SHA1_96,
                EncryptionType::AES128_CTS_HMAC_SHA1_96
            ]
        );
    }

    #[test]
    fn test_config_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::parse(file.path()).unwrap();
        assert_eq!(config.default_realm().unwrap(), "EXAMPLE.COM");
    }

    #[test]
    fn test_config_missing_values() {
        let config = Config::from_toml("").unwrap();
        assert!(matches!(
            config.default_realm(),
            Err(KrbError::ConfigDefaultRealmMissing)
        ));
        assert!(matches!(
            config.kdc_list("EXAMPLE.COM"),
            Err(KrbError::ConfigKdcUnresolvable)
        ));
        // Built-in defaults apply everywhere else.
        assert_eq!(config.max_retries("EXAMPLE.COM"), 3);
        assert_eq!(
            config.kdc_timeout("EXAMPLE.COM"),
            Duration::from_millis(30_000)
        );
        assert_eq!(config.bad_kdc_policy(), BadKdcPolicy::None);
        assert!(config.noaddresses());
    }

    #[test]
    fn test_config_domain_realm_lookup() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(
            config.realm_for_host("dc1.example.com"),
            Some("SPECIAL.EXAMPLE.COM")
        );
        assert_eq!(
            config.realm_for_host("Host.Example.Com"),
            Some("EXAMPLE.COM")
        );
        assert_eq!(config.realm_for_host("host.other.com"), None);
    }

    #[test]
    fn test_config_capaths() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(
            config.capath("A.EXAMPLE.COM", "B.EXAMPLE.COM"),
            Some(["EXAMPLE.COM".to_string()].as_slice())
        );
        assert_eq!(
            config.capath("A.EXAMPLE.COM", "C.EXAMPLE.COM"),
            Some([".".to_string()].as_slice())
        );
        assert_eq!(config.capath("B.EXAMPLE.COM", "A.EXAMPLE.COM"), None);
    }

    #[test]
    fn test_config_env_overrides() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config
            .apply_overrides(
                Some("OVERRIDE.COM".to_string()),
                Some("kdc-a.override.com kdc-b.override.com:188".to_string()),
            )
            .unwrap();
        assert_eq!(config.default_realm().unwrap(), "OVERRIDE.COM");
        assert_eq!(
            config.kdc_list("OVERRIDE.COM").unwrap(),
            vec!["kdc-a.override.com", "kdc-b.override.com:188"]
        );

        // Exactly one of the pair set is an error, in either direction.
        let mut config = Config::from_toml(SAMPLE).unwrap();
        assert!(matches!(
            config.apply_overrides(Some("OVERRIDE.COM".to_string()), None),
            Err(KrbError::ConfigOverrideIncomplete)
        ));
        assert!(matches!(
            config.apply_overrides(None, Some("kdc.override.com".to_string())),
            Err(KrbError::ConfigOverrideIncomplete)
        ));
    }
}
