use crate::asn1;
use crate::asn1::constants::PrincipalNameType;
use crate::asn1::kerberos_string::KerberosString;
use crate::config::Config;
use crate::error::KrbError;

use std::collections::BTreeSet;
use std::fmt;
use tracing::trace;

/// A realm token. May not contain `/`, `:` or NUL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Realm(String);

impl Realm {
    pub fn new(value: &str) -> Result<Self, KrbError> {
        if value.is_empty() {
            return Err(KrbError::PrincipalEmptyRealm);
        }
        if value.contains(['/', ':', '\0']) {
            return Err(KrbError::RealmInvalidCharacter);
        }
        Ok(Realm(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn asn1(&self) -> Result<asn1::kerberos_string::Realm, KrbError> {
        KerberosString::try_from(self.0.as_str()).map_err(|_| KrbError::DerEncodeKerberosString)
    }

    pub(crate) fn from_asn1(value: &asn1::kerberos_string::Realm) -> Result<Self, KrbError> {
        Self::new(value.as_str())
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Realm {
    type Error = KrbError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// A Kerberos principal: ordered name components, a name type and an
/// optional owning realm. An absent realm means "the default realm" and is
/// resolved before the principal goes on the wire.
///
/// The cached salt is only ever set from a server-supplied ETYPE-INFO2
/// value; when unset, [`Principal::salt`] derives the RFC 4120 default of
/// realm followed by every component.
#[derive(Debug, Clone)]
pub struct Principal {
    components: Vec<String>,
    name_type: PrincipalNameType,
    realm: Option<Realm>,
    salt: Option<String>,
}

impl PartialEq for Principal {
    fn eq(&self, other: &Self) -> bool {
        // The cached salt is derivation state, not identity.
        self.equals_without_realm(other) && self.realm == other.realm
    }
}

impl Eq for Principal {}

impl Principal {
    pub fn new(
        components: Vec<String>,
        name_type: PrincipalNameType,
        realm: Option<Realm>,
    ) -> Result<Self, KrbError> {
        if components.is_empty() || components.iter().any(|c| c.is_empty()) {
            return Err(KrbError::PrincipalEmptyComponent);
        }
        Ok(Principal {
            components,
            name_type,
            realm,
            salt: None,
        })
    }

    /// Parse a wire string of the form `primary/instance@REALM`. Unescaped
    /// `/` separates components; an unescaped `@` ends the component scan
    /// and the remainder is the realm. `\/` and `\@` pass through literally.
    pub fn parse(name: &str, name_type: PrincipalNameType) -> Result<Self, KrbError> {
        let mut components = Vec::new();
        let mut current = String::new();
        let mut realm: Option<&str> = None;

        let mut chars = name.char_indices();
        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped @ ('/' | '@'))) => current.push(escaped),
                    Some((_, other)) => {
                        current.push('\\');
                        current.push(other);
                    }
                    None => current.push('\\'),
                },
                '/' => {
                    components.push(std::mem::take(&mut current));
                }
                '@' => {
                    let rest = &name[idx + 1..];
                    if rest.is_empty() {
                        return Err(KrbError::PrincipalEmptyRealm);
                    }
                    realm = Some(rest);
                    break;
                }
                _ => current.push(c),
            }
        }
        components.push(current);

        let realm = realm.map(Realm::new).transpose()?;
        Self::new(components, name_type, realm)
    }

    /// A service/host principal (NT-SRV-HST). The hostname is lower-cased.
    /// When the resolver produced a canonical form for the host it is
    /// adopted only if it is a case-insensitive extension of the original,
    /// so canonicalization can never redirect to an unrelated host. The
    /// realm comes from the explicit argument, else the profile's
    /// domain_realm mapping, else stays unset for default-realm resolution.
    pub fn service_host(
        service: &str,
        host: &str,
        canonical_host: Option<&str>,
        realm: Option<Realm>,
        config: &Config,
    ) -> Result<Self, KrbError> {
        let mut host = host.to_lowercase();
        if let Some(canonical) = canonical_host {
            let canonical = canonical.to_lowercase();
            if canonical.starts_with(&host) {
                host = canonical;
            } else {
                trace!(host, canonical, "rejecting non-extension canonical hostname");
            }
        }

        let realm = match realm {
            Some(realm) => Some(realm),
            None => config.realm_for_host(&host).map(Realm::new).transpose()?,
        };

        Self::new(
            vec![service.to_string(), host],
            PrincipalNameType::NtSrvHst,
            realm,
        )
    }

    /// The ticket-granting service principal for a realm.
    pub fn tgs(realm: &Realm) -> Result<Self, KrbError> {
        Self::new(
            vec!["krbtgt".to_string(), realm.as_str().to_string()],
            PrincipalNameType::NtSrvInst,
            Some(realm.clone()),
        )
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn name_type(&self) -> PrincipalNameType {
        self.name_type
    }

    pub fn realm(&self) -> Option<&Realm> {
        self.realm.as_ref()
    }

    /// Fill in the default realm from the profile if none was given.
    pub fn resolve_realm(mut self, config: &Config) -> Result<Self, KrbError> {
        if self.realm.is_none() {
            self.realm = Some(Realm::new(config.default_realm()?)?);
        }
        Ok(self)
    }

    pub(crate) fn realm_required(&self) -> Result<&Realm, KrbError> {
        self.realm.as_ref().ok_or(KrbError::PrincipalEmptyRealm)
    }

    /// Name-only comparison. Name types must match unless either side is
    /// NT-UNKNOWN; components compare case-sensitively.
    pub fn equals_without_realm(&self, other: &Self) -> bool {
        if self.name_type != PrincipalNameType::NtUnknown
            && other.name_type != PrincipalNameType::NtUnknown
            && self.name_type != other.name_type
        {
            return false;
        }
        self.components == other.components
    }

    pub fn override_salt(&mut self, salt: String) {
        self.salt = Some(salt);
    }

    /// The string-to-key salt: the server-supplied override when present,
    /// else realm concatenated with every component.
    pub fn salt(&self) -> Result<String, KrbError> {
        if let Some(salt) = &self.salt {
            return Ok(salt.clone());
        }
        let realm = self.realm_required()?;
        let mut salt = realm.as_str().to_string();
        for component in &self.components {
            salt.push_str(component);
        }
        Ok(salt)
    }

    pub(crate) fn asn1_name(&self) -> Result<asn1::principal_name::PrincipalName, KrbError> {
        let name_string = self
            .components
            .iter()
            .map(|c| KerberosString::try_from(c.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| KrbError::DerEncodeKerberosString)?;
        Ok(asn1::principal_name::PrincipalName {
            name_type: self.name_type.into(),
            name_string,
        })
    }

    pub(crate) fn asn1_realm(&self) -> Result<asn1::kerberos_string::Realm, KrbError> {
        self.realm_required()?.asn1()
    }

    pub(crate) fn from_asn1(
        name: &asn1::principal_name::PrincipalName,
        realm: &asn1::kerberos_string::Realm,
    ) -> Result<Self, KrbError> {
        let name_type = PrincipalNameType::try_from(name.name_type)
            .map_err(|_| KrbError::PrincipalNameInvalidType)?;
        let components = name
            .name_string
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();
        Self::new(components, name_type, Some(Realm::from_asn1(realm)?))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            for c in component.chars() {
                if c == '/' || c == '@' {
                    f.write_str("\\")?;
                }
                write!(f, "{c}")?;
            }
        }
        if let Some(realm) = &self.realm {
            write!(f, "@{realm}")?;
        }
        Ok(())
    }
}

/// The ordered realm path from a client realm toward a server realm. Starts
/// with the client realm, never contains the server realm. Explicit capaths
/// entries win; a "." entry means no intermediaries; already-visited realms
/// are skipped so cyclic profiles cannot loop. Without capaths the path is
/// inferred from the shared dot-separated realm suffix.
pub fn realms_list(client: &Realm, server: &Realm, config: &Config) -> Vec<String> {
    if client == server {
        return vec![client.as_str().to_string()];
    }

    if config.has_capaths_for(client.as_str()) {
        let mut path = vec![client.as_str().to_string()];
        let mut visited = BTreeSet::from([
            client.as_str().to_string(),
            server.as_str().to_string(),
        ]);
        push_capath_intermediates(
            config,
            client.as_str(),
            server.as_str(),
            &mut visited,
            &mut path,
        );
        return path;
    }

    hierarchical_path(client.as_str(), server.as_str())
}

fn push_capath_intermediates(
    config: &Config,
    from: &str,
    to: &str,
    visited: &mut BTreeSet<String>,
    path: &mut Vec<String>,
) {
    let Some(hops) = config.capath(from, to) else {
        return;
    };
    for hop in hops {
        if hop == "." {
            continue;
        }
        if !visited.insert(hop.clone()) {
            continue;
        }
        push_capath_intermediates(config, from, hop, visited, path);
        path.push(hop.clone());
    }
}

fn hierarchical_path(client: &str, server: &str) -> Vec<String> {
    let client_labels: Vec<&str> = client.split('.').collect();
    let server_labels: Vec<&str> = server.split('.').collect();

    let common = client_labels
        .iter()
        .rev()
        .zip(server_labels.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mut path = Vec::new();
    // Descend from the client realm toward the shared suffix.
    for i in 0..(client_labels.len() - common) {
        path.push(client_labels[i..].join("."));
    }
    if common > 0 {
        let shared = client_labels[client_labels.len() - common..].join(".");
        if shared != server {
            path.push(shared);
        }
    }
    // Climb from the shared suffix toward (but excluding) the server realm.
    for i in 1..(server_labels.len() - common) {
        path.push(server_labels[i..].join("."));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_parse_simple() {
        let p = Principal::parse("user@EXAMPLE.COM", PrincipalNameType::NtPrincipal).unwrap();
        assert_eq!(p.components(), &["user".to_string()]);
        assert_eq!(p.realm().unwrap().as_str(), "EXAMPLE.COM");
        assert_eq!(p.to_string(), "user@EXAMPLE.COM");
    }

    #[test]
    fn test_principal_parse_service() {
        let p = Principal::parse("host/server.example.com@EXAMPLE.COM", PrincipalNameType::NtSrvHst)
            .unwrap();
        assert_eq!(
            p.components(),
            &["host".to_string(), "server.example.com".to_string()]
        );
        assert_eq!(p.to_string(), "host/server.example.com@EXAMPLE.COM");
    }

    #[test]
    fn test_principal_parse_no_realm() {
        let p = Principal::parse("user", PrincipalNameType::NtPrincipal).unwrap();
        assert!(p.realm().is_none());

        let config = Config::from_toml(
            r#"
            [libdefaults]
            default_realm = "EXAMPLE.COM"
            "#,
        )
        .unwrap();
        let p = p.resolve_realm(&config).unwrap();
        assert_eq!(p.realm().unwrap().as_str(), "EXAMPLE.COM");

        let empty = Config::from_toml("").unwrap();
        let p = Principal::parse("user", PrincipalNameType::NtPrincipal).unwrap();
        assert!(matches!(
            p.resolve_realm(&empty),
            Err(KrbError::ConfigDefaultRealmMissing)
        ));
    }

    #[test]
    fn test_principal_parse_escapes_round_trip() {
        for s in [
            "user@EXAMPLE.COM",
            "a/b@REALM",
            "odd\\/name/second@REALM",
            "user\\@host@REALM",
            "krbtgt/EXAMPLE.COM@EXAMPLE.COM",
        ] {
            let p = Principal::parse(s, PrincipalNameType::NtUnknown).unwrap();
            assert_eq!(p.to_string(), s);
        }

        let p = Principal::parse("odd\\/name@REALM", PrincipalNameType::NtPrincipal).unwrap();
        assert_eq!(p.components(), &["odd/name".to_string()]);
    }

    #[test]
    fn test_principal_parse_rejects_empty() {
        assert!(Principal::parse("user@", PrincipalNameType::NtPrincipal).is_err());
        assert!(Principal::parse("a//b@REALM", PrincipalNameType::NtPrincipal).is_err());
        assert!(Principal::parse("", PrincipalNameType::NtPrincipal).is_err());
    }

    #[test]
    fn test_principal_equality_unknown_wildcard() {
        let a = Principal::parse("user@EXAMPLE.COM", PrincipalNameType::NtPrincipal).unwrap();
        let b = Principal::parse("user@EXAMPLE.COM", PrincipalNameType::NtUnknown).unwrap();
        let c = Principal::parse("user@EXAMPLE.COM", PrincipalNameType::NtSrvInst).unwrap();

        assert!(a.equals_without_realm(&b));
        assert!(b.equals_without_realm(&a));
        assert!(!a.equals_without_realm(&c));

        let d = Principal::parse("user@OTHER.COM", PrincipalNameType::NtPrincipal).unwrap();
        assert!(a.equals_without_realm(&d));
        assert_ne!(a, d);
    }

    #[test]
    fn test_realm_rejects_separators() {
        assert!(Realm::new("EXAMPLE.COM").is_ok());
        assert!(matches!(Realm::new(""), Err(KrbError::PrincipalEmptyRealm)));
        for bad in ["EXAMPLE/COM", "EXAMPLE:88", "EXAMPLE\0COM"] {
            assert!(matches!(
                Realm::new(bad),
                Err(KrbError::RealmInvalidCharacter)
            ));
        }
    }

    #[test]
    fn test_default_salt() {
        let p = Principal::parse("host/server.example.com@EXAMPLE.COM", PrincipalNameType::NtSrvHst)
            .unwrap();
        assert_eq!(p.salt().unwrap(), "EXAMPLE.COMhostserver.example.com");

        let mut p = p;
        p.override_salt("EXAMPLE.COMcustom".to_string());
        assert_eq!(p.salt().unwrap(), "EXAMPLE.COMcustom");
    }

    #[test]
    fn test_service_host_canonical_extension_only() {
        let config = Config::from_toml("").unwrap();

        // Canonical form extends the original, adopt it.
        let p = Principal::service_host(
            "host",
            "Server",
            Some("server.example.com"),
            Some(Realm::new("EXAMPLE.COM").unwrap()),
            &config,
        )
        .unwrap();
        assert_eq!(
            p.components(),
            &["host".to_string(), "server.example.com".to_string()]
        );

        // Canonical form points somewhere else, keep the original.
        let p = Principal::service_host(
            "host",
            "server",
            Some("other.example.com"),
            Some(Realm::new("EXAMPLE.COM").unwrap()),
            &config,
        )
        .unwrap();
        assert_eq!(p.components(), &["host".to_string(), "server".to_string()]);
    }

    #[test]
    fn test_service_host_domain_realm() {
        let config = Config::from_toml(
            r#"
            [domain_realm]
            ".example.com" = "EXAMPLE.COM"
            "#,
        )
        .unwrap();
        let p = Principal::service_host("host", "Server.Example.Com", None, None, &config).unwrap();
        assert_eq!(p.realm().unwrap().as_str(), "EXAMPLE.COM");
    }

    #[test]
    fn test_realms_list_same_realm() {
        let config = Config::from_toml("").unwrap();
        let r = Realm::new("EXAMPLE.COM").unwrap();
        assert_eq!(realms_list(&r, &r, &config), vec!["EXAMPLE.COM"]);
    }

    #[test]
    fn test_realms_list_hierarchical_direct_ancestor() {
        let config = Config::from_toml("").unwrap();
        let client = Realm::new("A.B.C.COM").unwrap();
        let server = Realm::new("B.C.COM").unwrap();
        assert_eq!(realms_list(&client, &server, &config), vec!["A.B.C.COM"]);
    }

    #[test]
    fn test_realms_list_hierarchical_general() {
        let config = Config::from_toml("").unwrap();
        let client = Realm::new("A.B.C.COM").unwrap();
        let server = Realm::new("D.E.C.COM").unwrap();
        let path = realms_list(&client, &server, &config);
        assert_eq!(path, vec!["A.B.C.COM", "B.C.COM", "C.COM", "E.C.COM"]);
        assert_eq!(path[0], client.as_str());
        assert!(!path.contains(&server.as_str().to_string()));
    }

    #[test]
    fn test_realms_list_capaths() {
        let config = Config::from_toml(
            r#"
            [capaths."A.EXAMPLE.COM"]
            "B.EXAMPLE.COM" = ["EXAMPLE.COM"]
            "C.EXAMPLE.COM" = ["."]
            "#,
        )
        .unwrap();

        let client = Realm::new("A.EXAMPLE.COM").unwrap();
        let server = Realm::new("B.EXAMPLE.COM").unwrap();
        assert_eq!(
            realms_list(&client, &server, &config),
            vec!["A.EXAMPLE.COM", "EXAMPLE.COM"]
        );

        // "." sentinel: direct trust, no intermediaries.
        let server = Realm::new("C.EXAMPLE.COM").unwrap();
        assert_eq!(
            realms_list(&client, &server, &config),
            vec!["A.EXAMPLE.COM"]
        );
    }

    #[test]
    fn test_realms_list_capaths_cycle_avoidance() {
        let config = Config::from_toml(
            r#"
            [capaths."A.COM"]
            "B.COM" = ["C.COM", "A.COM", "C.COM"]
            "#,
        )
        .unwrap();
        let client = Realm::new("A.COM").unwrap();
        let server = Realm::new("B.COM").unwrap();
        // A.COM (visited) and the repeated C.COM are both skipped.
        assert_eq!(realms_list(&client, &server, &config), vec!["A.COM", "C.COM"]);
    }
}
