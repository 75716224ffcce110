use crate::asn1::constants::EncryptionType;
use crate::asn1::encrypted_data::EncryptedData;
use crate::asn1::host_addresses::HostAddresses;
use crate::asn1::kerberos_flags::TicketFlags;
use crate::asn1::kerberos_time::KerberosTime;
use crate::asn1::krb_cred::{EncKrbCredPart, EncKrbCredPartInner, KrbCred, KrbCredInfo};
use crate::asn1::tagged_ticket::TaggedTicket;
use crate::asn1::OctetString;
use crate::constants::KEY_USAGE_KRB_CRED;
use crate::error::KrbError;
use crate::keys::EncryptionKey;
use crate::principal::Principal;
use crate::proto::KdcReplyPart;

use der::flagset::FlagSet;
use der::{Decode, Encode};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

/// The authenticated session bundle produced by a successful exchange: the
/// server-encrypted ticket, the session key, and the ticket's validity
/// window and flags. A TGT is a Credentials whose server principal is the
/// ticket-granting service.
///
/// Renewal does not mutate in place - a renewal TGS exchange yields a fresh
/// Credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    ticket: TaggedTicket,
    client: Principal,
    server: Principal,
    session_key: EncryptionKey,
    flags: FlagSet<TicketFlags>,
    auth_time: SystemTime,
    start_time: Option<SystemTime>,
    end_time: SystemTime,
    renew_till: Option<SystemTime>,
    client_addresses: Option<HostAddresses>,
    service_key: Option<EncryptionKey>,
}

impl Credentials {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ticket: TaggedTicket,
        client: Principal,
        server: Principal,
        session_key: EncryptionKey,
        flags: FlagSet<TicketFlags>,
        auth_time: SystemTime,
        start_time: Option<SystemTime>,
        end_time: SystemTime,
        renew_till: Option<SystemTime>,
    ) -> Self {
        Credentials {
            ticket,
            client,
            server,
            session_key,
            flags,
            auth_time,
            start_time,
            end_time,
            renew_till,
            client_addresses: None,
            service_key: None,
        }
    }

    /// Assemble credentials from a validated, decrypted KDC reply.
    pub(crate) fn from_reply(
        client: Principal,
        ticket: TaggedTicket,
        part: KdcReplyPart,
    ) -> Self {
        Credentials {
            ticket,
            client,
            server: part.server,
            session_key: part.key,
            flags: part.flags,
            auth_time: part.auth_time,
            start_time: part.start_time,
            end_time: part.end_time,
            renew_till: part.renew_till,
            client_addresses: part.client_addresses,
            service_key: None,
        }
    }

    pub(crate) fn ticket(&self) -> &TaggedTicket {
        &self.ticket
    }

    pub fn client(&self) -> &Principal {
        &self.client
    }

    pub fn server(&self) -> &Principal {
        &self.server
    }

    pub(crate) fn session_key(&self) -> &EncryptionKey {
        &self.session_key
    }

    pub fn flags(&self) -> FlagSet<TicketFlags> {
        self.flags
    }

    pub fn auth_time(&self) -> SystemTime {
        self.auth_time
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.start_time
    }

    pub fn end_time(&self) -> SystemTime {
        self.end_time
    }

    pub fn renew_till(&self) -> Option<SystemTime> {
        self.renew_till
    }

    pub fn is_renewable(&self) -> bool {
        self.flags.contains(TicketFlags::Renewable)
    }

    pub fn ok_as_delegate(&self) -> bool {
        self.flags.contains(TicketFlags::OkAsDelegate)
    }

    /// Clear the ok-as-delegate flag, refusing local delegation regardless
    /// of KDC policy.
    pub fn reset_delegate(&mut self) {
        self.flags -= TicketFlags::OkAsDelegate;
    }

    pub fn set_service_key(&mut self, key: EncryptionKey) {
        self.service_key = Some(key);
    }

    pub fn service_key(&self) -> Option<&EncryptionKey> {
        self.service_key.as_ref()
    }

    /// Zero the session key. The credentials are unusable afterwards.
    pub fn destroy(&mut self) {
        self.session_key.destroy();
        if let Some(key) = &mut self.service_key {
            key.destroy();
        }
    }

    /// Package these credentials as a KRB-CRED for delegation to a peer.
    /// With a key the EncKrbCredPart travels encrypted under key usage 14;
    /// without one the unencrypted (NULL etype) form that GSS delegation
    /// relies on is produced.
    pub fn to_krb_cred(&self, key: Option<&EncryptionKey>) -> Result<Vec<u8>, KrbError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| KrbError::PreauthInvalidUnixTs)?;

        let info = KrbCredInfo {
            key: self.session_key.asn1()?,
            prealm: Some(self.client.asn1_realm()?),
            pname: Some(self.client.asn1_name()?),
            flags: Some(self.flags),
            auth_time: Some(
                KerberosTime::from_system_time(self.auth_time)
                    .map_err(|_| KrbError::DerEncodeKerberosTime)?,
            ),
            start_time: self
                .start_time
                .map(KerberosTime::from_system_time)
                .transpose()
                .map_err(|_| KrbError::DerEncodeKerberosTime)?,
            end_time: Some(
                KerberosTime::from_system_time(self.end_time)
                    .map_err(|_| KrbError::DerEncodeKerberosTime)?,
            ),
            renew_till: self
                .renew_till
                .map(KerberosTime::from_system_time)
                .transpose()
                .map_err(|_| KrbError::DerEncodeKerberosTime)?,
            srealm: Some(self.server.asn1_realm()?),
            sname: Some(self.server.asn1_name()?),
            caddr: self.client_addresses.clone(),
        };

        let part = EncKrbCredPart(EncKrbCredPartInner {
            ticket_info: vec![info],
            nonce: None,
            timestamp: Some(
                KerberosTime::from_unix_duration(now)
                    .map_err(|_| KrbError::DerEncodeKerberosTime)?,
            ),
            usec: Some(now.subsec_micros()),
            s_address: None,
            r_address: None,
        });
        let part_der = part.to_der().map_err(|_| KrbError::DerEncodeKrbCred)?;

        let null_key = EncryptionKey::null();
        let key = key.unwrap_or(&null_key);
        let enc_part = if key.etype() == EncryptionType::NULL {
            EncryptedData {
                etype: key.etype().into(),
                kvno: None,
                cipher: OctetString::new(part_der).map_err(|_| KrbError::DerEncodeOctetString)?,
            }
        } else {
            EncryptedData {
                etype: key.etype().into(),
                kvno: key.kvno(),
                cipher: OctetString::new(key.encrypt(&part_der, KEY_USAGE_KRB_CRED)?)
                    .map_err(|_| KrbError::DerEncodeOctetString)?,
            }
        };

        KrbCred::new(vec![self.ticket.clone()], enc_part)
            .to_der()
            .map_err(|_| KrbError::DerEncodeKrbCred)
    }

    /// Unpack a delegated KRB-CRED. The key must match how the sender
    /// protected the EncKrbCredPart; the NULL etype form needs none.
    pub fn from_krb_cred(der: &[u8], key: Option<&EncryptionKey>) -> Result<Self, KrbError> {
        let cred = KrbCred::from_der(der).map_err(|err| {
            error!(?err, "unable to decode krb-cred");
            KrbError::DerDecodeKrbCred
        })?;
        let inner = cred.as_ref();

        let part_der = if inner.enc_part.etype == EncryptionType::NULL as i32 {
            inner.enc_part.cipher.as_bytes().to_vec()
        } else {
            let key = key.ok_or(KrbError::NoUsableKey)?;
            key.decrypt(inner.enc_part.cipher.as_bytes(), KEY_USAGE_KRB_CRED)?
        };

        let part = EncKrbCredPart::from_der(&part_der).map_err(|err| {
            error!(?err, "unable to decode enc-krb-cred-part");
            KrbError::DerDecodeKrbCred
        })?;

        let ticket = inner
            .tickets
            .first()
            .ok_or(KrbError::KrbCredMissingTicketInfo)?
            .clone();
        let info = part
            .0
            .ticket_info
            .into_iter()
            .next()
            .ok_or(KrbError::KrbCredMissingTicketInfo)?;

        let prealm = info.prealm.ok_or(KrbError::KrbCredMissingTicketInfo)?;
        let pname = info.pname.ok_or(KrbError::KrbCredMissingTicketInfo)?;
        let srealm = info.srealm.ok_or(KrbError::KrbCredMissingTicketInfo)?;
        let sname = info.sname.ok_or(KrbError::KrbCredMissingTicketInfo)?;
        let end_time = info
            .end_time
            .ok_or(KrbError::KrbCredMissingTicketInfo)?
            .to_system_time();

        Ok(Credentials {
            ticket,
            client: Principal::from_asn1(&pname, &prealm)?,
            server: Principal::from_asn1(&sname, &srealm)?,
            session_key: EncryptionKey::from_asn1(&info.key)?,
            flags: info.flags.unwrap_or_default(),
            auth_time: info
                .auth_time
                .map(KerberosTime::to_system_time)
                .unwrap_or(UNIX_EPOCH),
            start_time: info.start_time.map(KerberosTime::to_system_time),
            end_time,
            renew_till: info.renew_till.map(KerberosTime::to_system_time),
            client_addresses: info.caddr,
            service_key: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::constants::PrincipalNameType;
    use crate::asn1::tagged_ticket::Ticket;
    use std::time::Duration;

    fn sample_credentials() -> Credentials {
        let client =
            Principal::parse("user@EXAMPLE.COM", PrincipalNameType::NtPrincipal).unwrap();
        let server =
            Principal::parse("krbtgt/EXAMPLE.COM@EXAMPLE.COM", PrincipalNameType::NtSrvInst)
                .unwrap();

        let ticket = TaggedTicket::new(Ticket {
            tkt_vno: 5,
            realm: server.asn1_realm().unwrap(),
            sname: server.asn1_name().unwrap(),
            enc_part: EncryptedData {
                etype: EncryptionType::AES256_CTS_HMAC_SHA1_96 as i32,
                kvno: Some(2),
                cipher: OctetString::new(vec![0x5a; 64]).unwrap(),
            },
        });

        let auth_time = UNIX_EPOCH + Duration::from_secs(1_725_000_000);
        let mut flags = FlagSet::<TicketFlags>::default();
        flags |= TicketFlags::Initial;
        flags |= TicketFlags::Renewable;
        flags |= TicketFlags::OkAsDelegate;

        Credentials::new(
            ticket,
            client,
            server,
            EncryptionKey::new(
                EncryptionType::AES256_CTS_HMAC_SHA1_96,
                vec![0x42; 32],
                None,
            ),
            flags,
            auth_time,
            Some(auth_time),
            auth_time + Duration::from_secs(8 * 3600),
            Some(auth_time + Duration::from_secs(7 * 24 * 3600)),
        )
    }

    #[test]
    fn test_reset_delegate() {
        let mut creds = sample_credentials();
        assert!(creds.ok_as_delegate());
        creds.reset_delegate();
        assert!(!creds.ok_as_delegate());
        assert!(creds.is_renewable());
    }

    #[test]
    fn test_krb_cred_round_trip_encrypted() {
        let creds = sample_credentials();
        let key = EncryptionKey::derive(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            b"sekrit",
            "EXAMPLE.COMuser",
            None,
        )
        .unwrap();

        let blob = creds.to_krb_cred(Some(&key)).unwrap();
        let parsed = Credentials::from_krb_cred(&blob, Some(&key)).unwrap();

        assert_eq!(parsed.client(), creds.client());
        assert_eq!(parsed.server(), creds.server());
        assert_eq!(parsed.session_key(), creds.session_key());
        assert_eq!(parsed.flags().bits(), creds.flags().bits());
        assert_eq!(parsed.end_time(), creds.end_time());
        assert_eq!(parsed.renew_till(), creds.renew_till());
    }

    #[test]
    fn test_krb_cred_round_trip_null_key() {
        let creds = sample_credentials();
        // The unencrypted form needs no key on either side.
        let blob = creds.to_krb_cred(None).unwrap();
        let cred = KrbCred::from_der(&blob).unwrap();
        assert_eq!(cred.as_ref().enc_part.etype, EncryptionType::NULL as i32);
        let parsed = Credentials::from_krb_cred(&blob, None).unwrap();
        assert_eq!(parsed.client(), creds.client());
        assert_eq!(parsed.session_key(), creds.session_key());

        // An explicit null key produces the same unencrypted form.
        let blob = creds.to_krb_cred(Some(&EncryptionKey::null())).unwrap();
        let parsed = Credentials::from_krb_cred(&blob, None).unwrap();
        assert_eq!(parsed.server(), creds.server());
    }

    #[test]
    fn test_krb_cred_wrong_key_fails() {
        let creds = sample_credentials();
        let key = EncryptionKey::derive(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            b"sekrit",
            "EXAMPLE.COMuser",
            None,
        )
        .unwrap();
        let wrong = EncryptionKey::derive(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            b"other",
            "EXAMPLE.COMuser",
            None,
        )
        .unwrap();

        let blob = creds.to_krb_cred(Some(&key)).unwrap();
        assert!(matches!(
            Credentials::from_krb_cred(&blob, Some(&wrong)),
            Err(KrbError::MessageAuthenticationFailed)
        ));
        // Encrypted form without a key cannot be opened.
        assert!(matches!(
            Credentials::from_krb_cred(&blob, None),
            Err(KrbError::NoUsableKey)
        ));
    }

    #[test]
    fn test_destroy_zeroes_session_key() {
        let mut creds = sample_credentials();
        creds.destroy();
        assert!(creds.session_key().is_zeroed());
    }
}
