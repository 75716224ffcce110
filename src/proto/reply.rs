use crate::asn1::constants::{EncryptionType, KrbMessageType};
use crate::asn1::enc_kdc_rep_part::{EncKdcRepPart, TaggedEncKdcRepPart};
use crate::asn1::host_addresses::HostAddresses;
use crate::asn1::kdc_rep::KdcRep;
use crate::asn1::kerberos_flags::{KerberosFlags, TicketFlags};
use crate::asn1::krb_error::{KrbError as KdcErrorMessage, MethodData};
use crate::asn1::krb_kdc_rep::KrbKdcRep;
use crate::asn1::tagged_ticket::TaggedTicket;
use crate::constants::{
    KEY_USAGE_AS_REP_ENC_PART, KEY_USAGE_TGS_REP_SESSION, KEY_USAGE_TGS_REP_SUBKEY,
};
use crate::error::KrbError;
use crate::keys::{EncryptionKey, KeyVault};
use crate::principal::Principal;
use crate::proto::request::{AsRequest, TgsRequest};
use crate::proto::{kdc_error_to_krb, PreauthData};

use der::flagset::FlagSet;
use der::Decode;
use std::time::{Duration, SystemTime};
use tracing::error;

const MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Any message a KDC sends back over the transport.
#[derive(Debug, Clone)]
pub enum KerberosReply {
    AsRep(AsReply),
    TgsRep(TgsReply),
    ErrRep(ErrorReply),
}

impl KerberosReply {
    pub fn parse(der: &[u8]) -> Result<Self, KrbError> {
        let rep = KrbKdcRep::from_der(der).map_err(|err| {
            error!(?err, "unable to decode kdc reply");
            KrbError::DerDecodeReply
        })?;
        match rep {
            KrbKdcRep::AsRep(rep) => {
                if rep.pvno != 5 {
                    return Err(KrbError::InvalidPvno);
                }
                if rep.msg_type != KrbMessageType::KrbAsRep as u8 {
                    return Err(KrbError::InvalidMessageType);
                }
                Ok(KerberosReply::AsRep(AsReply { rep }))
            }
            KrbKdcRep::TgsRep(rep) => {
                if rep.pvno != 5 {
                    return Err(KrbError::InvalidPvno);
                }
                if rep.msg_type != KrbMessageType::KrbTgsRep as u8 {
                    return Err(KrbError::InvalidMessageType);
                }
                Ok(KerberosReply::TgsRep(TgsReply { rep }))
            }
            KrbKdcRep::ErrRep(err) => {
                if err.pvno != 5 {
                    return Err(KrbError::InvalidPvno);
                }
                if err.msg_type != KrbMessageType::KrbError as u8 {
                    return Err(KrbError::InvalidMessageType);
                }
                Ok(KerberosReply::ErrRep(ErrorReply { err }))
            }
        }
    }
}

/// The decrypted EncKDCRepPart, lifted out of its wire types. Holds the
/// session key - every exit that does not hand the key to the caller must
/// destroy it.
#[derive(Debug)]
pub struct KdcReplyPart {
    pub(crate) key: EncryptionKey,
    pub(crate) nonce: i32,
    pub(crate) flags: FlagSet<TicketFlags>,
    pub(crate) auth_time: SystemTime,
    pub(crate) start_time: Option<SystemTime>,
    pub(crate) end_time: SystemTime,
    pub(crate) renew_till: Option<SystemTime>,
    pub(crate) server: Principal,
    pub(crate) client_addresses: Option<HostAddresses>,
    pub(crate) key_expiration: Option<SystemTime>,
}

impl KdcReplyPart {
    fn try_from_asn1(part: EncKdcRepPart) -> Result<Self, KrbError> {
        let key = EncryptionKey::from_asn1(&part.key)?;
        let server = Principal::from_asn1(&part.server_name, &part.server_realm)?;
        Ok(KdcReplyPart {
            key,
            nonce: part.nonce,
            flags: part.flags,
            auth_time: part.auth_time.to_system_time(),
            start_time: part.start_time.map(|t| t.to_system_time()),
            end_time: part.end_time.to_system_time(),
            renew_till: part.renew_till.map(|t| t.to_system_time()),
            server,
            client_addresses: part.client_addresses,
            key_expiration: part.key_expiration.map(|t| t.to_system_time()),
        })
    }

    pub fn session_key_zeroed(&self) -> bool {
        self.key.is_zeroed()
    }

    /// When the KDC reports the client's password is due to expire.
    pub fn key_expiration(&self) -> Option<SystemTime> {
        self.key_expiration
    }
}

fn reject(part: &mut KdcReplyPart) -> KrbError {
    part.key.destroy();
    KrbError::ReplyModified
}

fn within_skew(a: SystemTime, b: SystemTime) -> bool {
    match a.duration_since(b) {
        Ok(d) => d <= MAX_CLOCK_SKEW,
        Err(e) => e.duration() <= MAX_CLOCK_SKEW,
    }
}

fn truncate_secs(t: SystemTime) -> SystemTime {
    match t.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => SystemTime::UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => t,
    }
}

// RFC 4120 section 3.1.5: the client rechecks that what came back is what
// it asked for. The KDC (or an active attacker) must not be able to
// substitute fields the client did not request.
const OPTION_ECHO: [(KerberosFlags, TicketFlags); 7] = [
    (KerberosFlags::Forwardable, TicketFlags::Forwardable),
    (KerberosFlags::Forwarded, TicketFlags::Forwarded),
    (KerberosFlags::Proxiable, TicketFlags::Proxiable),
    (KerberosFlags::Proxy, TicketFlags::Proxy),
    (KerberosFlags::AllowPostdate, TicketFlags::MayPostdate),
    (KerberosFlags::Postdated, TicketFlags::Postdated),
    (KerberosFlags::Renewable, TicketFlags::Renewable),
];

#[allow(clippy::too_many_arguments)]
fn validate_reply_part(
    part: &mut KdcReplyPart,
    nonce: i32,
    options: FlagSet<KerberosFlags>,
    service: &Principal,
    from: Option<SystemTime>,
    till: SystemTime,
    rtime: Option<SystemTime>,
    addresses: Option<&HostAddresses>,
) -> Result<(), KrbError> {
    if part.nonce != nonce {
        error!("nonce mismatch in kdc reply");
        return Err(reject(part));
    }

    if !service.equals_without_realm(&part.server) {
        error!("server principal mismatch in kdc reply");
        return Err(reject(part));
    }

    for (option, flag) in OPTION_ECHO {
        let requested = options.contains(option);
        let granted = part.flags.contains(flag);
        if requested != granted {
            // RENEWABLE-OK invites the KDC to upgrade to a renewable
            // ticket that the client did not explicitly request.
            if flag == TicketFlags::Renewable
                && granted
                && options.contains(KerberosFlags::RenewableOk)
            {
                continue;
            }
            error!(?option, "ticket flags do not match requested options");
            return Err(reject(part));
        }
    }

    let start = part.start_time.unwrap_or(part.auth_time);
    match from {
        Some(from) => {
            if start != truncate_secs(from) {
                error!("postdated start time does not match request");
                return Err(reject(part));
            }
        }
        None => {
            if !within_skew(start, SystemTime::now()) {
                error!("ticket start time outside allowed clock skew");
                return Err(reject(part));
            }
        }
    }

    if part.end_time > till {
        error!("ticket end time exceeds requested till");
        return Err(reject(part));
    }

    if let (Some(renew_till), Some(rtime)) = (part.renew_till, rtime) {
        if renew_till > rtime {
            error!("ticket renew-till exceeds requested rtime");
            return Err(reject(part));
        }
    }

    if let (Some(requested), Some(granted)) = (addresses, part.client_addresses.as_ref()) {
        if requested != granted {
            error!("client addresses do not match request");
            return Err(reject(part));
        }
    }

    Ok(())
}

/// A decoded AS-REP, still carrying its encrypted part.
#[derive(Debug, Clone)]
pub struct AsReply {
    rep: KdcRep,
}

impl AsReply {
    /// The etype the KDC chose for the reply's encrypted part. When no
    /// preauth round named an etype, this is what the client key must be
    /// derived as.
    pub fn encryption_etype(&self) -> Result<EncryptionType, KrbError> {
        EncryptionType::try_from(self.rep.enc_part.etype)
            .map_err(|_| KrbError::UnsupportedEncryption)
    }

    /// Hints the KDC attached to the reply itself (salt corrections via
    /// PA-ETYPE-INFO2 are legal here too).
    pub fn preauth_hints(&self) -> Result<PreauthData, KrbError> {
        match &self.rep.padata {
            Some(padata) => PreauthData::try_from(padata.as_slice()),
            None => Ok(PreauthData::default()),
        }
    }

    pub(crate) fn ticket(&self) -> TaggedTicket {
        self.rep.ticket.clone()
    }

    /// Decrypt the enc-part with a key from the vault, key usage 3. A kvno
    /// mismatch retries without the kvno constraint before giving up, since
    /// KDCs routinely send stale kvnos for password-derived keys.
    pub fn decrypt(&self, vault: &KeyVault) -> Result<KdcReplyPart, KrbError> {
        let etype = self.encryption_etype()?;
        let key = match vault.find(etype, self.rep.enc_part.kvno) {
            Ok(key) => key,
            Err(KrbError::BadKeyVersion) => vault.find(etype, None)?,
            Err(err) => return Err(err),
        };

        let plain = key.decrypt(self.rep.enc_part.cipher.as_bytes(), KEY_USAGE_AS_REP_ENC_PART)?;

        // MIT KDCs have been seen tagging the AS enc-part as EncTGSRepPart,
        // so both application tags are accepted.
        let part = TaggedEncKdcRepPart::from_der(&plain).map_err(|err| {
            error!(?err, "unable to decode enc-kdc-rep-part");
            KrbError::DerDecodeEncKdcRepPart
        })?;
        let (TaggedEncKdcRepPart::EncAsRepPart(inner)
        | TaggedEncKdcRepPart::EncTgsRepPart(inner)) = part;
        KdcReplyPart::try_from_asn1(inner)
    }

    /// Cross-check the decrypted part against the request it answers. On
    /// any mismatch the session key is zeroed before the error is raised,
    /// so a tampered reply can never leak a live key.
    pub fn validate(&self, request: &AsRequest, part: &mut KdcReplyPart) -> Result<(), KrbError> {
        let Ok(client) = Principal::from_asn1(&self.rep.cname, &self.rep.crealm) else {
            error!("malformed client principal in as-rep");
            return Err(reject(part));
        };
        if !request.client.equals_without_realm(&client) {
            error!("client principal mismatch in as-rep");
            return Err(reject(part));
        }
        let Ok(request_realm) = request.client.realm_required() else {
            return Err(reject(part));
        };
        if self.rep.crealm.as_str() != request_realm.as_str() {
            error!("client realm mismatch in as-rep");
            return Err(reject(part));
        }
        // The authenticated copy of the service realm sits inside the
        // encrypted part; the realm-blind server comparison below does not
        // cover it.
        if part.server.realm() != Some(request_realm) {
            error!("service realm mismatch in as-rep enc-part");
            return Err(reject(part));
        }

        validate_reply_part(
            part,
            request.nonce,
            request.options,
            &request.service,
            request.from,
            request.till,
            request.rtime,
            request.addresses.as_ref(),
        )
    }
}

/// A decoded TGS-REP, still carrying its encrypted part.
#[derive(Debug, Clone)]
pub struct TgsReply {
    rep: KdcRep,
}

impl TgsReply {
    pub(crate) fn ticket(&self) -> TaggedTicket {
        self.rep.ticket.clone()
    }

    /// Decrypt the enc-part with the request's reply key: the subkey from
    /// the authenticator when one was sent (usage 9), else the TGT session
    /// key (usage 8).
    pub fn decrypt(&self, request: &TgsRequest) -> Result<KdcReplyPart, KrbError> {
        let etype = EncryptionType::try_from(self.rep.enc_part.etype)
            .map_err(|_| KrbError::UnsupportedEncryption)?;
        if etype != request.reply_key.etype() {
            error!("tgs-rep enc-part etype does not match the reply key");
            return Err(KrbError::NoUsableKey);
        }
        let usage = if request.subkey_used {
            KEY_USAGE_TGS_REP_SUBKEY
        } else {
            KEY_USAGE_TGS_REP_SESSION
        };
        let plain = request
            .reply_key
            .decrypt(self.rep.enc_part.cipher.as_bytes(), usage)?;

        let part = TaggedEncKdcRepPart::from_der(&plain).map_err(|err| {
            error!(?err, "unable to decode enc-kdc-rep-part");
            KrbError::DerDecodeEncKdcRepPart
        })?;
        let (TaggedEncKdcRepPart::EncAsRepPart(inner)
        | TaggedEncKdcRepPart::EncTgsRepPart(inner)) = part;
        KdcReplyPart::try_from_asn1(inner)
    }

    /// Same tamper checks as the AS path, keyed off the TGS request.
    pub fn validate(&self, request: &TgsRequest, part: &mut KdcReplyPart) -> Result<(), KrbError> {
        let Ok(client) = Principal::from_asn1(&self.rep.cname, &self.rep.crealm) else {
            error!("malformed client principal in tgs-rep");
            return Err(reject(part));
        };
        if !request.client.equals_without_realm(&client) {
            error!("client principal mismatch in tgs-rep");
            return Err(reject(part));
        }
        let Ok(service_realm) = request.service.realm_required() else {
            return Err(reject(part));
        };
        if part.server.realm() != Some(service_realm) {
            error!("service realm mismatch in tgs-rep enc-part");
            return Err(reject(part));
        }

        validate_reply_part(
            part,
            request.nonce,
            request.options,
            &request.service,
            request.from,
            request.till,
            request.rtime,
            None,
        )
    }
}

/// A decoded KRB-ERROR.
#[derive(Debug, Clone)]
pub struct ErrorReply {
    err: KdcErrorMessage,
}

impl ErrorReply {
    pub fn error_code(&self) -> i32 {
        self.err.error_code
    }

    pub fn error(&self) -> KrbError {
        kdc_error_to_krb(self.err.error_code)
    }

    pub fn error_text(&self) -> Option<&str> {
        self.err.error_text.as_ref().map(|t| t.as_str())
    }

    /// The preauth hints from the e-data field. Absent e-data yields empty
    /// hints rather than an error - not every KRB-ERROR carries it.
    pub fn preauth_data(&self) -> Result<PreauthData, KrbError> {
        match &self.err.error_data {
            Some(edata) => {
                let method_data = MethodData::from_der(edata.as_bytes()).map_err(|err| {
                    error!(?err, "unable to decode krb-error e-data");
                    KrbError::DerDecodePaData
                })?;
                PreauthData::try_from(method_data.as_slice())
            }
            None => Ok(PreauthData::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asn1::constants::PrincipalNameType;
    use crate::asn1::encrypted_data::EncryptedData;
    use crate::asn1::kerberos_time::KerberosTime;
    use crate::asn1::tagged_ticket::Ticket;
    use crate::asn1::OctetString;
    use crate::creds::Credentials;
    use crate::principal::Realm;
    use crate::proto::request::{AsRequestBuilder, TgsRequestBuilder};
    use der::Encode;
    use std::time::Duration;

    fn client() -> Principal {
        Principal::parse("testuser@EXAMPLE.COM", PrincipalNameType::NtPrincipal).unwrap()
    }

    fn now_secs() -> SystemTime {
        truncate_secs(SystemTime::now())
    }

    fn dummy_ticket(server: &Principal) -> TaggedTicket {
        TaggedTicket::new(Ticket {
            tkt_vno: 5,
            realm: server.asn1_realm().unwrap(),
            sname: server.asn1_name().unwrap(),
            enc_part: EncryptedData {
                etype: EncryptionType::AES256_CTS_HMAC_SHA1_96 as i32,
                kvno: Some(1),
                cipher: OctetString::new(vec![0x77; 48]).unwrap(),
            },
        })
    }

    fn encode_rep_part(
        session_key: &EncryptionKey,
        nonce: i32,
        flags: FlagSet<TicketFlags>,
        start: SystemTime,
        end: SystemTime,
        server: &Principal,
        as_rep: bool,
    ) -> Vec<u8> {
        let part = EncKdcRepPart {
            key: session_key.asn1().unwrap(),
            last_req: Vec::new(),
            nonce,
            key_expiration: None,
            flags,
            auth_time: KerberosTime::from_system_time(start).unwrap(),
            start_time: Some(KerberosTime::from_system_time(start).unwrap()),
            end_time: KerberosTime::from_system_time(end).unwrap(),
            renew_till: None,
            server_realm: server.asn1_realm().unwrap(),
            server_name: server.asn1_name().unwrap(),
            client_addresses: None,
        };
        let part = if as_rep {
            TaggedEncKdcRepPart::EncAsRepPart(part)
        } else {
            TaggedEncKdcRepPart::EncTgsRepPart(part)
        };
        part.to_der().unwrap()
    }

    fn fixture_as_reply(
        user_key: &EncryptionKey,
        session_key: &EncryptionKey,
        nonce: i32,
        flags: FlagSet<TicketFlags>,
        start: SystemTime,
        end: SystemTime,
    ) -> AsReply {
        let server = Principal::tgs(client().realm().unwrap()).unwrap();
        fixture_as_reply_for(user_key, session_key, nonce, flags, start, end, &server)
    }

    fn fixture_as_reply_for(
        user_key: &EncryptionKey,
        session_key: &EncryptionKey,
        nonce: i32,
        flags: FlagSet<TicketFlags>,
        start: SystemTime,
        end: SystemTime,
        server: &Principal,
    ) -> AsReply {
        let client = client();

        let plain = encode_rep_part(session_key, nonce, flags, start, end, server, true);
        let cipher = user_key.encrypt(&plain, KEY_USAGE_AS_REP_ENC_PART).unwrap();

        let rep = KdcRep {
            pvno: 5,
            msg_type: KrbMessageType::KrbAsRep as u8,
            padata: None,
            crealm: client.asn1_realm().unwrap(),
            cname: client.asn1_name().unwrap(),
            ticket: dummy_ticket(server),
            enc_part: EncryptedData {
                etype: user_key.etype().into(),
                kvno: user_key.kvno(),
                cipher: OctetString::new(cipher).unwrap(),
            },
        };
        let der = KrbKdcRep::AsRep(rep).to_der().unwrap();
        match KerberosReply::parse(&der).unwrap() {
            KerberosReply::AsRep(reply) => reply,
            _ => panic!("Expected AS-REP"),
        }
    }

    #[test]
    fn test_parse_as_rep_sample() {
        let _ = tracing_subscriber::fmt::try_init();
        let blob = "6b8203513082034da003020105a10302010ba22d302b3029a103020113a2220420301e301ca003020112a1151b134558414d504c452e434f4d7465737475736572a30d1b0b4558414d504c452e434f4da4153013a003020101a10c300a1b087465737475736572a58201ba618201b6308201b2a003020105a10d1b0b4558414d504c452e434f4da220301ea003020102a11730151b066b72627467741b0b4558414d504c452e434f4da382017830820174a003020112a103020101a282016604820162eac20712018638db059fc4580cb6aad87fbc722c85219b83574df7a6cee9ee5f6d83569c8ddfcd0695bd9ec215540200f905ec11f91353d6724be7fbfe9444606d39b4d85e4ae084a72a14a0f652a922da109e652b68dae1a519d2c2087b07c7d8f738738fe2276ead3c31d83bd3f8cbcc6c6ca8b5133a1cca5f09bfb45489fca80cecfc754d13f93418dc6385475400795d7f06f8ae9a146e21eeccd10f2efaa0bf1d3acde3f8d1c71cb7a555eedb1ce333a32941141c8ed7552a31df706d11be06b21c02178d2ac8bbed10964ff67b0b06e7f56f1c2422be26ac862521bf1be90b3977975a3346f2d2404342bf53b9c45d83a56c45fef0a7386ed82ffc0c4b23e10e9cb51ab18076d8fe9fc3d66d0ad9cd44764f2af929a181fe008d99de0acc44d689874ad433f1b04d129c2bb65f3070aa7c0343d9b07a44c9d031f950119f90744ff0085b0f4c08b29b281d376525736f9dd292eec03c16d2f5a681eb24bb56a682012c30820128a003020112a282011f0482011b602fe69bf3c949b575e0303ebec6975c3921b38a7479c16e68fd18d18972e670296ce1f6d005df8f423f44f9f8efcaafc8a148a141f706ddd24a2ded22f85b85c41ffe6168ba887a85f3b514e4f670818bf0f402c245cd167ef5136a72edd19e0536d0ea1863e27a227dd7207aa0d1c3d13526936636574f604bb57492feb534c1d8b15610bcce035a4de2d259103f9e63968f8b4e3f8b1e7120ef31bd390344bfabacf657ff062c8a50f12ffdf045df03d98bbc5f324b7a7eb48e4e656ceb5ee1325a394de51bb7617d6db4cda242c0aba97612dcf23816e08ca41bea80f4b2dc144422ed832c2395b61fdd9437f08fd2a3a1dd2475d61d61a102d1a38292afaded12f26318a6550328f60addb0542ac8e287d7a1c96f3593ca04";
        let blob = hex::decode(blob).unwrap();

        let KerberosReply::AsRep(reply) = KerberosReply::parse(&blob).unwrap() else {
            panic!("Expected AS-REP");
        };
        assert_eq!(
            reply.encryption_etype().unwrap(),
            EncryptionType::AES256_CTS_HMAC_SHA1_96
        );
        // The reply-attached etype-info2 names the salt.
        let hints = reply.preauth_hints().unwrap();
        let info = hints.preferred_etype_info2().unwrap();
        assert_eq!(info.salt.as_deref(), Some("EXAMPLE.COMtestuser"));
    }

    #[test]
    fn test_as_reply_decrypt_and_validate() {
        let now = now_secs();
        let till = now + Duration::from_secs(4 * 3600);
        let request = AsRequestBuilder::new(client(), till)
            .option(KerberosFlags::Forwardable)
            .nonce(0x0051_F00D)
            .build()
            .unwrap();

        let user_key = EncryptionKey::derive(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            b"password",
            "EXAMPLE.COMtestuser",
            None,
        )
        .unwrap();
        let session_key = EncryptionKey::new(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            vec![0x21; 32],
            None,
        );

        let mut flags = FlagSet::<TicketFlags>::default();
        flags |= TicketFlags::Forwardable;
        flags |= TicketFlags::Initial;

        let reply = fixture_as_reply(&user_key, &session_key, 0x0051_F00D, flags, now, till);

        let vault = KeyVault::new(vec![user_key]);
        let mut part = reply.decrypt(&vault).unwrap();
        reply.validate(&request, &mut part).unwrap();

        assert_eq!(part.key, session_key);
        assert_eq!(part.end_time, till);
        assert!(part.flags.contains(TicketFlags::Initial));
    }

    #[test]
    fn test_as_reply_tampered_nonce_zeroes_key() {
        let now = now_secs();
        let till = now + Duration::from_secs(3600);
        let request = AsRequestBuilder::new(client(), till)
            .nonce(1111)
            .build()
            .unwrap();

        let user_key = EncryptionKey::derive(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            b"password",
            "EXAMPLE.COMtestuser",
            None,
        )
        .unwrap();
        let session_key = EncryptionKey::new(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            vec![0x21; 32],
            None,
        );

        // The reply answers a different nonce than the request carried.
        let reply = fixture_as_reply(
            &user_key,
            &session_key,
            2222,
            FlagSet::default(),
            now,
            till,
        );

        let vault = KeyVault::new(vec![user_key]);
        let mut part = reply.decrypt(&vault).unwrap();
        assert!(!part.session_key_zeroed());
        assert!(matches!(
            reply.validate(&request, &mut part),
            Err(KrbError::ReplyModified)
        ));
        assert!(part.session_key_zeroed());
    }

    #[test]
    fn test_as_reply_foreign_service_realm_rejected() {
        let now = now_secs();
        let till = now + Duration::from_secs(3600);
        let request = AsRequestBuilder::new(client(), till)
            .nonce(3333)
            .build()
            .unwrap();

        let user_key = EncryptionKey::derive(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            b"password",
            "EXAMPLE.COMtestuser",
            None,
        )
        .unwrap();
        let session_key = EncryptionKey::new(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            vec![0x21; 32],
            None,
        );

        // Same krbtgt name components, but the enc-part claims the service
        // lives in a foreign realm.
        let forged = Principal::new(
            vec!["krbtgt".to_string(), "EXAMPLE.COM".to_string()],
            PrincipalNameType::NtSrvInst,
            Some(Realm::new("EVIL.COM").unwrap()),
        )
        .unwrap();
        let reply = fixture_as_reply_for(
            &user_key,
            &session_key,
            3333,
            FlagSet::default(),
            now,
            till,
            &forged,
        );

        let vault = KeyVault::new(vec![user_key]);
        let mut part = reply.decrypt(&vault).unwrap();
        assert!(!part.session_key_zeroed());
        assert!(matches!(
            reply.validate(&request, &mut part),
            Err(KrbError::ReplyModified)
        ));
        assert!(part.session_key_zeroed());
    }

    #[test]
    fn test_as_reply_unrequested_flag_rejected() {
        let now = now_secs();
        let till = now + Duration::from_secs(3600);
        let request = AsRequestBuilder::new(client(), till)
            .nonce(5555)
            .build()
            .unwrap();

        let user_key = EncryptionKey::derive(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            b"password",
            "EXAMPLE.COMtestuser",
            None,
        )
        .unwrap();
        let session_key = EncryptionKey::new(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            vec![0x21; 32],
            None,
        );

        // Proxiable was never requested.
        let mut flags = FlagSet::<TicketFlags>::default();
        flags |= TicketFlags::Proxiable;
        let reply = fixture_as_reply(&user_key, &session_key, 5555, flags, now, till);

        let vault = KeyVault::new(vec![user_key]);
        let mut part = reply.decrypt(&vault).unwrap();
        assert!(matches!(
            reply.validate(&request, &mut part),
            Err(KrbError::ReplyModified)
        ));
        assert!(part.session_key_zeroed());
    }

    #[test]
    fn test_as_reply_wrong_key_fails_decrypt() {
        let now = now_secs();
        let till = now + Duration::from_secs(3600);
        let user_key = EncryptionKey::derive(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            b"password",
            "EXAMPLE.COMtestuser",
            None,
        )
        .unwrap();
        let wrong_key = EncryptionKey::derive(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            b"hunter2",
            "EXAMPLE.COMtestuser",
            None,
        )
        .unwrap();
        let session_key = EncryptionKey::new(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            vec![0x21; 32],
            None,
        );

        let reply = fixture_as_reply(
            &user_key,
            &session_key,
            1,
            FlagSet::default(),
            now,
            till,
        );
        let vault = KeyVault::new(vec![wrong_key]);
        assert!(matches!(
            reply.decrypt(&vault),
            Err(KrbError::MessageAuthenticationFailed)
        ));
    }

    #[test]
    fn test_validate_rejects_address_substitution() {
        let now = now_secs();
        let till = now + Duration::from_secs(3600);
        let server = Principal::tgs(client().realm().unwrap()).unwrap();

        let requested =
            crate::proto::request::host_addresses(&["192.0.2.7".parse().unwrap()]).unwrap();
        let granted =
            crate::proto::request::host_addresses(&["198.51.100.9".parse().unwrap()]).unwrap();

        let mut part = KdcReplyPart {
            key: EncryptionKey::new(
                EncryptionType::AES256_CTS_HMAC_SHA1_96,
                vec![0x21; 32],
                None,
            ),
            nonce: 7,
            flags: FlagSet::default(),
            auth_time: now,
            start_time: Some(now),
            end_time: till,
            renew_till: None,
            server: server.clone(),
            client_addresses: Some(granted),
            key_expiration: None,
        };

        assert!(matches!(
            validate_reply_part(
                &mut part,
                7,
                FlagSet::default(),
                &server,
                None,
                till,
                None,
                Some(&requested),
            ),
            Err(KrbError::ReplyModified)
        ));
        assert!(part.session_key_zeroed());
    }

    #[test]
    fn test_tgs_reply_round_trip() {
        let now = now_secs();
        let tgt_client = client();
        let tgs = Principal::tgs(tgt_client.realm().unwrap()).unwrap();
        let session_key = EncryptionKey::new(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            vec![0x42; 32],
            None,
        );
        let tgt = Credentials::new(
            dummy_ticket(&tgs),
            tgt_client.clone(),
            tgs,
            session_key.clone(),
            FlagSet::default(),
            now,
            Some(now),
            now + Duration::from_secs(8 * 3600),
            None,
        );

        let service = Principal::parse(
            "host/files.example.com@EXAMPLE.COM",
            PrincipalNameType::NtSrvHst,
        )
        .unwrap();
        let request = TgsRequestBuilder::new(tgt, service.clone())
            .nonce(0x0070_3a57)
            .build()
            .unwrap();

        let service_session = EncryptionKey::new(
            EncryptionType::AES256_CTS_HMAC_SHA1_96,
            vec![0x99; 32],
            None,
        );
        let plain = encode_rep_part(
            &service_session,
            0x0070_3a57,
            FlagSet::default(),
            now,
            now + Duration::from_secs(8 * 3600),
            &service,
            false,
        );
        let cipher = session_key
            .encrypt(&plain, KEY_USAGE_TGS_REP_SESSION)
            .unwrap();

        let rep = KdcRep {
            pvno: 5,
            msg_type: KrbMessageType::KrbTgsRep as u8,
            padata: None,
            crealm: tgt_client.asn1_realm().unwrap(),
            cname: tgt_client.asn1_name().unwrap(),
            ticket: dummy_ticket(&service),
            enc_part: EncryptedData {
                etype: session_key.etype().into(),
                kvno: None,
                cipher: OctetString::new(cipher).unwrap(),
            },
        };
        let der = KrbKdcRep::TgsRep(rep).to_der().unwrap();

        let KerberosReply::TgsRep(reply) = KerberosReply::parse(&der).unwrap() else {
            panic!("Expected TGS-REP");
        };
        let mut part = reply.decrypt(&request).unwrap();
        reply.validate(&request, &mut part).unwrap();
        assert_eq!(part.key, service_session);
        assert!(part.server.equals_without_realm(&service));
    }

    #[test]
    fn test_error_reply_preauth_required() {
        let blob = "7e81a93081a6a003020105a10302011ea411180f32303234303631323131343830355aa505020301dc66a603020119a90c1b0a41464f524553542e4144aa1f301da003020102a11630141b066b72627467741b0a41464f524553542e4144ac4c044a30483025a103020113a21e041c301a3018a003020112a1111b0f41464f524553542e414475736572313009a103020102a20204003009a103020110a20204003009a10302010fa2020400";
        let blob = hex::decode(blob).unwrap();

        let KerberosReply::ErrRep(reply) = KerberosReply::parse(&blob).unwrap() else {
            panic!("Expected KRB-ERROR");
        };
        assert!(matches!(reply.error(), KrbError::PreauthRequired));

        let hints = reply.preauth_data().unwrap();
        assert!(hints.enc_timestamp);
        let info = hints.preferred_etype_info2().unwrap();
        assert_eq!(info.etype, EncryptionType::AES256_CTS_HMAC_SHA1_96);
        assert_eq!(info.salt.as_deref(), Some("AFOREST.ADuser1"));
    }
}
