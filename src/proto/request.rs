use crate::asn1::ap_req::{ApOptions, ApReq};
use crate::asn1::authenticator::Authenticator;
use crate::asn1::authorization_data::AuthorizationData;
use crate::asn1::checksum::Checksum;
use crate::asn1::constants::{EncryptionType, KrbMessageType};
use crate::asn1::encrypted_data::EncryptedData;
use crate::asn1::host_addresses::{HostAddress, HostAddresses};
use crate::asn1::kdc_req::{KdcReq, KdcReqBody};
use crate::asn1::kerberos_flags::{KerberosFlags, TicketFlags};
use crate::asn1::kerberos_time::KerberosTime;
use crate::asn1::krb_kdc_req::KrbKdcReq;
use crate::asn1::pa_enc_ts_enc::PaEncTsEnc;
use crate::asn1::OctetString;
use crate::constants::{
    KEY_USAGE_AS_REQ_PA_ENC_TS, KEY_USAGE_TGS_REQ_AUTHENTICATOR,
    KEY_USAGE_TGS_REQ_AUTH_DATA_SESSION, KEY_USAGE_TGS_REQ_AUTH_DATA_SUBKEY,
    KEY_USAGE_TGS_REQ_CHECKSUM,
};
use crate::creds::Credentials;
use crate::crypto;
use crate::error::KrbError;
use crate::keys::EncryptionKey;
use crate::principal::Principal;
use crate::proto::Preauth;

use der::asn1::Any;
use der::flagset::FlagSet;
use der::Encode;
use rand::Rng;
use std::net::IpAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

// RFC 4120 section 7.5.3 address types.
const ADDR_TYPE_INET: i32 = 2;
const ADDR_TYPE_INET6: i32 = 24;

// Options that only make sense against an existing ticket.
const TGS_ONLY_OPTIONS: [KerberosFlags; 5] = [
    KerberosFlags::Forwarded,
    KerberosFlags::Proxy,
    KerberosFlags::EncTktInSkey,
    KerberosFlags::Renew,
    KerberosFlags::Validate,
];

// Requesting an option the TGT cannot grant is a caller logic error, caught
// before anything goes on the wire.
const OPTION_REQUIRES_FLAG: [(KerberosFlags, TicketFlags); 9] = [
    (KerberosFlags::Forwardable, TicketFlags::Forwardable),
    (KerberosFlags::Forwarded, TicketFlags::Forwardable),
    (KerberosFlags::Proxiable, TicketFlags::Proxiable),
    (KerberosFlags::Proxy, TicketFlags::Proxiable),
    (KerberosFlags::AllowPostdate, TicketFlags::MayPostdate),
    (KerberosFlags::Postdated, TicketFlags::MayPostdate),
    (KerberosFlags::Renewable, TicketFlags::Renewable),
    (KerberosFlags::Renew, TicketFlags::Renewable),
    (KerberosFlags::Validate, TicketFlags::Invalid),
];

pub(crate) fn host_addresses(addrs: &[IpAddr]) -> Result<HostAddresses, KrbError> {
    addrs
        .iter()
        .map(|addr| {
            let (addr_type, octets) = match addr {
                IpAddr::V4(v4) => (ADDR_TYPE_INET, v4.octets().to_vec()),
                IpAddr::V6(v6) => (ADDR_TYPE_INET6, v6.octets().to_vec()),
            };
            Ok(HostAddress {
                addr_type,
                address: OctetString::new(octets).map_err(|_| KrbError::DerEncodeOctetString)?,
            })
        })
        .collect()
}

fn random_nonce() -> i32 {
    // MIT KDCs reject values above i32::MAX, so draw 31 bits.
    (rand::rng().random::<u32>() >> 1) as i32
}

fn kerberos_time(stime: SystemTime) -> Result<KerberosTime, KrbError> {
    KerberosTime::from_system_time(stime).map_err(|_| KrbError::DerEncodeKerberosTime)
}

/// PA-ENC-TIMESTAMP: the client's current time encrypted under its
/// long-term key, proving knowledge of the key before the KDC answers.
pub(crate) fn compute_pa_enc_timestamp(
    key: &EncryptionKey,
    now: SystemTime,
) -> Result<EncryptedData, KrbError> {
    let now = now
        .duration_since(UNIX_EPOCH)
        .map_err(|_| KrbError::PreauthInvalidUnixTs)?;
    let paenctsenc = PaEncTsEnc {
        patimestamp: KerberosTime::from_unix_duration(Duration::from_secs(now.as_secs()))
            .map_err(|_| KrbError::DerEncodeKerberosTime)?,
        pausec: Some(now.subsec_micros()),
    };
    trace!(?paenctsenc);
    let data = paenctsenc
        .to_der()
        .map_err(|_| KrbError::DerEncodePaEncTsEnc)?;
    let cipher = key.encrypt(&data, KEY_USAGE_AS_REQ_PA_ENC_TS)?;
    Ok(EncryptedData {
        etype: key.etype().into(),
        kvno: key.kvno(),
        cipher: OctetString::new(cipher).map_err(|_| KrbError::DerEncodeOctetString)?,
    })
}

/// Builds AS-REQ messages. One builder drives both rounds of the preauth
/// negotiation; each [`AsRequestBuilder::build`] emits an independent
/// request with a fresh nonce.
#[derive(Debug, Clone)]
pub struct AsRequestBuilder {
    client: Principal,
    service: Option<Principal>,
    options: FlagSet<KerberosFlags>,
    from: Option<SystemTime>,
    till: SystemTime,
    rtime: Option<SystemTime>,
    etypes: Vec<EncryptionType>,
    addresses: Option<HostAddresses>,
    nonce: Option<i32>,
}

impl AsRequestBuilder {
    /// `client` must already carry its realm.
    pub fn new(client: Principal, till: SystemTime) -> Self {
        AsRequestBuilder {
            client,
            service: None,
            options: FlagSet::default(),
            from: None,
            till,
            rtime: None,
            etypes: vec![
                EncryptionType::AES256_CTS_HMAC_SHA1_96,
                EncryptionType::AES128_CTS_HMAC_SHA1_96,
            ],
            addresses: None,
            nonce: None,
        }
    }

    pub fn service(mut self, service: Principal) -> Self {
        self.service = Some(service);
        self
    }

    pub fn option(mut self, option: KerberosFlags) -> Self {
        self.options |= option;
        self
    }

    pub fn options(mut self, options: FlagSet<KerberosFlags>) -> Self {
        self.options |= options;
        self
    }

    pub fn from(mut self, from: SystemTime) -> Self {
        self.from = Some(from);
        self
    }

    pub fn till(mut self, till: SystemTime) -> Self {
        self.till = till;
        self
    }

    pub fn renew_until(mut self, rtime: SystemTime) -> Self {
        self.rtime = Some(rtime);
        self
    }

    pub fn etypes(mut self, etypes: Vec<EncryptionType>) -> Self {
        self.etypes = etypes;
        self
    }

    /// Bind the ticket to these client addresses (`noaddresses = false`).
    pub(crate) fn addresses(mut self, addresses: HostAddresses) -> Self {
        self.addresses = Some(addresses);
        self
    }

    #[cfg(test)]
    pub(crate) fn nonce(mut self, nonce: i32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn build(&self) -> Result<AsRequest, KrbError> {
        self.build_with_preauth(&Preauth::default())
    }

    pub(crate) fn build_with_preauth(&self, preauth: &Preauth) -> Result<AsRequest, KrbError> {
        if TGS_ONLY_OPTIONS.iter().any(|o| self.options.contains(*o)) {
            return Err(KrbError::OptionNotAllowed);
        }

        let client_realm = self.client.realm_required()?;
        let service = match &self.service {
            Some(service) => service.clone(),
            None => Principal::tgs(client_realm)?,
        };

        // A time bound without its option would be echoed back and then
        // fail validation, so it is dropped here.
        let from = self
            .from
            .filter(|_| self.options.contains(KerberosFlags::Postdated));
        let rtime = self
            .rtime
            .filter(|_| self.options.contains(KerberosFlags::Renewable));

        let nonce = self.nonce.unwrap_or_else(random_nonce);

        let body = KdcReqBody {
            kdc_options: self.options,
            cname: Some(self.client.asn1_name()?),
            // In an AS-REQ this is the client's realm, which is also where
            // the default krbtgt service lives.
            realm: self.client.asn1_realm()?,
            sname: Some(service.asn1_name()?),
            from: from.map(kerberos_time).transpose()?,
            till: kerberos_time(self.till)?,
            rtime: rtime.map(kerberos_time).transpose()?,
            nonce,
            etype: self.etypes.iter().map(|e| (*e).into()).collect(),
            addresses: self.addresses.clone(),
            enc_authorization_data: None,
            additional_tickets: None,
        };
        let req_body = Any::encode_from(&body).map_err(|_| KrbError::DerEncodeKdcReqBody)?;

        let req = KdcReq {
            pvno: 5,
            msg_type: KrbMessageType::KrbAsReq as u8,
            padata: preauth.to_padata()?,
            req_body,
        };
        let der = KrbKdcReq::AsReq(req).to_der()?;

        Ok(AsRequest {
            der,
            client: self.client.clone(),
            service,
            nonce,
            options: self.options,
            from,
            till: self.till,
            rtime,
            addresses: self.addresses.clone(),
        })
    }
}

/// An emitted AS-REQ: the wire bytes plus the logical fields the reply is
/// validated against.
#[derive(Debug, Clone)]
pub struct AsRequest {
    der: Vec<u8>,
    pub(crate) client: Principal,
    pub(crate) service: Principal,
    pub(crate) nonce: i32,
    pub(crate) options: FlagSet<KerberosFlags>,
    pub(crate) from: Option<SystemTime>,
    pub(crate) till: SystemTime,
    pub(crate) rtime: Option<SystemTime>,
    pub(crate) addresses: Option<HostAddresses>,
}

impl AsRequest {
    pub fn to_der(&self) -> Vec<u8> {
        self.der.clone()
    }

    pub fn client(&self) -> &Principal {
        &self.client
    }
}

/// Builds TGS-REQ messages against an existing TGT.
#[derive(Debug)]
pub struct TgsRequestBuilder {
    tgt: Credentials,
    service: Principal,
    options: FlagSet<KerberosFlags>,
    from: Option<SystemTime>,
    till: SystemTime,
    rtime: Option<SystemTime>,
    etypes: Vec<EncryptionType>,
    subkey: Option<EncryptionKey>,
    authorization_data: Option<AuthorizationData>,
    nonce: Option<i32>,
}

impl TgsRequestBuilder {
    pub fn new(tgt: Credentials, service: Principal) -> Self {
        let till = tgt.end_time();
        TgsRequestBuilder {
            tgt,
            service,
            options: FlagSet::default(),
            from: None,
            till,
            rtime: None,
            etypes: vec![
                EncryptionType::AES256_CTS_HMAC_SHA1_96,
                EncryptionType::AES128_CTS_HMAC_SHA1_96,
            ],
            subkey: None,
            authorization_data: None,
            nonce: None,
        }
    }

    /// A renewal request: same service as the TGT, RENEW option set.
    pub fn renew(tgt: Credentials) -> Result<Self, KrbError> {
        if !tgt.is_renewable() {
            return Err(KrbError::TicketNotRenewable);
        }
        let service = tgt.server().clone();
        Ok(Self::new(tgt, service).option(KerberosFlags::Renew))
    }

    pub fn option(mut self, option: KerberosFlags) -> Self {
        self.options |= option;
        self
    }

    pub fn options(mut self, options: FlagSet<KerberosFlags>) -> Self {
        self.options |= options;
        self
    }

    pub fn from(mut self, from: SystemTime) -> Self {
        self.from = Some(from);
        self
    }

    pub fn till(mut self, till: SystemTime) -> Self {
        self.till = till;
        self
    }

    pub fn renew_until(mut self, rtime: SystemTime) -> Self {
        self.rtime = Some(rtime);
        self
    }

    pub fn etypes(mut self, etypes: Vec<EncryptionType>) -> Self {
        self.etypes = etypes;
        self
    }

    /// Provide a sub-session key. The authenticator carries it, the reply
    /// is decrypted with it, and authorization data travels under it.
    pub fn subkey(mut self, subkey: EncryptionKey) -> Self {
        self.subkey = Some(subkey);
        self
    }

    pub(crate) fn authorization_data(mut self, ad: AuthorizationData) -> Self {
        self.authorization_data = Some(ad);
        self
    }

    #[cfg(test)]
    pub(crate) fn nonce(mut self, nonce: i32) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn build(&self) -> Result<TgsRequest, KrbError> {
        for (option, flag) in OPTION_REQUIRES_FLAG {
            if self.options.contains(option) && !self.tgt.flags().contains(flag) {
                return Err(KrbError::OptionRequiresTgtFlag);
            }
        }

        let session_key = self.tgt.session_key();
        let service_realm = self.service.realm_required()?;

        let from = self
            .from
            .filter(|_| self.options.contains(KerberosFlags::Postdated));
        let rtime = self
            .rtime
            .filter(|_| self.options.contains(KerberosFlags::Renewable));

        let nonce = self.nonce.unwrap_or_else(random_nonce);

        // Authorization data travels under the subkey when one is given,
        // else under the session key. The usage number differs.
        let enc_authorization_data = self
            .authorization_data
            .as_ref()
            .map(|ad| {
                let ad_der = ad.to_der().map_err(|_| KrbError::DerEncodeAny)?;
                let (ad_key, usage) = match &self.subkey {
                    Some(subkey) => (subkey, KEY_USAGE_TGS_REQ_AUTH_DATA_SUBKEY),
                    None => (session_key, KEY_USAGE_TGS_REQ_AUTH_DATA_SESSION),
                };
                let cipher = ad_key.encrypt(&ad_der, usage)?;
                Ok::<_, KrbError>(EncryptedData {
                    etype: ad_key.etype().into(),
                    kvno: None,
                    cipher: OctetString::new(cipher).map_err(|_| KrbError::DerEncodeOctetString)?,
                })
            })
            .transpose()?;

        let body = KdcReqBody {
            kdc_options: self.options,
            cname: None,
            realm: service_realm.asn1()?,
            sname: Some(self.service.asn1_name()?),
            from: from.map(kerberos_time).transpose()?,
            till: kerberos_time(self.till)?,
            rtime: rtime.map(kerberos_time).transpose()?,
            nonce,
            etype: self.etypes.iter().map(|e| (*e).into()).collect(),
            addresses: None,
            enc_authorization_data,
            additional_tickets: None,
        };
        let req_body = Any::encode_from(&body).map_err(|_| KrbError::DerEncodeKdcReqBody)?;

        // The keyed checksum binds the authenticator to the exact DER of
        // the request body.
        let body_der = req_body.to_der().map_err(|_| KrbError::DerEncodeKdcReqBody)?;
        let checksum = Checksum {
            checksum_type: crypto::checksum_type_for_etype(session_key.etype())?,
            checksum: OctetString::new(session_key.checksum(&body_der, KEY_USAGE_TGS_REQ_CHECKSUM)?)
                .map_err(|_| KrbError::DerEncodeOctetString)?,
        };

        let subkey_asn1 = self.subkey.as_ref().map(|k| k.asn1()).transpose()?;
        let authenticator = Authenticator::new(
            self.tgt.client().asn1_name()?,
            self.tgt.client().asn1_realm()?,
            SystemTime::now(),
            Some(checksum),
            subkey_asn1,
            None,
            None,
        )
        .map_err(|_| KrbError::DerEncodeAuthenticator)?;
        let authenticator_der = authenticator
            .to_der()
            .map_err(|_| KrbError::DerEncodeAuthenticator)?;
        let enc_authenticator = EncryptedData {
            etype: session_key.etype().into(),
            kvno: None,
            cipher: OctetString::new(
                session_key.encrypt(&authenticator_der, KEY_USAGE_TGS_REQ_AUTHENTICATOR)?,
            )
            .map_err(|_| KrbError::DerEncodeOctetString)?,
        };

        let ap_req = ApReq::new(
            ApOptions::default(),
            self.tgt.ticket().clone(),
            enc_authenticator,
        );
        let ap_req_der = ap_req.to_der().map_err(|_| KrbError::DerEncodeApReq)?;

        let preauth = Preauth {
            tgs_req: Some(ap_req_der),
            ..Preauth::default()
        };

        let req = KdcReq {
            pvno: 5,
            msg_type: KrbMessageType::KrbTgsReq as u8,
            padata: preauth.to_padata()?,
            req_body,
        };
        let der = KrbKdcReq::TgsReq(req).to_der()?;

        // The subkey, when present, supersedes the session key for the
        // reply's encrypted part.
        let (reply_key, subkey_used) = match &self.subkey {
            Some(subkey) => (subkey.clone(), true),
            None => (session_key.clone(), false),
        };

        Ok(TgsRequest {
            der,
            client: self.tgt.client().clone(),
            service: self.service.clone(),
            nonce,
            options: self.options,
            from,
            till: self.till,
            rtime,
            reply_key,
            subkey_used,
        })
    }
}

/// An emitted TGS-REQ with its reply-decryption key.
#[derive(Debug)]
pub struct TgsRequest {
    der: Vec<u8>,
    pub(crate) client: Principal,
    pub(crate) service: Principal,
    pub(crate) nonce: i32,
    pub(crate) options: FlagSet<KerberosFlags>,
    pub(crate) from: Option<SystemTime>,
    pub(crate) till: SystemTime,
    pub(crate) rtime: Option<SystemTime>,
    pub(crate) reply_key: EncryptionKey,
    pub(crate) subkey_used: bool,
}

impl TgsRequest {
    pub fn to_der(&self) -> Vec<u8> {
        self.der.clone()
    }
}
