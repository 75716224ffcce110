use crate::asn1::constants::PrincipalNameType;
use crate::asn1::kerberos_flags::KerberosFlags;
use crate::config::Config;
use crate::creds::Credentials;
use crate::error::KrbError;
use crate::keys::{acquire_secret_keys, EncryptionKey, KeyVault};
use crate::principal::{realms_list, Principal, Realm};
use crate::proto::request::{compute_pa_enc_timestamp, AsRequestBuilder, TgsRequestBuilder};
use crate::proto::{AsReply, AsRequest, KerberosReply, Preauth, PreauthData, TgsRequest};
use crate::transport::KdcTransport;

use der::flagset::FlagSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error};

const DEFAULT_TICKET_LIFETIME: Duration = Duration::from_secs(10 * 3600);

#[derive(Debug)]
enum ExchangeState {
    Init,
    ReqOk { request: AsRequest, reply: AsReply },
    Destroyed,
}

/// A one-shot AS exchange. `action` drives the network rounds (at most one
/// preauth retry), `resolve` derives the client key and turns the reply
/// into credentials. Each step is valid exactly once; afterwards the
/// exchange is spent and the passphrase is zeroed.
pub struct AsExchange {
    client: Principal,
    passphrase: Vec<u8>,
    builder: AsRequestBuilder,
    preauth: PreauthData,
    state: ExchangeState,
    config: Arc<Config>,
}

impl AsExchange {
    pub fn new(
        client: Principal,
        passphrase: Vec<u8>,
        config: Arc<Config>,
    ) -> Result<Self, KrbError> {
        let client = client.resolve_realm(&config)?;
        let till = SystemTime::now() + DEFAULT_TICKET_LIFETIME;
        let builder =
            AsRequestBuilder::new(client.clone(), till).etypes(config.default_tkt_enctypes());
        Ok(AsExchange {
            client,
            passphrase,
            builder,
            preauth: PreauthData::default(),
            state: ExchangeState::Init,
            config,
        })
    }

    // The builder setters consume and return, while Drop forbids moving
    // the field out, hence the clones.
    pub fn option(mut self, option: KerberosFlags) -> Self {
        self.builder = self.builder.clone().option(option);
        self
    }

    pub fn till(mut self, till: SystemTime) -> Self {
        self.builder = self.builder.clone().till(till);
        self
    }

    pub fn renew_until(mut self, rtime: SystemTime) -> Self {
        self.builder = self.builder.clone().renew_until(rtime);
        self
    }

    /// Run the network rounds of the exchange. The first round is sent
    /// without preauth; if the KDC demands it, exactly one retry is made
    /// with PA-ENC-TIMESTAMP derived from the KDC's hints. A second preauth
    /// refusal is surfaced as-is, so a wrong passphrase fails after two
    /// rounds instead of looping.
    pub async fn action(&mut self, transport: &KdcTransport) -> Result<(), KrbError> {
        if !matches!(self.state, ExchangeState::Init) {
            return Err(KrbError::ExchangeInvalidState);
        }
        let realm = self.client.realm_required()?.as_str().to_string();

        // Address-bound tickets are opt-in via the profile.
        if !self.config.noaddresses() {
            if let Some(ip) = transport.local_address(&realm).await {
                let addresses = crate::proto::request::host_addresses(&[ip])?;
                self.builder = self.builder.clone().addresses(addresses);
            }
        }

        let mut request = self.builder.build()?;
        let mut preauth_attempted = false;
        loop {
            let response = transport.send(&realm, &request.to_der()).await?;
            match KerberosReply::parse(&response)? {
                KerberosReply::AsRep(reply) => {
                    self.state = ExchangeState::ReqOk { request, reply };
                    return Ok(());
                }
                KerberosReply::ErrRep(err) => {
                    let krb_err = err.error();
                    let retryable = matches!(
                        krb_err,
                        KrbError::PreauthRequired | KrbError::PreauthFailed
                    );
                    if !retryable || preauth_attempted {
                        error!(code = err.error_code(), "kdc refused the as exchange");
                        return Err(krb_err);
                    }
                    preauth_attempted = true;
                    debug!("kdc requires preauth, retrying with pa-enc-timestamp");
                    self.preauth.merge(err.preauth_data()?);
                    let preauth = self.prepare_preauth()?;
                    request = self.builder.build_with_preauth(&preauth)?;
                }
                KerberosReply::TgsRep(_) => return Err(KrbError::InvalidMessageType),
            }
        }
    }

    fn prepare_preauth(&self) -> Result<Preauth, KrbError> {
        if !self.preauth.enc_timestamp {
            error!("kdc offered no preauth mechanism this client implements");
            return Err(KrbError::PreauthUnsupported);
        }
        let info = self.preauth.preferred_etype_info2()?;
        let salt = match &info.salt {
            Some(salt) => salt.clone(),
            None => self.client.salt()?,
        };
        let mut key =
            EncryptionKey::derive(info.etype, &self.passphrase, &salt, info.s2k_iter_count)?;
        let enc_timestamp = compute_pa_enc_timestamp(&key, SystemTime::now());
        key.destroy();
        Ok(Preauth {
            tgs_req: None,
            enc_timestamp: Some(enc_timestamp?),
            pa_fx_cookie: self.preauth.pa_fx_cookie.clone(),
        })
    }

    /// Derive the reply key, decrypt and cross-check the reply, and hand
    /// back the credentials. Consumes the exchange state; the passphrase is
    /// zeroed once the keys are derived.
    pub fn resolve(&mut self) -> Result<Credentials, KrbError> {
        match std::mem::replace(&mut self.state, ExchangeState::Destroyed) {
            ExchangeState::ReqOk { request, reply } => {
                // A reply may carry corrected etype-info2 of its own.
                self.preauth.merge(reply.preauth_hints()?);
                let (etype, salt, iter_count) = match self.preauth.preferred_etype_info2() {
                    Ok(info) => (
                        info.etype,
                        match &info.salt {
                            Some(salt) => salt.clone(),
                            None => self.client.salt()?,
                        },
                        info.s2k_iter_count,
                    ),
                    Err(_) => (reply.encryption_etype()?, self.client.salt()?, None),
                };
                let keys = acquire_secret_keys(
                    &self.passphrase,
                    &salt,
                    Some(etype),
                    iter_count,
                    &self.config,
                )?;
                self.passphrase.fill(0);
                let vault = KeyVault::new(keys);

                let mut part = reply.decrypt(&vault)?;
                reply.validate(&request, &mut part)?;
                Ok(Credentials::from_reply(
                    self.client.clone(),
                    reply.ticket(),
                    part,
                ))
            }
            other => {
                self.state = other;
                Err(KrbError::ExchangeInvalidState)
            }
        }
    }

    /// Zero the passphrase and invalidate the exchange.
    pub fn destroy(&mut self) {
        self.passphrase.fill(0);
        self.state = ExchangeState::Destroyed;
    }
}

impl Drop for AsExchange {
    fn drop(&mut self) {
        self.passphrase.fill(0);
    }
}

/// The top-level client: a profile plus a transport with its KDC failover
/// state. One instance serves any number of exchanges.
#[derive(Debug)]
pub struct KerberosClient {
    config: Arc<Config>,
    transport: KdcTransport,
}

impl KerberosClient {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let transport = KdcTransport::new(config.clone());
        KerberosClient { config, transport }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &KdcTransport {
        &self.transport
    }

    pub fn as_exchange(
        &self,
        client: Principal,
        passphrase: Vec<u8>,
    ) -> Result<AsExchange, KrbError> {
        AsExchange::new(client, passphrase, self.config.clone())
    }

    /// Run a whole AS exchange and hand back the TGT.
    pub async fn authenticate(
        &self,
        client: Principal,
        passphrase: Vec<u8>,
    ) -> Result<Credentials, KrbError> {
        let mut exchange = self.as_exchange(client, passphrase)?;
        exchange.action(&self.transport).await?;
        exchange.resolve()
    }

    /// Obtain a service ticket. When the service lives in another realm the
    /// realm path is walked first, collecting a cross-realm TGT per hop.
    pub async fn tgs_exchange(
        &self,
        tgt: &Credentials,
        service: Principal,
        options: FlagSet<KerberosFlags>,
    ) -> Result<Credentials, KrbError> {
        let service = service.resolve_realm(&self.config)?;
        let local_realm = tgt.server().realm_required()?.clone();
        let service_realm = service.realm_required()?.clone();

        let mut tgt = tgt.clone();
        if local_realm != service_realm {
            let path = realms_list(&local_realm, &service_realm, &self.config);
            // Each hop after the local realm, plus the destination itself,
            // needs a krbtgt ticket issued by the realm before it.
            let mut targets: Vec<Realm> = Vec::new();
            for hop in path.iter().skip(1) {
                targets.push(Realm::new(hop)?);
            }
            targets.push(service_realm);
            for target in targets {
                let cross = Principal::new(
                    vec!["krbtgt".to_string(), target.as_str().to_string()],
                    PrincipalNameType::NtSrvInst,
                    Some(tgt.server().realm_required()?.clone()),
                )?;
                let request = TgsRequestBuilder::new(tgt.clone(), cross).build()?;
                tgt = self.tgs_send(&tgt, request).await?;
            }
        }

        let request = TgsRequestBuilder::new(tgt.clone(), service)
            .options(options)
            .build()?;
        self.tgs_send(&tgt, request).await
    }

    /// Renew a renewable TGT; yields fresh credentials, the old TGT is
    /// untouched.
    pub async fn renew(&self, tgt: &Credentials) -> Result<Credentials, KrbError> {
        let request = TgsRequestBuilder::renew(tgt.clone())?.build()?;
        self.tgs_send(tgt, request).await
    }

    async fn tgs_send(
        &self,
        tgt: &Credentials,
        request: TgsRequest,
    ) -> Result<Credentials, KrbError> {
        let realm = contact_realm(tgt)?;
        let response = self.transport.send(&realm, &request.to_der()).await?;
        match KerberosReply::parse(&response)? {
            KerberosReply::TgsRep(reply) => {
                let mut part = reply.decrypt(&request)?;
                reply.validate(&request, &mut part)?;
                Ok(Credentials::from_reply(
                    tgt.client().clone(),
                    reply.ticket(),
                    part,
                ))
            }
            KerberosReply::ErrRep(err) => {
                error!(code = err.error_code(), "kdc refused the tgs exchange");
                Err(err.error())
            }
            KerberosReply::AsRep(_) => Err(KrbError::InvalidMessageType),
        }
    }
}

/// The realm whose KDC a ticket is presented to. A cross-realm TGT names
/// krbtgt/TARGET@ISSUER and is presented to TARGET's KDC, not the issuer's.
fn contact_realm(tgt: &Credentials) -> Result<String, KrbError> {
    let server = tgt.server();
    let components = server.components();
    if components.len() == 2 && components[0] == "krbtgt" {
        Ok(components[1].clone())
    } else {
        Ok(server.realm_required()?.as_str().to_string())
    }
}
