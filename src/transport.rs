use crate::asn1::constants::KrbErrorCode;
use crate::asn1::krb_kdc_rep::KrbKdcRep;
use crate::config::{BadKdcPolicy, Config};
use crate::constants::{DEFAULT_IO_MAX_SIZE, DEFAULT_KDC_PORT};
use crate::error::KrbError;

use bytes::{Buf, BufMut, BytesMut};
use der::Decode;
use futures::{SinkExt, StreamExt};
use std::collections::BTreeSet;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, error, trace, warn};

/// RFC 4120 section 7.2.2 TCP framing: each message is preceded by a 4-octet
/// big endian length. The length may never have its high bit set (reserved
/// for future expansion), which the maximum size guard enforces implicitly.
pub struct KerberosTcpCodec {
    max_size: usize,
}

impl Default for KerberosTcpCodec {
    fn default() -> Self {
        KerberosTcpCodec {
            max_size: DEFAULT_IO_MAX_SIZE,
        }
    }
}

impl Decoder for KerberosTcpCodec {
    type Item = Vec<u8>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&src[..4]);
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > self.max_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame exceeds maximum message size",
            ));
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        Ok(Some(src.split_to(len).to_vec()))
    }
}

impl Encoder<&[u8]> for KerberosTcpCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "frame exceeds maximum message size",
            ));
        }
        dst.reserve(4 + item.len());
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(item);
        Ok(())
    }
}

/// Sends encoded KDC requests for a realm and returns the raw response.
/// Candidates come from the profile; failing KDCs are tracked in a shared
/// bad-set that the configured [`BadKdcPolicy`] consults on the next
/// resolve. UDP is preferred below the size limit, with a single TCP resend
/// when the KDC signals KRB_ERR_RESPONSE_TOO_BIG.
#[derive(Debug)]
pub struct KdcTransport {
    config: Arc<Config>,
    bad_kdcs: Mutex<BTreeSet<String>>,
}

impl KdcTransport {
    pub fn new(config: Arc<Config>) -> Self {
        KdcTransport {
            config,
            bad_kdcs: Mutex::new(BTreeSet::new()),
        }
    }

    fn bad_set(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.bad_kdcs.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Forget past failures, on configuration refresh.
    pub fn reset_bad_kdcs(&self) {
        self.bad_set().clear();
    }

    pub(crate) fn is_bad(&self, candidate: &str) -> bool {
        self.bad_set().contains(candidate)
    }

    /// The realm's KDC candidates in attempt order. Under the try-last
    /// policy, currently-bad candidates sink to the end; both sublists keep
    /// their configured order. Other policies leave the order untouched.
    pub fn resolve(&self, realm: &str) -> Result<Vec<String>, KrbError> {
        let kdcs = self.config.kdc_list(realm)?;
        match self.config.bad_kdc_policy() {
            BadKdcPolicy::TryLast => {
                let bad = self.bad_set();
                let (good, failing): (Vec<_>, Vec<_>) =
                    kdcs.into_iter().partition(|kdc| !bad.contains(kdc));
                Ok(good.into_iter().chain(failing).collect())
            }
            BadKdcPolicy::TryLess | BadKdcPolicy::None => Ok(kdcs),
        }
    }

    /// Send a request to the realm's KDCs, failing over between candidates.
    /// A candidate that answers is removed from the bad-set; one that does
    /// not is added. When every candidate fails, the last error observed is
    /// surfaced.
    pub async fn send(&self, realm: &str, message: &[u8]) -> Result<Vec<u8>, KrbError> {
        let candidates = self.resolve(realm)?;
        let policy = self.config.bad_kdc_policy();

        let mut last_err = KrbError::ConfigKdcUnresolvable;
        for candidate in candidates {
            let mut retries = self.config.max_retries(realm);
            let mut timeout = self.config.kdc_timeout(realm);
            if policy == BadKdcPolicy::TryLess && self.is_bad(&candidate) {
                let (clamp_retries, clamp_timeout) = self.config.try_less_budget();
                retries = retries.min(clamp_retries);
                timeout = timeout.min(clamp_timeout);
            }

            match self.attempt(&candidate, message, retries, timeout).await {
                Ok(response) => {
                    self.bad_set().remove(&candidate);
                    return Ok(response);
                }
                Err(err) => {
                    warn!(kdc = %candidate, ?err, "kdc attempt failed");
                    self.bad_set().insert(candidate);
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    /// The local source address the OS would route toward this realm's
    /// first KDC candidate. Connecting a datagram socket selects the
    /// outbound address without sending anything.
    pub(crate) async fn local_address(&self, realm: &str) -> Option<std::net::IpAddr> {
        let candidates = self.resolve(realm).ok()?;
        let addr = lookup_host(kdc_addr(candidates.first()?))
            .await
            .ok()?
            .next()?;
        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).await.ok()?;
        socket.connect(addr).await.ok()?;
        socket.local_addr().ok().map(|local| local.ip())
    }

    async fn attempt(
        &self,
        candidate: &str,
        message: &[u8],
        retries: u32,
        timeout: Duration,
    ) -> Result<Vec<u8>, KrbError> {
        let addr = kdc_addr(candidate);

        if message.len() > self.config.udp_preference_limit() {
            trace!(kdc = %addr, "request exceeds udp preference limit, using tcp");
            return send_tcp(&addr, message, timeout).await;
        }

        let response = send_udp(&addr, message, retries, timeout).await?;
        if is_response_too_big(&response) {
            debug!(kdc = %addr, "kdc signalled response too big, resending over tcp");
            return send_tcp(&addr, message, timeout).await;
        }
        Ok(response)
    }
}

/// Normalise a configured KDC endpoint to a connectable `host:port` string.
/// The host may be a name, a v4 literal, or a (possibly bracketed) v6
/// literal; the port defaults to 88.
fn kdc_addr(candidate: &str) -> String {
    if candidate.starts_with('[') {
        if candidate.rsplit_once("]:").is_some() {
            candidate.to_string()
        } else {
            format!("{candidate}:{DEFAULT_KDC_PORT}")
        }
    } else if candidate.matches(':').count() > 1 {
        // Bare v6 literal.
        format!("[{candidate}]:{DEFAULT_KDC_PORT}")
    } else if candidate.contains(':') {
        candidate.to_string()
    } else {
        format!("{candidate}:{DEFAULT_KDC_PORT}")
    }
}

fn is_response_too_big(response: &[u8]) -> bool {
    match KrbKdcRep::from_der(response) {
        Ok(KrbKdcRep::ErrRep(err)) => {
            err.error_code == KrbErrorCode::KrbErrResponseTooBig as i32
        }
        _ => false,
    }
}

/// Datagram exchange per RFC 4120 section 7.2.1. A timeout is transient and
/// consumes one retry; any other socket error fails the candidate at once.
async fn send_udp(
    addr: &str,
    message: &[u8],
    retries: u32,
    per_attempt: Duration,
) -> Result<Vec<u8>, KrbError> {
    let mut addrs = lookup_host(addr).await.map_err(|err| {
        error!(%addr, ?err, "kdc hostname did not resolve");
        KrbError::ConfigKdcUnresolvable
    })?;
    let addr = addrs.next().ok_or(KrbError::ConfigKdcUnresolvable)?;
    let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };

    for attempt in 0..retries.max(1) {
        let exchange = async {
            let socket = UdpSocket::bind(bind_addr).await?;
            socket.connect(addr).await?;
            socket.send(message).await?;
            let mut buf = vec![0u8; 65_535];
            let n = socket.recv(&mut buf).await?;
            buf.truncate(n);
            Ok::<_, io::Error>(buf)
        };
        match tokio::time::timeout(per_attempt, exchange).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(err)) => {
                error!(%addr, ?err, "udp exchange failed");
                return Err(KrbError::NetworkIo);
            }
            Err(_elapsed) => {
                trace!(%addr, attempt, "udp attempt timed out");
            }
        }
    }
    Err(KrbError::NetworkTimeout)
}

/// Stream exchange per RFC 4120 section 7.2.2. TCP is reliable, so a single
/// attempt under the same timeout suffices.
async fn send_tcp(addr: &str, message: &[u8], timeout: Duration) -> Result<Vec<u8>, KrbError> {
    let exchange = async {
        let stream = TcpStream::connect(addr).await?;
        let mut framed = Framed::new(stream, KerberosTcpCodec::default());
        framed.send(message).await?;
        framed.next().await.transpose()?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "kdc closed the connection")
        })
    };
    match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(err)) => {
            error!(%addr, ?err, "tcp exchange failed");
            Err(KrbError::NetworkIo)
        }
        Err(_elapsed) => Err(KrbError::NetworkTimeout),
    }
}
