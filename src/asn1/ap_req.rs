use super::constants::message_types::KrbMessageType;
use super::encrypted_data::EncryptedData;
use super::tagged_ticket::TaggedTicket;
use der::flagset::{flags, FlagSet};
use der::{Decode, DecodeValue, Encode, EncodeValue, FixedTag, Sequence, Tag, TagNumber};

flags! {
    #[repr(u32)]
    pub enum ApFlags: u32 {
        Reserved        = 1 << 0,
        // The ticket the client presents is encrypted in the session key
        // from the server's TGT rather than the server's secret key.
        UseSessionKey   = 1 << 1,
        // The client requires mutual authentication; the server must
        // respond with a KRB_AP_REP message.
        MutualRequired  = 1 << 2,
    }
}

pub(crate) type ApOptions = FlagSet<ApFlags>;

/// ```text
/// AP-REQ          ::= [APPLICATION 14] SEQUENCE {
///            pvno            [0] INTEGER (5),
///            msg-type        [1] INTEGER (14),
///            ap-options      [2] APOptions,
///            ticket          [3] Ticket,
///            authenticator   [4] EncryptedData -- Authenticator
///    }
///```
#[derive(Debug, Eq, PartialEq, Sequence)]
pub(crate) struct ApReqInner {
    #[asn1(context_specific = "0")]
    pub(crate) pvno: u8,
    #[asn1(context_specific = "1")]
    pub(crate) msg_type: u8,
    #[asn1(context_specific = "2")]
    pub(crate) ap_options: ApOptions,
    #[asn1(context_specific = "3")]
    pub(crate) ticket: TaggedTicket,
    #[asn1(context_specific = "4")]
    pub(crate) authenticator: EncryptedData,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct ApReq(ApReqInner);

impl ApReq {
    pub(crate) fn new(
        ap_options: ApOptions,
        ticket: TaggedTicket,
        authenticator: EncryptedData,
    ) -> Self {
        let inner = ApReqInner {
            pvno: 5,
            msg_type: KrbMessageType::KrbApReq as u8,
            ap_options,
            ticket,
            authenticator,
        };
        Self(inner)
    }
}

impl FixedTag for ApReq {
    const TAG: Tag = Tag::Application {
        constructed: true,
        number: TagNumber(14),
    };
}

impl<'a> DecodeValue<'a> for ApReq {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, _header: der::Header) -> der::Result<Self> {
        let inner: ApReqInner = ApReqInner::decode(reader)?;
        Ok(Self(inner))
    }
}

impl EncodeValue for ApReq {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(encoder)?;
        Ok(())
    }
}

impl From<ApReq> for ApReqInner {
    fn from(value: ApReq) -> ApReqInner {
        value.0
    }
}

impl AsRef<ApReqInner> for ApReq {
    fn as_ref(&self) -> &ApReqInner {
        &self.0
    }
}
