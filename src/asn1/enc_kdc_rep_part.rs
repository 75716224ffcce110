use super::encryption_key::EncryptionKey;
use super::host_addresses::HostAddresses;
use super::kerberos_flags::TicketFlags;
use super::kerberos_string::Realm;
use super::kerberos_time::KerberosTime;
use super::last_req::LastReq;
use super::principal_name::PrincipalName;
use der::flagset::FlagSet;
use der::{Sequence, Tag, TagNumber, Writer};

/// ```text
/// EncKDCRepPart   ::= SEQUENCE {
///         key             [0] EncryptionKey,
///         last-req        [1] LastReq,
///         nonce           [2] UInt32,
///         key-expiration  [3] KerberosTime OPTIONAL,
///         flags           [4] TicketFlags,
///         authtime        [5] KerberosTime,
///         starttime       [6] KerberosTime OPTIONAL,
///         endtime         [7] KerberosTime,
///         renew-till      [8] KerberosTime OPTIONAL,
///         srealm          [9] Realm,
///         sname           [10] PrincipalName,
///         caddr           [11] HostAddresses OPTIONAL
/// }
/// ```
#[derive(Debug, Eq, PartialEq, Sequence)]
pub(crate) struct EncKdcRepPart {
    #[asn1(context_specific = "0")]
    pub(crate) key: EncryptionKey,
    #[asn1(context_specific = "1")]
    pub(crate) last_req: LastReq,
    #[asn1(context_specific = "2")]
    pub(crate) nonce: i32,
    #[asn1(context_specific = "3", optional = "true")]
    pub(crate) key_expiration: Option<KerberosTime>,
    #[asn1(context_specific = "4")]
    pub(crate) flags: FlagSet<TicketFlags>,
    #[asn1(context_specific = "5")]
    pub(crate) auth_time: KerberosTime,
    #[asn1(context_specific = "6", optional = "true")]
    pub(crate) start_time: Option<KerberosTime>,
    #[asn1(context_specific = "7")]
    pub(crate) end_time: KerberosTime,
    #[asn1(context_specific = "8", optional = "true")]
    pub(crate) renew_till: Option<KerberosTime>,
    #[asn1(context_specific = "9")]
    pub(crate) server_realm: Realm,
    #[asn1(context_specific = "10")]
    pub(crate) server_name: PrincipalName,
    #[asn1(context_specific = "11", optional = "true")]
    pub(crate) client_addresses: Option<HostAddresses>,
}

/// ```text
///  EncASRepPart    ::= [APPLICATION 25] EncKDCRepPart
///  EncTGSRepPart   ::= [APPLICATION 26] EncKDCRepPart
/// ```
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum TaggedEncKdcRepPart {
    EncAsRepPart(EncKdcRepPart),
    EncTgsRepPart(EncKdcRepPart),
}

impl TaggedEncKdcRepPart {
    fn tag(&self) -> Tag {
        let number = match self {
            TaggedEncKdcRepPart::EncAsRepPart(_) => TagNumber(25),
            TaggedEncKdcRepPart::EncTgsRepPart(_) => TagNumber(26),
        };
        Tag::Application {
            constructed: true,
            number,
        }
    }

    fn inner(&self) -> &EncKdcRepPart {
        match self {
            TaggedEncKdcRepPart::EncAsRepPart(part) => part,
            TaggedEncKdcRepPart::EncTgsRepPart(part) => part,
        }
    }
}

impl<'a> ::der::Decode<'a> for TaggedEncKdcRepPart {
    type Error = der::Error;

    fn decode<R: der::Reader<'a>>(decoder: &mut R) -> der::Result<Self> {
        let tag: der::Tag = decoder.decode()?;
        let _len: der::Length = decoder.decode()?;

        match tag {
            Tag::Application {
                constructed: true,
                number: TagNumber(25),
            } => {
                let part: EncKdcRepPart = decoder.decode()?;
                Ok(TaggedEncKdcRepPart::EncAsRepPart(part))
            }
            Tag::Application {
                constructed: true,
                number: TagNumber(26),
            } => {
                let part: EncKdcRepPart = decoder.decode()?;
                Ok(TaggedEncKdcRepPart::EncTgsRepPart(part))
            }
            _ => Err(der::Error::from(der::ErrorKind::TagUnexpected {
                expected: None,
                actual: tag,
            })),
        }
    }
}

impl ::der::Encode for TaggedEncKdcRepPart {
    fn encoded_len(&self) -> Result<der::Length, der::Error> {
        let inner_len = self.inner().encoded_len()?;
        let len = (self.tag().encoded_len()? + inner_len + inner_len.encoded_len()?)?;
        Ok(len)
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.tag().encode(writer)?;
        self.inner().encoded_len()?.encode(writer)?;
        self.inner().encode(writer)
    }
}
