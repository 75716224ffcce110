use super::constants::message_types::KrbMessageType;
use super::encrypted_data::EncryptedData;
use super::encryption_key::EncryptionKey;
use super::host_addresses::{HostAddress, HostAddresses};
use super::kerberos_flags::TicketFlags;
use super::kerberos_string::Realm;
use super::kerberos_time::{KerberosTime, Microseconds};
use super::principal_name::PrincipalName;
use super::tagged_ticket::TaggedTicket;
use der::flagset::FlagSet;
use der::{Decode, DecodeValue, Encode, EncodeValue, FixedTag, Sequence, Tag, TagNumber};

/// ```text
/// KRB-CRED        ::= [APPLICATION 22] SEQUENCE {
///         pvno            [0] INTEGER (5),
///         msg-type        [1] INTEGER (22),
///         tickets         [2] SEQUENCE OF Ticket,
///         enc-part        [3] EncryptedData -- EncKrbCredPart
/// }
/// ```
#[derive(Debug, Eq, PartialEq, Sequence)]
pub(crate) struct KrbCredInner {
    #[asn1(context_specific = "0")]
    pub(crate) pvno: u8,
    #[asn1(context_specific = "1")]
    pub(crate) msg_type: u8,
    #[asn1(context_specific = "2")]
    pub(crate) tickets: Vec<TaggedTicket>,
    #[asn1(context_specific = "3")]
    pub(crate) enc_part: EncryptedData,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct KrbCred(KrbCredInner);

impl KrbCred {
    pub(crate) fn new(tickets: Vec<TaggedTicket>, enc_part: EncryptedData) -> Self {
        Self(KrbCredInner {
            pvno: 5,
            msg_type: KrbMessageType::KrbCred as u8,
            tickets,
            enc_part,
        })
    }
}

impl FixedTag for KrbCred {
    const TAG: Tag = Tag::Application {
        constructed: true,
        number: TagNumber(22),
    };
}

impl<'a> DecodeValue<'a> for KrbCred {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, _header: der::Header) -> der::Result<Self> {
        let inner: KrbCredInner = KrbCredInner::decode(reader)?;
        Ok(Self(inner))
    }
}

impl EncodeValue for KrbCred {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(encoder)?;
        Ok(())
    }
}

impl AsRef<KrbCredInner> for KrbCred {
    fn as_ref(&self) -> &KrbCredInner {
        &self.0
    }
}

/// ```text
/// KrbCredInfo     ::= SEQUENCE {
///         key             [0] EncryptionKey,
///         prealm          [1] Realm OPTIONAL,
///         pname           [2] PrincipalName OPTIONAL,
///         flags           [3] TicketFlags OPTIONAL,
///         authtime        [4] KerberosTime OPTIONAL,
///         starttime       [5] KerberosTime OPTIONAL,
///         endtime         [6] KerberosTime OPTIONAL,
///         renew-till      [7] KerberosTime OPTIONAL,
///         srealm          [8] Realm OPTIONAL,
///         sname           [9] PrincipalName OPTIONAL,
///         caddr           [10] HostAddresses OPTIONAL
/// }
/// ```
#[derive(Debug, Eq, PartialEq, Sequence)]
pub(crate) struct KrbCredInfo {
    #[asn1(context_specific = "0")]
    pub(crate) key: EncryptionKey,
    #[asn1(context_specific = "1", optional = "true")]
    pub(crate) prealm: Option<Realm>,
    #[asn1(context_specific = "2", optional = "true")]
    pub(crate) pname: Option<PrincipalName>,
    #[asn1(context_specific = "3", optional = "true")]
    pub(crate) flags: Option<FlagSet<TicketFlags>>,
    #[asn1(context_specific = "4", optional = "true")]
    pub(crate) auth_time: Option<KerberosTime>,
    #[asn1(context_specific = "5", optional = "true")]
    pub(crate) start_time: Option<KerberosTime>,
    #[asn1(context_specific = "6", optional = "true")]
    pub(crate) end_time: Option<KerberosTime>,
    #[asn1(context_specific = "7", optional = "true")]
    pub(crate) renew_till: Option<KerberosTime>,
    #[asn1(context_specific = "8", optional = "true")]
    pub(crate) srealm: Option<Realm>,
    #[asn1(context_specific = "9", optional = "true")]
    pub(crate) sname: Option<PrincipalName>,
    #[asn1(context_specific = "10", optional = "true")]
    pub(crate) caddr: Option<HostAddresses>,
}

/// ```text
/// EncKrbCredPart  ::= [APPLICATION 29] SEQUENCE {
///         ticket-info     [0] SEQUENCE OF KrbCredInfo,
///         nonce           [1] UInt32 OPTIONAL,
///         timestamp       [2] KerberosTime OPTIONAL,
///         usec            [3] Microseconds OPTIONAL,
///         s-address       [4] HostAddress OPTIONAL,
///         r-address       [5] HostAddress OPTIONAL
/// }
/// ```
#[derive(Debug, Eq, PartialEq, Sequence)]
pub(crate) struct EncKrbCredPartInner {
    #[asn1(context_specific = "0")]
    pub(crate) ticket_info: Vec<KrbCredInfo>,
    #[asn1(context_specific = "1", optional = "true")]
    pub(crate) nonce: Option<u32>,
    #[asn1(context_specific = "2", optional = "true")]
    pub(crate) timestamp: Option<KerberosTime>,
    #[asn1(context_specific = "3", optional = "true")]
    pub(crate) usec: Option<Microseconds>,
    #[asn1(context_specific = "4", optional = "true")]
    pub(crate) s_address: Option<HostAddress>,
    #[asn1(context_specific = "5", optional = "true")]
    pub(crate) r_address: Option<HostAddress>,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct EncKrbCredPart(pub(crate) EncKrbCredPartInner);

impl FixedTag for EncKrbCredPart {
    const TAG: Tag = Tag::Application {
        constructed: true,
        number: TagNumber(29),
    };
}

impl<'a> DecodeValue<'a> for EncKrbCredPart {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, _header: der::Header) -> der::Result<Self> {
        let inner: EncKrbCredPartInner = EncKrbCredPartInner::decode(reader)?;
        Ok(Self(inner))
    }
}

impl EncodeValue for EncKrbCredPart {
    fn value_len(&self) -> der::Result<der::Length> {
        self.0.encoded_len()
    }

    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        self.0.encode(encoder)?;
        Ok(())
    }
}
