use super::encrypted_data::EncryptedData;
use super::host_addresses::HostAddresses;
use super::kerberos_flags::KdcOptions;
use super::kerberos_string::Realm;
use super::kerberos_time::KerberosTime;
use super::pa_data::PaData;
use super::principal_name::PrincipalName;
use super::tagged_ticket::TaggedTicket;
use der::asn1::Any;
use der::Sequence;

/// ```text
/// KDC-REQ         ::= SEQUENCE {
///         -- NOTE: first tag is [1], not [0]
///         pvno            [1] INTEGER (5) ,
///         msg-type        [2] INTEGER (10 -- AS -- | 12 -- TGS --),
///         padata          [3] SEQUENCE OF PA-DATA OPTIONAL
///                             -- NOTE: not empty --,
///         req-body        [4] KDC-REQ-BODY
/// }
/// ```
#[derive(Debug, Eq, PartialEq, Sequence)]
pub(crate) struct KdcReq {
    #[asn1(context_specific = "1")]
    pub(crate) pvno: u8,
    #[asn1(context_specific = "2")]
    pub(crate) msg_type: u8,
    #[asn1(context_specific = "3", optional = "true")]
    pub(crate) padata: Option<Vec<PaData>>,
    // Held as Any (raw bytes) because the TGS path computes a keyed checksum
    // over the exact DER of the request body.
    #[asn1(context_specific = "4")]
    pub(crate) req_body: Any,
}

/// ```text
/// KDC-REQ-BODY    ::= SEQUENCE {
///         kdc-options             [0] KDCOptions,
///         cname                   [1] PrincipalName OPTIONAL
///                                     -- Used only in AS-REQ --,
///         realm                   [2] Realm
///                                     -- Server's realm
///                                     -- Also client's in AS-REQ --,
///         sname                   [3] PrincipalName OPTIONAL,
///         from                    [4] KerberosTime OPTIONAL,
///         till                    [5] KerberosTime,
///         rtime                   [6] KerberosTime OPTIONAL,
///         nonce                   [7] UInt32,
///         etype                   [8] SEQUENCE OF Int32 -- EncryptionType
///                                     -- in preference order --,
///         addresses               [9] HostAddresses OPTIONAL,
///         enc-authorization-data  [10] EncryptedData OPTIONAL
///                                     -- AuthorizationData --,
///         additional-tickets      [11] SEQUENCE OF Ticket OPTIONAL
///                                         -- NOTE: not empty
/// }
/// ```
#[derive(Debug, Eq, PartialEq, Sequence)]
pub(crate) struct KdcReqBody {
    #[asn1(context_specific = "0")]
    pub(crate) kdc_options: KdcOptions,
    #[asn1(context_specific = "1", optional = "true")]
    pub(crate) cname: Option<PrincipalName>,
    #[asn1(context_specific = "2")]
    pub(crate) realm: Realm,
    #[asn1(context_specific = "3", optional = "true")]
    pub(crate) sname: Option<PrincipalName>,
    #[asn1(context_specific = "4", optional = "true")]
    pub(crate) from: Option<KerberosTime>,
    #[asn1(context_specific = "5")]
    pub(crate) till: KerberosTime,
    #[asn1(context_specific = "6", optional = "true")]
    pub(crate) rtime: Option<KerberosTime>,
    // KRB spec claims this is a u32, but heimdal sends i32, and MIT treats
    // this as u31. Values above i32::MAX are rejected by MIT KDCs.
    #[asn1(context_specific = "7")]
    pub(crate) nonce: i32,
    #[asn1(context_specific = "8")]
    pub(crate) etype: Vec<i32>,
    #[asn1(context_specific = "9", optional = "true")]
    pub(crate) addresses: Option<HostAddresses>,
    #[asn1(context_specific = "10", optional = "true")]
    pub(crate) enc_authorization_data: Option<EncryptedData>,
    #[asn1(context_specific = "11", optional = "true")]
    pub(crate) additional_tickets: Option<Vec<TaggedTicket>>,
}

#[cfg(test)]
mod tests {
    use super::KdcReqBody;
    use der::Decode;

    #[test]
    fn kdc_req_body_heimdal_macos() {
        let _ = tracing_subscriber::fmt::try_init();
        // Sample taken from macos while attempting to access a samba share.
        let req_body_bytes = hex::decode(concat!(
            // Sequence
            "3079",
            // bit string
            "a007",
            "03050000000000",
            // Realm
            "a215",
            "1b134445562e4649525354594541522e49442e4155",
            // Service Name
            "a32c",
            "302a",
            "a003",
            "020101",
            "a123",
            "3021",
            "1b04",
            "63696673",
            "1b19",
            "66696c65732e6465762e6669727374796561722e69642e6175",
            // Generalised time
            "a511",
            "180f31393730303130313030303030305a",
            // Nonce
            "a706",
            "02",
            "04",
            "cd5c0274",
            // etypes
            "a80e",
            "300c",
            "02",
            "01",
            "12",
            "02",
            "01",
            "11",
            "02",
            "01",
            "10",
            "02",
            "01",
            "17",
        ))
        .unwrap();
        let req_body = der::Any::from_der(&req_body_bytes).unwrap();
        let req_body = req_body.decode_as::<KdcReqBody>().unwrap();
        tracing::trace!(?req_body);

        assert_eq!(req_body.realm.as_str(), "DEV.FIRSTYEAR.ID.AU");
        let sname = req_body.sname.as_ref().unwrap();
        assert_eq!(sname.name_string[0].as_str(), "cifs");
        assert_eq!(sname.name_string[1].as_str(), "files.dev.firstyear.id.au");
    }
}
