use der::asn1::OctetString;
use der::Sequence;

/// ```text
/// Checksum        ::= SEQUENCE {
///     cksumtype       [0] Int32,
///     checksum        [1] OCTET STRING
/// }
/// ````
#[derive(Debug, Clone, Eq, PartialEq, Sequence)]
pub(crate) struct Checksum {
    // This field indicates the algorithm used to generate the accompanying checksum.
    #[asn1(context_specific = "0")]
    pub(crate) checksum_type: i32,
    // This field contains the checksum itself, encoded as an octet string.
    #[asn1(context_specific = "1")]
    pub(crate) checksum: OctetString,
}
