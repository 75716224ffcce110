use super::kdc_req::KdcReq;
use der::{Tag, TagNumber, Writer};

/// ```text
/// AS-REQ          ::= [APPLICATION 10] KDC-REQ
/// TGS-REQ         ::= [APPLICATION 12] KDC-REQ
/// ```
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum KrbKdcReq {
    AsReq(KdcReq),
    TgsReq(KdcReq),
}

impl<'a> ::der::Decode<'a> for KrbKdcReq {
    type Error = der::Error;

    fn decode<R: der::Reader<'a>>(decoder: &mut R) -> der::Result<Self> {
        let tag: der::Tag = decoder.decode()?;
        let _len: der::Length = decoder.decode()?;

        match tag {
            Tag::Application {
                constructed: true,
                number: TagNumber(10),
            } => {
                let kdc_req: KdcReq = decoder.decode()?;
                Ok(KrbKdcReq::AsReq(kdc_req))
            }
            Tag::Application {
                constructed: true,
                number: TagNumber(12),
            } => {
                let kdc_req: KdcReq = decoder.decode()?;
                Ok(KrbKdcReq::TgsReq(kdc_req))
            }
            _ => Err(der::Error::from(der::ErrorKind::TagUnexpected {
                expected: None,
                actual: tag,
            })),
        }
    }
}

impl ::der::Encode for KrbKdcReq {
    fn encoded_len(&self) -> Result<der::Length, der::Error> {
        let (tag, req) = match self {
            KrbKdcReq::AsReq(req) => (
                Tag::Application {
                    constructed: true,
                    number: TagNumber(10),
                },
                req,
            ),
            KrbKdcReq::TgsReq(req) => (
                Tag::Application {
                    constructed: true,
                    number: TagNumber(12),
                },
                req,
            ),
        };

        let req_len = req.encoded_len()?;
        let len = (tag.encoded_len()? + req_len + req_len.encoded_len()?)?;
        Ok(len)
    }

    fn encode(&self, writer: &mut impl Writer) -> der::Result<()> {
        let (tag, req) = match self {
            KrbKdcReq::AsReq(req) => (
                Tag::Application {
                    constructed: true,
                    number: TagNumber(10),
                },
                req,
            ),
            KrbKdcReq::TgsReq(req) => (
                Tag::Application {
                    constructed: true,
                    number: TagNumber(12),
                },
                req,
            ),
        };

        tag.encode(writer)?;
        req.encoded_len()?.encode(writer)?;
        req.encode(writer)
    }
}
