use der::asn1::GeneralizedTime;
use der::{DateTime, DecodeValue, EncodeValue, FixedTag, Tag};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// ```text
/// KerberosTime    ::= GeneralizedTime -- with no fractional seconds
/// ````
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct KerberosTime(GeneralizedTime);

impl KerberosTime {
    pub(crate) fn from_unix_duration(duration: Duration) -> der::Result<Self> {
        // Sub-second precision is not representable on the wire.
        let duration = Duration::from_secs(duration.as_secs());
        GeneralizedTime::from_unix_duration(duration).map(KerberosTime)
    }

    pub(crate) fn from_system_time(stime: SystemTime) -> der::Result<Self> {
        let duration = stime
            .duration_since(UNIX_EPOCH)
            .map_err(|_| der::Error::from(der::ErrorKind::DateTime))?;
        Self::from_unix_duration(duration)
    }

    pub(crate) fn from_date_time(dt: DateTime) -> Self {
        KerberosTime(GeneralizedTime::from_date_time(dt))
    }

    pub(crate) fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + self.0.to_unix_duration()
    }
}

impl FixedTag for KerberosTime {
    const TAG: Tag = Tag::GeneralizedTime;
}

impl<'a> DecodeValue<'a> for KerberosTime {
    type Error = der::Error;

    fn decode_value<R: der::Reader<'a>>(reader: &mut R, header: der::Header) -> der::Result<Self> {
        let t = GeneralizedTime::decode_value(reader, header)?;
        Ok(Self(t))
    }
}

impl EncodeValue for KerberosTime {
    fn value_len(&self) -> der::Result<der::Length> {
        GeneralizedTime::value_len(&self.0)
    }
    fn encode_value(&self, encoder: &mut impl der::Writer) -> der::Result<()> {
        GeneralizedTime::encode_value(&self.0, encoder)
    }
}

/// ```text
/// Microseconds    ::= INTEGER (0..999999)
///                     -- microseconds
/// ````
pub(crate) type Microseconds = u32;
