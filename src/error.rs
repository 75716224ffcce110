#[derive(Debug)]
pub enum KrbError {
    // IMPORTANT: Don't add values to this enum - it's a potential security risk
    // as you can leak internal state in an error. If you want to debug the error,
    // then use the error! macro at the error raise site to report relevant information.
    InvalidHmacSha1Key,
    MessageAuthenticationFailed,
    MessageEmpty,
    InsufficientData,
    PlaintextEmpty,
    CtsCiphertextInvalid,
    UnsupportedEncryption,
    UnsupportedChecksumType,

    DerDecodePaData,
    DerDecodeEtypeInfo2,
    DerEncodePaEncTsEnc,
    DerDecodeEncKdcRepPart,
    DerEncodeOctetString,
    DerEncodeAuthenticator,
    DerEncodeApReq,
    DerEncodeKdcReqBody,
    DerEncodeKerberosString,
    DerEncodeKerberosTime,
    DerEncodeAny,
    DerDecodeKrbCred,
    DerEncodeKrbCred,
    DerDecodeReply,
    DerError(der::Error),

    PrincipalEmptyComponent,
    PrincipalEmptyRealm,
    PrincipalNameInvalidType,
    RealmInvalidCharacter,

    ConfigDefaultRealmMissing,
    ConfigKdcUnresolvable,
    ConfigOverrideIncomplete,
    ConfigParse,

    NoUsableKey,
    BadKeyVersion,

    NetworkTimeout,
    NetworkIo,
    ResponseTooBig,

    OptionNotAllowed,
    OptionRequiresTgtFlag,

    PreauthRequired,
    PreauthFailed,
    PreauthUnsupported,
    PreauthMissingEtypeInfo2,
    PreauthInvalidUnixTs,
    PreauthInvalidS2KParams,

    ReplyModified,
    KdcRefusal,

    TicketNotRenewable,
    KrbCredMissingTicketInfo,

    ExchangeInvalidState,

    InvalidMessageType,
    InvalidPvno,
    InvalidEncryptionKey,
    IoError(std::io::Error),
}

impl From<der::Error> for KrbError {
    fn from(value: der::Error) -> Self {
        KrbError::DerError(value)
    }
}

impl From<std::io::Error> for KrbError {
    fn from(value: std::io::Error) -> Self {
        KrbError::IoError(value)
    }
}
