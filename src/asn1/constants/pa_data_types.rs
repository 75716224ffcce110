use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum PaDataType {
    PaTgsReq = 1,
    PaEncTimestamp = 2,
    PaPwSalt = 3,
    Reserved4 = 4,
    PaEncUnixTime = 5, // (deprecated)
    PaSandiaSecureid = 6,
    PaSesame = 7,
    PaOsfDce = 8,
    PaCybersafeSecureid = 9,
    PaAfs3Salt = 10,
    PaEtypeInfo = 11,
    PaSamChallenge = 12, // (sam/otp)
    PaSamResponse = 13,  // (sam/otp)
    PaPkAsReqOld = 14,   // (pkinit)
    PaPkAsRepOld = 15,   // (pkinit)
    PaPkAsReq = 16,      // (pkinit)
    PaPkAsRep = 17,      // (pkinit)
    PaEtypeInfo2 = 19,   // (replaces pa-etype-info)
    PaUseSpecifiedKvno = 20,
    PaSamRedirect = 21, // (sam/otp)
    TdPadata = 22,      // (embeds padata)
    PaSamEtypeInfo = 23,
    PaAltPrinc = 24,
    PaSamChallenge2 = 30,
    PaSamResponse2 = 31,
    PaExtraTgt = 41,
    TdPkinitCmsCertificates = 101,
    TdKrbPrincipal = 102,
    TdKrbRealm = 103,
    TdTrustedCertifiers = 104,
    TdCertificateIndex = 105,
    TdAppDefinedError = 106,
    TdReqNonce = 107,
    TdReqSeq = 108,
    PaPacRequest = 128,         // Include Windows PAC
    PaFxCookie = 133,           // RFC6113 FAST Cookie
    PaFxFast = 136,             // RFC6113 FAST
    EncpadataReqEncPaRep = 149, // RFC 6806
    PadataAsFreshness = 150,    // RFC 8070
    PadataSpake = 151,
}
