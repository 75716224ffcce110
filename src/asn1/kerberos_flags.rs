use der::flagset::flags;
use der::flagset::FlagSet;

flags! {
    /// ```text
    /// KerberosFlags   ::= BIT STRING (SIZE (32..MAX))
    ///                     -- minimum number of bits shall be sent,
    ///                     -- but no fewer than 32
    /// ````
    #[repr(u32)]
    pub enum KerberosFlags: u32 {
        Reserved        = 1 << 0,
        Forwardable     = 1 << 1,
        Forwarded       = 1 << 2,
        Proxiable       = 1 << 3,
        Proxy           = 1 << 4,
        AllowPostdate   = 1 << 5,
        Postdated       = 1 << 6,
        Unused7         = 1 << 7,
        Renewable       = 1 << 8,
        Unused9         = 1 << 9,
        Unused10        = 1 << 10,
        OptHardwareAuth = 1 << 11,
        Unused12        = 1 << 12,
        Unused13        = 1 << 13,
        Unused14        = 1 << 14,
        Canonicalize    = 1 << 15,
        Unused16        = 1 << 16,
        Unused17        = 1 << 17,
        Unused18        = 1 << 18,
        Unused19        = 1 << 19,
        Unused20        = 1 << 20,
        Unused21        = 1 << 21,
        Unused22        = 1 << 22,
        Unused23        = 1 << 23,
        Unused24        = 1 << 24,
        Unused25        = 1 << 25,
        // -- 26 was unused in 1510
        DisableTransitedCheck = 1 << 26,
        RenewableOk     = 1 << 27,
        EncTktInSkey    = 1 << 28,
        Unused29        = 1 << 29,
        Renew           = 1 << 30,
        Validate        = 1 << 31
    }
}

/// ```text
/// KDCOptions      ::= KerberosFlags
/// ````
pub(crate) type KdcOptions = FlagSet<KerberosFlags>;

flags! {
    /// ```text
    /// TicketFlags     ::= KerberosFlags
    ///         -- reserved(0),
    ///         -- forwardable(1),
    ///         -- forwarded(2),
    ///         -- proxiable(3),
    ///         -- proxy(4),
    ///         -- may-postdate(5),
    ///         -- postdated(6),
    ///         -- invalid(7),
    ///         -- renewable(8),
    ///         -- initial(9),
    ///         -- pre-authent(10),
    ///         -- hw-authent(11),
    ///         -- transited-policy-checked(12),
    ///         -- ok-as-delegate(13)
    /// ````
    #[repr(u32)]
    pub enum TicketFlags: u32 {
        Reserved               = 1 << 0,
        Forwardable            = 1 << 1,
        Forwarded              = 1 << 2,
        Proxiable              = 1 << 3,
        Proxy                  = 1 << 4,
        MayPostdate            = 1 << 5,
        Postdated              = 1 << 6,
        Invalid                = 1 << 7,
        Renewable              = 1 << 8,
        Initial                = 1 << 9,
        PreAuthent             = 1 << 10,
        HwAuthent              = 1 << 11,
        TransitedPolicyChecked = 1 << 12,
        OkAsDelegate           = 1 << 13,
    }
}
