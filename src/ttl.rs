type TtlInnerType = u8;

/// IPv4 time-to-live or IPv6 hop limit.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Ttl(pub TtlInnerType);

impl Ttl {
    pub fn max_value() -> Ttl {
        Ttl(TtlInnerType::MAX)
    }

    /// Next hop limit, or `None` once `cap` is reached.
    pub(crate) fn next(self, cap: Ttl) -> Option<Ttl> {
        if self >= cap {
            return None;
        }
        self.0.checked_add(1).map(Ttl)
    }
}

impl From<TtlInnerType> for Ttl {
    fn from(integer: TtlInnerType) -> Self {
        Ttl(integer)
    }
}

impl From<Ttl> for TtlInnerType {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl std::fmt::Display for Ttl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
