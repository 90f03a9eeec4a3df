use std::fmt;

/// ICMP echo sequence number. Wraps around at `u16::MAX`.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct SequenceNumber(pub u16);

impl SequenceNumber {
    pub(crate) fn start_value() -> SequenceNumber {
        SequenceNumber(0)
    }

    pub(crate) fn next(self) -> Self {
        SequenceNumber(self.0.wrapping_add(1))
    }
}

impl From<SequenceNumber> for u16 {
    fn from(value: SequenceNumber) -> Self {
        value.0
    }
}

impl From<u16> for SequenceNumber {
    fn from(value: u16) -> Self {
        SequenceNumber(value)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ICMP echo identifier, used as the correlation id of a probe.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Identifier(pub u16);

impl Identifier {
    pub(crate) fn random<R: rand::Rng>(rng: &mut R) -> Identifier {
        Identifier(rng.gen())
    }
}

impl From<Identifier> for u16 {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl From<u16> for Identifier {
    fn from(value: u16) -> Self {
        Identifier(value)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IP time-to-live, as set on outgoing probes or read from a reply header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Ttl(pub u8);

impl From<u8> for Ttl {
    fn from(integer: u8) -> Self {
        Ttl(integer)
    }
}

impl From<Ttl> for u8 {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
