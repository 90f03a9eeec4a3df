use crate::icmp::v4::{Identifier, SequenceNumber, Ttl};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// A successful round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PingReply {
    pub package_size: usize,
    pub ip_addr: IpAddr,
    pub ttl: Ttl,
    pub sequence_number: SequenceNumber,
    pub ping_duration: Duration,
}

/// Why a probe or a received packet did not produce a [`PingReply`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FailureKind {
    #[error("request timeout")]
    Timeout,
    #[error("no reply before the run stopped")]
    Unanswered,
    #[error("time to live exceeded")]
    TimeExceeded,
    #[error("time to live exceeded for an untracked request")]
    TimeExceededUntracked { identifier: Option<Identifier> },
    #[error("reply for untracked id {identifier}")]
    UntrackedId { identifier: Identifier },
    #[error("reply did not come from the probed host {expected}")]
    UnexpectedAddress { expected: IpAddr },
    #[error("unexpected ICMP type {icmp_type} (code {icmp_code})")]
    UnexpectedType { icmp_type: u8, icmp_code: u8 },
    #[error("malformed packet: {0}")]
    Malformed(String),
}

impl FailureKind {
    /// Whether a tracked probe was consumed by this failure and must be counted as lost.
    pub fn is_loss(&self) -> bool {
        matches!(
            self,
            FailureKind::Timeout
                | FailureKind::Unanswered
                | FailureKind::TimeExceeded
                | FailureKind::UnexpectedAddress { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    /// The responding host, or the probed target for timeouts.
    pub ip_addr: Option<IpAddr>,
    pub sequence_number: Option<SequenceNumber>,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ip_addr) = self.ip_addr {
            write!(f, "From {ip_addr} ")?;
        }
        if let Some(sequence_number) = self.sequence_number {
            write!(f, "icmp_seq={sequence_number} ")?;
        }
        write!(f, "{}", self.kind)
    }
}

/// Everything the pinger hands to a [`crate::Reporter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Reply(PingReply),
    Failure(ProbeFailure),
}

impl Outcome {
    pub(crate) fn failure(kind: FailureKind, ip_addr: Option<IpAddr>, sequence_number: Option<SequenceNumber>) -> Self {
        Outcome::Failure(ProbeFailure { kind, ip_addr, sequence_number })
    }

    pub fn is_loss(&self) -> bool {
        match self {
            Outcome::Reply(_) => false,
            Outcome::Failure(failure) => failure.kind.is_loss(),
        }
    }
}
