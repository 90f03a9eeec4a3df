use crate::ledger::LedgerError;
use crate::pinger::State;
use thiserror::Error;

pub type PingResult<T> = std::result::Result<T, PingError>;

/// Errors that abort a run or prevent one from starting. Per-probe problems
/// are reported as [`crate::Outcome::Failure`] instead.
#[derive(Debug, Error)]
pub enum PingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot resolve {0}: Unknown host")]
    HostNotFound(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("pinger is {0:?}, a run can only start from Idle")]
    InvalidState(State),
    #[error("could not create ICMP package")]
    PackageConstruction,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}
