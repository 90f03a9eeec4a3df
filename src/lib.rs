#![warn(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub use icmp::v4::{Identifier, RawSocket, SequenceNumber, TSocket, Ttl};
pub use ledger::{LedgerError, ProbeRequest, RequestLedger};
pub use outcome::{FailureKind, Outcome, PingReply, ProbeFailure};
pub use ping_error::{PingError, PingResult};
pub use ping_statistics::{PingStatistics, PingSummary};
pub use pinger::{Pinger, State};
pub use pinger_config::PingerConfig;
pub use reporter::{Reporter, StatisticsHandle, StatsReporter};
pub use stop_condition::StopHandle;

mod icmp;
mod ledger;
mod outcome;
mod ping_error;
mod ping_statistics;
mod pinger;
mod pinger_config;
mod records;
mod reporter;
mod stop_condition;
