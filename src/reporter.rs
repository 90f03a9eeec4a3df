use crate::outcome::{FailureKind, Outcome};
use crate::ping_statistics::{PingStatistics, PingSummary};
use std::sync::{Arc, Mutex, PoisonError};

/// Receives every outcome of a run.
///
/// Called from the pinger's processing thread only, one outcome at a time.
pub trait Reporter: Send {
    /// Called once when the run starts, before the first probe is sent.
    fn start(&mut self) {}

    fn report(&mut self, outcome: &Outcome);
}

impl<F> Reporter for F
where
    F: FnMut(&Outcome) + Send,
{
    fn report(&mut self, outcome: &Outcome) {
        self(outcome);
    }
}

/// Shared read access to the statistics a [`StatsReporter`] collects.
#[derive(Clone, Debug)]
pub struct StatisticsHandle {
    statistics: Arc<Mutex<PingStatistics>>,
}

impl StatisticsHandle {
    pub fn summarize(&self) -> PingSummary {
        self.statistics.lock().unwrap_or_else(PoisonError::into_inner).summarize()
    }

    /// Number of probes recorded so far.
    pub fn len(&self) -> usize {
        self.statistics.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Logs each outcome, records it in [`PingStatistics`] and optionally passes
/// it on to another reporter.
#[allow(clippy::module_name_repetitions)]
pub struct StatsReporter {
    statistics: Arc<Mutex<PingStatistics>>,
    forward: Option<Box<dyn Reporter>>,
}

impl Default for StatsReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsReporter {
    /// Elapsed time is measured from construction until the pinger calls
    /// [`Reporter::start`].
    pub fn new() -> Self {
        StatsReporter { statistics: Arc::new(Mutex::new(PingStatistics::new())), forward: None }
    }

    pub fn forwarding_to(reporter: impl Reporter + 'static) -> Self {
        StatsReporter { forward: Some(Box::new(reporter)), ..Self::new() }
    }

    pub fn statistics(&self) -> StatisticsHandle {
        StatisticsHandle { statistics: self.statistics.clone() }
    }

    fn record(&self, outcome: &Outcome) {
        let mut statistics = self.statistics.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Outcome::Reply(reply) => statistics.record_success(reply.ping_duration),
            Outcome::Failure(_) if outcome.is_loss() => statistics.record_loss(),
            Outcome::Failure(_) => {}
        }
    }
}

impl Reporter for StatsReporter {
    fn start(&mut self) {
        self.statistics.lock().unwrap_or_else(PoisonError::into_inner).start();
        if let Some(forward) = self.forward.as_mut() {
            forward.start();
        }
    }

    fn report(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Reply(reply) => tracing::info!(
                "{} bytes from {}: icmp_seq={} ttl={} time={:?}",
                reply.package_size,
                reply.ip_addr,
                reply.sequence_number,
                reply.ttl,
                reply.ping_duration
            ),
            Outcome::Failure(failure) if failure.kind == FailureKind::Timeout => {
                if let Some(sequence_number) = failure.sequence_number {
                    tracing::warn!("Request timeout for icmp_seq={sequence_number}");
                }
            }
            Outcome::Failure(failure) => tracing::warn!("{failure}"),
        }
        self.record(outcome);
        if let Some(forward) = self.forward.as_mut() {
            forward.report(outcome);
        }
    }
}
