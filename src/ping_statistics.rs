use std::fmt;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ProbeRecord {
    Received(Duration),
    Lost,
}

/// Append-only record of probe results for one run.
#[derive(Debug)]
pub struct PingStatistics {
    start_time: Instant,
    records: Vec<ProbeRecord>,
}

/// Summary of a run. All RTT values are zero when nothing was recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PingSummary {
    pub sent: u64,
    pub received: u64,
    pub elapsed: Duration,
    pub min_rtt: Duration,
    /// Sum of received RTTs divided by `sent`, not by `received`.
    pub avg_rtt: Duration,
    pub max_rtt: Duration,
    pub sdev_rtt: Duration,
}

impl Default for PingStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl PingStatistics {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start_time: Instant) -> Self {
        PingStatistics { start_time, records: Vec::new() }
    }

    /// Restarts the elapsed-time clock.
    pub fn start(&mut self) {
        self.start_time = Instant::now();
    }

    pub fn record_success(&mut self, rtt: Duration) {
        self.records.push(ProbeRecord::Received(rtt));
    }

    pub fn record_loss(&mut self) {
        self.records.push(ProbeRecord::Lost);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summarize(&self) -> PingSummary {
        self.summarize_at(Instant::now())
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn summarize_at(&self, now: Instant) -> PingSummary {
        if self.records.is_empty() {
            return PingSummary::default();
        }

        let rtts: Vec<Duration> = self
            .records
            .iter()
            .filter_map(|record| match record {
                ProbeRecord::Received(rtt) => Some(*rtt),
                ProbeRecord::Lost => None,
            })
            .collect();
        let sent = self.records.len() as u64;
        let received = rtts.len() as u64;

        let rtt_sum: u128 = rtts.iter().map(Duration::as_nanos).sum();
        let avg_rtt = Duration::from_nanos(u64::try_from(rtt_sum / u128::from(sent)).unwrap_or(u64::MAX));

        let sdev_rtt = if sent > 1 {
            let avg_ms = millis(avg_rtt);
            let squared_diff_sum: f64 = rtts.iter().map(|rtt| (millis(*rtt) - avg_ms).powi(2)).sum();
            let sdev_ms = (squared_diff_sum / (sent - 1) as f64).sqrt();
            Duration::from_secs_f64(sdev_ms / 1000.0)
        } else {
            Duration::ZERO
        };

        PingSummary {
            sent,
            received,
            elapsed: now.saturating_duration_since(self.start_time),
            min_rtt: rtts.iter().min().copied().unwrap_or_default(),
            avg_rtt,
            max_rtt: rtts.iter().max().copied().unwrap_or_default(),
            sdev_rtt,
        }
    }
}

impl PingSummary {
    #[allow(clippy::cast_precision_loss)]
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        (self.sent - self.received) as f64 / self.sent as f64 * 100.0
    }
}

impl fmt::Display for PingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} packets transmitted, {} received, {:.0}% packet loss, time {:.0} ms",
            self.sent,
            self.received,
            self.loss_percent(),
            millis(self.elapsed)
        )?;
        write!(
            f,
            "rtt min/avg/max/sdev = {:.3}/{:.3}/{:.3}/{:.3} ms",
            millis(self.min_rtt),
            millis(self.avg_rtt),
            millis(self.max_rtt),
            millis(self.sdev_rtt)
        )
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use more_asserts as ma;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn empty_statistics_summarize_to_zero() {
        let statistics = PingStatistics::new();
        assert_eq!(PingSummary::default(), statistics.summarize());
        assert_eq!(0.0, statistics.summarize().loss_percent());
    }

    #[test]
    fn counts_sent_and_received() {
        let mut statistics = PingStatistics::new();
        for n in 0..4 {
            statistics.record_success(ms(n + 1));
        }
        for _ in 0..3 {
            statistics.record_loss();
        }

        let summary = statistics.summarize();

        assert_eq!(7, summary.sent);
        assert_eq!(4, summary.received);
    }

    #[test]
    fn average_is_divided_by_sent() {
        let mut statistics = PingStatistics::new();
        statistics.record_success(ms(10));
        statistics.record_success(ms(20));
        statistics.record_loss();

        let summary = statistics.summarize();

        assert_eq!(ms(10), summary.avg_rtt);
        assert_eq!(ms(10), summary.min_rtt);
        assert_eq!(ms(20), summary.max_rtt);
    }

    #[test]
    fn min_ignores_leading_loss() {
        let mut statistics = PingStatistics::new();
        statistics.record_loss();
        statistics.record_success(ms(30));
        statistics.record_success(ms(25));

        assert_eq!(ms(25), statistics.summarize().min_rtt);
    }

    #[test]
    fn single_probe_has_zero_standard_deviation() {
        let mut statistics = PingStatistics::new();
        statistics.record_success(ms(42));

        let summary = statistics.summarize();

        assert_eq!(Duration::ZERO, summary.sdev_rtt);
        assert_eq!(ms(42), summary.avg_rtt);
    }

    #[test]
    fn five_on_time_replies() {
        let mut statistics = PingStatistics::new();
        for rtt in [10, 12, 11, 9, 13] {
            statistics.record_success(ms(rtt));
        }

        let summary = statistics.summarize();

        assert_eq!(5, summary.received);
        assert_eq!(ms(9), summary.min_rtt);
        assert_eq!(ms(13), summary.max_rtt);
        assert_eq!(ms(11), summary.avg_rtt);
        // sqrt((1 + 1 + 0 + 4 + 4) / 4) ms
        let sdev_ms = millis(summary.sdev_rtt);
        ma::assert_gt!(sdev_ms, 1.581);
        ma::assert_lt!(sdev_ms, 1.582);
    }

    #[test]
    fn all_lost() {
        let mut statistics = PingStatistics::new();
        for _ in 0..5 {
            statistics.record_loss();
        }

        let summary = statistics.summarize();

        assert_eq!(5, summary.sent);
        assert_eq!(0, summary.received);
        assert_eq!(Duration::ZERO, summary.avg_rtt);
        assert_eq!(Duration::ZERO, summary.sdev_rtt);
        assert_eq!(100.0, summary.loss_percent());
    }

    #[test]
    fn elapsed_is_measured_from_start() {
        let start = Instant::now();
        let mut statistics = PingStatistics::starting_at(start);
        statistics.record_loss();

        assert_eq!(ms(1500), statistics.summarize_at(start + ms(1500)).elapsed);
    }

    #[test]
    fn fmt_summary() {
        let summary = PingSummary {
            sent: 4,
            received: 3,
            elapsed: ms(3004),
            min_rtt: Duration::from_micros(9_250),
            avg_rtt: ms(10),
            max_rtt: Duration::from_micros(12_500),
            sdev_rtt: Duration::from_micros(1_125),
        };
        assert_eq!(
            "4 packets transmitted, 3 received, 25% packet loss, time 3004 ms\n\
             rtt min/avg/max/sdev = 9.250/10.000/12.500/1.125 ms",
            format!("{summary}")
        );
    }
}
