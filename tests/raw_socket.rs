use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use more_asserts as ma;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use rtt_probe::{Outcome, Pinger, PingerConfig, StatsReporter, StopHandle};

static SETUP: Once = Once::new();

fn setup() {
    SETUP.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    });
}

/// Stops the pinger once `replies` echo replies have been reported.
fn stop_after_replies(replies: usize) -> (Arc<Mutex<Option<StopHandle>>>, impl FnMut(&Outcome) + Send) {
    let stop_slot: Arc<Mutex<Option<StopHandle>>> = Arc::new(Mutex::new(None));
    let slot = stop_slot.clone();
    let mut seen = 0;
    let reporter = move |outcome: &Outcome| {
        if matches!(outcome, Outcome::Reply(_)) {
            seen += 1;
            if seen == replies {
                if let Some(stop_handle) = &*slot.lock().unwrap() {
                    stop_handle.stop();
                }
            }
        }
    };
    (stop_slot, reporter)
}

/*
* Note: Raw sockets work only with root privileges.
*/
#[test]
#[ignore = "raw sockets need root privileges"]
fn ping_localhost_with_raw_socket_gets_replies() {
    setup();
    let config = PingerConfig { interval: Duration::from_millis(100), debug: true, ..PingerConfig::default() };
    let (stop_slot, on_reply) = stop_after_replies(3);
    let reporter = StatsReporter::forwarding_to(on_reply);
    let statistics = reporter.statistics();
    let pinger = Pinger::new(&config, reporter).unwrap();
    *stop_slot.lock().unwrap() = Some(pinger.stop_handle());

    pinger.ping("127.0.0.1").unwrap();

    let summary = statistics.summarize();
    assert_eq!(3, summary.sent);
    assert_eq!(3, summary.received);
    assert_eq!(0.0, summary.loss_percent());
    ma::assert_gt!(summary.max_rtt, Duration::ZERO);
    ma::assert_le!(summary.min_rtt, summary.avg_rtt);
    ma::assert_le!(summary.avg_rtt, summary.max_rtt);
}

#[test]
#[ignore = "raw sockets need root privileges"]
fn ping_resolves_host_name() {
    setup();
    let config = PingerConfig { interval: Duration::from_millis(100), ..PingerConfig::default() };
    let (stop_slot, on_reply) = stop_after_replies(1);
    let reporter = StatsReporter::forwarding_to(on_reply);
    let statistics = reporter.statistics();
    let pinger = Pinger::new(&config, reporter).unwrap();
    *stop_slot.lock().unwrap() = Some(pinger.stop_handle());

    pinger.ping("localhost").unwrap();

    assert_eq!(1, statistics.summarize().received);
}
