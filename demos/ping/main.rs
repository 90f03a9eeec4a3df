use rtt_probe::{Pinger, PingerConfig, StatsReporter};
use std::time::Duration;

type GenericError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(argh::FromArgs)]
/// ping - send ICMP ECHO_REQUEST to a host and report round trip times
struct Args {
    #[argh(option, default = "1000")]
    /// a probe without reply after <max-rtt> milliseconds counts as lost
    max_rtt: u64,

    #[argh(option, short = 'i', default = "1000")]
    /// wait <interval> milliseconds between probes
    interval: u64,

    #[argh(switch, short = 'd')]
    /// log every packet sent and received
    debug: bool,

    #[argh(option, default = "String::from(\"0.0.0.0\")")]
    /// IPv4 address to listen on
    listen_address: String,

    #[argh(option, default = "64")]
    /// IP time to live of the probes
    ttl: u8,

    #[argh(option, short = 'c', default = "4")]
    /// stop after <count> probes
    count: u32,

    #[argh(positional)]
    /// host name or IPv4 address
    host: String,
}

// Raw sockets need root privileges (or CAP_NET_RAW).
fn main() -> Result<(), GenericError> {
    let args: Args = argh::from_env();

    let level = if args.debug { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = PingerConfig {
        interval: Duration::from_millis(args.interval),
        max_rtt: Duration::from_millis(args.max_rtt),
        debug: args.debug,
        listen_address: args.listen_address,
        ttl: args.ttl,
    };
    let reporter = StatsReporter::new();
    let statistics = reporter.statistics();
    let pinger = Pinger::new(&config, reporter)?;

    // Stop halfway between the last probe and the one after it.
    let run_time = config.interval * args.count.saturating_sub(1) + config.interval / 2;
    let stop_handle = pinger.stop_handle();
    std::thread::spawn(move || {
        std::thread::sleep(run_time);
        stop_handle.stop();
    });

    pinger.ping(&args.host)?;

    println!("--- {} ping statistics ---", args.host);
    println!("{}", statistics.summarize());
    Ok(())
}
