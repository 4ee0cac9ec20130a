use ping_hop::{PingEvent, Pinger, PingerConfig, SocketType, Ttl};
use std::time::Duration;

type GenericError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(argh::FromArgs)]
/// ping - send ICMP ECHO_REQUEST to a host, raising the TTL whenever a router drops the probe
struct Args {
    #[argh(option, short = 'i', default = "1000")]
    /// milliseconds between echo requests
    interval: u64,

    #[argh(switch, short = 'p')]
    /// use an unprivileged datagram socket instead of a raw one
    unprivileged: bool,

    #[argh(option, short = 'T', default = "60")]
    /// TTL of the first echo request
    ttl: u8,

    #[argh(positional)]
    /// host name or IP address
    host: String,
}

fn main() -> Result<(), GenericError> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_max_level(tracing::Level::WARN).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Args = argh::from_env();
    let config = PingerConfig {
        interval: Duration::from_millis(args.interval),
        socket_type: if args.unprivileged { SocketType::DGRAM } else { SocketType::RAW },
        ttl: Ttl(args.ttl),
        ..PingerConfig::default()
    };

    let mut pinger = match Pinger::create(&args.host, config) {
        Ok(pinger) => pinger,
        Err(e) => {
            eprintln!("cannot ping {}: {}", args.host, e);
            std::process::exit(2);
        }
    };
    println!("PING {} ({}):", pinger.target().host, pinger.target().ip_addr);

    let stop_handle = pinger.stop_handle();
    ctrlc::set_handler(move || stop_handle.stop())?;

    let events = pinger.subscribe();
    let printer = std::thread::spawn(move || {
        for event in events {
            match event {
                PingEvent::Reply(output) => println!("{output}"),
                PingEvent::HopExpired { ttl, hop } => println!("time to live exceeded at ttl={ttl} from {hop}"),
                PingEvent::TtlNotRaised { ttl, error } => println!("ERROR ttl stays at {ttl}: {error}"),
                PingEvent::SendFailed(e) | PingEvent::Discarded(e) | PingEvent::ReadFault(e) => {
                    println!("ERROR {e}");
                }
            }
        }
    });

    let result = pinger.run();
    // The event stream closes once the pinger is gone.
    if printer.join().is_err() {
        eprintln!("printer thread panicked");
    }

    match result {
        Ok(summary) => {
            println!("\n{summary}");
            Ok(())
        }
        Err(e) if e.is_construction_error() => {
            eprintln!("cannot ping {}: {}", args.host, e);
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}
