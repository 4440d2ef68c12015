use clap::{ArgAction, Parser, Subcommand};
use rssi_positioning::api::{EstimateFormatter, JsonFormatter, TextFormatter};
use rssi_positioning::hardware::MockSignalSource;
use rssi_positioning::{
    send_range_report, CycleScheduler, IwconfigSignalSource, PositionEstimate, RangeEstimate,
    SignalSource, SystemConfig, TcpReportChannel,
};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn, Level};

/// How often the console renderer polls for a new estimate
const RENDER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// RSSI-based indoor positioning
#[derive(Parser, Debug)]
#[command(name = "rssi-positioning")]
#[command(version, about = "Locate a Wi-Fi device from anchor RSSI ranges")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the locator: collect anchor ranges and publish estimates
    Serve {
        /// JSON configuration file (reference deployment if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use a fixed local RSSI (dBm) instead of querying the radio
        #[arg(long, allow_hyphen_values = true)]
        simulate_rssi: Option<i32>,

        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,

        /// Print estimates as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Run on a remote anchor: measure once and send the range to the locator
    Report {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Locator address (defaults to the local anchor on the rendezvous port)
        #[arg(long)]
        collector: Option<SocketAddr>,

        /// Source address identifying this anchor to the locator
        #[arg(long)]
        bind_ip: Option<IpAddr>,

        /// Wireless interface to read the RSSI from
        #[arg(long)]
        interface: Option<String>,

        /// Use this RSSI (dBm) instead of querying the radio
        #[arg(long, allow_hyphen_values = true)]
        rssi: Option<i32>,
    },

    /// Print the effective configuration as JSON
    PrintConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Serve {
            config,
            simulate_rssi,
            cycles,
            json,
        } => serve(&load_config(config.as_deref())?, simulate_rssi, cycles, json),
        Commands::Report {
            config,
            collector,
            bind_ip,
            interface,
            rssi,
        } => report(&load_config(config.as_deref())?, collector, bind_ip, interface, rssi),
        Commands::PrintConfig { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<SystemConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => SystemConfig::from_file(path)?,
        None => SystemConfig::default(),
    };
    for warning in config.validate().into_result()? {
        warn!("{}", warning);
    }
    Ok(config)
}

fn signal_source(interface: &str, fixed_rssi: Option<i32>) -> Box<dyn SignalSource + Send> {
    match fixed_rssi {
        Some(rssi) => Box::new(MockSignalSource::steady(rssi)),
        None => Box::new(IwconfigSignalSource::with_interface(interface)),
    }
}

fn serve(
    config: &SystemConfig,
    simulate_rssi: Option<i32>,
    cycles: Option<u64>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let channel = TcpReportChannel::bind(
        config.rendezvous_address,
        config.listen_backlog,
        config.read_timeout(),
    )?;
    info!(address = %channel.local_addr(), "rendezvous endpoint listening");

    let signal = signal_source(&config.signal_interface, simulate_rssi);
    let mut scheduler = CycleScheduler::from_config(config, Box::new(channel), signal)?;
    let handle = scheduler.handle();
    for anchor in handle.anchors() {
        info!(anchor = %anchor.id, x = anchor.position.x, y = anchor.position.y, "anchor");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let worker = {
        let stop = stop.clone();
        thread::spawn(move || scheduler.run(cycles, &stop))
    };

    let mut shown: Option<Arc<PositionEstimate>> = None;
    loop {
        let finished = worker.is_finished();
        if let Some(estimate) = handle.latest_estimate() {
            if !shown.as_ref().map_or(false, |s| Arc::ptr_eq(s, &estimate)) {
                print_estimate(&estimate, json)?;
                shown = Some(estimate);
            }
        }
        if finished {
            break;
        }
        thread::sleep(RENDER_POLL_INTERVAL);
    }

    let state = worker
        .join()
        .map_err(|_| "scheduler thread panicked")?;
    info!(
        cycles = state.cycles_run,
        published = state.estimates_published,
        failed = state.cycles_failed,
        rejected_reports = state.rejected_reports,
        "scheduler stopped"
    );
    Ok(())
}

fn print_estimate(estimate: &PositionEstimate, json: bool) -> Result<(), serde_json::Error> {
    let formatted = EstimateFormatter::new().format(estimate);
    if json {
        println!("{}", JsonFormatter::new().format_json(&formatted)?);
    } else {
        println!("{}", TextFormatter::new().format_text(&formatted));
    }
    Ok(())
}

fn report(
    config: &SystemConfig,
    collector: Option<SocketAddr>,
    bind_ip: Option<IpAddr>,
    interface: Option<String>,
    rssi: Option<i32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let collector = collector
        .or_else(|| config.collector_address())
        .ok_or("no collector address: pass --collector or configure the local anchor")?;

    let interface = interface.unwrap_or_else(|| config.signal_interface.clone());
    let mut signal = signal_source(&interface, rssi);
    let rssi = signal.read_rssi()?;
    let meters = config.range_model().distance(rssi);
    let range = RangeEstimate::new(meters)
        .ok_or_else(|| format!("RSSI {} dBm gives unusable range {}", rssi, meters))?;

    send_range_report(collector, range, bind_ip, config.read_timeout())?;
    info!(%collector, rssi, meters = range.meters(), "range reported");
    Ok(())
}
