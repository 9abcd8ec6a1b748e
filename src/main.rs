//! Binary entrypoint for the pinwatch CLI.
//!
//! Commands:
//! - `run` (default) - interactive menu: settings, pins, data view
//! - `init` - write a starter `config.toml`
//! - `status` - print the saved board settings
//! - `ports` - list serial ports visible to the OS
//! - `read [--timeout <s>]` - one headless refresh cycle, printed to stdout
//!
//! See the library crate docs for module-level details: `pinwatch::`.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};

use pinwatch::config::Config;
use pinwatch::device::{self, PlaceholderTransaction};
use pinwatch::display::SENTINEL_TEXT;
use pinwatch::logutil;
use pinwatch::metrics;
use pinwatch::poll::scheduler::PollScheduler;
use pinwatch::poll::ResultsBuffer;
use pinwatch::settings::saver::DebouncedSaver;
use pinwatch::settings::SettingsStore;
use pinwatch::shell::Shell;

#[derive(Parser)]
#[command(name = "pinwatch")]
#[command(about = "Poll named microcontroller pins over a serial link")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu (default)
    Run,
    /// Write a default configuration file
    Init,
    /// Print the saved board settings
    Status,
    /// List available serial ports
    Ports,
    /// Read every configured pin once and print the results
    Read {
        /// Seconds to wait for all reads
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let config = match command {
        Commands::Init => None,
        _ => match Config::load(&cli.config).await {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                // Missing config is normal; defaults cover every value.
                eprintln!("{} (using defaults)", e);
                None
            }
        },
    };
    init_logging(&config, cli.verbose);
    let config = config.unwrap_or_default();

    match command {
        Commands::Run => run_interactive(config).await?,
        Commands::Init => {
            info!("Writing default configuration");
            Config::create_default(&cli.config).await?;
            println!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let store = SettingsStore::new(&config.settings.file);
            match store.load() {
                Ok(()) => store.print(),
                Err(e) => {
                    println!("No settings available: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Ports => {
            let ports = device::list_ports();
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for (i, port) in ports.iter().enumerate() {
                println!("{} :: {}", i + 1, port);
            }
        }
        Commands::Read { timeout } => read_once(config, timeout).await?,
    }

    Ok(())
}

async fn run_interactive(config: Config) -> Result<()> {
    info!("Starting pinwatch v{}", env!("CARGO_PKG_VERSION"));
    let store = SettingsStore::new(&config.settings.file);
    let saver = DebouncedSaver::new(
        &store,
        Duration::from_millis(config.settings.save_debounce_ms),
    )
    .start();

    let runtime = tokio::runtime::Handle::current();
    let shell_store = store.clone();
    let result = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let mut shell = Shell::new(stdin.lock(), std::io::stdout(), shell_store, config, runtime);
        shell.run()
    })
    .await?;

    match saver.shutdown().await {
        Some(stats) => debug!("settings saver stopped: {:?}", stats),
        None => {
            // Saver already gone; write directly so nothing is lost.
            if store.is_dirty() {
                if let Err(e) = store.save() {
                    warn!("Failed to save settings on exit: {}", e);
                }
            }
        }
    }
    debug!("session totals: {}", metrics::snapshot());
    println!("Bye!");
    result
}

async fn read_once(config: Config, timeout: u64) -> Result<()> {
    let store = SettingsStore::new(&config.settings.file);
    if let Err(e) = store.load() {
        println!("No settings available: {} (run `pinwatch` to set up)", e);
        std::process::exit(1);
    }
    let buffer = ResultsBuffer::new();
    let scheduler = PollScheduler::new(
        tokio::runtime::Handle::current(),
        Arc::new(PlaceholderTransaction::new(config.poll.placeholder_value.clone())),
        buffer.clone(),
        &config.poll,
    );
    let refresh = scheduler.refresh(&store);
    info!("Reading {} pin(s)", refresh.dispatched);
    if tokio::time::timeout(Duration::from_secs(timeout), refresh.join())
        .await
        .is_err()
    {
        warn!("Not every pin answered within {}s", timeout);
        scheduler.cancel();
    }

    let results = buffer.snapshot();
    if results.is_empty() {
        println!("Timeout error. Check connections");
    }
    for (name, _) in store.pins_snapshot() {
        let text = match results.iter().find(|r| r.pin_name == name) {
            Some(r) if r.is_no_data() => SENTINEL_TEXT.to_string(),
            Some(r) => r.value.clone(),
            None => "-".to_string(),
        };
        println!("{}: {}", name, text);
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .map(|c| c.logging.level_filter())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let log_file = config.as_ref().and_then(|c| c.logging.file.clone());
    if let Some(file) = log_file {
        if let Ok(f) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
        {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Mirror to the console only when attached to a terminal
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty && !logutil::defer_console_line(&line) {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
            let _ = builder.try_init();
            return;
        }
    }
    builder.format(|fmt, record| {
        let line = format!(
            "{} [{}] {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
            record.level(),
            record.args()
        );
        if logutil::defer_console_line(&line) {
            return Ok(());
        }
        writeln!(fmt, "{}", line)
    });
    let _ = builder.try_init();
}
