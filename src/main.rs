use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use fieldcam::config::{CameraKind, FieldcamConfig, LoggingConfig};
use fieldcam::FieldcamApp;

#[derive(Parser, Debug)]
#[command(name = "fieldcam")]
#[command(about = "Unattended field camera recorder with PTZ aiming and removable-media storage")]
#[command(version)]
#[command(long_about = "An unattended recording system for remote wildlife camera \
installations. Records continuously in fixed-length segments to removable media with \
automatic fallback storage, drives a pan-tilt-zoom mount from panel buttons or a \
keyboard, and logs solar charge telemetry for off-grid deployments.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "fieldcam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - assemble the system against the mock camera and exit
    #[arg(long, help = "Perform dry run - verify configuration and wiring without hardware")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config();
        return Ok(());
    }

    // The log directory lives in the config file, so the file is read
    // before the subscriber goes up; load failures report on stderr.
    let mut config = match FieldcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", args.config, e);
            return Err(e.into());
        }
    };

    let log_guard = init_logging(&args, &config.logging)?;

    info!("Starting fieldcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    match config.validate() {
        Ok(()) => {
            if args.validate_config {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            if args.validate_config {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
            return Err(e.into());
        }
    }

    if args.dry_run {
        config.camera.kind = CameraKind::Mock;
    }

    let mut app = FieldcamApp::new(config).await.map_err(|e| {
        error!("Failed to build application: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - services assembled but not started");
        app.shutdown().await?;
        println!("✓ Dry run completed successfully");
        return Ok(());
    }

    app.start();

    // Run the main application loop with signal handling
    let exit_code = app.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Fieldcam exited with code: {}", exit_code);

    // Flush the file appender before the hard exit
    drop(log_guard);
    std::process::exit(exit_code);
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
    };

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fieldcam={}", log_level)));

    // Configure format based on options
    let console_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![console_layer];

    // Daily-rolling file log when the config names a directory
    let guard = if logging.directory.is_empty() {
        None
    } else {
        std::fs::create_dir_all(&logging.directory)?;
        let appender = tracing_appender::rolling::daily(&logging.directory, "fieldcam.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
        Some(guard)
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Fieldcam Configuration File");
    println!("# Defaults shown; any key left out of a config file falls back to these");
    println!();

    match toml::to_string_pretty(&FieldcamConfig::default()) {
        Ok(rendered) => println!("{}", rendered),
        Err(e) => eprintln!("Could not render default configuration: {}", e),
    }
}
