use clap::Parser;
use log::{error, info, warn};
use speechd_serial::config_loader::Settings;
use speechd_serial::dispatcher::LoopControl;
use speechd_serial::error::BridgeError;
use speechd_serial::{service, transport};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

/// Speaks and plays sounds when a board on the serial line asks for it
#[derive(Parser)]
#[command(name = "speechd-serial")]
#[command(author = "StarTuz")]
#[command(version)]
#[command(about = "Turns serial tokens from a microcontroller into speech and sound", long_about = None)]
struct Cli {
    /// Extra config file, layered over the defaults and SerialSpeech files
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port to open (overrides serial_port)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides baud_rate)
    #[arg(short, long)]
    baud: Option<u32>,

    /// List the serial ports found on this machine and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_ports {
        let ports = transport::list_ports()?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        settings.serial_port = port;
    }
    if let Some(baud) = cli.baud {
        settings.baud_rate = baud;
    }
    settings.validate()?;

    let control = Arc::new(LoopControl::new());
    let worker_control = control.clone();
    // rodio's output stream is not Send, so everything lives on this thread
    let mut worker = tokio::task::spawn_blocking(move || service::run(&settings, &worker_control));

    tokio::select! {
        joined = &mut worker => {
            finish(joined);
            return Ok(());
        }
        _ = signal::ctrl_c() => {
            if !control.request_shutdown() {
                // No graceful stop mid-handler; the OS closes the port on exit
                warn!("Interrupt during a handler, aborting");
                std::process::exit(130);
            }
            info!("Interrupt received, shutting down...");
        }
    }

    // Still starting up (audio device, settle delay) or about to notice the flag
    tokio::select! {
        joined = &mut worker => finish(joined),
        _ = signal::ctrl_c() => {
            warn!("Second interrupt, aborting");
            std::process::exit(130);
        }
    }
    Ok(())
}

/// Fatal loop errors are logged once here and end the process with status 1.
fn finish(joined: Result<Result<(), BridgeError>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("{}", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Event loop thread failed: {}", e);
            std::process::exit(1);
        }
    }
}
