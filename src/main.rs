//! CLI entry point for printer-overlay
//!
//! Provides a command-line interface for:
//! - Rendering one overlay frame to HTML from a status document
//! - Resolving overlay query parameters
//! - Running a live overlay against a simulated printer
//!
//! # Usage
//!
//! ```bash
//! printer-overlay render --printer-id 3 --query "size=large&show=progress,eta" --status status.json
//! printer-overlay resolve --query "fps=60&camera=false"
//! printer-overlay demo --printer-id 3 --seconds 30
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use printer_overlay::collaborators::mock::{ChannelPushTransport, SimulatedPrinter};
use printer_overlay::collaborators::{Collaborators, PushTransport, WebSocketPushTransport};
use printer_overlay::logging;
use printer_overlay::settings::Settings;
use printer_overlay::status::{read_status_file, PrinterId, PrinterStatus};
use printer_overlay::view::config::resolve_query;
use printer_overlay::view::keepalive::{StreamEndpoint, StreamKeepalive};
use printer_overlay::view::render::{compose, FrameContext, OverlayFrame};
use printer_overlay::OverlayView;

#[derive(Parser)]
#[command(name = "printer-overlay")]
#[command(about = "Live 3D printer status overlay for stream compositing", long_about = None)]
struct Cli {
    /// Settings file (defaults to config/overlay.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one frame as HTML to stdout
    Render {
        #[arg(long, allow_negative_numbers = true)]
        printer_id: PrinterId,

        /// Overlay query string, e.g. "size=small&show=progress"
        #[arg(long, default_value = "")]
        query: String,

        /// Status JSON file, or "-" for stdin. Without it the loading frame is rendered.
        #[arg(long)]
        status: Option<String>,

        /// Printer name for the name line
        #[arg(long)]
        name: Option<String>,
    },

    /// Print the resolved overlay configuration as JSON
    Resolve {
        #[arg(long, default_value = "")]
        query: String,
    },

    /// Mount a live overlay against a simulated printer
    Demo {
        #[arg(long, default_value = "1", allow_negative_numbers = true)]
        printer_id: PrinterId,

        #[arg(long, default_value = "")]
        query: String,

        /// Stop after this many seconds (runs until Ctrl+C when omitted)
        #[arg(long)]
        seconds: Option<u64>,

        /// WebSocket push endpoint; an idle in-process channel is used when omitted
        #[arg(long)]
        push_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let (settings, settings_error) = match loaded {
        Ok(settings) => (settings, None),
        Err(err) => (Settings::default(), Some(err)),
    };
    logging::init_from_settings(&settings).map_err(anyhow::Error::msg)?;
    if let Some(err) = settings_error {
        warn!("falling back to default settings: {err}");
    }

    match cli.command {
        Commands::Render {
            printer_id,
            query,
            status,
            name,
        } => render_once(&settings, printer_id, &query, status.as_deref(), name),
        Commands::Resolve { query } => {
            let config = resolve_query(&query);
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Demo {
            printer_id,
            query,
            seconds,
            push_url,
        } => run_demo(&settings, printer_id, &query, seconds, push_url).await,
    }
}

fn render_once(
    settings: &Settings,
    printer_id: PrinterId,
    query: &str,
    status_path: Option<&str>,
    name: Option<String>,
) -> Result<()> {
    let config = resolve_query(query);

    let frame = if printer_id <= 0 {
        OverlayFrame::InvalidPrinter
    } else {
        let status = status_path.map(read_status).transpose()?;
        let camera_url = config.show_camera.then(|| {
            StreamKeepalive::new(
                StreamEndpoint::from_settings(&settings.endpoints),
                printer_id,
                config.frame_rate,
            )
            .current_url()
        });
        let context = FrameContext {
            printer_name: name,
            camera_url,
            branding: settings.branding.clone(),
        };
        compose(&config, status.as_ref(), &context, &Local::now())
    };

    print!("{}", frame.to_html());
    Ok(())
}

fn read_status(path: &str) -> Result<PrinterStatus> {
    if path != "-" {
        return read_status_file(Path::new(path)).with_context(|| format!("failed to load {path}"));
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read status from stdin")?;
    serde_json::from_str(&buf).context("status is not a valid printer status document")
}

async fn run_demo(
    settings: &Settings,
    printer_id: PrinterId,
    query: &str,
    seconds: Option<u64>,
    push_url: Option<String>,
) -> Result<()> {
    let printer = Arc::new(
        SimulatedPrinter::printing(printer_id, "Simulated printer", "benchy.gcode.3mf")
            .with_step(1.5),
    );
    let push: Arc<dyn PushTransport> = match push_url {
        Some(url) => Arc::new(WebSocketPushTransport::new(&url)?),
        None => Arc::new(ChannelPushTransport::new()),
    };
    let collaborators = Collaborators::new(printer.clone(), printer, push);

    let mut view = OverlayView::mount(printer_id, resolve_query(query), settings, collaborators);
    info!(
        printer_id,
        query = %view.config().to_query(),
        "{}",
        view.frame(&Local::now()).summary()
    );

    let mut changes = view.changes();
    let deadline = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            res = changes.changed() => {
                if res.is_err() {
                    break;
                }
                info!(printer_id, "{}", view.frame(&Local::now()).summary());
            }
        }
    }

    view.teardown().await;
    Ok(())
}
