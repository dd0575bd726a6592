use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gridview_core::config::Config;
use gridview_core::model::GridSnapshot;
use gridview_core::pane::Pane;
use gridview_core::remote::DaemonClient;
use gridview_core::sync::{CellMetrics, ContainerSize};
use gridview_core::telemetry::logging::{self, LogConfig, LogLevel};
use gridview_core::view::ViewSink;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gridview", about = "Headless viewer for a remote terminal session")]
struct Cli {
    /// Daemon address; overrides GRIDVIEW_DAEMON_ADDR
    #[arg(long)]
    daemon: Option<String>,

    #[arg(long, short = 's')]
    session: String,

    /// Container width in pixels
    #[arg(long, default_value_t = 640.0)]
    width: f64,

    /// Container height in pixels
    #[arg(long, default_value_t = 384.0)]
    height: f64,

    #[arg(long, default_value_t = 8.0)]
    cell_width: f64,

    #[arg(long, default_value_t = 16.0)]
    cell_height: f64,

    /// Text written to the session once it is mounted
    #[arg(long)]
    input: Option<String>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    #[arg(long, help = "Write logs to a file instead of stderr")]
    log_file: Option<PathBuf>,
}

/// Prints every rendered grid to stdout.
struct StdoutSink;

impl ViewSink for StdoutSink {
    fn snapshot_ready(&self, snapshot: &GridSnapshot) {
        let mut out = std::io::stdout().lock();
        let rule = "-".repeat(usize::from(snapshot.dimensions.cols.max(1)));
        let _ = writeln!(out, "{rule}");
        for line in snapshot.text_lines() {
            let _ = writeln!(out, "{line}");
        }
        let _ = out.flush();
    }

    fn title_changed(&self, title: &str) {
        info!(target = "gridview::cli", title, "title changed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&LogConfig {
        level: cli.log_level,
        file: cli.log_file.clone(),
    })
    .context("initializing logging")?;

    let mut config = Config::from_env();
    if let Some(addr) = cli.daemon {
        config.daemon_addr = addr;
    }
    info!(
        target = "gridview::cli",
        daemon = %config.daemon_addr,
        session = %cli.session,
        "mounting pane"
    );

    let client = Arc::new(DaemonClient::new(
        config.daemon_addr.clone(),
        config.tuning.request_timeout,
    ));
    let mut pane = Pane::mount(
        cli.session.clone(),
        client.clone(),
        Some(client),
        Arc::new(StdoutSink),
        config.tuning,
    );
    pane.handle().fit(
        ContainerSize::new(cli.width, cli.height),
        CellMetrics::new(cli.cell_width, cli.cell_height),
    );
    if let Some(input) = cli.input {
        pane.handle().send_input(input.into_bytes());
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
        }
        Some(exit) = pane.session_ended() => {
            info!(target = "gridview::cli", ?exit, "output stream stopped");
        }
    }

    pane.destroy().await;
    Ok(())
}
