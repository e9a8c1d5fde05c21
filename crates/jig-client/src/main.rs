//! Test-jig client.
//!
//! Runs on the board under test, talks to the jig's control board over a UART
//! and reports one check per configured item:
//!
//!   jig-client --config client.toml
//!   jig-client --device /dev/ttyUSB0 --self-test

use anyhow::Context as _;
use clap::Parser;
use jig_client::config::{self, ClientConfig};
use jig_client::hardware::{LinuxBoard, ShellChecks, Throughput};
use jig_client::inbound::{self, Exit};
use jig_client::state::ClientState;
use jig_client::transport::{self, Outbox};
use jig_client::ui::TracingUi;
use jig_client::{Context, dispatcher, orchestrator};
use jig_core::Frame;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const UNKNOWN_IP: &str = "???.???.???.???";

#[derive(Debug, Parser)]
#[command(name = "jig-client", version, about = "Board-under-test client for the test jig")]
struct Args {
    /// Configuration file.
    #[arg(long, env = "JIG_CONFIG", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial device, overriding the config and board model.
    #[arg(long, env = "JIG_DEVICE")]
    device: Option<String>,

    #[arg(long, env = "JIG_BAUD")]
    baud: Option<u32>,

    /// Confirm check-requests locally and start without waiting for `O`.
    #[arg(long)]
    self_test: bool,

    /// Run countdown in seconds.
    #[arg(long)]
    run_seconds: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jig_client=info".parse()?))
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::load(&args.config)?;
    config.validate()?;
    if args.self_test {
        config.run.self_test = true;
    }
    if let Some(seconds) = args.run_seconds {
        config.run.seconds = seconds;
    }

    let model = config::detect_model();
    let (default_device, default_baud) = config.serial_for(model.as_deref());
    let device = args.device.unwrap_or(default_device);
    let baud = args.baud.unwrap_or(default_baud);
    tracing::info!(
        "model = {}, uart = {}, baud = {}",
        model.as_deref().unwrap_or("unknown"),
        device,
        baud
    );

    let port = transport::open_serial(&device, baud)
        .with_context(|| format!("cannot open serial device {}", device))?;
    let (reader, writer) = tokio::io::split(port);

    let (outbox, outgoing) = Outbox::channel(64);
    let writer_task = tokio::spawn(transport::write_frames(outgoing, writer));

    let throughput = Throughput::default();
    let checks = ShellChecks::new(
        config.shell_checks(),
        config.check_timeout(),
        throughput.clone(),
    );
    let board = LinuxBoard::new(config.network.interface.clone(), throughput);
    let settings = config.settings();
    let state = ClientState::new(config.registry(), config.run.seconds);
    let ctx = Context::new(
        state,
        outbox,
        Arc::new(TracingUi),
        Arc::new(checks),
        Arc::new(board),
        settings,
    );

    ctx.outbox.send(Frame::boot()).await;

    let ip = ctx.board.board_ip();
    tracing::info!("ip address = {}", ip.as_deref().unwrap_or(UNKNOWN_IP));
    ctx.ui
        .set_text(ctx.settings.layout.ip, ip.as_deref().unwrap_or(UNKNOWN_IP));
    ctx.ui.refresh();

    if ctx.settings.self_test {
        tracing::info!("self-test mode");
        ctx.state.write().await.start();
    }

    let dispatcher_task = tokio::spawn(dispatcher::run(ctx.clone()));
    let orchestrator_task = tokio::spawn(orchestrator::run(ctx.clone()));

    let exit = inbound::run(&ctx, transport::frames(reader)).await;

    dispatcher_task.abort();
    orchestrator_task.abort();
    writer_task.abort();

    match exit? {
        Exit::Reboot => Ok(()),
        Exit::LinkClosed => anyhow::bail!("serial link to {} closed", device),
    }
}
