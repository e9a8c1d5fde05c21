//! Board-under-test side of the test-jig protocol.
//!
//! Three tasks share one [`ClientState`]:
//! - [`inbound::run`] reads frames from the link and applies commands,
//! - [`dispatcher::run`] walks the item registry and reports each check,
//! - [`orchestrator::run`] ticks the lifecycle and sends the final report.

pub mod config;
pub mod dispatcher;
pub mod hardware;
pub mod inbound;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod transport;
pub mod ui;
pub mod update;

use hardware::{BoardInfo, DeviceCheck};
use state::{ClientState, SharedState};
use std::sync::Arc;
use std::time::Duration;
use transport::Outbox;
use ui::{Ui, UiLayout};

/// Delays and bounds for the three loops.
#[derive(Debug, Clone)]
pub struct Timing {
    /// UI tick; the countdown moves every second tick.
    pub ui_tick: Duration,
    /// Dispatcher poll while waiting for the start command.
    pub ready_poll: Duration,
    /// Pause after each transmitted status report.
    pub post_transmit: Duration,
    /// Pause between registry passes.
    pub pass_delay: Duration,
    /// One acknowledgement poll.
    pub ack_tick: Duration,
    /// Polls before an unacknowledged request is given up.
    pub ack_ticks: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            ui_tick: Duration::from_millis(500),
            ready_poll: Duration::from_millis(500),
            post_transmit: Duration::from_millis(100),
            pass_delay: Duration::from_millis(500),
            ack_tick: Duration::from_millis(100),
            ack_ticks: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// No peer attached: check-requests are confirmed locally.
    pub self_test: bool,
    pub timing: Timing,
    pub layout: UiLayout,
}

/// Handles every task gets.
#[derive(Clone)]
pub struct Context {
    pub state: SharedState,
    pub outbox: Outbox,
    pub ui: Arc<dyn Ui>,
    pub checks: Arc<dyn DeviceCheck>,
    pub board: Arc<dyn BoardInfo>,
    pub settings: Arc<Settings>,
}

impl Context {
    pub fn new(
        state: ClientState,
        outbox: Outbox,
        ui: Arc<dyn Ui>,
        checks: Arc<dyn DeviceCheck>,
        board: Arc<dyn BoardInfo>,
        settings: Settings,
    ) -> Self {
        Self {
            state: state.shared(),
            outbox,
            ui,
            checks,
            board,
            settings: Arc::new(settings),
        }
    }
}
