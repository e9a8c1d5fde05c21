//! Run state shared by the inbound loop, the check dispatcher and the UI tick.

use jig_core::{Phase, Registry};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Seconds added to the countdown when an item is re-checked mid-run.
pub const RECHECK_GRACE_SECONDS: u32 = 5;

pub type SharedState = Arc<RwLock<ClientState>>;

/// A check-request waiting for the peer to confirm it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub group_id: i32,
    pub device_id: i32,
    pub acknowledged: bool,
    pub ticks_remaining: u32,
}

impl PendingRequest {
    pub fn new(group_id: i32, device_id: i32, ticks: u32) -> Self {
        Self {
            group_id,
            device_id,
            acknowledged: false,
            ticks_remaining: ticks,
        }
    }

    pub fn matches(&self, group_id: i32, device_id: i32) -> bool {
        self.group_id == group_id && self.device_id == device_id
    }
}

/// What the UI tick should show after advancing the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickAction {
    ShowWait,
    ShowRunning(u32),
    PrintReport,
    Idle,
}

/// Result of a re-check request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recheck {
    /// The item was reset and the countdown extended.
    Rearmed,
    /// No run is active; the caller checks once instead.
    NotRunning,
    UnknownItem,
}

/// Everything the three activities coordinate through.
#[derive(Debug)]
pub struct ClientState {
    pub items: Registry,
    /// Checks may run. Cleared again when the dispatcher finishes.
    pub ready: bool,
    /// A start was commanded. Never cleared, so the lifecycle sees a run
    /// even when it finished between two ticks.
    pub started: bool,
    pub remaining_seconds: u32,
    pub phase: Phase,
    pub pending: Option<PendingRequest>,
    pub stop_requested: bool,
    /// Failure summary lines from the last report.
    pub error_lines: Vec<String>,
}

impl ClientState {
    pub fn new(items: Registry, run_seconds: u32) -> Self {
        Self {
            items,
            ready: false,
            started: false,
            remaining_seconds: run_seconds,
            phase: Phase::Wait,
            pending: None,
            stop_requested: false,
            error_lines: Vec::new(),
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    pub fn start(&mut self) {
        self.ready = true;
        self.started = true;
    }

    /// Force-stop. An active countdown drops to 1, not 0, so the UI gets one
    /// more tick before the report.
    pub fn force_stop(&mut self) {
        if self.remaining_seconds > 0 {
            self.remaining_seconds = 1;
        }
        self.stop_requested = true;
    }

    /// The dispatcher should leave its pass.
    pub fn should_stop(&self) -> bool {
        self.remaining_seconds == 0 || self.stop_requested
    }

    /// Single "run finished" signal from the dispatcher.
    pub fn finish_run(&mut self) {
        self.remaining_seconds = 0;
        self.ready = false;
        self.pending = None;
    }

    pub fn recheck(&mut self, group_id: i32, device_id: i32) -> Recheck {
        if !self.ready {
            return Recheck::NotRunning;
        }
        match self.items.find_index(group_id, device_id) {
            Some(index) => {
                self.items.reset(index);
                self.remaining_seconds += RECHECK_GRACE_SECONDS;
                Recheck::Rearmed
            }
            None => Recheck::UnknownItem,
        }
    }

    /// Mark the outstanding request acknowledged. Stale or mismatched
    /// acknowledgements return false and change nothing.
    pub fn acknowledge(&mut self, group_id: i32, device_id: i32) -> bool {
        match self.pending.as_mut() {
            Some(pending) if pending.matches(group_id, device_id) => {
                pending.acknowledged = true;
                true
            }
            _ => false,
        }
    }

    /// Advance the lifecycle by one visible tick.
    pub fn tick(&mut self) -> TickAction {
        let current = self.phase;
        self.phase = current.next(self.started, self.remaining_seconds);
        match current {
            Phase::Wait => TickAction::ShowWait,
            Phase::Run if self.phase == Phase::Run => {
                let shown = self.remaining_seconds;
                self.remaining_seconds -= 1;
                TickAction::ShowRunning(shown)
            }
            Phase::Print => TickAction::PrintReport,
            Phase::Run | Phase::Stop => TickAction::Idle,
        }
    }
}
