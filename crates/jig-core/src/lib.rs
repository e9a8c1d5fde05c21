//! Core types for the test-jig serial protocol.
//!
//! This crate owns the wire format and the item model. The client crate
//! drives them; nothing here touches I/O.

mod frame;
mod item;
mod message;
pub mod policy;

pub use frame::{
    Command, DEVICE_RESP_SIZE, DeviceResponse, Frame, FrameError, FrameKind, LINE_END, PREAMBLE,
    RESP_TEXT_WIDTH, SERIAL_RESP_SIZE, STATUS_CHECK_REQUEST, STATUS_FAIL, STATUS_PASS, TRAILER,
    leading_int,
};
pub use item::{ItemKind, MAX_NAME_LEN, Registry, TestItem, UiHandle};
pub use message::ParsedMessage;

/// Visible run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Booted, waiting for the start command.
    #[default]
    Wait,
    /// Checks running, countdown visible.
    Run,
    /// Countdown over, report pending.
    Print,
    /// Report sent. Terminal until the next boot.
    Stop,
}

impl Phase {
    /// Next phase given the run flags. `started` latches once the run is
    /// commanded, so a run that already finished still leaves `Wait`. `Print`
    /// moves on once the report is out, which the caller does after acting on it.
    pub fn next(self, started: bool, remaining_seconds: u32) -> Self {
        match self {
            Phase::Wait if started => Phase::Run,
            Phase::Run if remaining_seconds == 0 => Phase::Print,
            Phase::Print => Phase::Stop,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order() {
        let mut seen = vec![Phase::Wait];
        let mut phase = Phase::Wait;
        let mut remaining = 3;

        phase = phase.next(false, remaining);
        assert_eq!(phase, Phase::Wait);

        for _ in 0..10 {
            let next = phase.next(true, remaining);
            if next == Phase::Run && phase == Phase::Run {
                remaining -= 1;
            }
            if next != phase {
                seen.push(next);
            }
            phase = next;
        }
        assert_eq!(seen, [Phase::Wait, Phase::Run, Phase::Print, Phase::Stop]);
        assert_eq!(phase.next(true, 5), Phase::Stop);
    }

    #[test]
    fn finished_run_still_reaches_print() {
        let phase = Phase::Wait.next(true, 0);
        assert_eq!(phase, Phase::Run);
        assert_eq!(phase.next(true, 0), Phase::Print);
    }
}
