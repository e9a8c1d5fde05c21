//! End-of-run report: board identifier, failure summary, overall verdict.

use crate::Context;
use jig_core::{Command, DeviceResponse, Frame, Registry};

/// Characters per failure-summary line.
pub const LINE_WIDTH: usize = 19;

/// Most failure-summary lines sent.
pub const MAX_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub failures: usize,
    /// Names of failed items, each followed by a space, wrapped to [`LINE_WIDTH`].
    pub lines: Vec<String>,
}

impl Report {
    pub fn compose(items: &Registry) -> Self {
        let mut failures = 0;
        let mut lines: Vec<String> = Vec::new();
        let mut current = String::new();

        for item in items.iter().filter(|item| !item.passed()) {
            failures += 1;
            let token = format!("{} ", item.display_name);
            if !current.is_empty() && current.len() + token.len() > LINE_WIDTH {
                lines.push(std::mem::take(&mut current));
            }
            current.push_str(&token);
        }
        if !current.is_empty() {
            lines.push(current);
        }

        if lines.len() > MAX_LINES {
            tracing::warn!(
                "failure summary needs {} lines, sending the first {}",
                lines.len(),
                MAX_LINES
            );
            lines.truncate(MAX_LINES);
        }

        Self { failures, lines }
    }

    pub fn passed(&self) -> bool {
        self.failures == 0
    }

    /// Frames in send order: identifier, summary lines, verdict.
    pub fn frames(&self, mac: Option<&str>) -> Vec<Frame> {
        let identifier = match mac {
            Some(mac) => DeviceResponse::pass(mac),
            None => DeviceResponse::fail(""),
        };

        let mut frames = vec![Frame::new(Command::MacAddress, -1, -1, identifier)];
        frames.extend(error_frames(&self.lines));

        let verdict = if self.passed() {
            DeviceResponse::pass("PASS")
        } else {
            DeviceResponse::fail("FAIL")
        };
        frames.push(Frame::new(Command::Status, -1, -1, verdict));
        frames
    }
}

/// One `E` frame per summary line, numbered by line.
pub fn error_frames(lines: &[String]) -> Vec<Frame> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            Frame::new(
                Command::ErrorList,
                -1,
                i as i32,
                DeviceResponse::fail(line.as_str()),
            )
        })
        .collect()
}

/// Compose and send the report. Returns the failure count.
pub async fn emit(ctx: &Context) -> usize {
    let report = {
        let mut state = ctx.state.write().await;
        let report = Report::compose(&state.items);
        state.error_lines = report.lines.clone();
        report
    };

    let mac = ctx.board.mac_address();
    if mac.is_none() {
        tracing::warn!("board identifier unknown");
    }
    for frame in report.frames(mac.as_deref()) {
        ctx.outbox.send(frame).await;
    }

    tracing::info!("report sent, {} failures", report.failures);
    for line in &report.lines {
        tracing::info!("failed: {}", line.trim_end());
    }
    report.failures
}
