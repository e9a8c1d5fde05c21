//! Walks the registry until every item is complete or the run is stopped.

use crate::Context;
use crate::state::{PendingRequest, SharedState};
use crate::ui::Color;
use crate::update::apply_result;
use jig_core::policy::{self, SkipContext};
use jig_core::{Command, Frame, ParsedMessage};
use std::time::Duration;

/// How one item step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Already complete; counts toward the pass.
    Complete,
    /// Left incomplete by a skip rule.
    Skipped,
    /// A check ran and its result was sent.
    Checked,
}

/// How an acknowledgement wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    TimedOut,
    Cancelled,
}

pub async fn run(ctx: Context) {
    if !wait_until_ready(&ctx).await {
        tracing::info!("stopped before the run started");
        ctx.state.write().await.finish_run();
        return;
    }
    tracing::info!("check dispatcher started");

    'run: loop {
        let total = ctx.state.read().await.items.len();
        let mut complete = 0;

        for index in 0..total {
            if check_item(&ctx, index).await == Step::Complete {
                complete += 1;
            }
            if ctx.state.read().await.should_stop() {
                tracing::info!("run stopped before all items completed");
                break 'run;
            }
        }

        if complete == total {
            tracing::info!("all {} items complete", total);
            break;
        }
        tokio::time::sleep(ctx.settings.timing.pass_delay).await;
    }

    ctx.state.write().await.finish_run();
    tracing::info!("check dispatcher exit");
}

/// False if a stop arrived first.
async fn wait_until_ready(ctx: &Context) -> bool {
    loop {
        {
            let state = ctx.state.read().await;
            if state.ready {
                return true;
            }
            if state.stop_requested {
                return false;
            }
        }
        tokio::time::sleep(ctx.settings.timing.ready_poll).await;
    }
}

/// Process the item at `index` once.
pub async fn check_item(ctx: &Context, index: usize) -> Step {
    let Some(item) = ctx.state.read().await.items.get(index).cloned() else {
        return Step::Skipped;
    };
    let (gid, did) = item.key();

    let skip = SkipContext {
        measured_throughput: ctx.board.measured_throughput(),
    };
    if let Some(rule) = policy::skip_rule(gid, did, &skip) {
        tracing::debug!("gid = {}, did = {}: skipped ({})", gid, did, rule.name);
        return Step::Skipped;
    }
    if item.completed {
        return Step::Complete;
    }

    if item.kind.shows_progress() {
        ctx.ui.set_color(item.ui_handle, Color::Yellow);
        ctx.ui.refresh();
    }

    let outcome = ctx.checks.check(gid, did).await;
    tracing::info!(
        "gid = {}, did = {}, status = {}, resp = {:?}",
        gid,
        did,
        outcome.status,
        outcome.response.encode()
    );

    let mut msg = match ParsedMessage::parse(outcome.response.encode().as_bytes()) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!("gid = {}, did = {}: unreadable response: {}", gid, did, e);
            ParsedMessage::default()
        }
    };
    msg.command = Command::Status;
    msg.group_id = gid;
    msg.device_id = did;

    // The check's status decides completion; the reported payload decides the verdict.
    let request = outcome.response.is_check_request();
    let finalize = if request {
        (ctx.settings.self_test && policy::self_confirms(gid)).then_some(outcome.status)
    } else {
        outcome.status.then_some(msg.status_bool)
    };

    let projection = {
        let mut state = ctx.state.write().await;
        let projection = apply_result(&mut state.items, &msg, finalize);
        if request && finalize.is_none() {
            // Recorded before sending so an immediate reply is not stale.
            let ticks = ctx.settings.timing.ack_ticks;
            state.pending = Some(PendingRequest::new(gid, did, ticks));
        }
        projection
    };
    if let Some(projection) = projection {
        projection.show(ctx.ui.as_ref());
    }

    ctx.outbox
        .send(Frame::new(Command::Status, gid, did, outcome.response))
        .await;

    if request && finalize.is_none() && policy::awaits_ack(gid) {
        match wait_for_ack(&ctx.state, ctx.settings.timing.ack_tick).await {
            AckOutcome::Acknowledged => {
                tracing::info!("gid = {}, did = {}: acknowledged", gid, did)
            }
            AckOutcome::TimedOut => {
                tracing::warn!("gid = {}, did = {}: no ack, moving on", gid, did)
            }
            AckOutcome::Cancelled => {
                tracing::info!("gid = {}, did = {}: wait cancelled by stop", gid, did)
            }
        }
    }

    tokio::time::sleep(ctx.settings.timing.post_transmit).await;
    Step::Checked
}

/// Poll the pending request once per `tick` until it is acknowledged, its
/// ticks run out, or a stop is requested. The request is cleared on return.
pub async fn wait_for_ack(state: &SharedState, tick: Duration) -> AckOutcome {
    loop {
        {
            let mut s = state.write().await;
            if s.stop_requested {
                s.pending = None;
                return AckOutcome::Cancelled;
            }
            let Some(pending) = s.pending.as_mut() else {
                return AckOutcome::Cancelled;
            };
            if pending.acknowledged {
                s.pending = None;
                return AckOutcome::Acknowledged;
            }
            if pending.ticks_remaining == 0 {
                s.pending = None;
                return AckOutcome::TimedOut;
            }
            pending.ticks_remaining -= 1;
        }
        tokio::time::sleep(tick).await;
    }
}
