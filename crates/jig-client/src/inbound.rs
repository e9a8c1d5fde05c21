//! Inbound commands from the control board.

use crate::Context;
use crate::report;
use crate::state::Recheck;
use crate::update::apply_result;
use anyhow::Context as _;
use futures_util::{Stream, StreamExt};
use jig_core::{Command, Frame, ParsedMessage};
use std::io;

/// Why the inbound loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The control board rebooted; the client exits cleanly.
    Reboot,
    /// The link reached end of stream.
    LinkClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(Exit),
}

/// Read lines until the control board reboots or the link closes.
pub async fn run<S>(ctx: &Context, mut lines: S) -> anyhow::Result<Exit>
where
    S: Stream<Item = io::Result<Vec<u8>>> + Unpin,
{
    while let Some(line) = lines.next().await {
        let line = line.context("serial read failed")?;
        if line.is_empty() {
            continue;
        }
        if let Flow::Exit(exit) = handle_frame(ctx, &line).await {
            return Ok(exit);
        }
    }
    Ok(Exit::LinkClosed)
}

/// Apply one received frame.
pub async fn handle_frame(ctx: &Context, bytes: &[u8]) -> Flow {
    let msg = match ParsedMessage::parse(bytes) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!("dropping frame: {} ({:?})", e, String::from_utf8_lossy(bytes));
            return Flow::Continue;
        }
    };
    tracing::debug!(
        "rx cmd = {}, gid = {}, did = {}, status = {:?}",
        msg.command,
        msg.group_id,
        msg.device_id,
        msg.status_char
    );

    match msg.command {
        Command::Start => {
            ctx.state.write().await.start();
            tracing::info!("run started");
        }
        Command::CheckRequest => spawn_check_once(ctx, msg.group_id, msg.device_id),
        Command::Ready => {
            let outcome = ctx
                .state
                .write()
                .await
                .recheck(msg.group_id, msg.device_id);
            match outcome {
                Recheck::Rearmed => tracing::info!(
                    "re-check gid = {}, did = {}, run extended",
                    msg.group_id,
                    msg.device_id
                ),
                Recheck::NotRunning => spawn_check_once(ctx, msg.group_id, msg.device_id),
                Recheck::UnknownItem => tracing::warn!(
                    "re-check for unknown item gid = {}, did = {}",
                    msg.group_id,
                    msg.device_id
                ),
            }
        }
        Command::Ack => acknowledge(ctx, &msg).await,
        Command::Stop => {
            ctx.state.write().await.force_stop();
            tracing::info!("force stop");
        }
        Command::ErrorList => {
            let lines = ctx.state.read().await.error_lines.clone();
            for frame in report::error_frames(&lines) {
                ctx.outbox.send(frame).await;
            }
        }
        Command::Reboot => {
            tracing::info!("server rebooted, exiting");
            return Flow::Exit(Exit::Reboot);
        }
        other => tracing::warn!("unknown command {}", other),
    }
    Flow::Continue
}

async fn acknowledge(ctx: &Context, msg: &ParsedMessage) {
    let projection = {
        let mut state = ctx.state.write().await;
        if !state.acknowledge(msg.group_id, msg.device_id) {
            tracing::warn!(
                "stale ack gid = {}, did = {}",
                msg.group_id,
                msg.device_id
            );
            return;
        }
        apply_result(&mut state.items, msg, Some(msg.status_bool))
    };
    tracing::info!("gid = {}, did = {}, ack received", msg.group_id, msg.device_id);
    if let Some(projection) = projection {
        projection.show(ctx.ui.as_ref());
    }
}

fn spawn_check_once(ctx: &Context, group_id: i32, device_id: i32) {
    let ctx = ctx.clone();
    tokio::spawn(async move { check_once(&ctx, group_id, device_id).await });
}

/// Run one item's check and report it, leaving the lifecycle untouched.
pub async fn check_once(ctx: &Context, group_id: i32, device_id: i32) {
    if ctx
        .state
        .read()
        .await
        .items
        .find_index(group_id, device_id)
        .is_none()
    {
        return;
    }

    let outcome = ctx.checks.check(group_id, device_id).await;
    let encoded = outcome.response.encode();
    let projection = match ParsedMessage::parse(encoded.as_bytes()) {
        Ok(mut msg) => {
            msg.command = Command::Status;
            msg.group_id = group_id;
            msg.device_id = device_id;
            apply_result(&mut ctx.state.write().await.items, &msg, None)
        }
        Err(e) => {
            tracing::warn!("unreadable response {:?}: {}", encoded, e);
            None
        }
    };
    if let Some(projection) = projection {
        projection.show(ctx.ui.as_ref());
    }

    ctx.outbox
        .send(Frame::new(Command::Status, group_id, device_id, outcome.response))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use crate::state::{PendingRequest, RECHECK_GRACE_SECONDS};
    use crate::testing::{FakeBoard, Harness, ScriptedChecks, pass};
    use crate::transport;
    use crate::ui::Color;
    use jig_core::policy::group;
    use jig_core::{DeviceResponse, ItemKind, Registry, TestItem, UiHandle};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn harness() -> Harness {
        let items = Registry::new(vec![
            TestItem::new(UiHandle(20), group::USB, 0, ItemKind::Interactive, "USB"),
            TestItem::new(UiHandle(21), group::AUDIO, 0, ItemKind::Interactive, "AUDIO"),
        ]);
        let checks = ScriptedChecks::with([((group::USB, 0), pass("480"))]);
        Harness::new(items, checks, FakeBoard::default(), Settings::default())
    }

    fn frame(command: Command, gid: i32, did: i32, payload: DeviceResponse) -> Vec<u8> {
        Frame::new(command, gid, did, payload).encode().into_bytes()
    }

    fn control(command: Command) -> Vec<u8> {
        frame(command, -1, -1, DeviceResponse::blank())
    }

    async fn next_sent(h: &mut Harness) -> Frame {
        tokio::time::timeout(Duration::from_secs(1), h.sent.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn start_sets_ready() {
        let h = harness();
        assert_eq!(handle_frame(&h.ctx, &control(Command::Start)).await, Flow::Continue);
        assert!(h.ctx.state.read().await.ready);
    }

    #[tokio::test]
    async fn matching_ack_finalizes_item() {
        let h = harness();
        h.ctx.state.write().await.pending = Some(PendingRequest::new(group::AUDIO, 0, 50));

        let ack = frame(Command::Ack, group::AUDIO, 0, DeviceResponse::pass("OK"));
        handle_frame(&h.ctx, &ack).await;

        let state = h.ctx.state.read().await;
        assert!(state.pending.as_ref().unwrap().acknowledged);
        assert!(state.items.get(1).unwrap().passed());
        assert_eq!(h.ui.colors(UiHandle(21)), [Color::Green]);
    }

    #[tokio::test]
    async fn stale_ack_is_ignored() {
        let h = harness();
        h.ctx.state.write().await.pending = Some(PendingRequest::new(group::AUDIO, 0, 50));

        let ack = frame(Command::Ack, group::USB, 0, DeviceResponse::pass("OK"));
        handle_frame(&h.ctx, &ack).await;

        let state = h.ctx.state.read().await;
        assert!(!state.pending.as_ref().unwrap().acknowledged);
        assert!(!state.items.get(0).unwrap().completed);
        assert!(h.ui.events().is_empty());
    }

    #[tokio::test]
    async fn recheck_during_run_rearms_item() {
        let h = harness();
        {
            let mut state = h.ctx.state.write().await;
            state.start();
            state.items.get_mut(0).unwrap().complete(true);
        }
        handle_frame(&h.ctx, &frame(Command::Ready, group::USB, 0, DeviceResponse::blank())).await;

        let state = h.ctx.state.read().await;
        assert!(!state.items.get(0).unwrap().completed);
        assert_eq!(state.remaining_seconds, 60 + RECHECK_GRACE_SECONDS);
        assert!(h.checks.calls().is_empty());
    }

    #[tokio::test]
    async fn recheck_outside_run_checks_once() {
        let mut h = harness();
        handle_frame(&h.ctx, &frame(Command::Ready, group::USB, 0, DeviceResponse::blank())).await;

        let sent = next_sent(&mut h).await;
        assert_eq!(sent.command, Command::Status);
        assert_eq!((sent.group_id, sent.device_id), (group::USB, 0));
        assert_eq!(sent.payload, DeviceResponse::pass("480"));

        let state = h.ctx.state.read().await;
        assert!(!state.items.get(0).unwrap().completed);
        assert!(!state.ready);
        assert_eq!(state.remaining_seconds, 60);
        assert_eq!(h.ui.texts(UiHandle(20)), ["480"]);
    }

    #[tokio::test]
    async fn check_request_runs_one_shot() {
        let mut h = harness();
        handle_frame(
            &h.ctx,
            &frame(Command::CheckRequest, group::USB, 0, DeviceResponse::blank()),
        )
        .await;
        assert_eq!(next_sent(&mut h).await.group_id, group::USB);
        assert_eq!(h.checks.calls(), [(group::USB, 0)]);
    }

    #[tokio::test]
    async fn one_shot_for_unknown_item_is_dropped() {
        let mut h = harness();
        check_once(&h.ctx, 9, 9).await;
        assert!(h.checks.calls().is_empty());
        assert!(h.drain().is_empty());
    }

    #[tokio::test]
    async fn stop_forces_countdown_to_one() {
        let h = harness();
        handle_frame(&h.ctx, &control(Command::Start)).await;
        handle_frame(&h.ctx, &control(Command::Stop)).await;
        let state = h.ctx.state.read().await;
        assert!(state.stop_requested);
        assert_eq!(state.remaining_seconds, 1);
    }

    #[tokio::test]
    async fn error_list_is_resent() {
        let mut h = harness();
        h.ctx.state.write().await.error_lines = vec!["USB AUDIO ".to_string()];

        handle_frame(&h.ctx, &control(Command::ErrorList)).await;
        let sent = h.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].command, Command::ErrorList);
        assert_eq!(sent[0].device_id, 0);
        assert_eq!(sent[0].payload, DeviceResponse::fail("USB AUDIO "));
    }

    #[tokio::test]
    async fn reboot_exits() {
        let h = harness();
        assert_eq!(
            handle_frame(&h.ctx, &control(Command::Reboot)).await,
            Flow::Exit(Exit::Reboot)
        );
    }

    #[tokio::test]
    async fn bad_frames_and_unknown_commands_are_ignored() {
        let h = harness();
        assert_eq!(handle_frame(&h.ctx, b"@,O,#").await, Flow::Continue);
        assert_eq!(
            handle_frame(&h.ctx, &control(Command::Unknown('Q'))).await,
            Flow::Continue
        );
        assert!(!h.ctx.state.read().await.ready);
    }

    #[tokio::test]
    async fn loop_reads_until_reboot() {
        let h = harness();
        let (mut peer, link) = tokio::io::duplex(1024);

        for bytes in [control(Command::Start), Vec::new(), control(Command::Reboot)] {
            peer.write_all(&bytes).await.unwrap();
            peer.write_all(b"\r\n").await.unwrap();
        }

        let exit = run(&h.ctx, transport::frames(link)).await.unwrap();
        assert_eq!(exit, Exit::Reboot);
        assert!(h.ctx.state.read().await.ready);
    }

    #[tokio::test]
    async fn loop_reports_closed_link() {
        let h = harness();
        let (peer, link) = tokio::io::duplex(64);
        drop(peer);
        assert_eq!(run(&h.ctx, transport::frames(link)).await.unwrap(), Exit::LinkClosed);
    }
}
