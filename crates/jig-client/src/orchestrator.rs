//! UI tick: alive blink, countdown and the end-of-run report.

use crate::state::TickAction;
use crate::ui::Color;
use crate::{Context, report};

pub async fn run(ctx: Context) {
    let layout = ctx.settings.layout;
    let mut interval = tokio::time::interval(ctx.settings.timing.ui_tick);
    let mut alive = false;

    loop {
        interval.tick().await;
        alive = !alive;
        ctx.ui.set_color(
            layout.alive,
            if alive { Color::Green } else { Color::Background },
        );
        // Lifecycle moves on the lit half only, once per two ticks.
        if alive {
            step(&ctx).await;
        }
        ctx.ui.refresh();
    }
}

/// Advance the lifecycle one step and show the result.
pub async fn step(ctx: &Context) -> TickAction {
    let status = ctx.settings.layout.status;
    let action = ctx.state.write().await.tick();

    match &action {
        TickAction::ShowWait => {
            ctx.ui.set_color(status, Color::Background);
            ctx.ui.set_text(status, "WAIT");
        }
        TickAction::ShowRunning(seconds) => {
            ctx.ui.set_text(status, &format!("Running({})", seconds));
        }
        TickAction::PrintReport => {
            let failures = report::emit(ctx).await;
            ctx.ui.set_color(status, Color::verdict(failures == 0));
            ctx.ui.set_text(status, "STOP");
            tracing::info!("run over: {}", if failures == 0 { "PASS" } else { "FAIL" });
        }
        TickAction::Idle => {}
    }
    action
}
