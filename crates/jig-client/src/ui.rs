//! Display seam. The client only says what an element should show; drawing is
//! the display's business.

use jig_core::UiHandle;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// The layout's own background colour.
    Background,
    Green,
    Red,
    Yellow,
}

impl Color {
    pub fn verdict(pass: bool) -> Self {
        if pass { Color::Green } else { Color::Red }
    }
}

pub trait Ui: Send + Sync {
    fn set_color(&self, handle: UiHandle, color: Color);
    fn set_text(&self, handle: UiHandle, text: &str);
    fn refresh(&self);
}

/// Fixed elements the lifecycle drives.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct UiLayout {
    pub alive: UiHandle,
    pub ip: UiHandle,
    pub status: UiHandle,
}

impl Default for UiLayout {
    fn default() -> Self {
        Self {
            alive: UiHandle(0),
            ip: UiHandle(4),
            status: UiHandle(47),
        }
    }
}

/// An item update, computed under the state lock and shown after it is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub handle: UiHandle,
    pub color: Option<Color>,
    pub text: String,
}

impl Projection {
    pub fn show(&self, ui: &dyn Ui) {
        if let Some(color) = self.color {
            ui.set_color(self.handle, color);
        }
        ui.set_text(self.handle, &self.text);
        ui.refresh();
    }
}

/// Headless display: every projection becomes a log line.
#[derive(Debug, Default)]
pub struct TracingUi;

impl Ui for TracingUi {
    fn set_color(&self, handle: UiHandle, color: Color) {
        tracing::trace!(%handle, ?color, "set color");
    }

    fn set_text(&self, handle: UiHandle, text: &str) {
        tracing::debug!(%handle, text, "set text");
    }

    fn refresh(&self) {}
}
