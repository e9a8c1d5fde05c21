//! The one path by which a result reaches an item and the display.

use crate::ui::{Color, Projection};
use jig_core::{ParsedMessage, Registry, policy};

/// Apply `msg` to its item.
///
/// `finalize` completes the item with that verdict. Without it, a plain
/// result still colours the item while an open check-request leaves the
/// in-progress colour alone. Unknown items yield `None` and change nothing.
pub fn apply_result(
    items: &mut Registry,
    msg: &ParsedMessage,
    finalize: Option<bool>,
) -> Option<Projection> {
    let item = items.find_mut(msg.group_id, msg.device_id)?;

    let verdict = match finalize {
        Some(status) => Some(status),
        None if !msg.is_check_request() => Some(msg.status_bool),
        None => None,
    };
    if let Some(status) = finalize {
        item.complete(status);
    }

    Some(Projection {
        handle: item.ui_handle,
        color: verdict
            .filter(|_| item.kind.shows_verdict())
            .map(Color::verdict),
        text: policy::display_text(msg),
    })
}
