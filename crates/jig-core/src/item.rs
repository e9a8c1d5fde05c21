//! Test items and the registry that orders them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest display name kept for the failure summary.
pub const MAX_NAME_LEN: usize = 18;

/// Opaque reference to a UI element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UiHandle(pub u32);

impl fmt::Display for UiHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ui#{}", self.0)
    }
}

/// How an item shows its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Pass/fail colour, in-progress colour and text.
    #[default]
    Interactive,
    /// In-progress colour and text, no pass/fail colour.
    StatusOnly,
    /// Text only.
    DataOnly,
}

impl ItemKind {
    /// Does the item get the in-progress colour while its check runs?
    pub fn shows_progress(self) -> bool {
        !matches!(self, ItemKind::DataOnly)
    }

    /// Does the item get a pass/fail colour?
    pub fn shows_verdict(self) -> bool {
        matches!(self, ItemKind::Interactive)
    }
}

/// One hardware check slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestItem {
    pub ui_handle: UiHandle,
    pub group_id: i32,
    pub device_id: i32,
    pub completed: bool,
    pub status: bool,
    pub kind: ItemKind,
    pub display_name: String,
}

impl TestItem {
    pub fn new(
        ui_handle: UiHandle,
        group_id: i32,
        device_id: i32,
        kind: ItemKind,
        display_name: impl Into<String>,
    ) -> Self {
        let mut display_name: String = display_name.into();
        if let Some((idx, _)) = display_name.char_indices().nth(MAX_NAME_LEN) {
            display_name.truncate(idx);
        }
        Self {
            ui_handle,
            group_id,
            device_id,
            completed: false,
            status: false,
            kind,
            display_name,
        }
    }

    pub fn key(&self) -> (i32, i32) {
        (self.group_id, self.device_id)
    }

    /// Completed with a passing result.
    pub fn passed(&self) -> bool {
        self.completed && self.status
    }

    /// Finalize the result.
    pub fn complete(&mut self, status: bool) {
        self.completed = true;
        self.status = status;
    }

    /// Forget the result so the dispatcher visits the item again.
    pub fn reset(&mut self) {
        self.completed = false;
        self.status = false;
    }
}

/// Items in check order, looked up by `(group, device)`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    items: Vec<TestItem>,
}

impl Registry {
    pub fn new(items: Vec<TestItem>) -> Self {
        let registry = Self { items };
        for (i, item) in registry.items.iter().enumerate() {
            if registry.items[..i].iter().any(|other| other.key() == item.key()) {
                tracing::warn!(
                    "duplicate item gid = {}, did = {}; lookups return the first",
                    item.group_id,
                    item.device_id
                );
            }
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insertion-ordered traversal.
    pub fn iter(&self) -> impl Iterator<Item = &TestItem> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&TestItem> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut TestItem> {
        self.items.get_mut(index)
    }

    pub fn find_index(&self, group_id: i32, device_id: i32) -> Option<usize> {
        let found = self
            .items
            .iter()
            .position(|item| item.key() == (group_id, device_id));
        if found.is_none() {
            tracing::warn!("cannot find item. gid = {}, did = {}", group_id, device_id);
        }
        found
    }

    pub fn find_ui_handle(&self, group_id: i32, device_id: i32) -> Option<UiHandle> {
        self.find_index(group_id, device_id)
            .map(|idx| self.items[idx].ui_handle)
    }

    pub fn find_mut(&mut self, group_id: i32, device_id: i32) -> Option<&mut TestItem> {
        self.find_index(group_id, device_id)
            .map(move |idx| &mut self.items[idx])
    }

    /// Clear the result at `index`. False if there is no such item.
    pub fn reset(&mut self, index: usize) -> bool {
        match self.items.get_mut(index) {
            Some(item) => {
                item.reset();
                true
            }
            None => false,
        }
    }

    /// Number of items that are not completed with a pass.
    pub fn failure_count(&self) -> usize {
        self.items.iter().filter(|item| !item.passed()).count()
    }

    pub fn all_completed(&self) -> bool {
        self.items.iter().all(|item| item.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new(vec![
            TestItem::new(UiHandle(10), 5, 0, ItemKind::Interactive, "ETH"),
            TestItem::new(UiHandle(11), 2, 1, ItemKind::StatusOnly, "USB"),
            TestItem::new(UiHandle(12), 0, 0, ItemKind::DataOnly, "MEM"),
        ])
    }

    #[test]
    fn lookup_by_key() {
        let reg = registry();
        assert_eq!(reg.find_index(2, 1), Some(1));
        assert_eq!(reg.find_ui_handle(0, 0), Some(UiHandle(12)));
    }

    #[test]
    fn missing_key_is_none() {
        let mut reg = registry();
        assert_eq!(reg.find_index(9, 9), None);
        assert_eq!(reg.find_ui_handle(-1, -1), None);
        assert!(reg.find_mut(7, 0).is_none());
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let reg = registry();
        let names: Vec<_> = reg.iter().map(|i| i.display_name.as_str()).collect();
        assert_eq!(names, ["ETH", "USB", "MEM"]);
    }

    #[test]
    fn long_names_are_truncated() {
        let name = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let item = TestItem::new(UiHandle(1), 0, 0, ItemKind::Interactive, name);
        assert_eq!(item.display_name.len(), MAX_NAME_LEN);
    }

    #[test]
    fn completion_and_reset() {
        let mut reg = registry();
        assert_eq!(reg.failure_count(), 3);
        reg.find_mut(5, 0).unwrap().complete(true);
        reg.find_mut(2, 1).unwrap().complete(false);
        assert_eq!(reg.failure_count(), 2);
        assert!(!reg.all_completed());

        assert!(reg.reset(1));
        assert!(!reg.reset(7));
        let usb = reg.get(1).unwrap();
        assert!(!usb.completed);
        assert!(!usb.status);
    }

    #[test]
    fn kind_projection_rules() {
        assert!(ItemKind::Interactive.shows_verdict());
        assert!(!ItemKind::StatusOnly.shows_verdict());
        assert!(ItemKind::StatusOnly.shows_progress());
        assert!(!ItemKind::DataOnly.shows_progress());
    }
}
