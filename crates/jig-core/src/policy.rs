//! Group/device identifiers and the per-item rules keyed on them.
//!
//! Rules live in tables so new cases are additions, not new branches in the
//! dispatcher.

use crate::message::ParsedMessage;

/// Group identifiers as they appear on the wire.
pub mod group {
    pub const SYSTEM: i32 = 0;
    pub const STORAGE: i32 = 1;
    pub const USB: i32 = 2;
    pub const HDMI: i32 = 3;
    pub const ADC: i32 = 4;
    pub const ETHERNET: i32 = 5;
    pub const HEADER: i32 = 6;
    pub const AUDIO: i32 = 7;
    pub const LED: i32 = 8;
    pub const PWM: i32 = 9;
    pub const IR: i32 = 10;
    pub const GPIO: i32 = 11;
    pub const FIRMWARE: i32 = 12;
    pub const MISC: i32 = 13;
}

/// Device identifiers that rules refer to.
pub mod device {
    pub const SYSTEM_MEM: i32 = 0;
    pub const SYSTEM_FB_SIZE: i32 = 1;

    pub const ETHERNET_IP: i32 = 0;
    pub const ETHERNET_MAC: i32 = 1;
    pub const ETHERNET_IPERF: i32 = 2;

    pub const LED_POWER: i32 = 0;
    pub const LED_ALIVE: i32 = 1;
    pub const LED_100M: i32 = 2;
    pub const LED_1G: i32 = 3;
}

/// Inputs a skip rule may consult.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipContext {
    /// Last measured network throughput, 0 if never measured.
    pub measured_throughput: u32,
}

/// An item left incomplete for this pass while its precondition is unmet.
pub struct SkipRule {
    pub name: &'static str,
    pub applies: fn(group_id: i32, device_id: i32) -> bool,
    pub blocked: fn(&SkipContext) -> bool,
}

pub const SKIP_RULES: &[SkipRule] = &[SkipRule {
    name: "link-rate LED before throughput measurement",
    applies: |gid, did| gid == group::LED && matches!(did, device::LED_100M | device::LED_1G),
    blocked: |ctx| ctx.measured_throughput == 0,
}];

/// The first rule that skips this item, if any.
pub fn skip_rule(group_id: i32, device_id: i32, ctx: &SkipContext) -> Option<&'static SkipRule> {
    SKIP_RULES
        .iter()
        .find(|rule| (rule.applies)(group_id, device_id) && (rule.blocked)(ctx))
}

/// Groups whose check-requests are resolved on the board and never wait for
/// a remote acknowledgement.
pub const ACK_EXEMPT_GROUPS: &[i32] = &[group::MISC, group::IR, group::SYSTEM];

pub fn awaits_ack(group_id: i32) -> bool {
    !ACK_EXEMPT_GROUPS.contains(&group_id)
}

/// Groups whose check-requests are finished by their own background watcher
/// rather than confirmed locally in self-test mode.
pub const EXTERNALLY_CONFIRMED_GROUPS: &[i32] = &[group::IR];

/// Can a check-request for this group be confirmed without a peer?
pub fn self_confirms(group_id: i32) -> bool {
    !EXTERNALLY_CONFIRMED_GROUPS.contains(&group_id)
}

/// Text shown next to an item for a received result.
pub fn display_text(msg: &ParsedMessage) -> String {
    match (msg.group_id, msg.device_id) {
        (group::SYSTEM, device::SYSTEM_MEM) => format!("{} GB", msg.response_int),
        (group::SYSTEM, device::SYSTEM_FB_SIZE) => {
            if msg.status_bool { "PASS" } else { "FAIL" }.to_string()
        }
        (group::ETHERNET, device::ETHERNET_MAC) => format_mac(&msg.response_text),
        _ => msg.response_text.clone(),
    }
}

/// `001E06AABBCC` -> `00:1E:06:AA:BB:CC`. Short input is shown as-is.
pub fn format_mac(raw: &str) -> String {
    let hex: Vec<char> = raw.chars().filter(|c| *c != ':').collect();
    if hex.len() < 12 {
        return raw.to_string();
    }
    hex[..12]
        .chunks(2)
        .map(|pair| pair.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
}
