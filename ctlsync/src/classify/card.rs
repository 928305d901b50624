//! Control-slot health from `show card` output.
//!
//! Only the CPM slots (`A`, `B`) are examined. A slot line is a line whose
//! first token is the slot letter; the indented lines right after it belong
//! to the same slot.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static SLOT_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([AB])\s+").unwrap());

static STATE_ROLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(up|down)/(standby|active)\b").unwrap());

/// Marker on a continuation line for an empty slot.
const NOT_EQUIPPED: &str = "(not equipped)";

/// A fault found on a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFault {
    /// Slot letter.
    pub slot: String,
    /// What is wrong.
    pub description: String,
}

impl SlotFault {
    fn new(slot: &str, description: impl Into<String>) -> Self {
        Self {
            slot: slot.to_string(),
            description: description.into(),
        }
    }
}

impl fmt::Display for SlotFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}: {}", self.slot, self.description)
    }
}

/// Every fault on the control slots. Empty means healthy.
///
/// A `(not equipped)` continuation line yields a single "not equipped"
/// fault and skips the state checks for that slot. Otherwise the first two
/// standalone `up`/`down` tokens are the admin and operational state, and a
/// `down/<role>` pair is reported separately.
pub fn slot_health(output: &str) -> Vec<SlotFault> {
    let lines: Vec<&str> = output.lines().collect();
    let mut faults = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let Some(caps) = SLOT_LINE.captures(trimmed) else {
            continue;
        };
        let slot = &caps[1];

        let not_equipped = lines[index + 1..]
            .iter()
            .take_while(|l| l.starts_with(' ') || l.starts_with('\t'))
            .any(|l| l.to_lowercase().contains(NOT_EQUIPPED));
        if not_equipped {
            faults.push(SlotFault::new(slot, "not equipped"));
            continue;
        }

        let mut states = trimmed
            .split_whitespace()
            .map(str::to_lowercase)
            .filter(|t| t == "up" || t == "down");
        let admin = states.next();
        let operational = states.next();
        if admin.as_deref() == Some("down") || operational.as_deref() == Some("down") {
            faults.push(SlotFault::new(
                slot,
                format!(
                    "admin {}, operational {}",
                    admin.as_deref().unwrap_or("unknown"),
                    operational.as_deref().unwrap_or("unknown")
                ),
            ));
        }

        if let Some(pair) = STATE_ROLE.captures(trimmed) {
            if pair[1].eq_ignore_ascii_case("down") {
                faults.push(SlotFault::new(
                    slot,
                    format!("operational {}", pair[0].to_lowercase()),
                ));
            }
        }
    }

    faults
}
