//! Four-level total order over tasks.

use serde::{Deserialize, Serialize};

/// Task urgency. Discriminant order defines `Ord`: `Critical` is strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

impl Priority {
    /// Case-insensitive parse. Unknown input maps to `Normal`, never an error —
    /// ranking is best-effort and must never block on a malformed label.
    pub fn from_string(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Priority::Critical,
            "HIGH" => Priority::High,
            "LOW" => Priority::Low,
            _ => Priority::Normal,
        }
    }

    /// Stable lowercase token, as carried on the wire in the Result envelope.
    pub fn to_string(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}
