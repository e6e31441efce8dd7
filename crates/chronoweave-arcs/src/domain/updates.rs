//! Arc change notifications.

use serde::{Deserialize, Serialize};

/// What changed on an arc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ArcChange {
    /// A required beat was fulfilled.
    BeatFulfilled {
        /// Canonical beat description.
        beat: String,
    },
    /// The arc moved to a later phase.
    PhaseAdvanced {
        /// Previous phase index.
        from: usize,
        /// New phase index.
        to: usize,
    },
    /// Tension changed.
    TensionChanged {
        /// Previous tension.
        from: u8,
        /// New tension.
        to: u8,
    },
}

/// One change to one arc, with the arc's state after the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcUpdate {
    /// Owning character; `None` for the master arc.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    /// The change.
    #[serde(flatten)]
    pub change: ArcChange,
    /// Phase (or act) the change applies to.
    pub phase_index: usize,
    /// Name of that phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_name: Option<String>,
    /// Tension after the change.
    pub tension: u8,
    /// Fulfillment after the change.
    pub fulfillment: u8,
}

impl ArcUpdate {
    /// Returns `true` for master-arc updates.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.character_id.is_none()
    }
}
