//! Orchestrator stages and progress events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Orchestrator state. Declaration order is pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Ingesting,
    Extracting,
    Retrieving,
    Verifying,
    Judging,
    Completed,
    Failed,
    Cancelled,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Progress percent reported on entering this stage.
    ///
    /// Terminal failure states have no fixed percent; they repeat the last one.
    pub fn base_percent(&self) -> Option<u8> {
        match self {
            Self::Queued => Some(0),
            Self::Ingesting => Some(5),
            Self::Extracting => Some(20),
            Self::Retrieving => Some(35),
            Self::Verifying => Some(60),
            Self::Judging => Some(75),
            Self::Completed => Some(100),
            Self::Failed | Self::Cancelled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Ingesting => "ingesting",
            Self::Extracting => "extracting",
            Self::Retrieving => "retrieving",
            Self::Verifying => "verifying",
            Self::Judging => "judging",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted at stage boundaries and as heartbeats during the claim fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub check_id: Uuid,
    pub stage: Stage,

    /// Non-decreasing within one run, 0..=100
    pub progress_percent: u8,

    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_percent_follows_stage_order() {
        let stages = [
            Stage::Queued,
            Stage::Ingesting,
            Stage::Extracting,
            Stage::Retrieving,
            Stage::Verifying,
            Stage::Judging,
            Stage::Completed,
        ];
        let percents: Vec<u8> = stages.iter().filter_map(|s| s.base_percent()).collect();
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
        assert!(Stage::Retrieving < Stage::Judging);
    }
}
