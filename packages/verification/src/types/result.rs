//! Check results handed to the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::claim::VerifiedClaim;
use super::progress::Stage;
use crate::error::PipelineError;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Start/end timestamps of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageTiming {
    pub fn elapsed_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Credits to finalize against the caller's reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSettlement {
    pub reserved: u32,

    /// Credits to charge. Zero releases the whole reservation.
    pub to_finalize: u32,
}

impl CreditSettlement {
    /// Completed runs consume the reservation; anything else releases it.
    pub fn for_status(status: CheckStatus, reserved: u32) -> Self {
        let to_finalize = match status {
            CheckStatus::Completed => reserved,
            CheckStatus::Failed | CheckStatus::Cancelled => 0,
        };
        Self {
            reserved,
            to_finalize,
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: Uuid,
    pub status: CheckStatus,

    /// Claims in extraction order
    pub claims: Vec<VerifiedClaim>,

    pub error: Option<PipelineError>,
    pub credits: CreditSettlement,
    pub timings: Vec<StageTiming>,
    pub finished_at: DateTime<Utc>,
}

impl CheckResult {
    pub fn is_completed(&self) -> bool {
        self.status == CheckStatus::Completed
    }
}
