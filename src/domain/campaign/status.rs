//! CampaignStatus enum for tracking the dispatch lifecycle of a campaign.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Lifecycle status of a campaign.
///
/// The CRUD tier moves campaigns between Draft, Scheduled, Running and
/// Paused. The dispatch engine only ever writes the terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Scheduled,
    Running,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Running => "running",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
        }
    }

    /// Returns true if a worker should be dispatching this campaign.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, CampaignStatus::Running)
    }

    /// Returns true if no further dispatch can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }

    /// Validates a transition from this status to another.
    ///
    /// Valid transitions:
    /// - Draft -> Scheduled | Running
    /// - Scheduled -> Running | Draft
    /// - Running -> Paused | Completed | Failed
    /// - Paused -> Running | Draft
    pub fn can_transition_to(&self, target: &CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, target),
            (Draft, Scheduled)
                | (Draft, Running)
                | (Scheduled, Running)
                | (Scheduled, Draft)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Draft)
        )
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "running" => Ok(CampaignStatus::Running),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            other => Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Unknown campaign status: {}", other),
            )),
        }
    }
}
