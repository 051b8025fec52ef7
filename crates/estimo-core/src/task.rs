//! Backlog items estimated inside a room.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EstimoError, Result};
use crate::vote::SENTINEL;

/// Maximum headline length, in characters, after trimming.
pub const MAX_HEADLINE_LEN: usize = 255;

/// A task in a room's ordered list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task ID.
    pub id: String,
    /// Owning room.
    pub room_id: String,
    /// Short title.
    pub headline: String,
    /// Free-text description; empty when unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// External tracker URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_link: Option<String>,
    /// Estimation recorded when a round was cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimation: Option<String>,
    /// 1-based position within the room.
    pub position: u32,
}

impl Task {
    /// Create an unestimated task at `position`.
    pub fn new(room_id: &str, headline: &str, position: u32) -> Result<Self> {
        if room_id.is_empty() {
            return Err(EstimoError::invalid("room id is required"));
        }
        if position < 1 {
            return Err(EstimoError::invalid("task position must be at least 1"));
        }
        Ok(Self {
            id: Uuid::now_v7().to_string(),
            room_id: room_id.to_owned(),
            headline: validate_headline(headline)?,
            description: String::new(),
            tracker_link: None,
            estimation: None,
            position,
        })
    }

    /// Replace the headline.
    pub fn update_headline(&mut self, headline: &str) -> Result<()> {
        self.headline = validate_headline(headline)?;
        Ok(())
    }

    /// Replace the description (trimmed).
    pub fn update_description(&mut self, description: &str) {
        description.trim().clone_into(&mut self.description);
    }

    /// Replace the tracker link (trimmed); blank clears it.
    pub fn update_tracker_link(&mut self, link: &str) {
        let link = link.trim();
        self.tracker_link = (!link.is_empty()).then(|| link.to_owned());
    }

    /// Record an estimation. Any label is accepted.
    pub fn set_estimation(&mut self, estimation: impl Into<String>) {
        self.estimation = Some(estimation.into());
    }

    /// Whether the task carries a usable estimation.
    pub fn is_estimated(&self) -> bool {
        self.estimation
            .as_deref()
            .is_some_and(|e| !e.is_empty() && e != SENTINEL)
    }
}

fn validate_headline(headline: &str) -> Result<String> {
    let trimmed = headline.trim();
    if trimmed.is_empty() {
        return Err(EstimoError::invalid("task headline cannot be empty"));
    }
    if trimmed.chars().count() > MAX_HEADLINE_LEN {
        return Err(EstimoError::invalid(format!(
            "task headline must be at most {MAX_HEADLINE_LEN} characters"
        )));
    }
    Ok(trimmed.to_owned())
}
