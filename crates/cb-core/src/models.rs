//! # Domain Models
//!
//! The content queue holds a single entity, [`ContentItem`]. Its lifecycle is
//! the closed state machine below; deletion is modeled as row absence rather
//! than a stored status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A generated (or hand-written) post waiting in, or retired from, the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub content: String,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly when `status` is `Posted`.
    pub posted_at: Option<DateTime<Utc>>,
}

/// Where an item sits in the review/publish pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Pending,
    Authorized,
    Posted,
}

/// Events that move an item through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Authorize,
    Remove,
    PublishSucceeded,
    PublishFailed,
}

/// Result of applying a [`Transition`] to a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Stored(ContentStatus),
    Removed,
}

impl ContentStatus {
    pub const ALL: [ContentStatus; 3] = [
        ContentStatus::Pending,
        ContentStatus::Authorized,
        ContentStatus::Posted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::Authorized => "authorized",
            ContentStatus::Posted => "posted",
        }
    }

    /// Applies `transition`, rejecting every pair the queue does not allow.
    pub fn apply(self, transition: Transition) -> Result<TransitionOutcome, AppError> {
        use ContentStatus::*;
        use Transition::*;

        match (self, transition) {
            (Pending, Authorize) => Ok(TransitionOutcome::Stored(Authorized)),
            (Pending | Authorized, Remove) => Ok(TransitionOutcome::Removed),
            (Authorized, PublishSucceeded) => Ok(TransitionOutcome::Stored(Posted)),
            (Authorized, PublishFailed) => Ok(TransitionOutcome::Stored(Authorized)),
            (Authorized, Authorize)
            | (Pending, PublishSucceeded | PublishFailed)
            | (Posted, Authorize | Remove | PublishSucceeded | PublishFailed) => {
                Err(AppError::InvalidTransition {
                    from: self,
                    transition,
                })
            }
        }
    }

    /// Whether the item's text may still be edited by a reviewer.
    pub fn is_editable(&self) -> bool {
        !matches!(self, ContentStatus::Posted)
    }
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Authorize => "authorize",
            Transition::Remove => "remove",
            Transition::PublishSucceeded => "publish",
            Transition::PublishFailed => "fail publishing",
        }
    }

    /// The statuses from which this transition is legal.
    pub fn sources(&self) -> Vec<ContentStatus> {
        ContentStatus::ALL
            .into_iter()
            .filter(|status| status.apply(*self).is_ok())
            .collect()
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ContentStatus::Pending),
            "authorized" => Ok(ContentStatus::Authorized),
            "posted" => Ok(ContentStatus::Posted),
            other => Err(AppError::StorageError(format!(
                "unknown content status '{other}'"
            ))),
        }
    }
}

/// System and user messages handed to the text generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPrompt {
    pub system: String,
    pub user: String,
}

/// Acknowledgement returned by a publisher after a successful post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub remote_id: String,
}
