//! Keyword and assignment records as seen by the pipeline.
//!
//! Both tables are owned by the CRUD layer; the pipeline only reads them,
//! except for `Keyword::priority`, which the metrics hook recalculates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::Priority;
use crate::CoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    pub public_id: Uuid,
    pub owner_id: Uuid,
    pub term: String,
    pub category: Option<String>,
    pub priority: Priority,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Keyword {
    #[must_use]
    pub fn is_owned_by(&self, caller: Uuid) -> bool {
        self.owner_id == caller
    }
}

/// What a keyword assignment points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    SocialPost,
    Place,
}

impl TargetKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::SocialPost => "social_post",
            TargetKind::Place => "place",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "social_post" => Ok(TargetKind::SocialPost),
            "place" => Ok(TargetKind::Place),
            other => Err(CoreError::InvalidTargetKind(other.to_string())),
        }
    }
}

/// A collected result (social post or place) associated with a keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordAssignment {
    pub id: i64,
    pub keyword_id: i64,
    pub target_kind: TargetKind,
    /// Likes + comments + shares at collection time.
    pub engagement: i64,
    /// Star rating for places, `None` for social posts.
    pub rating: Option<Decimal>,
    pub created_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
