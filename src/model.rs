//! Domain entities.
//!
//! These are the shapes request handlers work with. The storage layer maps
//! them onto physical records (see [`crate::storage::record`]); handlers never
//! see keys or index attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An audio clip owned by a user.
///
/// `id` must be globally unique: the physical key is derived from it alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meditation {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    pub name: String,
    pub text: String,
    pub public: bool,
}

/// An ordered playlist of meditations.
///
/// Member order is significant and round-trips exactly through the store.
/// A meditation may appear more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub image_url: String,
    pub name: String,
    pub description: String,
    pub public: bool,
    #[serde(default)]
    pub meditations: Vec<Meditation>,
}

impl Sequence {
    /// Ordered member ids: the membership manifest.
    pub fn meditation_ids(&self) -> Vec<String> {
        self.meditations.iter().map(|m| m.id.clone()).collect()
    }
}
