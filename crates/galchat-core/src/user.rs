//! User profiles and style preference weights.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Upper bound for a preference weight.
pub const PREFERENCE_MAX: f32 = 10.0;

/// Learned style preference weights, nudged by option selections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Affinity for humorous replies
    pub humor_level: f32,
    /// Affinity for cold/detached replies
    pub cold_level: f32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            humor_level: 5.0,
            cold_level: 5.0,
        }
    }
}

/// One stored user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub preferences: Preferences,
    pub created_at: String,
    pub updated_at: String,
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            preferences: Preferences::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Persistence for user profiles.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn save(&self, user: &UserProfile) -> Result<()>;
}
