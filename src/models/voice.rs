//! Voice data model.
//!
//! Per-member voice channel preferences and usage, stored in the
//! `voiceData` collection.

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Name of the collection holding [`VoiceData`].
pub const VOICE_COLLECTION: &str = "voiceData";

/// Preferences for a member's private voice channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_limit: Option<u32>,

    pub is_private: bool,

    #[serde(default)]
    pub allowed_users: Vec<String>,
}

/// Accumulated voice usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceStatistics {
    /// Total seconds spent in voice channels.
    pub total_time_in_voice: i64,

    /// Unix timestamp of the last join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_joined: Option<i64>,

    /// Unix timestamp of the last leave.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_left: Option<i64>,
}

/// Voice record for one member of one guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceData {
    /// MongoDB document ID
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<ObjectId>,

    /// Cache key the record was written under, for non-native keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub user_id: String,
    pub guild_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_settings: Option<ChannelSettings>,

    #[serde(default)]
    pub statistics: VoiceStatistics,

    pub created_at: i64,
    pub updated_at: i64,
}

impl VoiceData {
    /// Create a fresh record for a member.
    pub fn new(guild_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            object_id: None,
            id: None,
            user_id: user_id.into(),
            guild_id: guild_id.into(),
            channel_settings: None,
            statistics: VoiceStatistics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Cache key for a member of a guild.
    pub fn key(guild_id: &str, user_id: &str) -> String {
        format!("{}:{}", guild_id, user_id)
    }

    /// Record the member joining a voice channel.
    pub fn joined(&mut self) {
        let now = chrono::Utc::now().timestamp();
        self.statistics.last_joined = Some(now);
        self.updated_at = now;
    }

    /// Record the member leaving, adding the session to the total.
    pub fn left(&mut self) {
        let now = chrono::Utc::now().timestamp();
        if let Some(joined) = self.statistics.last_joined {
            self.statistics.total_time_in_voice += (now - joined).max(0);
        }
        self.statistics.last_left = Some(now);
        self.updated_at = now;
    }
}
