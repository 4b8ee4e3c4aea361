//! Core types for wgaccess

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Telegram chat identity of a user
pub type ChatId = i64;

/// Separator between the chat id and the profile name in a peer identifier.
///
/// Profile names cannot contain it (see [`validate_profile_name`]), so the
/// derivation stays reversible and users with a shared numeric prefix can
/// never collide.
pub const PEER_SEPARATOR: char = '-';

/// Maximum accepted profile-name length
pub const MAX_PROFILE_NAME_LEN: usize = 32;

/// A registered chat user and the token linked to it, if any
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub chat_id: ChatId,
    pub token: Option<String>,
}

/// Lifecycle status of a VPN profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    Active,
    Suspended,
}

impl ProfileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileStatus::Active => "active",
            ProfileStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ProfileStatus::Active),
            "suspended" => Some(ProfileStatus::Suspended),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named VPN profile owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpnProfile {
    pub chat_id: ChatId,
    pub name: String,
    pub status: ProfileStatus,
    pub created_at: i64,
}

/// A prepaid access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub balance: i64,
    pub created_at: i64,
}

/// Derive the external peer identifier for a profile.
///
/// Pure function of the owning chat id and the profile name. The bot never
/// stores it and must be able to rebuild the same identifier for the whole
/// lifetime of the profile.
pub fn peer_id(chat_id: ChatId, name: &str) -> String {
    format!("{chat_id}{PEER_SEPARATOR}{name}")
}

/// Validate a user-supplied profile name.
///
/// Names are 1..=32 characters of `[A-Za-z0-9_]`. The charset keeps peer
/// identifiers unambiguous and filesystem-safe.
pub fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("Profile name must not be empty".into()));
    }
    if name.len() > MAX_PROFILE_NAME_LEN {
        return Err(Error::Validation(format!(
            "Profile name must be at most {MAX_PROFILE_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Validation(
            "Profile names may only contain letters, digits and underscores".into(),
        ));
    }
    Ok(())
}
