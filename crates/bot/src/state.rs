//! Shared runtime state for the bot

use crate::config::BotConfig;
use crate::session::Sessions;
use std::sync::Arc;
use wgaccess_common::types::{ChatId, VpnProfile};
use wgaccess_common::{validate_profile_name, Database, Error, Result};

/// Everything a handler needs, cheap to clone
#[derive(Clone)]
pub struct AppState {
    config: Arc<BotConfig>,
    db: Database,
    sessions: Sessions,
}

impl AppState {
    pub fn new(config: BotConfig, db: Database, sessions: Sessions) -> Self {
        Self {
            config: Arc::new(config),
            db,
            sessions,
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    /// Create a profile after name validation and the optional balance gate
    pub fn create_profile(&self, chat_id: ChatId, name: &str) -> Result<VpnProfile> {
        validate_profile_name(name)?;
        if self.config.policy.require_token_balance {
            match self.db.linked_token(chat_id)? {
                Some(token) if token.balance > 0 => {}
                _ => return Err(Error::TokenRequired),
            }
        }
        self.db.create_profile(chat_id, name)
    }
}
