//! SQLite store for users, VPN profiles and access tokens

use crate::error::{Error, Result};
use crate::types::{AccessToken, ChatId, ProfileStatus, User, VpnProfile};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Store wrapper.
///
/// One connection guarded by a mutex: every check-then-act sequence below
/// runs under a single lock acquisition, so concurrent handlers cannot race
/// profile creation or token linking.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        info!("Opened database at {:?}", path.as_ref());
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Chat users; token is the optional link into access_tokens
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                chat_id INTEGER NOT NULL UNIQUE,
                token TEXT
            );

            -- VPN profiles; the name is unique per owner
            CREATE TABLE IF NOT EXISTS vpn_profiles (
                id INTEGER PRIMARY KEY,
                chat_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at INTEGER NOT NULL,
                UNIQUE (chat_id, name)
            );
            CREATE INDEX IF NOT EXISTS idx_vpn_profiles_chat ON vpn_profiles(chat_id);

            -- Prepaid access tokens, managed by the admin CLI only
            CREATE TABLE IF NOT EXISTS access_tokens (
                id INTEGER PRIMARY KEY,
                token TEXT NOT NULL UNIQUE,
                balance INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    // ========================================================================
    // User registry
    // ========================================================================

    /// Idempotent user registration keyed by chat id
    pub fn ensure_user(&self, chat_id: ChatId) -> Result<User> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO users (chat_id) VALUES (?1)",
            params![chat_id],
        )?;
        let user = conn.query_row(
            "SELECT id, chat_id, token FROM users WHERE chat_id = ?1",
            params![chat_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    token: row.get(2)?,
                })
            },
        )?;
        Ok(user)
    }

    /// Get a user by chat id
    pub fn get_user(&self, chat_id: ChatId) -> Result<Option<User>> {
        let conn = self.conn.lock();
        let user = conn
            .query_row(
                "SELECT id, chat_id, token FROM users WHERE chat_id = ?1",
                params![chat_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        token: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Link a store token to the user.
    ///
    /// Fails if the user already holds a token or the token is unknown.
    /// Returns the token's current balance.
    pub fn link_token(&self, chat_id: ChatId, token: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO users (chat_id) VALUES (?1)",
            params![chat_id],
        )?;
        let current: Option<String> = conn.query_row(
            "SELECT token FROM users WHERE chat_id = ?1",
            params![chat_id],
            |row| row.get(0),
        )?;
        if let Some(current) = current {
            return Err(Error::AlreadyLinked(current));
        }
        let balance: Option<i64> = conn
            .query_row(
                "SELECT balance FROM access_tokens WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()?;
        let Some(balance) = balance else {
            return Err(Error::TokenNotFound(token.to_string()));
        };
        conn.execute(
            "UPDATE users SET token = ?1 WHERE chat_id = ?2",
            params![token, chat_id],
        )?;
        debug!("Linked token to chat {}", chat_id);
        Ok(balance)
    }

    /// Clear the user's token link; returns the token that was linked
    pub fn unlink_token(&self, chat_id: ChatId) -> Result<String> {
        let conn = self.conn.lock();
        let current: Option<Option<String>> = conn
            .query_row(
                "SELECT token FROM users WHERE chat_id = ?1",
                params![chat_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(Some(token)) = current else {
            return Err(Error::NoToken);
        };
        conn.execute(
            "UPDATE users SET token = NULL WHERE chat_id = ?1",
            params![chat_id],
        )?;
        debug!("Unlinked token from chat {}", chat_id);
        Ok(token)
    }

    /// The user's linked token together with its store record, if any
    pub fn linked_token(&self, chat_id: ChatId) -> Result<Option<AccessToken>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT t.token, t.balance, t.created_at
                 FROM users u JOIN access_tokens t ON t.token = u.token
                 WHERE u.chat_id = ?1",
                params![chat_id],
                |row| {
                    Ok(AccessToken {
                        token: row.get(0)?,
                        balance: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // ========================================================================
    // Profile registry
    // ========================================================================

    /// Create a profile with status active
    pub fn create_profile(&self, chat_id: ChatId, name: &str) -> Result<VpnProfile> {
        let conn = self.conn.lock();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vpn_profiles WHERE chat_id = ?1 AND name = ?2",
            params![chat_id, name],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Err(Error::DuplicateProfile {
                name: name.to_string(),
            });
        }
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO vpn_profiles (chat_id, name, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![chat_id, name, ProfileStatus::Active.as_str(), now],
        )?;
        debug!("Created profile '{}' for chat {}", name, chat_id);
        Ok(VpnProfile {
            chat_id,
            name: name.to_string(),
            status: ProfileStatus::Active,
            created_at: now,
        })
    }

    /// Get a profile by owner and name
    pub fn get_profile(&self, chat_id: ChatId, name: &str) -> Result<Option<VpnProfile>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT chat_id, name, status, created_at
                 FROM vpn_profiles WHERE chat_id = ?1 AND name = ?2",
                params![chat_id, name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(chat_id, name, status, created_at)| {
            Ok(VpnProfile {
                chat_id,
                name,
                status: parse_status(&status)?,
                created_at,
            })
        })
        .transpose()
    }

    /// Profiles owned by the user, in insertion order
    pub fn list_profiles(&self, chat_id: ChatId) -> Result<Vec<VpnProfile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT chat_id, name, status, created_at
             FROM vpn_profiles WHERE chat_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![chat_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut profiles = Vec::new();
        for row in rows {
            let (chat_id, name, status, created_at) = row?;
            profiles.push(VpnProfile {
                chat_id,
                name,
                status: parse_status(&status)?,
                created_at,
            });
        }
        Ok(profiles)
    }

    /// Delete a profile
    pub fn delete_profile(&self, chat_id: ChatId, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM vpn_profiles WHERE chat_id = ?1 AND name = ?2",
            params![chat_id, name],
        )?;
        if rows == 0 {
            return Err(Error::ProfileNotFound {
                name: name.to_string(),
            });
        }
        debug!("Deleted profile '{}' for chat {}", name, chat_id);
        Ok(())
    }

    /// Flip a profile's status. Rejects a no-op transition.
    pub fn set_profile_status(
        &self,
        chat_id: ChatId,
        name: &str,
        status: ProfileStatus,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM vpn_profiles WHERE chat_id = ?1 AND name = ?2",
                params![chat_id, name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(Error::ProfileNotFound {
                name: name.to_string(),
            });
        };
        if parse_status(&current)? == status {
            return Err(Error::AlreadyInState {
                name: name.to_string(),
                status,
            });
        }
        conn.execute(
            "UPDATE vpn_profiles SET status = ?1 WHERE chat_id = ?2 AND name = ?3",
            params![status.as_str(), chat_id, name],
        )?;
        debug!("Profile '{}' of chat {} is now {}", name, chat_id, status);
        Ok(())
    }

    // ========================================================================
    // Token store
    // ========================================================================

    /// Insert a freshly generated token
    pub fn insert_token(&self, token: &str, balance: i64) -> Result<AccessToken> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO access_tokens (token, balance, created_at) VALUES (?1, ?2, ?3)",
            params![token, balance, now],
        )?;
        debug!("Inserted token with balance {}", balance);
        Ok(AccessToken {
            token: token.to_string(),
            balance,
            created_at: now,
        })
    }

    /// Get a token record
    pub fn get_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT token, balance, created_at FROM access_tokens WHERE token = ?1",
                params![token],
                |row| {
                    Ok(AccessToken {
                        token: row.get(0)?,
                        balance: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Adjust a balance by a signed delta, flooring at zero.
    /// Returns the new balance.
    pub fn adjust_balance(&self, token: &str, delta: i64) -> Result<i64> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE access_tokens SET balance = MAX(0, balance + ?1) WHERE token = ?2",
            params![delta, token],
        )?;
        if rows == 0 {
            return Err(Error::TokenNotFound(token.to_string()));
        }
        let balance = conn.query_row(
            "SELECT balance FROM access_tokens WHERE token = ?1",
            params![token],
            |row| row.get(0),
        )?;
        Ok(balance)
    }

    /// Set a balance outright
    pub fn set_balance(&self, token: &str, balance: i64) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE access_tokens SET balance = ?1 WHERE token = ?2",
            params![balance, token],
        )?;
        if rows == 0 {
            return Err(Error::TokenNotFound(token.to_string()));
        }
        Ok(())
    }

    /// All tokens, oldest first
    pub fn list_tokens(&self) -> Result<Vec<AccessToken>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT token, balance, created_at FROM access_tokens ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AccessToken {
                token: row.get(0)?,
                balance: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;

        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(row?);
        }
        Ok(tokens)
    }
}

fn parse_status(s: &str) -> Result<ProfileStatus> {
    ProfileStatus::parse(s).ok_or_else(|| Error::Internal(format!("unknown profile status '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_user_is_idempotent() {
        let db = Database::open_memory().unwrap();
        let a = db.ensure_user(42).unwrap();
        let b = db.ensure_user(42).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.chat_id, 42);
        assert!(b.token.is_none());
    }

    #[test]
    fn create_list_delete_profiles() {
        let db = Database::open_memory().unwrap();

        db.create_profile(1, "laptop").unwrap();
        db.create_profile(1, "phone").unwrap();
        // Another user's profiles must not leak into the listing
        db.create_profile(2, "laptop").unwrap();

        let names: Vec<String> = db
            .list_profiles(1)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["laptop", "phone"]);

        db.delete_profile(1, "phone").unwrap();
        let names: Vec<String> = db
            .list_profiles(1)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["laptop"]);

        // The other user's set is untouched
        assert_eq!(db.list_profiles(2).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_profile_is_rejected() {
        let db = Database::open_memory().unwrap();
        db.create_profile(1, "x").unwrap();
        let err = db.create_profile(1, "x").unwrap_err();
        assert!(matches!(err, Error::DuplicateProfile { .. }));
        assert_eq!(db.list_profiles(1).unwrap().len(), 1);
    }

    #[test]
    fn delete_missing_profile_is_not_found() {
        let db = Database::open_memory().unwrap();
        db.create_profile(1, "x").unwrap();
        let err = db.delete_profile(1, "missing").unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound { .. }));
        assert_eq!(db.list_profiles(1).unwrap().len(), 1);
    }

    #[test]
    fn status_transitions() {
        let db = Database::open_memory().unwrap();
        db.create_profile(1, "x").unwrap();

        db.set_profile_status(1, "x", ProfileStatus::Suspended).unwrap();
        let err = db
            .set_profile_status(1, "x", ProfileStatus::Suspended)
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyInState { .. }));

        db.set_profile_status(1, "x", ProfileStatus::Active).unwrap();
        assert_eq!(
            db.get_profile(1, "x").unwrap().unwrap().status,
            ProfileStatus::Active
        );

        let err = db
            .set_profile_status(1, "missing", ProfileStatus::Suspended)
            .unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound { .. }));
    }

    #[test]
    fn link_unknown_token_fails() {
        let db = Database::open_memory().unwrap();
        let err = db.link_token(1, "deadbeef").unwrap_err();
        assert!(matches!(err, Error::TokenNotFound(_)));
        assert!(db.linked_token(1).unwrap().is_none());
    }

    #[test]
    fn link_and_unlink_token() {
        let db = Database::open_memory().unwrap();
        db.insert_token("cafe01", 50).unwrap();

        let balance = db.link_token(7, "cafe01").unwrap();
        assert_eq!(balance, 50);
        assert_eq!(db.linked_token(7).unwrap().unwrap().token, "cafe01");

        // A second link is a conflict, not a replacement
        db.insert_token("cafe02", 10).unwrap();
        let err = db.link_token(7, "cafe02").unwrap_err();
        assert!(matches!(err, Error::AlreadyLinked(t) if t == "cafe01"));

        assert_eq!(db.unlink_token(7).unwrap(), "cafe01");
        assert!(matches!(db.unlink_token(7).unwrap_err(), Error::NoToken));
        assert!(db.linked_token(7).unwrap().is_none());
    }

    #[test]
    fn token_balance_round_trip() {
        let db = Database::open_memory().unwrap();
        db.insert_token("feed01", 100).unwrap();

        assert_eq!(db.adjust_balance("feed01", -30).unwrap(), 70);
        let listed = db.list_tokens().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].token, "feed01");
        assert_eq!(listed[0].balance, 70);

        // Balances floor at zero
        assert_eq!(db.adjust_balance("feed01", -500).unwrap(), 0);

        db.set_balance("feed01", 25).unwrap();
        assert_eq!(db.get_token("feed01").unwrap().unwrap().balance, 25);
    }

    #[test]
    fn token_mutations_report_missing_tokens() {
        let db = Database::open_memory().unwrap();
        assert!(matches!(
            db.adjust_balance("nope", 5).unwrap_err(),
            Error::TokenNotFound(_)
        ));
        assert!(matches!(
            db.set_balance("nope", 5).unwrap_err(),
            Error::TokenNotFound(_)
        ));
    }
}
