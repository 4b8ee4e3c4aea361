//! Chat command routing
//!
//! Parses `/<verb> [argument]` lines, drives the registries and the peer
//! provisioner, and renders replies. Every error is converted to a reply at
//! this boundary; nothing propagates to the transport.

use crate::artifacts;
use crate::session::PendingAction;
use crate::state::AppState;
use crate::wg::PeerBackend;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::utils::html::escape;
use tracing::warn;
use wgaccess_common::types::{peer_id, ChatId, ProfileStatus, VpnProfile};
use wgaccess_common::Error;

const HELP: &str = "\
/start - Initialize user in the system\n\
/register <token> - Register a token\n\
/add <name> - Add a new VPN profile\n\
/list - List your VPN profiles\n\
/get <name> - Resend the .conf file and QR code for a profile\n\
/delete <name> - Delete a VPN profile\n\
/suspend <name> - Suspend a VPN profile\n\
/resume <name> - Resume a VPN profile\n\
/unregister - Unregister your token\n\
/info - Show your token and balance\n\
/balance - Show your balance\n\
/help - Show this help message";

/// Parsed inbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Add(Option<String>),
    List,
    Delete(Option<String>),
    Get(Option<String>),
    Register(Option<String>),
    Unregister,
    Info,
    Balance,
    Suspend(Option<String>),
    Resume(Option<String>),
}

impl Command {
    /// Parse a `/verb [argument]` line. Unknown verbs yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let (verb, arg) = match rest.split_once(char::is_whitespace) {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (rest, ""),
        };
        // Group chats append "@botname" to the verb
        let verb = verb.split('@').next().unwrap_or(verb);
        let arg = (!arg.is_empty()).then(|| arg.to_string());

        Some(match verb {
            "start" => Command::Start,
            "help" => Command::Help,
            "add" => Command::Add(arg),
            "list" => Command::List,
            "delete" => Command::Delete(arg),
            "get" => Command::Get(arg),
            "register" => Command::Register(arg),
            "unregister" => Command::Unregister,
            "info" => Command::Info,
            "balance" => Command::Balance,
            "suspend" => Command::Suspend(arg),
            "resume" => Command::Resume(arg),
            _ => return None,
        })
    }
}

/// One outbound reply unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// HTML-formatted text; user-supplied values are escaped at render time
    Text(String),
    Document { path: PathBuf, caption: String },
    Photo { path: PathBuf, caption: String },
}

/// Dispatches inbound messages to the registries and the peer provisioner
pub struct Router {
    state: AppState,
    peers: Arc<dyn PeerBackend>,
}

impl Router {
    pub fn new(state: AppState, peers: Arc<dyn PeerBackend>) -> Self {
        Self { state, peers }
    }

    /// Handle one inbound message. `None` means no reply at all.
    pub async fn handle(&self, chat_id: ChatId, text: &str) -> Option<Vec<Reply>> {
        let text = text.trim();

        // A pending prompt consumes the next message whatever it says;
        // name validation decides whether it was usable.
        if let Some(action) = self.state.sessions().take(chat_id) {
            return Some(self.finish_pending(chat_id, action, text).await);
        }

        let cmd = Command::parse(text)?;
        Some(self.dispatch(chat_id, cmd).await)
    }

    async fn dispatch(&self, chat_id: ChatId, cmd: Command) -> Vec<Reply> {
        match cmd {
            Command::Start => match self.state.db().ensure_user(chat_id) {
                Ok(_) => vec![Reply::Text(
                    "Welcome to the VPN access bot! Use /help to see the available commands."
                        .to_string(),
                )],
                Err(e) => vec![error_reply(&e)],
            },
            Command::Help => vec![Reply::Text(HELP.to_string())],
            Command::Add(Some(name)) => self.do_add(chat_id, &name).await,
            Command::Add(None) => self.prompt(chat_id, PendingAction::AddProfile),
            Command::List => self.do_list(chat_id),
            Command::Delete(Some(name)) => self.do_delete(chat_id, &name).await,
            Command::Delete(None) => vec![Reply::Text(
                "Please provide the name of the profile to delete.".to_string(),
            )],
            Command::Get(Some(name)) => self.do_get(chat_id, &name),
            Command::Get(None) => vec![Reply::Text(
                "Please provide the name of the profile to get.".to_string(),
            )],
            Command::Register(Some(token)) => self.do_register(chat_id, &token),
            Command::Register(None) => vec![Reply::Text(
                "Please provide the token to register.".to_string(),
            )],
            Command::Unregister => self.do_unregister(chat_id),
            Command::Info => self.do_info(chat_id),
            Command::Balance => self.do_balance(chat_id),
            Command::Suspend(Some(name)) => {
                self.do_set_status(chat_id, &name, ProfileStatus::Suspended).await
            }
            Command::Suspend(None) => self.prompt(chat_id, PendingAction::SuspendProfile),
            Command::Resume(Some(name)) => {
                self.do_set_status(chat_id, &name, ProfileStatus::Active).await
            }
            Command::Resume(None) => self.prompt(chat_id, PendingAction::ResumeProfile),
        }
    }

    fn prompt(&self, chat_id: ChatId, action: PendingAction) -> Vec<Reply> {
        self.state.sessions().begin(chat_id, action);
        let verb = match action {
            PendingAction::AddProfile => "add",
            PendingAction::SuspendProfile => "suspend",
            PendingAction::ResumeProfile => "resume",
        };
        vec![Reply::Text(format!(
            "Which profile do you want to {verb}? Send the name as your next message."
        ))]
    }

    async fn finish_pending(
        &self,
        chat_id: ChatId,
        action: PendingAction,
        text: &str,
    ) -> Vec<Reply> {
        match action {
            PendingAction::AddProfile => self.do_add(chat_id, text).await,
            PendingAction::SuspendProfile => {
                self.do_set_status(chat_id, text, ProfileStatus::Suspended).await
            }
            PendingAction::ResumeProfile => {
                self.do_set_status(chat_id, text, ProfileStatus::Active).await
            }
        }
    }

    async fn do_add(&self, chat_id: ChatId, name: &str) -> Vec<Reply> {
        match self.state.create_profile(chat_id, name) {
            Ok(_) => {
                let peer = peer_id(chat_id, name);
                let mut replies = Vec::new();
                match self.peers.add_peer(&peer).await {
                    Ok(()) => replies.push(Reply::Text(format!(
                        "VPN profile <b>{}</b> added. Your WireGuard config and QR code follow.",
                        escape(name)
                    ))),
                    Err(e) => {
                        warn!("Peer add failed for {}: {}", peer, e);
                        replies.push(Reply::Text(format!(
                            "VPN profile <b>{}</b> was recorded, but the VPN peer may not be active: {}",
                            escape(name),
                            escape(&e.to_string())
                        )));
                    }
                }
                replies.extend(self.artifact_replies(chat_id, name));
                replies
            }
            // Soft conflict: the profile is already there, just resend its artifacts
            Err(Error::DuplicateProfile { .. }) => {
                let mut replies = vec![Reply::Text(format!(
                    "VPN profile <b>{}</b> already exists.",
                    escape(name)
                ))];
                replies.extend(self.artifact_replies(chat_id, name));
                replies
            }
            Err(e) => vec![error_reply(&e)],
        }
    }

    fn do_list(&self, chat_id: ChatId) -> Vec<Reply> {
        match self.state.db().list_profiles(chat_id) {
            Ok(profiles) if profiles.is_empty() => {
                vec![Reply::Text("You have no VPN profiles.".to_string())]
            }
            Ok(profiles) => vec![Reply::Text(format_profiles(&profiles))],
            Err(e) => vec![error_reply(&e)],
        }
    }

    fn do_get(&self, chat_id: ChatId, name: &str) -> Vec<Reply> {
        match self.state.db().get_profile(chat_id, name) {
            Ok(Some(_)) => self.artifact_replies(chat_id, name),
            Ok(None) => vec![Reply::Text(format!(
                "VPN profile <b>{}</b> not found.",
                escape(name)
            ))],
            Err(e) => vec![error_reply(&e)],
        }
    }

    async fn do_delete(&self, chat_id: ChatId, name: &str) -> Vec<Reply> {
        match self.state.db().delete_profile(chat_id, name) {
            Ok(()) => {
                let peer = peer_id(chat_id, name);
                match self.peers.remove_peer(&peer).await {
                    Ok(()) => vec![Reply::Text(format!(
                        "VPN profile <b>{}</b> deleted.",
                        escape(name)
                    ))],
                    Err(e) => {
                        warn!("Peer remove failed for {}: {}", peer, e);
                        vec![Reply::Text(format!(
                            "VPN profile <b>{}</b> deleted, but the VPN peer may still be active: {}",
                            escape(name),
                            escape(&e.to_string())
                        ))]
                    }
                }
            }
            Err(e) => vec![error_reply(&e)],
        }
    }

    async fn do_set_status(
        &self,
        chat_id: ChatId,
        name: &str,
        status: ProfileStatus,
    ) -> Vec<Reply> {
        if let Err(e) = self.state.db().set_profile_status(chat_id, name, status) {
            return vec![error_reply(&e)];
        }
        let peer = peer_id(chat_id, name);
        let result = match status {
            ProfileStatus::Suspended => self.peers.suspend_peer(&peer).await,
            ProfileStatus::Active => self.peers.resume_peer(&peer).await,
        };
        let verb = match status {
            ProfileStatus::Suspended => "suspended",
            ProfileStatus::Active => "resumed",
        };
        match result {
            Ok(()) => vec![Reply::Text(format!(
                "VPN profile <b>{}</b> {verb}.",
                escape(name)
            ))],
            Err(e) => {
                warn!("Peer {} failed for {}: {}", verb, peer, e);
                vec![Reply::Text(format!(
                    "VPN profile <b>{}</b> {verb} in the registry, but the peer state may be unchanged: {}",
                    escape(name),
                    escape(&e.to_string())
                ))]
            }
        }
    }

    fn do_register(&self, chat_id: ChatId, token: &str) -> Vec<Reply> {
        match self.state.db().link_token(chat_id, token) {
            Ok(balance) => vec![
                Reply::Text(format!(
                    "Token <code>{}</code> registered.",
                    escape(token)
                )),
                Reply::Text(format!("Your balance is {balance}.")),
            ],
            Err(e) => vec![error_reply(&e)],
        }
    }

    fn do_unregister(&self, chat_id: ChatId) -> Vec<Reply> {
        match self.state.db().unlink_token(chat_id) {
            Ok(token) => vec![Reply::Text(format!(
                "Token <code>{}</code> unregistered.",
                escape(&token)
            ))],
            Err(e) => vec![error_reply(&e)],
        }
    }

    fn do_info(&self, chat_id: ChatId) -> Vec<Reply> {
        match self.state.db().linked_token(chat_id) {
            Ok(Some(token)) => vec![
                Reply::Text(format!("Your token is <code>{}</code>.", escape(&token.token))),
                Reply::Text(format!("Your balance is {}.", token.balance)),
            ],
            Ok(None) => vec![Reply::Text("You don't have any token.".to_string())],
            Err(e) => vec![error_reply(&e)],
        }
    }

    fn do_balance(&self, chat_id: ChatId) -> Vec<Reply> {
        match self.state.db().linked_token(chat_id) {
            Ok(Some(token)) => vec![Reply::Text(format!("Your balance is {}.", token.balance))],
            Ok(None) => vec![Reply::Text("You don't have any token.".to_string())],
            Err(e) => vec![error_reply(&e)],
        }
    }

    fn artifact_replies(&self, chat_id: ChatId, name: &str) -> Vec<Reply> {
        let peer = peer_id(chat_id, name);
        match artifacts::locate(&self.state.config().wg.config_root, &peer) {
            Ok(found) => vec![
                Reply::Document {
                    path: found.conf,
                    caption: format!("{name}.conf"),
                },
                Reply::Photo {
                    path: found.qr,
                    caption: format!("{name}.png"),
                },
            ],
            Err(e) => {
                warn!("Artifacts unavailable for {}: {}", peer, e);
                vec![Reply::Text(format!(
                    "The config files for <b>{}</b> are not available yet.",
                    escape(name)
                ))]
            }
        }
    }
}

fn error_reply(e: &Error) -> Reply {
    Reply::Text(escape(&e.to_string()))
}

fn format_profiles(profiles: &[VpnProfile]) -> String {
    let mut out = String::from("Your VPN profiles:");
    for profile in profiles {
        let created = chrono::DateTime::from_timestamp(profile.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| profile.created_at.to_string());
        out.push_str(&format!(
            "\n• <b>{}</b> ({}) created {}",
            escape(&profile.name),
            profile.status,
            created
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BotConfig, SessionConfig, WgConfig};
    use crate::session::Sessions;
    use crate::wg::PeerAction;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use wgaccess_common::{Database, Result};

    struct FakeBackend {
        calls: Mutex<Vec<(PeerAction, String)>>,
        fail: bool,
    }

    impl FakeBackend {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn calls(&self) -> Vec<(PeerAction, String)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl PeerBackend for FakeBackend {
        async fn run(&self, action: PeerAction, peer_id: &str) -> Result<()> {
            self.calls.lock().push((action, peer_id.to_string()));
            if self.fail {
                Err(Error::PeerCommand("boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        router: Router,
        backend: Arc<FakeBackend>,
        db: Database,
        // Keeps the artifact directory alive for the test's duration
        _dir: TempDir,
    }

    fn fixture(fail: bool, require_balance: bool, session_ttl: Duration) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BotConfig::default();
        config.store_path = dir.path().to_path_buf();
        config.wg = WgConfig {
            command: vec!["true".to_string()],
            config_root: dir.path().join("wg_config"),
            timeout_secs: 5,
        };
        config.policy.require_token_balance = require_balance;
        config.session = SessionConfig {
            timeout_secs: session_ttl.as_secs(),
        };

        let db = Database::open_memory().unwrap();
        let sessions = Sessions::new(session_ttl);
        let backend = FakeBackend::new(fail);
        let state = AppState::new(config, db.clone(), sessions);
        let router = Router::new(state, backend.clone());
        Fixture {
            router,
            backend,
            db,
            _dir: dir,
        }
    }

    fn write_artifacts(fx: &Fixture, peer: &str) {
        let dir = fx
            .router
            .state
            .config()
            .wg
            .config_root
            .join(format!("peer_{peer}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("peer_{peer}.conf")), "[Interface]").unwrap();
        std::fs::write(dir.join(format!("peer_{peer}.png")), [0u8; 4]).unwrap();
    }

    fn text_of(reply: &Reply) -> &str {
        match reply {
            Reply::Text(text) => text,
            other => panic!("expected text reply, got {other:?}"),
        }
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(
            Command::parse("/add laptop"),
            Some(Command::Add(Some("laptop".to_string())))
        );
        assert_eq!(Command::parse("/add"), Some(Command::Add(None)));
        assert_eq!(Command::parse("/add   "), Some(Command::Add(None)));
        assert_eq!(Command::parse("/list@vpnbot"), Some(Command::List));
        assert_eq!(Command::parse("/frobnicate"), None);
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse("/"), None);
    }

    #[tokio::test]
    async fn unknown_verbs_and_plain_text_are_ignored() {
        let fx = fixture(false, false, Duration::from_secs(60));
        assert!(fx.router.handle(1, "/frobnicate").await.is_none());
        assert!(fx.router.handle(1, "just chatting").await.is_none());
    }

    #[tokio::test]
    async fn start_registers_user() {
        let fx = fixture(false, false, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/start").await.unwrap();
        assert!(text_of(&replies[0]).contains("Welcome"));
        assert!(fx.db.get_user(1).unwrap().is_some());
    }

    #[tokio::test]
    async fn add_creates_profile_and_provisions_peer() {
        let fx = fixture(false, false, Duration::from_secs(60));
        write_artifacts(&fx, "1-laptop");

        let replies = fx.router.handle(1, "/add laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("added"));
        assert!(matches!(replies[1], Reply::Document { .. }));
        assert!(matches!(replies[2], Reply::Photo { .. }));

        assert_eq!(fx.backend.calls(), vec![(PeerAction::Add, "1-laptop".to_string())]);
        assert_eq!(fx.db.list_profiles(1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_add_is_soft_and_redelivers_artifacts() {
        let fx = fixture(false, false, Duration::from_secs(60));
        write_artifacts(&fx, "1-laptop");

        fx.router.handle(1, "/add laptop").await.unwrap();
        let replies = fx.router.handle(1, "/add laptop").await.unwrap();

        assert!(text_of(&replies[0]).contains("already exists"));
        assert!(matches!(replies[1], Reply::Document { .. }));
        assert_eq!(fx.db.list_profiles(1).unwrap().len(), 1);
        // The peer tool only ran for the first add
        assert_eq!(fx.backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn add_reports_missing_artifacts() {
        let fx = fixture(false, false, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/add laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("added"));
        assert!(text_of(&replies[1]).contains("not available"));
    }

    #[tokio::test]
    async fn add_with_failing_tool_degrades_gracefully() {
        let fx = fixture(true, false, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/add laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("may not be active"));
        // The registry write is kept even though the tool failed
        assert_eq!(fx.db.list_profiles(1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_profile_name_is_rejected() {
        let fx = fixture(false, false, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/add my-phone").await.unwrap();
        assert!(text_of(&replies[0]).contains("letters, digits and underscores"));
        assert!(fx.db.list_profiles(1).unwrap().is_empty());
        assert!(fx.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn two_step_add_uses_next_message_as_name() {
        let fx = fixture(false, false, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/add").await.unwrap();
        assert!(text_of(&replies[0]).contains("next message"));

        let replies = fx.router.handle(1, "homelaptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("added"));
        assert_eq!(fx.db.list_profiles(1).unwrap().len(), 1);

        // The prompt was consumed; further plain text is ignored again
        assert!(fx.router.handle(1, "another").await.is_none());
    }

    #[tokio::test]
    async fn expired_prompt_does_not_capture_later_messages() {
        let fx = fixture(false, false, Duration::ZERO);
        fx.router.handle(1, "/add").await.unwrap();
        assert!(fx.router.handle(1, "homelaptop").await.is_none());
        assert!(fx.db.list_profiles(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompts_are_scoped_per_user() {
        let fx = fixture(false, false, Duration::from_secs(60));
        fx.router.handle(1, "/add").await.unwrap();
        // A different user's plain text is not captured by user 1's prompt
        assert!(fx.router.handle(2, "sneaky").await.is_none());
        let replies = fx.router.handle(1, "laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("added"));
    }

    #[tokio::test]
    async fn suspend_and_resume_flow() {
        let fx = fixture(false, false, Duration::from_secs(60));
        fx.router.handle(1, "/add laptop").await.unwrap();

        let replies = fx.router.handle(1, "/suspend laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("suspended"));

        let replies = fx.router.handle(1, "/suspend laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("already suspended"));

        let replies = fx.router.handle(1, "/resume laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("resumed"));

        // Resume re-issues `add` against the external tool
        assert_eq!(
            fx.backend.calls(),
            vec![
                (PeerAction::Add, "1-laptop".to_string()),
                (PeerAction::Suspend, "1-laptop".to_string()),
                (PeerAction::Add, "1-laptop".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn suspend_unknown_profile_is_not_found() {
        let fx = fixture(false, false, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/suspend ghost").await.unwrap();
        assert!(text_of(&replies[0]).contains("not found"));
        assert!(fx.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_profile_and_peer() {
        let fx = fixture(false, false, Duration::from_secs(60));
        fx.router.handle(1, "/add laptop").await.unwrap();

        let replies = fx.router.handle(1, "/delete laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("deleted"));
        assert!(fx.db.list_profiles(1).unwrap().is_empty());
        assert_eq!(
            fx.backend.calls().last().unwrap(),
            &(PeerAction::Remove, "1-laptop".to_string())
        );

        let replies = fx.router.handle(1, "/delete laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("not found"));
    }

    #[tokio::test]
    async fn list_shows_profiles_in_insertion_order() {
        let fx = fixture(false, false, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/list").await.unwrap();
        assert_eq!(text_of(&replies[0]), "You have no VPN profiles.");

        fx.router.handle(1, "/add laptop").await.unwrap();
        fx.router.handle(1, "/add phone").await.unwrap();
        let replies = fx.router.handle(1, "/list").await.unwrap();
        let listing = text_of(&replies[0]);
        let laptop = listing.find("laptop").unwrap();
        let phone = listing.find("phone").unwrap();
        assert!(laptop < phone);
    }

    #[tokio::test]
    async fn get_redelivers_without_reprovisioning() {
        let fx = fixture(false, false, Duration::from_secs(60));
        write_artifacts(&fx, "1-laptop");
        fx.router.handle(1, "/add laptop").await.unwrap();
        let calls_after_add = fx.backend.calls().len();

        let replies = fx.router.handle(1, "/get laptop").await.unwrap();
        assert!(matches!(replies[0], Reply::Document { .. }));
        assert!(matches!(replies[1], Reply::Photo { .. }));
        assert_eq!(fx.backend.calls().len(), calls_after_add);

        let replies = fx.router.handle(1, "/get ghost").await.unwrap();
        assert!(text_of(&replies[0]).contains("not found"));
    }

    #[tokio::test]
    async fn register_unregister_info_balance() {
        let fx = fixture(false, false, Duration::from_secs(60));
        fx.db.insert_token("cafe01", 100).unwrap();

        let replies = fx.router.handle(1, "/register nope").await.unwrap();
        assert!(text_of(&replies[0]).contains("not found"));

        let replies = fx.router.handle(1, "/register cafe01").await.unwrap();
        assert!(text_of(&replies[0]).contains("registered"));
        assert!(text_of(&replies[1]).contains("100"));

        let replies = fx.router.handle(1, "/register cafe01").await.unwrap();
        assert!(text_of(&replies[0]).contains("already have a token"));

        let replies = fx.router.handle(1, "/info").await.unwrap();
        assert!(text_of(&replies[0]).contains("cafe01"));
        assert!(text_of(&replies[1]).contains("100"));

        let replies = fx.router.handle(1, "/balance").await.unwrap();
        assert_eq!(text_of(&replies[0]), "Your balance is 100.");

        let replies = fx.router.handle(1, "/unregister").await.unwrap();
        assert!(text_of(&replies[0]).contains("unregistered"));

        let replies = fx.router.handle(1, "/info").await.unwrap();
        assert_eq!(text_of(&replies[0]), "You don't have any token.");
    }

    #[tokio::test]
    async fn missing_arguments_prompt_without_session() {
        let fx = fixture(false, false, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/delete").await.unwrap();
        assert!(text_of(&replies[0]).contains("provide the name"));
        // No session was armed; plain text stays ignored
        assert!(fx.router.handle(1, "laptop").await.is_none());
    }

    #[tokio::test]
    async fn balance_gate_blocks_creation_without_token() {
        let fx = fixture(false, true, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/add laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("positive balance"));
        assert!(fx.db.list_profiles(1).unwrap().is_empty());

        fx.db.insert_token("cafe01", 1).unwrap();
        fx.router.handle(1, "/register cafe01").await.unwrap();
        let replies = fx.router.handle(1, "/add laptop").await.unwrap();
        assert!(text_of(&replies[0]).contains("added"));
    }

    #[tokio::test]
    async fn user_text_is_html_escaped() {
        let fx = fixture(false, false, Duration::from_secs(60));
        let replies = fx.router.handle(1, "/get <b>x</b>").await.unwrap();
        let text = text_of(&replies[0]);
        assert!(text.contains("&lt;b&gt;"));
        assert!(!text.contains("<b>x</b>"));
    }
}
