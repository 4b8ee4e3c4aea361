//! Telegram transport adapter
//!
//! Keeps teloxide at the edge: updates are unwrapped to a chat id and text,
//! routed, and the router's replies are mapped back to Telegram sends.

use crate::router::{Reply, Router};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use teloxide::{dptree, RequestError};
use tracing::warn;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dispatch Telegram updates until shutdown (ctrl-c)
pub async fn run(bot: Bot, router: Arc<Router>) {
    let handler = Update::filter_message().endpoint(on_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn on_message(bot: Bot, msg: Message, router: Arc<Router>) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(replies) = router.handle(msg.chat.id.0, text).await else {
        return Ok(());
    };
    for reply in replies {
        if let Err(e) = send(&bot, msg.chat.id, reply).await {
            warn!("Failed to send reply to chat {}: {}", msg.chat.id, e);
        }
    }
    Ok(())
}

async fn send(bot: &Bot, chat: ChatId, reply: Reply) -> Result<(), RequestError> {
    match reply {
        Reply::Text(text) => {
            bot.send_message(chat, text)
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Reply::Document { path, caption } => {
            bot.send_document(chat, InputFile::file(path).file_name(caption.clone()))
                .caption(caption)
                .await?;
        }
        Reply::Photo { path, caption } => {
            bot.send_photo(chat, InputFile::file(path)).caption(caption).await?;
        }
    }
    Ok(())
}
