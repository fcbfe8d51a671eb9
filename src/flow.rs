use crate::commands::transfer::run_transfer;
use crate::commands::vibe::{failure_text, run_change};
use crate::db::Identity;
use crate::directory::{GuildDirectory, RecipientDirectory, StoredDirectory};
use crate::error::VibeError;
use crate::render;
use crate::services::vibe::{parse_amount, VibeService};
use crate::session::PendingStep;
use crate::{chat_id_of, Data, Error};
use poise::serenity_prelude as serenity;
use tracing::{debug, info};

/// Who a transfer-target message points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    User { user_id: u64, username: String },
    Handle(String),
    Missing,
}

/// A mention wins, then the author of the replied-to message, then `@handle` text.
pub fn parse_target(message: &serenity::Message, bot_id: u64) -> Target {
    let is_candidate = |user: &serenity::User| !user.bot && user.id.get() != bot_id;

    if let Some(user) = message.mentions.iter().find(|u| is_candidate(u)) {
        return Target::User {
            user_id: user.id.get(),
            username: user.name.clone(),
        };
    }

    if let Some(referenced) = message.referenced_message.as_deref() {
        if is_candidate(&referenced.author) {
            return Target::User {
                user_id: referenced.author.id.get(),
                username: referenced.author.name.clone(),
            };
        }
    }

    let text = message.content.trim();
    match text.strip_prefix('@') {
        Some(handle) if !handle.trim().is_empty() => Target::Handle(handle.trim().to_string()),
        _ => Target::Missing,
    }
}

/// Feed a plain message to the author's pending flow in this chat, if any.
/// Returns whether the message was consumed.
pub async fn handle_pending_message(
    ctx: &serenity::Context,
    message: &serenity::Message,
    data: &Data,
) -> Result<bool, Error> {
    if message.author.bot {
        return Ok(false);
    }

    let chat_id = chat_id_of(message.guild_id, message.channel_id);
    let key = (message.author.id.get(), chat_id);
    let Some(step) = data.sessions.current(key, message.channel_id.get()) else {
        return Ok(false);
    };

    debug!("Flow: message from user {} continues {:?}", key.0, step);
    let who = Identity::new(key.0, chat_id, message.author.name.clone());

    let reply = match step {
        PendingStep::AwaitingNote { delta } => {
            if !data.sessions.finish(key, step) {
                return Ok(false);
            }
            run_change(data, who, delta, Some(message.content.clone())).await
        }
        PendingStep::AwaitingTransferAmount => match parse_amount(&message.content, None) {
            Err(e) => render::error_reply(&e),
            Ok(amount) => {
                let service = VibeService::new(data.db.clone());
                match service.ensure_balance(&who, amount).await {
                    Ok(_) => {
                        let next = PendingStep::AwaitingTransferTarget { amount };
                        if data.sessions.advance(key, step, next) {
                            render::transfer_target_prompt().to_string()
                        } else {
                            render::flow_expired().to_string()
                        }
                    }
                    Err(e) => {
                        data.sessions.finish(key, step);
                        failure_text("Transfer", &e)
                    }
                }
            }
        },
        PendingStep::AwaitingTransferTarget { amount } => {
            match resolve_target(ctx, message, data, chat_id).await {
                Err(VibeError::RecipientNotFound) => render::error_reply(&VibeError::RecipientNotFound),
                Err(e) => {
                    data.sessions.finish(key, step);
                    failure_text("Recipient lookup", &e)
                }
                Ok(recipient) => {
                    if !data.sessions.finish(key, step) {
                        return Ok(false);
                    }
                    if recipient.user_id == who.user_id {
                        render::error_reply(&VibeError::SelfTransfer)
                    } else {
                        info!(
                            "Flow: user {} picked user {} as transfer target",
                            who.user_id, recipient.user_id
                        );
                        run_transfer(data, who, recipient, amount).await
                    }
                }
            }
        }
    };

    message.reply(&ctx.http, reply).await?;
    Ok(true)
}

async fn resolve_target(
    ctx: &serenity::Context,
    message: &serenity::Message,
    data: &Data,
    chat_id: u64,
) -> Result<Identity, VibeError> {
    match parse_target(message, data.bot_id) {
        Target::User { user_id, username } => Ok(Identity::new(user_id, chat_id, username)),
        Target::Handle(handle) => {
            let directory: Box<dyn RecipientDirectory> = if message.guild_id.is_some() {
                Box::new(GuildDirectory::new(data.db.clone(), ctx.http.clone()))
            } else {
                Box::new(StoredDirectory::new(data.db.clone()))
            };
            directory.resolve(chat_id, &handle).await
        }
        Target::Missing => Err(VibeError::RecipientNotFound),
    }
}
