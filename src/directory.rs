use crate::db::{Database, Identity};
use crate::error::VibeError;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves `@handle` text typed by a user into a chat member.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn resolve(&self, chat_id: u64, handle: &str) -> Result<Identity, VibeError>;
}

fn normalize_handle(handle: &str) -> Option<&str> {
    let trimmed = handle.trim().trim_start_matches('@').trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        None
    } else {
        Some(trimmed)
    }
}

/// Looks handles up among users the ledger has already seen in the chat.
#[derive(Clone)]
pub struct StoredDirectory {
    db: Database,
}

impl StoredDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecipientDirectory for StoredDirectory {
    async fn resolve(&self, chat_id: u64, handle: &str) -> Result<Identity, VibeError> {
        let Some(name) = normalize_handle(handle) else {
            return Err(VibeError::RecipientNotFound);
        };
        let name = name.to_string();
        let record = self
            .db
            .run_blocking(move |db| db.find_user_by_username(chat_id, &name))
            .await
            .map_err(VibeError::Store)?;

        record
            .map(|r| Identity::new(r.user_id, r.chat_id, r.username))
            .ok_or(VibeError::RecipientNotFound)
    }
}

/// Keeps the account handle so later `@handle` lookups still match.
fn member_identity(chat_id: u64, user: &serenity::User) -> Identity {
    Identity::new(user.id.get(), chat_id, user.name.clone())
}

/// Stored lookup, then confirms the user is still a member of the guild.
pub struct GuildDirectory {
    stored: StoredDirectory,
    http: Arc<serenity::Http>,
}

impl GuildDirectory {
    pub fn new(db: Database, http: Arc<serenity::Http>) -> Self {
        Self {
            stored: StoredDirectory::new(db),
            http,
        }
    }
}

#[async_trait]
impl RecipientDirectory for GuildDirectory {
    async fn resolve(&self, chat_id: u64, handle: &str) -> Result<Identity, VibeError> {
        let found = self.stored.resolve(chat_id, handle).await?;

        let guild = serenity::GuildId::new(chat_id);
        match guild.member(&self.http, serenity::UserId::new(found.user_id)).await {
            Ok(member) => {
                debug!("Directory: resolved '{}' to user {}", handle, found.user_id);
                Ok(member_identity(chat_id, &member.user))
            }
            Err(e) => {
                warn!(
                    "Directory: member lookup for user {} in guild {} failed: {}",
                    found.user_id, chat_id, e
                );
                Err(VibeError::RecipientNotFound)
            }
        }
    }
}
