pub mod achievements;
pub mod commands;
pub mod config;
pub mod daily;
pub mod db;
pub mod directory;
pub mod error;
pub mod flow;
pub mod progression;
pub mod render;
pub mod services;
pub mod session;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub sessions: session::SessionStore,
    /// Bot's own user ID, ignored when resolving transfer targets
    pub bot_id: u64,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// The ledger scopes scores to a guild; direct messages fall back to the channel.
pub fn chat_id_of(
    guild_id: Option<poise::serenity_prelude::GuildId>,
    channel_id: poise::serenity_prelude::ChannelId,
) -> u64 {
    guild_id.map(|id| id.get()).unwrap_or_else(|| channel_id.get())
}
