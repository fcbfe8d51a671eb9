use dotenvy::dotenv;
use humantime::parse_duration;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub status_message: String,
    /// Register commands in this guild only (instant updates while developing).
    pub dev_guild_id: Option<u64>,
    /// How long a note prompt or transfer flow waits for the user.
    pub flow_timeout_secs: u64,
    pub session_capacity: usize,
    pub max_change_amount: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let flow_timeout = env::var("FLOW_TIMEOUT").unwrap_or_else(|_| "5m".to_string());
        let flow_timeout = parse_duration(flow_timeout.trim())
            .map_err(|e| anyhow::anyhow!("FLOW_TIMEOUT must be a duration like 5m: {}", e))?;

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/vibecord.db".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Следим за вайбом ✨".to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            flow_timeout_secs: flow_timeout.as_secs().max(1),
            session_capacity: env::var("SESSION_CAPACITY")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            max_change_amount: env::var("MAX_CHANGE_AMOUNT")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
        })
    }

    pub fn flow_timeout(&self) -> Duration {
        Duration::from_secs(self.flow_timeout_secs)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("flow_timeout_secs", &self.flow_timeout_secs)
            .field("session_capacity", &self.session_capacity)
            .field("max_change_amount", &self.max_change_amount)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        // 1. Missing token
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("FLOW_TIMEOUT");
        assert!(Config::build().is_err(), "Should fail when DISCORD_TOKEN is missing");

        // 2. Defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.flow_timeout_secs, 300);
        assert_eq!(config.max_change_amount, 100);

        // 3. Humantime durations
        env::set_var("FLOW_TIMEOUT", "90s");
        assert_eq!(Config::build().unwrap().flow_timeout(), Duration::from_secs(90));
        env::set_var("FLOW_TIMEOUT", "soon");
        assert!(Config::build().is_err());

        // 4. Debug redaction
        env::remove_var("FLOW_TIMEOUT");
        let debug_output = format!("{:?}", Config::build().unwrap());
        assert!(!debug_output.contains("test_token"));
        assert!(debug_output.contains("[REDACTED]"));

        env::remove_var("DISCORD_TOKEN");
    }
}
