pub mod ledger;
pub mod schema;

use crate::config::Config;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Format of every timestamp column, always UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Who a command acts on: a user inside one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: u64,
    pub chat_id: u64,
    pub username: String,
}

impl Identity {
    pub fn new(user_id: u64, chat_id: u64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id,
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
    Manual,
    Daily,
    Achievement,
}

impl HistorySource {
    pub fn as_str(self) -> &'static str {
        match self {
            HistorySource::Manual => "manual",
            HistorySource::Daily => "daily",
            HistorySource::Achievement => "achievement",
        }
    }

    fn from_column(value: &str) -> Self {
        match value {
            "daily" => HistorySource::Daily,
            "achievement" => HistorySource::Achievement,
            _ => HistorySource::Manual,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserVibeRecord {
    pub user_id: u64,
    pub chat_id: u64,
    pub username: String,
    pub vibe_score: i64,
    pub last_update: String,
    pub last_daily_bonus: Option<String>,
    pub daily_streak: u32,
}

#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub change_amount: i64,
    pub note: Option<String>,
    pub source: HistorySource,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub user_id: u64,
    pub username: String,
    pub vibe_score: i64,
}

#[derive(Debug, Clone)]
pub struct AchievementRecord {
    pub achievement_id: String,
    pub achieved_at: String,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        info!("Database: Opened {}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.lock()?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    /// Run `f` on a blocking thread so SQLite I/O never stalls the gateway.
    pub async fn run_blocking<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<anyhow::Error> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| E::from(anyhow::anyhow!("Database task failed: {}", e)))?
    }

    pub fn with_conn<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction. Any error rolls the
    /// whole unit back when the transaction is dropped.
    pub fn with_tx<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<anyhow::Error> + From<rusqlite::Error>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // --- Queries ---

    pub fn get_user(&self, user_id: u64, chat_id: u64) -> anyhow::Result<Option<UserVibeRecord>> {
        self.with_conn(|conn| Ok(select_user(conn, user_id, chat_id)?))
    }

    pub fn top_vibes(&self, chat_id: u64, limit: usize) -> anyhow::Result<Vec<LeaderboardEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, username, vibe_score FROM user_vibes
                 WHERE chat_id = ?1
                 ORDER BY vibe_score DESC, last_update ASC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map((chat_id, limit), |row| {
                Ok(LeaderboardEntry {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    vibe_score: row.get(2)?,
                })
            })?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
    }

    pub fn recent_history(
        &self,
        user_id: u64,
        chat_id: u64,
        limit: usize,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT change_amount, note, source, timestamp FROM vibe_history
                 WHERE user_id = ?1 AND chat_id = ?2
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map((user_id, chat_id, limit), |row| {
                let source: String = row.get(2)?;
                Ok(HistoryRecord {
                    change_amount: row.get(0)?,
                    note: row.get(1)?,
                    source: HistorySource::from_column(&source),
                    timestamp: row.get(3)?,
                })
            })?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
    }

    pub fn achievements_for(&self, user_id: u64, chat_id: u64) -> anyhow::Result<Vec<AchievementRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT achievement_id, achieved_at FROM achievements
                 WHERE user_id = ?1 AND chat_id = ?2
                 ORDER BY achieved_at ASC",
            )?;
            let rows = stmt.query_map((user_id, chat_id), |row| {
                Ok(AchievementRecord {
                    achievement_id: row.get(0)?,
                    achieved_at: row.get(1)?,
                })
            })?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
    }

    /// Case-insensitive lookup of a known member of `chat_id` by display name.
    pub fn find_user_by_username(&self, chat_id: u64, username: &str) -> anyhow::Result<Option<UserVibeRecord>> {
        self.with_conn(|conn| {
            let user_id: Option<u64> = conn
                .query_row(
                    "SELECT user_id FROM user_vibes
                     WHERE chat_id = ?1 AND username = ?2 COLLATE NOCASE
                     ORDER BY last_update DESC
                     LIMIT 1",
                    (chat_id, username),
                    |row| row.get(0),
                )
                .optional()?;

            match user_id {
                Some(user_id) => Ok(select_user(conn, user_id, chat_id)?),
                None => Ok(None),
            }
        })
    }

    pub fn distinct_recipients(&self, from_user_id: u64, chat_id: u64) -> anyhow::Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(DISTINCT to_user_id) FROM vibe_transfers
                 WHERE from_user_id = ?1 AND chat_id = ?2",
                (from_user_id, chat_id),
                |row| row.get(0),
            )?)
        })
    }

    /// Notes users attached themselves; bonus and reward rows do not count.
    pub fn manual_note_count(&self, user_id: u64, chat_id: u64) -> anyhow::Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM vibe_history
                 WHERE user_id = ?1 AND chat_id = ?2 AND source = 'manual'
                   AND note IS NOT NULL AND note != ''",
                (user_id, chat_id),
                |row| row.get(0),
            )?)
        })
    }
}

pub(crate) fn select_user(
    conn: &Connection,
    user_id: u64,
    chat_id: u64,
) -> rusqlite::Result<Option<UserVibeRecord>> {
    conn.query_row(
        "SELECT user_id, chat_id, username, vibe_score, last_update, last_daily_bonus, daily_streak
         FROM user_vibes WHERE user_id = ?1 AND chat_id = ?2",
        (user_id, chat_id),
        |row| {
            Ok(UserVibeRecord {
                user_id: row.get(0)?,
                chat_id: row.get(1)?,
                username: row.get(2)?,
                vibe_score: row.get(3)?,
                last_update: row.get(4)?,
                last_daily_bonus: row.get(5)?,
                daily_streak: row.get(6)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let text = format_timestamp(ts);
        assert_eq!(text, "2026-01-02 03:04:05");
        assert_eq!(parse_timestamp(&text), Some(ts));
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = test_db();
        db.execute_init().unwrap();
        assert!(db.get_user(1, 1).unwrap().is_none());
    }

    #[test]
    fn test_top_vibes_orders_and_limits() {
        let db = test_db();
        let now = Utc::now();
        for i in 0..12u64 {
            let who = Identity::new(i + 1, 7, format!("user{}", i));
            db.apply_change(&who, (i as i64) * 3 - 5, None, HistorySource::Manual, now)
                .unwrap();
        }
        db.apply_change(&Identity::new(99, 8, "elsewhere"), 100, None, HistorySource::Manual, now)
            .unwrap();

        let top = db.top_vibes(7, 10).unwrap();
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].username, "user11");
        assert!(top.windows(2).all(|w| w[0].vibe_score >= w[1].vibe_score));
        assert!(top.iter().all(|e| e.user_id != 99));
    }

    #[test]
    fn test_recent_history_is_newest_first_and_capped() {
        let db = test_db();
        let who = Identity::new(1, 1, "alice");
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        for i in 0..12 {
            db.apply_change(&who, i + 1, None, HistorySource::Manual, start + chrono::Duration::minutes(i))
                .unwrap();
        }

        let history = db.recent_history(1, 1, 10).unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].change_amount, 12);
        assert_eq!(history[9].change_amount, 3);
    }

    #[test]
    fn test_find_user_by_username_ignores_case() {
        let db = test_db();
        db.apply_change(&Identity::new(5, 1, "Bob"), 1, None, HistorySource::Manual, Utc::now())
            .unwrap();

        let found = db.find_user_by_username(1, "bob").unwrap().unwrap();
        assert_eq!(found.user_id, 5);
        assert!(db.find_user_by_username(2, "bob").unwrap().is_none());
        assert!(db.find_user_by_username(1, "carol").unwrap().is_none());
    }

    #[test]
    fn test_manual_note_count_excludes_bonus_rows() {
        let db = test_db();
        let who = Identity::new(1, 1, "alice");
        let now = Utc::now();
        db.apply_change(&who, 2, Some("thanks"), HistorySource::Manual, now).unwrap();
        db.apply_change(&who, 2, None, HistorySource::Manual, now).unwrap();
        db.apply_change(&who, 5, Some("Ежедневный бонус (стрик: 1)"), HistorySource::Daily, now)
            .unwrap();

        assert_eq!(db.manual_note_count(1, 1).unwrap(), 1);
    }

    #[test]
    fn test_search_with_special_chars() {
        let db = test_db();
        db.apply_change(&Identity::new(1, 1, "alice"), 1, None, HistorySource::Manual, Utc::now())
            .unwrap();

        let result = db.find_user_by_username(1, "'; DROP TABLE user_vibes; --");
        assert!(result.unwrap().is_none());
        assert!(db.get_user(1, 1).unwrap().is_some());
    }
}
