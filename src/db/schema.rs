/// Idempotent schema for the vibe ledger.
pub const SCHEMA: &str = "
    -- One row per (user, chat); never deleted
    CREATE TABLE IF NOT EXISTS user_vibes (
        user_id INTEGER NOT NULL,
        chat_id INTEGER NOT NULL,
        username TEXT NOT NULL,
        vibe_score INTEGER NOT NULL DEFAULT 0,
        last_update DATETIME NOT NULL,
        last_daily_bonus DATETIME,
        daily_streak INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, chat_id)
    );
    CREATE INDEX IF NOT EXISTS idx_user_vibes_chat_score ON user_vibes (chat_id, vibe_score);

    -- Append-only
    CREATE TABLE IF NOT EXISTS vibe_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        chat_id INTEGER NOT NULL,
        change_amount INTEGER NOT NULL,
        note TEXT,
        source TEXT NOT NULL DEFAULT 'manual',
        timestamp DATETIME NOT NULL,
        FOREIGN KEY (user_id, chat_id) REFERENCES user_vibes (user_id, chat_id)
    );
    CREATE INDEX IF NOT EXISTS idx_vibe_history_user_date ON vibe_history (user_id, chat_id, timestamp);

    CREATE TABLE IF NOT EXISTS achievements (
        user_id INTEGER NOT NULL,
        chat_id INTEGER NOT NULL,
        achievement_id TEXT NOT NULL,
        achieved_at DATETIME NOT NULL,
        PRIMARY KEY (user_id, chat_id, achievement_id),
        FOREIGN KEY (user_id, chat_id) REFERENCES user_vibes (user_id, chat_id)
    );

    -- Append-only
    CREATE TABLE IF NOT EXISTS vibe_transfers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_user_id INTEGER NOT NULL,
        to_user_id INTEGER NOT NULL,
        chat_id INTEGER NOT NULL,
        amount INTEGER NOT NULL CHECK (amount > 0),
        timestamp DATETIME NOT NULL,
        FOREIGN KEY (from_user_id, chat_id) REFERENCES user_vibes (user_id, chat_id),
        FOREIGN KEY (to_user_id, chat_id) REFERENCES user_vibes (user_id, chat_id)
    );
    CREATE INDEX IF NOT EXISTS idx_vibe_transfers_sender ON vibe_transfers (from_user_id, chat_id);
";
