//! Transactional score mutations. Every score change, whatever its source,
//! goes through `apply_change_in` and so through the same bound check.

use super::{format_timestamp, parse_timestamp, select_user, Database, HistorySource, Identity};
use crate::achievements::{Achievement, AchievementId};
use crate::daily::{evaluate_claim, split_wait, ClaimDecision};
use crate::error::VibeError;
use crate::progression::{within_bound, SCORE_BOUND};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub amount: i64,
    pub sender_score: i64,
    pub recipient_score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyClaim {
    TooEarly { hours: i64, minutes: i64 },
    Granted { bonus: i64, streak: u32, score: i64 },
}

fn checked_score(current: i64, delta: i64) -> Result<i64, VibeError> {
    let attempted = current.saturating_add(delta);
    if !within_bound(attempted) {
        return Err(VibeError::BoundExceeded {
            attempted,
            bound: SCORE_BOUND,
        });
    }
    Ok(attempted)
}

fn current_score(conn: &Connection, user_id: u64, chat_id: u64) -> rusqlite::Result<i64> {
    let score: Option<i64> = conn
        .query_row(
            "SELECT vibe_score FROM user_vibes WHERE user_id = ?1 AND chat_id = ?2",
            (user_id, chat_id),
            |row| row.get(0),
        )
        .optional()?;
    Ok(score.unwrap_or(0))
}

fn upsert_score(conn: &Connection, who: &Identity, score: i64, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO user_vibes (user_id, chat_id, username, vibe_score, last_update)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, chat_id) DO UPDATE SET
            username = excluded.username,
            vibe_score = excluded.vibe_score,
            last_update = excluded.last_update",
        (who.user_id, who.chat_id, &who.username, score, now),
    )?;
    Ok(())
}

/// Bounded score change plus its history row, inside the caller's transaction.
pub(crate) fn apply_change_in(
    conn: &Connection,
    who: &Identity,
    delta: i64,
    note: Option<&str>,
    source: HistorySource,
    now: &str,
) -> Result<i64, VibeError> {
    let current = current_score(conn, who.user_id, who.chat_id)?;
    let new_score = checked_score(current, delta)?;

    upsert_score(conn, who, new_score, now)?;
    conn.execute(
        "INSERT INTO vibe_history (user_id, chat_id, change_amount, note, source, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (who.user_id, who.chat_id, delta, note, source.as_str(), now),
    )?;
    Ok(new_score)
}

impl Database {
    /// Apply `delta` to `who` and record it. Rejected changes leave no trace.
    pub fn apply_change(
        &self,
        who: &Identity,
        delta: i64,
        note: Option<&str>,
        source: HistorySource,
        now: DateTime<Utc>,
    ) -> Result<i64, VibeError> {
        let now = format_timestamp(now);
        let score = self.with_tx(|tx| apply_change_in(tx, who, delta, note, source, &now))?;
        debug!(
            "Ledger: user {} in chat {} changed by {} to {}",
            who.user_id, who.chat_id, delta, score
        );
        Ok(score)
    }

    /// Move `amount` from `sender` to `recipient` within the sender's chat.
    pub fn transfer(
        &self,
        sender: &Identity,
        recipient: &Identity,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<TransferReceipt, VibeError> {
        if sender.user_id == recipient.user_id {
            return Err(VibeError::SelfTransfer);
        }
        if amount <= 0 {
            return Err(VibeError::InvalidAmount { max: i64::MAX });
        }

        let chat_id = sender.chat_id;
        let now = format_timestamp(now);
        let receipt = self.with_tx(|tx| -> Result<TransferReceipt, VibeError> {
            let available = current_score(tx, sender.user_id, chat_id)?;
            if available < amount {
                return Err(VibeError::InsufficientBalance {
                    available,
                    requested: amount,
                });
            }

            let recipient_current = current_score(tx, recipient.user_id, chat_id)?;
            let recipient_score = checked_score(recipient_current, amount)?;
            let sender_score = available - amount;

            tx.execute(
                "UPDATE user_vibes SET vibe_score = ?1, last_update = ?2
                 WHERE user_id = ?3 AND chat_id = ?4",
                (sender_score, &now, sender.user_id, chat_id),
            )?;
            upsert_score(
                tx,
                &Identity::new(recipient.user_id, chat_id, recipient.username.clone()),
                recipient_score,
                &now,
            )?;
            tx.execute(
                "INSERT INTO vibe_transfers (from_user_id, to_user_id, chat_id, amount, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (sender.user_id, recipient.user_id, chat_id, amount, &now),
            )?;

            Ok(TransferReceipt {
                amount,
                sender_score,
                recipient_score,
            })
        })?;

        info!(
            "Ledger: transferred {} from user {} to user {} in chat {}",
            amount, sender.user_id, recipient.user_id, chat_id
        );
        Ok(receipt)
    }

    /// Claim the daily bonus at `now`. A claim inside the cooldown changes nothing.
    pub fn claim_daily(&self, who: &Identity, now: DateTime<Utc>) -> Result<DailyClaim, VibeError> {
        let now_text = format_timestamp(now);
        self.with_tx(|tx| -> Result<DailyClaim, VibeError> {
            tx.execute(
                "INSERT OR IGNORE INTO user_vibes
                    (user_id, chat_id, username, vibe_score, last_update, last_daily_bonus, daily_streak)
                 VALUES (?1, ?2, ?3, 0, ?4, NULL, 0)",
                (who.user_id, who.chat_id, &who.username, &now_text),
            )?;

            let record = select_user(tx, who.user_id, who.chat_id)?
                .ok_or_else(|| anyhow::anyhow!("user row missing after insert"))?;
            let last = record.last_daily_bonus.as_deref().and_then(parse_timestamp);

            match evaluate_claim(last, record.daily_streak, now) {
                ClaimDecision::Wait { remaining } => {
                    let (hours, minutes) = split_wait(remaining);
                    Ok(DailyClaim::TooEarly { hours, minutes })
                }
                ClaimDecision::Grant { streak, bonus } => {
                    let note = format!("Ежедневный бонус (стрик: {})", streak);
                    let score = apply_change_in(tx, who, bonus, Some(&note), HistorySource::Daily, &now_text)?;
                    tx.execute(
                        "UPDATE user_vibes SET last_daily_bonus = ?1, daily_streak = ?2
                         WHERE user_id = ?3 AND chat_id = ?4",
                        (&now_text, streak, who.user_id, who.chat_id),
                    )?;
                    Ok(DailyClaim::Granted { bonus, streak, score })
                }
            }
        })
    }

    /// Grant `id` to `who` once. Returns `None` when it was already held.
    pub fn grant_achievement(
        &self,
        who: &Identity,
        id: AchievementId,
        now: DateTime<Utc>,
    ) -> Result<Option<&'static Achievement>, VibeError> {
        let achievement = id.achievement();
        let now = format_timestamp(now);

        let granted = self.with_tx(|tx| {
            let held = tx
                .prepare(
                    "SELECT 1 FROM achievements
                     WHERE user_id = ?1 AND chat_id = ?2 AND achievement_id = ?3",
                )?
                .exists((who.user_id, who.chat_id, id.as_str()))?;
            if held {
                return Ok::<_, VibeError>(false);
            }

            apply_change_in(
                tx,
                who,
                achievement.reward,
                Some(achievement.name),
                HistorySource::Achievement,
                &now,
            )?;
            tx.execute(
                "INSERT INTO achievements (user_id, chat_id, achievement_id, achieved_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (who.user_id, who.chat_id, id.as_str(), &now),
            )?;
            Ok(true)
        })?;

        if granted {
            info!(
                "Ledger: user {} in chat {} earned achievement {}",
                who.user_id, who.chat_id, id
            );
            Ok(Some(achievement))
        } else {
            Ok(None)
        }
    }
}
