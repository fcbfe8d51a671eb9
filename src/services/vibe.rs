use crate::achievements::{earned, Achievement, AchievementId, ProgressSnapshot, CATALOG};
use crate::db::ledger::{DailyClaim, TransferReceipt};
use crate::db::{Database, HistoryRecord, HistorySource, Identity, LeaderboardEntry};
use crate::error::VibeError;
use crate::progression::{level_for, level_info, Level, LevelInfo};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{error, warn};

pub const TOP_LIMIT: usize = 10;
pub const HISTORY_LIMIT: usize = 10;

/// An achievement granted to a specific user as a side effect of a command.
#[derive(Debug, Clone, Copy)]
pub struct GrantNotice {
    pub user_id: u64,
    pub achievement: &'static Achievement,
}

#[derive(Debug, Clone)]
pub struct ChangeOutcome {
    pub delta: i64,
    /// Score right after the change, before any achievement reward.
    pub score: i64,
    pub level: LevelInfo,
    pub note: Option<String>,
    pub granted: Vec<GrantNotice>,
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub receipt: TransferReceipt,
    pub recipient: Identity,
    pub granted: Vec<GrantNotice>,
}

#[derive(Debug, Clone)]
pub enum DailyOutcome {
    TooEarly { hours: i64, minutes: i64 },
    Granted {
        bonus: i64,
        streak: u32,
        score: i64,
        granted: Vec<GrantNotice>,
    },
}

#[derive(Debug, Clone)]
pub struct Standing {
    pub score: i64,
    pub level: LevelInfo,
}

#[derive(Debug, Clone)]
pub struct AchievementStatus {
    pub achievement: &'static Achievement,
    pub achieved_at: Option<String>,
}

/// Validate the magnitude of a manual change.
pub fn validate_change_amount(amount: i64, max: i64) -> Result<i64, VibeError> {
    if amount <= 0 || amount > max {
        return Err(VibeError::InvalidAmount { max });
    }
    Ok(amount)
}

/// Parse a typed amount; `max` is `None` for transfers, which are only
/// limited by the sender's balance.
pub fn parse_amount(text: &str, max: Option<i64>) -> Result<i64, VibeError> {
    let max_or_any = max.unwrap_or(i64::MAX);
    let amount: i64 = text
        .trim()
        .parse()
        .map_err(|_| VibeError::InvalidAmount { max: max_or_any })?;
    validate_change_amount(amount, max_or_any)
}

pub struct VibeService {
    db: Database,
}

impl VibeService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn change_vibe(
        &self,
        who: Identity,
        delta: i64,
        note: Option<String>,
    ) -> Result<ChangeOutcome, VibeError> {
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let now = Utc::now();

        let (score, granted) = self
            .db
            .run_blocking({
                let note = note.clone();
                move |db| {
                    let score = db.apply_change(&who, delta, note.as_deref(), HistorySource::Manual, now)?;
                    let manual_notes = if note.is_some() {
                        Some(db.manual_note_count(who.user_id, who.chat_id)?)
                    } else {
                        None
                    };
                    let snapshot = ProgressSnapshot {
                        score,
                        positive_change: delta > 0,
                        manual_notes,
                        ..Default::default()
                    };
                    let granted = award(db, &who, snapshot, now);
                    Ok::<_, VibeError>((score, granted))
                }
            })
            .await?;

        Ok(ChangeOutcome {
            delta,
            score,
            level: level_info(score),
            note,
            granted,
        })
    }

    /// Fails with `InsufficientBalance` unless `who` holds at least `amount`.
    pub async fn ensure_balance(&self, who: &Identity, amount: i64) -> Result<i64, VibeError> {
        let (user_id, chat_id) = (who.user_id, who.chat_id);
        let available = self
            .db
            .run_blocking(move |db| db.get_user(user_id, chat_id))
            .await?
            .map(|r| r.vibe_score)
            .unwrap_or(0);
        if available < amount {
            return Err(VibeError::InsufficientBalance {
                available,
                requested: amount,
            });
        }
        Ok(available)
    }

    pub async fn transfer(
        &self,
        sender: Identity,
        recipient: Identity,
        amount: i64,
    ) -> Result<TransferOutcome, VibeError> {
        let now = Utc::now();
        self.db
            .run_blocking(move |db| -> Result<TransferOutcome, VibeError> {
                let receipt = db.transfer(&sender, &recipient, amount, now)?;

                let recipients = db.distinct_recipients(sender.user_id, sender.chat_id)?;
                let mut granted = award(
                    db,
                    &sender,
                    ProgressSnapshot {
                        score: receipt.sender_score,
                        distinct_recipients: Some(recipients),
                        ..Default::default()
                    },
                    now,
                );
                let recipient = Identity::new(recipient.user_id, sender.chat_id, recipient.username);
                granted.extend(award(
                    db,
                    &recipient,
                    ProgressSnapshot {
                        score: receipt.recipient_score,
                        positive_change: true,
                        ..Default::default()
                    },
                    now,
                ));

                Ok(TransferOutcome {
                    receipt,
                    recipient,
                    granted,
                })
            })
            .await
    }

    pub async fn claim_daily(&self, who: Identity) -> Result<DailyOutcome, VibeError> {
        self.claim_daily_at(who, Utc::now()).await
    }

    pub async fn claim_daily_at(&self, who: Identity, now: DateTime<Utc>) -> Result<DailyOutcome, VibeError> {
        self.db
            .run_blocking(move |db| -> Result<DailyOutcome, VibeError> {
                let (bonus, streak, score) = match db.claim_daily(&who, now)? {
                    DailyClaim::TooEarly { hours, minutes } => {
                        return Ok(DailyOutcome::TooEarly { hours, minutes });
                    }
                    DailyClaim::Granted { bonus, streak, score } => (bonus, streak, score),
                };

                let snapshot = ProgressSnapshot {
                    score,
                    positive_change: true,
                    daily_streak: Some(streak),
                    ..Default::default()
                };
                Ok(DailyOutcome::Granted {
                    bonus,
                    streak,
                    score,
                    granted: award(db, &who, snapshot, now),
                })
            })
            .await
    }

    pub async fn standing(&self, user_id: u64, chat_id: u64) -> Result<Option<Standing>, VibeError> {
        let record = self
            .db
            .run_blocking(move |db| db.get_user(user_id, chat_id))
            .await?;
        Ok(record.map(|r| Standing {
            score: r.vibe_score,
            level: level_info(r.vibe_score),
        }))
    }

    pub async fn top(&self, chat_id: u64) -> Result<Vec<(LeaderboardEntry, &'static Level)>, VibeError> {
        let entries = self
            .db
            .run_blocking(move |db| db.top_vibes(chat_id, TOP_LIMIT))
            .await?;
        Ok(entries
            .into_iter()
            .map(|e| {
                let level = level_for(e.vibe_score);
                (e, level)
            })
            .collect())
    }

    pub async fn history(&self, user_id: u64, chat_id: u64) -> Result<Vec<HistoryRecord>, VibeError> {
        Ok(self
            .db
            .run_blocking(move |db| db.recent_history(user_id, chat_id, HISTORY_LIMIT))
            .await?)
    }

    /// The whole catalog, each entry marked with its grant time if held.
    pub async fn achievements(&self, user_id: u64, chat_id: u64) -> Result<Vec<AchievementStatus>, VibeError> {
        let records = self
            .db
            .run_blocking(move |db| db.achievements_for(user_id, chat_id))
            .await?;

        Ok(CATALOG
            .iter()
            .map(|achievement| AchievementStatus {
                achievement,
                achieved_at: records
                    .iter()
                    .find(|r| r.achievement_id == achievement.id.as_str())
                    .map(|r| r.achieved_at.clone()),
            })
            .collect())
    }
}

/// Grant everything `snapshot` earns. Rewards can lift the score past the
/// vibe master threshold, so that trigger is re-checked after each reward.
/// Failures are logged and skipped: the mutation that triggered them has
/// already committed.
fn award(db: &Database, who: &Identity, snapshot: ProgressSnapshot, now: DateTime<Utc>) -> Vec<GrantNotice> {
    let mut granted = Vec::new();
    let mut score = snapshot.score;
    let mut pending: VecDeque<AchievementId> = earned(&snapshot).into();

    while let Some(id) = pending.pop_front() {
        match db.grant_achievement(who, id, now) {
            Ok(Some(achievement)) => {
                score += achievement.reward;
                granted.push(GrantNotice {
                    user_id: who.user_id,
                    achievement,
                });
                let master = earned(&ProgressSnapshot {
                    score,
                    ..Default::default()
                });
                for extra in master {
                    if extra != id && !pending.contains(&extra) {
                        pending.push_back(extra);
                    }
                }
            }
            Ok(None) => {}
            Err(e) if e.is_rejection() => {
                warn!(
                    "Achievement {} for user {} in chat {} not granted: {}",
                    id, who.user_id, who.chat_id, e
                );
            }
            Err(e) => {
                error!(
                    "Achievement {} for user {} in chat {} failed: {}",
                    id, who.user_id, who.chat_id, e
                );
            }
        }
    }

    granted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::AchievementId;
    use chrono::{Duration, TimeZone};

    fn service() -> (VibeService, Database) {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        (VibeService::new(db.clone()), db)
    }

    fn stored(db: &Database, user_id: u64, chat_id: u64) -> i64 {
        db.get_user(user_id, chat_id).unwrap().map(|r| r.vibe_score).unwrap_or(0)
    }

    fn ids(granted: &[GrantNotice]) -> Vec<AchievementId> {
        granted.iter().map(|g| g.achievement.id).collect()
    }

    #[test]
    fn test_amount_validation() {
        assert_eq!(validate_change_amount(1, 100).unwrap(), 1);
        assert_eq!(validate_change_amount(100, 100).unwrap(), 100);
        assert!(matches!(validate_change_amount(0, 100), Err(VibeError::InvalidAmount { .. })));
        assert!(matches!(validate_change_amount(101, 100), Err(VibeError::InvalidAmount { .. })));

        assert_eq!(parse_amount(" 42 ", Some(100)).unwrap(), 42);
        assert!(parse_amount("abc", Some(100)).is_err());
        assert!(parse_amount("-3", None).is_err());
        assert_eq!(parse_amount("5000", None).unwrap(), 5000);
    }

    #[tokio::test]
    async fn test_first_positive_change_earns_first_vibe_once() {
        let (service, db) = service();
        let alice = Identity::new(1, 10, "alice");

        let outcome = service.change_vibe(alice.clone(), 10, None).await.unwrap();
        assert_eq!(outcome.score, 10);
        assert_eq!(outcome.level.current.index, 1);
        assert_eq!(ids(&outcome.granted), vec![AchievementId::FirstVibe]);
        assert_eq!(stored(&db, 1, 10), 15);

        let outcome = service.change_vibe(alice, 3, None).await.unwrap();
        assert!(outcome.granted.is_empty());
        assert_eq!(stored(&db, 1, 10), 18);
    }

    #[tokio::test]
    async fn test_negative_change_earns_nothing() {
        let (service, db) = service();
        let outcome = service
            .change_vibe(Identity::new(1, 10, "alice"), -4, Some("  ".to_string()))
            .await
            .unwrap();
        assert_eq!(outcome.score, -4);
        assert!(outcome.note.is_none());
        assert!(outcome.granted.is_empty());
        assert_eq!(db.manual_note_count(1, 10).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reward_chain_reaches_vibe_master() {
        let (service, db) = service();
        let alice = Identity::new(1, 10, "alice");
        db.apply_change(&alice, 190, None, HistorySource::Manual, Utc::now())
            .unwrap();

        let outcome = service.change_vibe(alice, 6, None).await.unwrap();

        // 196 + 5 (first vibe) crosses 200.
        assert_eq!(outcome.score, 196);
        assert_eq!(
            ids(&outcome.granted),
            vec![AchievementId::FirstVibe, AchievementId::VibeMaster]
        );
        assert_eq!(stored(&db, 1, 10), 221);
    }

    #[tokio::test]
    async fn test_tenth_note_earns_note_taker() {
        let (service, _db) = service();
        let alice = Identity::new(1, 10, "alice");
        for i in 0..9 {
            let outcome = service
                .change_vibe(alice.clone(), -1, Some(format!("note {}", i)))
                .await
                .unwrap();
            assert!(outcome.granted.is_empty());
        }
        let outcome = service
            .change_vibe(alice, -1, Some("tenth".to_string()))
            .await
            .unwrap();
        assert_eq!(ids(&outcome.granted), vec![AchievementId::NoteTaker]);
    }

    #[tokio::test]
    async fn test_transfer_to_five_recipients_earns_social_butterfly() {
        let (service, db) = service();
        let alice = Identity::new(1, 10, "alice");
        service.change_vibe(alice.clone(), 50, None).await.unwrap();

        for target in 2..=5u64 {
            let outcome = service
                .transfer(alice.clone(), Identity::new(target, 10, format!("u{}", target)), 1)
                .await
                .unwrap();
            assert!(!outcome.granted.iter().any(|g| g.user_id == 1));
            assert!(outcome
                .granted
                .iter()
                .any(|g| g.user_id == target && g.achievement.id == AchievementId::FirstVibe));
        }

        let outcome = service
            .transfer(alice.clone(), Identity::new(6, 10, "u6"), 1)
            .await
            .unwrap();
        assert!(outcome
            .granted
            .iter()
            .any(|g| g.user_id == 1 && g.achievement.id == AchievementId::SocialButterfly));

        let again = service
            .transfer(alice, Identity::new(2, 10, "u2"), 1)
            .await
            .unwrap();
        assert!(!again.granted.iter().any(|g| g.user_id == 1));

        // 50 + 5 first vibe - 6 transfers + 15 butterfly
        assert_eq!(stored(&db, 1, 10), 64);
    }

    #[tokio::test]
    async fn test_transfer_rejections_leave_state() {
        let (service, db) = service();
        let alice = Identity::new(1, 10, "alice");
        service.change_vibe(alice.clone(), 1, None).await.unwrap();

        assert!(matches!(
            service.ensure_balance(&alice, 7).await,
            Err(VibeError::InsufficientBalance { available: 6, requested: 7 })
        ));
        assert!(matches!(
            service.transfer(alice.clone(), alice.clone(), 1).await,
            Err(VibeError::SelfTransfer)
        ));
        assert_eq!(stored(&db, 1, 10), 6);
    }

    #[tokio::test]
    async fn test_five_day_streak_earns_daily_streak() {
        let (service, _db) = service();
        let alice = Identity::new(1, 10, "alice");
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();

        let mut last = Vec::new();
        for day in 0..5 {
            match service
                .claim_daily_at(alice.clone(), start + Duration::hours(25 * day))
                .await
                .unwrap()
            {
                DailyOutcome::Granted { streak, granted, .. } => {
                    assert_eq!(streak as i64, day + 1);
                    last = ids(&granted);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(last, vec![AchievementId::DailyStreak]);

        let early = service
            .claim_daily_at(alice, start + Duration::hours(25 * 4 + 2))
            .await
            .unwrap();
        assert!(matches!(early, DailyOutcome::TooEarly { hours: 22, minutes: 0 }));
    }

    #[tokio::test]
    async fn test_achievements_lists_whole_catalog() {
        let (service, _db) = service();
        service
            .change_vibe(Identity::new(1, 10, "alice"), 2, None)
            .await
            .unwrap();

        let statuses = service.achievements(1, 10).await.unwrap();
        assert_eq!(statuses.len(), CATALOG.len());
        assert!(statuses[0].achieved_at.is_some());
        assert!(statuses[1..].iter().all(|s| s.achieved_at.is_none()));
    }

    #[tokio::test]
    async fn test_top_and_standing() {
        let (service, _db) = service();
        service.change_vibe(Identity::new(1, 10, "alice"), -3, None).await.unwrap();
        service.change_vibe(Identity::new(2, 10, "bob"), 30, None).await.unwrap();

        let top = service.top(10).await.unwrap();
        assert_eq!(top[0].0.username, "bob");
        assert_eq!(top[0].1.index, 2);

        assert!(service.standing(3, 10).await.unwrap().is_none());
        let standing = service.standing(1, 10).await.unwrap().unwrap();
        assert_eq!(standing.score, -3);
        assert_eq!(standing.level.current.index, 0);
    }
}
