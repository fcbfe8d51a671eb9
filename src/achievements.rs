//! Static achievement catalog and trigger rules.

use crate::progression::LEVELS;
use std::fmt;
use std::str::FromStr;

pub const SOCIAL_BUTTERFLY_RECIPIENTS: i64 = 5;
pub const DAILY_STREAK_DAYS: u32 = 5;
pub const NOTE_TAKER_NOTES: i64 = 10;
/// Threshold of the top level.
pub const VIBE_MASTER_SCORE: i64 = LEVELS[LEVELS.len() - 1].required;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AchievementId {
    FirstVibe,
    VibeMaster,
    SocialButterfly,
    DailyStreak,
    NoteTaker,
}

impl AchievementId {
    pub fn as_str(self) -> &'static str {
        match self {
            AchievementId::FirstVibe => "first_vibe",
            AchievementId::VibeMaster => "vibe_master",
            AchievementId::SocialButterfly => "social_butterfly",
            AchievementId::DailyStreak => "daily_streak",
            AchievementId::NoteTaker => "note_taker",
        }
    }

    pub fn achievement(self) -> &'static Achievement {
        CATALOG
            .iter()
            .find(|a| a.id == self)
            .unwrap_or(&CATALOG[0])
    }
}

impl fmt::Display for AchievementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CATALOG
            .iter()
            .map(|a| a.id)
            .find(|id| id.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown achievement id '{}'", s))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Achievement {
    pub id: AchievementId,
    pub name: &'static str,
    pub description: &'static str,
    pub emoji: &'static str,
    pub reward: i64,
}

/// Display order of the catalog.
pub const CATALOG: &[Achievement] = &[
    Achievement {
        id: AchievementId::FirstVibe,
        name: "Первый вайб",
        description: "Получите свой первый вайб",
        emoji: "🎯",
        reward: 5,
    },
    Achievement {
        id: AchievementId::VibeMaster,
        name: "Мастер вайба",
        description: "Достигните уровня \"Легенда\"",
        emoji: "🏆",
        reward: 20,
    },
    Achievement {
        id: AchievementId::SocialButterfly,
        name: "Социальная бабочка",
        description: "Передайте вайб 5 разным пользователям",
        emoji: "🦋",
        reward: 15,
    },
    Achievement {
        id: AchievementId::DailyStreak,
        name: "Ежедневный стрик",
        description: "Получайте ежедневный бонус 5 дней подряд",
        emoji: "🔥",
        reward: 25,
    },
    Achievement {
        id: AchievementId::NoteTaker,
        name: "Заметочник",
        description: "Добавьте 10 заметок к изменениям вайба",
        emoji: "📝",
        reward: 10,
    },
];

/// What a mutation just did to one identity. Fields the mutation did not
/// touch are left `None` so their triggers are skipped.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub score: i64,
    pub positive_change: bool,
    pub distinct_recipients: Option<i64>,
    pub daily_streak: Option<u32>,
    pub manual_notes: Option<i64>,
}

/// Achievements whose condition holds for `snapshot`, in catalog order.
/// Grants are idempotent, so already-held ids may be returned.
pub fn earned(snapshot: &ProgressSnapshot) -> Vec<AchievementId> {
    let mut ids = Vec::new();
    if snapshot.positive_change {
        ids.push(AchievementId::FirstVibe);
    }
    if snapshot.score >= VIBE_MASTER_SCORE {
        ids.push(AchievementId::VibeMaster);
    }
    if snapshot
        .distinct_recipients
        .is_some_and(|n| n >= SOCIAL_BUTTERFLY_RECIPIENTS)
    {
        ids.push(AchievementId::SocialButterfly);
    }
    if snapshot.daily_streak.is_some_and(|s| s >= DAILY_STREAK_DAYS) {
        ids.push(AchievementId::DailyStreak);
    }
    if snapshot.manual_notes.is_some_and(|n| n >= NOTE_TAKER_NOTES) {
        ids.push(AchievementId::NoteTaker);
    }
    ids
}
