//! Level ladder and daily bonus arithmetic.

/// Absolute bound on any stored score.
pub const SCORE_BOUND: i64 = 1_000_000;

const DAILY_BASE: i64 = 5;
const DAILY_STREAK_CAP: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub index: usize,
    pub name: &'static str,
    pub emoji: &'static str,
    pub required: i64,
}

/// Ascending by `required`; `LEVELS[0].required` is 0.
pub const LEVELS: &[Level] = &[
    Level { index: 0, name: "Начинающий", emoji: "🌱", required: 0 },
    Level { index: 1, name: "Позитивный", emoji: "⭐", required: 10 },
    Level { index: 2, name: "Энергичный", emoji: "🌟", required: 25 },
    Level { index: 3, name: "Вайбовый", emoji: "✨", required: 50 },
    Level { index: 4, name: "Суперзвезда", emoji: "🌠", required: 100 },
    Level { index: 5, name: "Легенда", emoji: "👑", required: 200 },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    pub current: &'static Level,
    pub next: Option<&'static Level>,
    /// Percent toward `next`, always within 0..=100.
    pub progress: f64,
}

pub fn level_for(score: i64) -> &'static Level {
    LEVELS
        .iter()
        .rev()
        .find(|level| score >= level.required)
        .unwrap_or(&LEVELS[0])
}

pub fn level_info(score: i64) -> LevelInfo {
    let current = level_for(score);
    let next = LEVELS.get(current.index + 1);

    let progress = match next {
        Some(next) => {
            let span = (next.required - current.required) as f64;
            let raw = (score - current.required) as f64 / span * 100.0;
            raw.clamp(0.0, 100.0)
        }
        None => 100.0,
    };

    LevelInfo {
        current,
        next,
        progress,
    }
}

/// Bonus for a claim, given the streak after it has been incremented.
pub fn daily_bonus_amount(streak: u32) -> i64 {
    let extra = (streak.max(1) as i64 - 1).min(DAILY_STREAK_CAP);
    DAILY_BASE + extra
}

pub fn within_bound(score: i64) -> bool {
    score.abs() <= SCORE_BOUND
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_selection() {
        assert_eq!(level_for(0).index, 0);
        assert_eq!(level_for(9).index, 0);
        assert_eq!(level_for(10).index, 1);
        assert_eq!(level_for(25).index, 2);
        assert_eq!(level_for(199).index, 4);
        assert_eq!(level_for(1_000_000).index, 5);
    }

    #[test]
    fn test_negative_score_clamps_to_first_level() {
        let info = level_info(-500);
        assert_eq!(info.current.index, 0);
        assert_eq!(info.next.map(|l| l.index), Some(1));
        assert_eq!(info.progress, 0.0);
    }

    #[test]
    fn test_progress_examples() {
        let info = level_info(10);
        assert_eq!(info.current.name, "Позитивный");
        assert_eq!(info.next.map(|l| l.required), Some(25));
        assert_eq!(info.progress, 0.0);

        let info = level_info(25);
        assert_eq!(info.current.index, 2);
        assert_eq!(info.progress, 0.0);

        let info = level_info(75);
        assert_eq!(info.current.index, 3);
        assert!((info.progress - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_top_level_progress_is_full() {
        let info = level_info(250);
        assert_eq!(info.current.name, "Легенда");
        assert!(info.next.is_none());
        assert_eq!(info.progress, 100.0);
    }

    #[test]
    fn test_level_is_monotonic() {
        let mut previous = level_for(-1_000_000).index;
        for score in (-50..=400).step_by(3) {
            let index = level_for(score).index;
            assert!(index >= previous, "level dropped at score {}", score);
            previous = index;
        }
    }

    #[test]
    fn test_ladder_is_ascending() {
        assert_eq!(LEVELS[0].required, 0);
        for pair in LEVELS.windows(2) {
            assert!(pair[0].required < pair[1].required);
            assert_eq!(pair[0].index + 1, pair[1].index);
        }
    }

    #[test]
    fn test_daily_bonus_amount() {
        assert_eq!(daily_bonus_amount(1), 5);
        assert_eq!(daily_bonus_amount(2), 6);
        assert_eq!(daily_bonus_amount(6), 10);
        assert_eq!(daily_bonus_amount(30), 10);
    }
}
