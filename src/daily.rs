use crate::progression::daily_bonus_amount;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Claimed again inside the 24h window.
    Wait { remaining: Duration },
    Grant { streak: u32, bonus: i64 },
}

pub fn cooldown() -> Duration {
    Duration::hours(24)
}

pub fn streak_window() -> Duration {
    Duration::hours(48)
}

/// Decide a daily bonus claim at `now` given the stored claim state.
pub fn evaluate_claim(last: Option<DateTime<Utc>>, streak: u32, now: DateTime<Utc>) -> ClaimDecision {
    let base_streak = match last {
        None => 0,
        Some(last) => {
            let elapsed = now - last;
            if elapsed < cooldown() {
                return ClaimDecision::Wait {
                    remaining: cooldown() - elapsed,
                };
            }
            if elapsed > streak_window() {
                0
            } else {
                streak
            }
        }
    };

    let streak = base_streak.saturating_add(1);
    ClaimDecision::Grant {
        streak,
        bonus: daily_bonus_amount(streak),
    }
}

/// Whole hours and leftover minutes of a wait, for display.
pub fn split_wait(remaining: Duration) -> (i64, i64) {
    let total = remaining.num_seconds().max(0);
    (total / 3600, (total % 3600) / 60)
}
