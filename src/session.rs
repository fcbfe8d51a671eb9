//! Pending conversational steps, one per (user, chat).
//!
//! A flow only ever moves forward: a note prompt completes in one step, a
//! transfer goes amount -> target -> done. `/cancel` or the timeout ends
//! either flow early. A step only listens in the channel it was started in.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::debug;

/// (user_id, chat_id)
pub type SessionKey = (u64, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStep {
    AwaitingNote { delta: i64 },
    AwaitingTransferAmount,
    AwaitingTransferTarget { amount: i64 },
}

impl PendingStep {
    fn can_advance_to(&self, next: &PendingStep) -> bool {
        matches!(
            (self, next),
            (
                PendingStep::AwaitingTransferAmount,
                PendingStep::AwaitingTransferTarget { .. }
            )
        )
    }
}

struct Pending {
    step: PendingStep,
    channel_id: u64,
    started: Instant,
}

#[derive(Clone)]
pub struct SessionStore {
    pending: Arc<Mutex<LruCache<SessionKey, Pending>>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            pending: Arc::new(Mutex::new(LruCache::new(cap))),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn with_pending<T>(&self, f: impl FnOnce(&mut LruCache<SessionKey, Pending>) -> T) -> T {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut pending)
    }

    /// Start a flow, replacing whatever the user had pending in this chat.
    pub fn begin(&self, key: SessionKey, channel_id: u64, step: PendingStep) -> Option<PendingStep> {
        self.begin_at(key, channel_id, step, Instant::now())
    }

    pub(crate) fn begin_at(
        &self,
        key: SessionKey,
        channel_id: u64,
        step: PendingStep,
        now: Instant,
    ) -> Option<PendingStep> {
        debug!("Session: {:?} begins {:?} in channel {}", key, step, channel_id);
        self.with_pending(|pending| {
            pending
                .put(
                    key,
                    Pending {
                        step,
                        channel_id,
                        started: now,
                    },
                )
                .map(|old| old.step)
        })
    }

    /// The pending step for `key`, if it was started in `channel_id` and has not expired.
    pub fn current(&self, key: SessionKey, channel_id: u64) -> Option<PendingStep> {
        self.current_at(key, channel_id, Instant::now())
    }

    pub(crate) fn current_at(&self, key: SessionKey, channel_id: u64, now: Instant) -> Option<PendingStep> {
        let timeout = self.timeout;
        self.with_pending(|pending| {
            let expired = pending
                .peek(&key)
                .map(|p| now.saturating_duration_since(p.started) > timeout)?;
            if expired {
                pending.pop(&key);
                return None;
            }
            pending
                .get(&key)
                .filter(|p| p.channel_id == channel_id)
                .map(|p| p.step)
        })
    }

    /// Move from `from` to `to` if that is the pending step and a forward move.
    /// Advancing restarts the timeout.
    pub fn advance(&self, key: SessionKey, from: PendingStep, to: PendingStep) -> bool {
        if !from.can_advance_to(&to) {
            return false;
        }
        let now = Instant::now();
        self.with_pending(|pending| match pending.get_mut(&key) {
            Some(current) if current.step == from => {
                current.step = to;
                current.started = now;
                true
            }
            _ => false,
        })
    }

    /// Complete the flow if `expected` is still the pending step.
    pub fn finish(&self, key: SessionKey, expected: PendingStep) -> bool {
        self.with_pending(|pending| match pending.peek(&key) {
            Some(current) if current.step == expected => {
                pending.pop(&key);
                true
            }
            _ => false,
        })
    }

    pub fn cancel(&self, key: SessionKey) -> Option<PendingStep> {
        self.with_pending(|pending| pending.pop(&key).map(|p| p.step))
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: Instant) -> usize {
        let timeout = self.timeout;
        self.with_pending(|pending| {
            let expired: Vec<SessionKey> = pending
                .iter()
                .filter(|(_, p)| now.saturating_duration_since(p.started) > timeout)
                .map(|(key, _)| *key)
                .collect();
            for key in &expired {
                pending.pop(key);
            }
            expired.len()
        })
    }
}

/// Periodically drop flows nobody finished.
pub async fn start_expiry_task(sessions: SessionStore) {
    let mut ticker = interval(sessions.timeout().max(Duration::from_secs(30)));
    loop {
        ticker.tick().await;
        let removed = sessions.sweep_expired();
        if removed > 0 {
            debug!("Session: expired {} pending flow(s)", removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: SessionKey = (1, 10);
    const CHANNEL: u64 = 100;

    fn store() -> SessionStore {
        SessionStore::new(16, Duration::from_secs(60))
    }

    #[test]
    fn test_note_flow_finishes_once() {
        let sessions = store();
        let step = PendingStep::AwaitingNote { delta: 3 };
        sessions.begin(KEY, CHANNEL, step);

        assert_eq!(sessions.current(KEY, CHANNEL), Some(step));
        assert!(sessions.finish(KEY, step));
        assert!(!sessions.finish(KEY, step));
        assert_eq!(sessions.current(KEY, CHANNEL), None);
    }

    #[test]
    fn test_transfer_flow_only_moves_forward() {
        let sessions = store();
        sessions.begin(KEY, CHANNEL, PendingStep::AwaitingTransferAmount);

        let target = PendingStep::AwaitingTransferTarget { amount: 7 };
        assert!(sessions.advance(KEY, PendingStep::AwaitingTransferAmount, target));
        assert_eq!(sessions.current(KEY, CHANNEL), Some(target));

        // No way back, and no skipping from a different step.
        assert!(!sessions.advance(KEY, target, PendingStep::AwaitingTransferAmount));
        assert!(!sessions.advance(
            KEY,
            PendingStep::AwaitingTransferAmount,
            PendingStep::AwaitingTransferTarget { amount: 9 }
        ));
        assert_eq!(sessions.current(KEY, CHANNEL), Some(target));
    }

    #[test]
    fn test_advance_fails_once_step_is_gone() {
        let sessions = store();
        sessions.begin(KEY, CHANNEL, PendingStep::AwaitingTransferAmount);
        sessions.cancel(KEY);

        let target = PendingStep::AwaitingTransferTarget { amount: 3 };
        assert!(!sessions.advance(KEY, PendingStep::AwaitingTransferAmount, target));
        assert_eq!(sessions.current(KEY, CHANNEL), None);
    }

    #[test]
    fn test_note_step_cannot_advance() {
        let sessions = store();
        let note = PendingStep::AwaitingNote { delta: -1 };
        sessions.begin(KEY, CHANNEL, note);
        assert!(!sessions.advance(KEY, note, PendingStep::AwaitingTransferTarget { amount: 1 }));
    }

    #[test]
    fn test_sessions_are_scoped_per_chat() {
        let sessions = store();
        sessions.begin((1, 10), CHANNEL, PendingStep::AwaitingTransferAmount);
        assert_eq!(sessions.current((1, 11), CHANNEL), None);
        assert_eq!(sessions.current((2, 10), CHANNEL), None);
    }

    #[test]
    fn test_step_ignores_other_channels() {
        let sessions = store();
        let step = PendingStep::AwaitingNote { delta: 2 };
        sessions.begin(KEY, CHANNEL, step);

        assert_eq!(sessions.current(KEY, CHANNEL + 1), None);
        // Still pending where it was started.
        assert_eq!(sessions.current(KEY, CHANNEL), Some(step));
    }

    #[test]
    fn test_cancel_clears_step() {
        let sessions = store();
        sessions.begin(KEY, CHANNEL, PendingStep::AwaitingTransferAmount);
        assert_eq!(sessions.cancel(KEY), Some(PendingStep::AwaitingTransferAmount));
        assert_eq!(sessions.cancel(KEY), None);
    }

    #[test]
    fn test_expired_steps_disappear() {
        let sessions = store();
        let start = Instant::now();
        sessions.begin_at((1, 10), CHANNEL, PendingStep::AwaitingTransferAmount, start);
        sessions.begin_at((2, 10), CHANNEL, PendingStep::AwaitingNote { delta: 1 }, start + Duration::from_secs(50));

        let later = start + Duration::from_secs(61);
        assert_eq!(sessions.current_at((1, 10), CHANNEL, later), None);
        assert!(sessions.current_at((2, 10), CHANNEL, later).is_some());

        assert_eq!(sessions.sweep_expired_at(start + Duration::from_secs(200)), 1);
        assert_eq!(sessions.current_at((2, 10), CHANNEL, start + Duration::from_secs(200)), None);
    }

    #[test]
    fn test_capacity_evicts_oldest_flow() {
        let sessions = SessionStore::new(2, Duration::from_secs(60));
        sessions.begin((1, 1), CHANNEL, PendingStep::AwaitingTransferAmount);
        sessions.begin((2, 1), CHANNEL, PendingStep::AwaitingTransferAmount);
        sessions.begin((3, 1), CHANNEL, PendingStep::AwaitingTransferAmount);

        assert_eq!(sessions.current((1, 1), CHANNEL), None);
        assert!(sessions.current((3, 1), CHANNEL).is_some());
    }
}
