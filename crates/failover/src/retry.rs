//! Retry coordination: resend the last user message once per failover episode.
//!
//! Two guards keep a failover from looping:
//! - an in-flight lock, held from dispatch until a release timer fires, so
//!   only one retry runs at a time;
//! - a content fingerprint, so the same message is not retried twice in a row
//!   until an unrelated turn starts.
//!
//! The lock carries a generation number. A release timer only clears the lock
//! it was armed for, so a late timer from an old episode cannot unlock a newer
//! one.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rotakey_types::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default time a retry holds the in-flight lock.
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(5);

/// What [`RetryCoordinator::attempt`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The message was handed to the host.
    Dispatched,
    /// Another retry holds the lock; nothing was sent.
    AlreadyInFlight,
    /// The same content was just retried; nothing was sent.
    DuplicateContent,
    /// No user message has been seen yet.
    NothingToRetry,
    /// The host rejected the resend. The lock is released immediately.
    DispatchFailed,
}

#[derive(Debug)]
struct Episode {
    in_flight: bool,
    last_fingerprint: Option<String>,
    generation: u64,
    last_content: Option<Value>,
    lock_duration: Duration,
}

/// Stable fingerprint of a message's content.
#[must_use]
pub fn fingerprint(content: &Value) -> String {
    // `Value` objects serialize with sorted keys, so equal content always
    // produces the same bytes.
    let bytes = serde_json::to_vec(content).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(Sha256::digest(&bytes))
}

/// Owns the retry episode state.
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    episode: Arc<Mutex<Episode>>,
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_DURATION)
    }
}

impl RetryCoordinator {
    #[must_use]
    pub fn new(lock_duration: Duration) -> Self {
        Self {
            episode: Arc::new(Mutex::new(Episode {
                in_flight: false,
                last_fingerprint: None,
                generation: 0,
                last_content: None,
                lock_duration,
            })),
        }
    }

    /// Change how long future retries hold the lock. A lock already held
    /// keeps its timer.
    pub fn set_lock_duration(&self, lock_duration: Duration) {
        self.episode().lock_duration = lock_duration;
    }

    fn episode(&self) -> std::sync::MutexGuard<'_, Episode> {
        // The episode holds plain data, so a poisoned lock is still usable.
        self.episode
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether a retry currently holds the lock.
    #[must_use]
    pub fn is_retrying(&self) -> bool {
        self.episode().in_flight
    }

    /// The generation of the most recent dispatch.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.episode().generation
    }

    /// Record the start of a turn.
    ///
    /// A turn that starts while no retry is in flight was not caused by a
    /// retry, so the fingerprint is forgotten and the same content may be
    /// retried again in a later, unrelated episode. `user_content`, when
    /// present, becomes the message a future retry resends.
    pub fn on_turn_start(&self, user_content: Option<&Value>) {
        let mut episode = self.episode();
        if !episode.in_flight {
            episode.last_fingerprint = None;
        }
        if let Some(content) = user_content {
            episode.last_content = Some(content.clone());
        }
    }

    /// The most recent user message seen at turn start.
    #[must_use]
    pub fn last_content(&self) -> Option<Value> {
        self.episode().last_content.clone()
    }

    /// Resend the last user message through `dispatch`, unless a retry is in
    /// flight or this exact content was just retried.
    pub async fn attempt<F, Fut>(&self, dispatch: F) -> RetryDecision
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let Some(content) = self.last_content() else {
            return RetryDecision::NothingToRetry;
        };
        let fp = fingerprint(&content);

        let (generation, lock_duration) = {
            let mut episode = self.episode();
            if episode.in_flight {
                tracing::debug!("retry suppressed: another retry is in flight");
                return RetryDecision::AlreadyInFlight;
            }
            if episode.last_fingerprint.as_deref() == Some(fp.as_str()) {
                tracing::debug!("retry suppressed: content was just retried");
                return RetryDecision::DuplicateContent;
            }
            episode.in_flight = true;
            episode.last_fingerprint = Some(fp);
            episode.generation += 1;
            (episode.generation, episode.lock_duration)
        };
        arm_release(Arc::clone(&self.episode), generation, lock_duration);

        match dispatch(content).await {
            Ok(()) => {
                tracing::info!(generation, "retry dispatched");
                RetryDecision::Dispatched
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "retry dispatch failed");
                self.release(generation);
                RetryDecision::DispatchFailed
            }
        }
    }

    /// Clear the lock if it still belongs to `generation`.
    pub fn release(&self, generation: u64) -> bool {
        release(&self.episode, generation)
    }
}

fn arm_release(episode: Arc<Mutex<Episode>>, generation: u64, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if release(&episode, generation) {
            tracing::debug!(generation, "retry lock released by timer");
        }
    });
}

fn release(episode: &Mutex<Episode>, generation: u64) -> bool {
    let mut episode = episode
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    if episode.in_flight && episode.generation == generation {
        episode.in_flight = false;
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotakey_types::RotakeyError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnOnce(Value) -> std::future::Ready<Result<()>> {
        let counter = Arc::clone(counter);
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[test]
    fn test_fingerprint_is_stable_across_key_order() {
        let a = json!({"role": "user", "text": "hi"});
        let b: Value = serde_json::from_str(r#"{"text": "hi", "role": "user"}"#).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&json!("hi")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_retry_without_content() {
        let retry = RetryCoordinator::default();
        let sent = Arc::new(AtomicUsize::new(0));
        assert_eq!(retry.attempt(counting(&sent)).await, RetryDecision::NothingToRetry);
        assert_eq!(sent.load(Ordering::SeqCst), 0);
        assert!(!retry.is_retrying());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_calls_while_in_flight_dispatch_once() {
        let retry = RetryCoordinator::default();
        retry.on_turn_start(Some(&json!("hello")));
        let sent = Arc::new(AtomicUsize::new(0));

        assert_eq!(retry.attempt(counting(&sent)).await, RetryDecision::Dispatched);
        assert!(retry.is_retrying());
        assert_eq!(retry.attempt(counting(&sent)).await, RetryDecision::AlreadyInFlight);
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_releases_lock_but_fingerprint_blocks_same_content() {
        let retry = RetryCoordinator::new(Duration::from_secs(5));
        retry.on_turn_start(Some(&json!("hello")));
        let sent = Arc::new(AtomicUsize::new(0));
        retry.attempt(counting(&sent)).await;

        tokio::time::sleep(Duration::from_millis(5001)).await;
        assert!(!retry.is_retrying());
        assert_eq!(retry.attempt(counting(&sent)).await, RetryDecision::DuplicateContent);
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_turn_start_clears_fingerprint() {
        let retry = RetryCoordinator::new(Duration::from_secs(5));
        retry.on_turn_start(Some(&json!("hello")));
        let sent = Arc::new(AtomicUsize::new(0));
        retry.attempt(counting(&sent)).await;

        // The retried turn starts while the lock is held: fingerprint kept.
        retry.on_turn_start(None);
        tokio::time::sleep(Duration::from_millis(5001)).await;
        assert_eq!(retry.attempt(counting(&sent)).await, RetryDecision::DuplicateContent);

        // A later, unrelated turn with the same text may be retried again.
        retry.on_turn_start(Some(&json!("hello")));
        assert_eq!(retry.attempt(counting(&sent)).await, RetryDecision::Dispatched);
        assert_eq!(sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_timer_does_not_release_newer_episode() {
        let retry = RetryCoordinator::new(Duration::from_secs(5));
        retry.on_turn_start(Some(&json!("first")));
        let sent = Arc::new(AtomicUsize::new(0));
        retry.attempt(counting(&sent)).await;
        let first = retry.generation();

        // Released early by hand, then a new episode starts at t=3s.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(retry.release(first));
        retry.on_turn_start(Some(&json!("second")));
        assert_eq!(retry.attempt(counting(&sent)).await, RetryDecision::Dispatched);

        // The first timer fires at t=5s and must leave the second lock alone.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(retry.is_retrying());
        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert!(!retry.is_retrying());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_duration_change_applies_to_next_retry() {
        let retry = RetryCoordinator::new(Duration::from_secs(5));
        retry.set_lock_duration(Duration::from_secs(1));
        retry.on_turn_start(Some(&json!("hello")));
        let sent = Arc::new(AtomicUsize::new(0));
        retry.attempt(counting(&sent)).await;
        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert!(!retry.is_retrying());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_failure_releases_lock_keeps_fingerprint() {
        let retry = RetryCoordinator::default();
        retry.on_turn_start(Some(&json!("hello")));
        let decision = retry
            .attempt(|_| std::future::ready(Err(RotakeyError::Host("queue closed".into()))))
            .await;
        assert_eq!(decision, RetryDecision::DispatchFailed);
        assert!(!retry.is_retrying());
        let sent = Arc::new(AtomicUsize::new(0));
        assert_eq!(retry.attempt(counting(&sent)).await, RetryDecision::DuplicateContent);
    }
}
