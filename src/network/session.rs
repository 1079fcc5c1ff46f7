//! Shared Session Handle
//!
//! The server owns exactly one game [`Session`] and hands out clones of this
//! handle to connection tasks. `start` and `guess` take the write lock, so
//! they never interleave; `past_guesses` only reads.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::rng::DeterministicRng;
use crate::game::engine::{GuessOutcome, PastGuess, Session};
use crate::game::guess::GuessError;
use crate::game::secret::Secret;

/// Cloneable handle to the server's game session.
#[derive(Clone, Debug, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<Session>>,
}

impl SharedSession {
    /// Wrap an existing session.
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(session)),
        }
    }

    /// Session drawing secrets from a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(Session::new(DeterministicRng::new(seed)))
    }

    /// Start a new game. Returns the resolved attempt limit.
    pub async fn start(&self, limit: Option<u32>, unlimited: bool) -> u32 {
        let mut session = self.inner.write().await;
        session.start(limit, unlimited);
        let attempt_limit = session.attempt_limit();
        info!(attempt_limit, "Game started");
        attempt_limit
    }

    /// Start a new game with a known secret.
    pub async fn start_with_secret(&self, secret: Secret, limit: Option<u32>, unlimited: bool) -> u32 {
        let mut session = self.inner.write().await;
        session.start_with_secret(secret, limit, unlimited);
        session.attempt_limit()
    }

    /// Submit a guess.
    pub async fn guess(&self, input: &str) -> Result<GuessOutcome, GuessError> {
        let mut session = self.inner.write().await;
        let result = session.guess(input);

        match &result {
            Ok(GuessOutcome::Win) => info!("Secret guessed, game won"),
            Ok(GuessOutcome::GameOver { attempt_limit, .. }) => {
                info!(attempt_limit, "Attempt limit reached, game over")
            }
            Ok(GuessOutcome::Feedback { guess, score }) => debug!(
                %guess,
                digits_correct = score.digits_correct,
                positions_correct = score.positions_correct,
                attempts_used = session.attempts_used(),
                "Guess scored"
            ),
            Err(e) => debug!(input, "Guess rejected: {}", e),
        }

        result
    }

    /// Recorded guesses, oldest first.
    pub async fn past_guesses(&self) -> Vec<PastGuess> {
        self.inner.read().await.past_guesses().to_vec()
    }

    /// Whether a game has been started.
    pub async fn is_started(&self) -> bool {
        self.inner.read().await.is_started()
    }

    /// Attempt limit of the current game. `0` means unlimited.
    pub async fn attempt_limit(&self) -> u32 {
        self.inner.read().await.attempt_limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_guess_before_start() {
        let session = SharedSession::with_seed(1);
        assert!(!session.is_started().await);
        assert_eq!(session.guess("1234").await, Err(GuessError::NotStarted));
    }

    #[tokio::test]
    async fn test_start_resolves_limit() {
        let session = SharedSession::with_seed(1);
        assert_eq!(session.start(Some(15), false).await, 15);
        assert_eq!(session.start(None, true).await, 0);
        assert_eq!(session.start(None, false).await, 10);
        assert!(session.is_started().await);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let session = SharedSession::with_seed(1);
        let other = session.clone();

        session.start_with_secret("1234".parse().unwrap(), None, true).await;
        other.guess("5678").await.unwrap();

        let history = session.past_guesses().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].guess.to_string(), "5678");
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_guesses_recorded_once() {
        let session = SharedSession::with_seed(1);
        session.start_with_secret("1234".parse().unwrap(), None, true).await;

        let mut handles = Vec::new();
        for i in 0..32 {
            let session = session.clone();
            let guess = if i % 2 == 0 { "5678" } else { "9876" };
            handles.push(tokio::spawn(async move { session.guess(guess).await }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 2);
        let history = session.past_guesses().await;
        let unique: HashSet<String> = history.iter().map(|p| p.guess.to_string()).collect();
        assert_eq!(history.len(), 2);
        assert_eq!(unique.len(), 2);
    }
}
