//! Game Engine
//!
//! Single-session state machine: `start`, `guess` and `past_guesses`.
//! Synchronous and free of I/O; callers that share a session across tasks
//! wrap it in a lock (see `network::session`).

use crate::core::rng::DeterministicRng;
use crate::game::guess::{Guess, GuessError, Score};
use crate::game::secret::Secret;
use crate::DEFAULT_ATTEMPT_LIMIT;

/// Whether a game is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    /// `start` has never been called.
    NotStarted,
    /// A secret is set and guesses are accepted.
    InProgress {
        /// The value being guessed.
        secret: Secret,
    },
}

/// A recorded, scored guess.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PastGuess {
    /// The guess as submitted.
    pub guess: Guess,
    /// Its feedback.
    pub score: Score,
}

/// Result of an accepted guess.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuessOutcome {
    /// The guess equals the secret. History has been cleared.
    Win,
    /// Ordinary feedback; the game continues.
    Feedback {
        /// The scored guess.
        guess: Guess,
        /// Its feedback.
        score: Score,
    },
    /// The attempt limit is used up. Carries the score and reveals the secret.
    GameOver {
        /// The limit that was reached.
        attempt_limit: u32,
        /// The revealed secret.
        secret: Secret,
        /// The guess that reached, or came after, the limit.
        guess: Guess,
        /// Its feedback.
        score: Score,
    },
}

/// Resolve the attempt limit for a new game.
///
/// An explicit limit wins, with `0` meaning unlimited. Without one, the
/// `unlimited` flag picks between `0` and [`DEFAULT_ATTEMPT_LIMIT`].
pub fn resolve_attempt_limit(limit: Option<u32>, unlimited: bool) -> u32 {
    match limit {
        Some(limit) => limit,
        None if unlimited => 0,
        None => DEFAULT_ATTEMPT_LIMIT,
    }
}

/// One game session.
#[derive(Debug)]
pub struct Session {
    state: GameState,
    /// `0` means unlimited.
    attempt_limit: u32,
    /// Insertion ordered, no duplicate guesses.
    past_guesses: Vec<PastGuess>,
    rng: DeterministicRng,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DeterministicRng::from_entropy())
    }
}

impl Session {
    /// Create an unstarted session drawing secrets from `rng`.
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            state: GameState::NotStarted,
            attempt_limit: DEFAULT_ATTEMPT_LIMIT,
            past_guesses: Vec::new(),
            rng,
        }
    }

    /// Start a new game with a freshly generated secret.
    ///
    /// Resets the attempt limit and clears all past guesses.
    pub fn start(&mut self, limit: Option<u32>, unlimited: bool) {
        let secret = Secret::generate(&mut self.rng);
        self.start_with_secret(secret, limit, unlimited);
    }

    /// Start a new game with a known secret.
    pub fn start_with_secret(&mut self, secret: Secret, limit: Option<u32>, unlimited: bool) {
        self.state = GameState::InProgress { secret };
        self.attempt_limit = resolve_attempt_limit(limit, unlimited);
        self.past_guesses.clear();
    }

    /// Submit a guess.
    ///
    /// Rejected guesses leave the session untouched.
    pub fn guess(&mut self, input: &str) -> Result<GuessOutcome, GuessError> {
        let secret = match self.state {
            GameState::NotStarted => return Err(GuessError::NotStarted),
            GameState::InProgress { secret } => secret,
        };

        let guess = Guess::parse(input)?;

        if self.past_guesses.iter().any(|p| p.guess == guess) {
            return Err(GuessError::AlreadyGuessed);
        }

        if guess.matches(&secret) {
            self.past_guesses.clear();
            return Ok(GuessOutcome::Win);
        }

        let score = Score::compute(&secret, &guess);
        self.past_guesses.push(PastGuess { guess, score });

        if self.limit_reached() {
            Ok(GuessOutcome::GameOver {
                attempt_limit: self.attempt_limit,
                secret,
                guess,
                score,
            })
        } else {
            Ok(GuessOutcome::Feedback { guess, score })
        }
    }

    /// Recorded guesses in the order they were made.
    pub fn past_guesses(&self) -> &[PastGuess] {
        &self.past_guesses
    }

    /// Current game state.
    pub fn state(&self) -> GameState {
        self.state
    }

    /// Whether a game has been started.
    pub fn is_started(&self) -> bool {
        matches!(self.state, GameState::InProgress { .. })
    }

    /// Attempt limit of the current game. `0` means unlimited.
    pub fn attempt_limit(&self) -> u32 {
        self.attempt_limit
    }

    /// Number of recorded guesses.
    pub fn attempts_used(&self) -> usize {
        self.past_guesses.len()
    }

    fn limit_reached(&self) -> bool {
        self.attempt_limit > 0 && self.past_guesses.len() >= self.attempt_limit as usize
    }
}

// =============================================================================
// TESTS
// =============================================================================
