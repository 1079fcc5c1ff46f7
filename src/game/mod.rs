//! Game Logic Module
//!
//! All game rules. Synchronous, no I/O.
//!
//! ## Module Structure
//!
//! - `secret`: Secret generation and validation
//! - `guess`: Guess validation and scoring
//! - `engine`: Session state machine

pub mod engine;
pub mod guess;
pub mod secret;

// Re-export key types
pub use engine::{resolve_attempt_limit, GameState, GuessOutcome, PastGuess, Session};
pub use guess::{Guess, GuessError, Score};
pub use secret::{Secret, SecretError};
