//! Guess Validation and Scoring
//!
//! Turns raw player input into a [`Guess`] and scores it against a
//! [`Secret`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::secret::Secret;
use crate::CODE_LENGTH;

/// Reasons a guess is rejected.
///
/// The engine checks these in declaration order and reports the first
/// one that applies. The messages are shown to players verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuessError {
    /// No game has been started yet.
    #[error("Game not started")]
    NotStarted,
    /// Input is not exactly four characters long.
    #[error("Guess must be 4 digits")]
    InvalidLength,
    /// Input contains something other than decimal digits.
    #[error("Guess must be a number")]
    InvalidFormat,
    /// A digit appears more than once.
    #[error("Digits must be unique (no repeats)")]
    DuplicateDigits,
    /// The same guess was already recorded in this game.
    #[error("Guess already made")]
    AlreadyGuessed,
}

/// Why a string is not four distinct decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DigitsError {
    Length,
    Format,
    Duplicate,
}

impl From<DigitsError> for GuessError {
    fn from(e: DigitsError) -> Self {
        match e {
            DigitsError::Length => GuessError::InvalidLength,
            DigitsError::Format => GuessError::InvalidFormat,
            DigitsError::Duplicate => GuessError::DuplicateDigits,
        }
    }
}

/// Parse exactly four distinct decimal digits.
///
/// Checks length (in characters), then format, then uniqueness.
pub(crate) fn parse_distinct_digits(input: &str) -> Result<[u8; CODE_LENGTH], DigitsError> {
    if input.chars().count() != CODE_LENGTH {
        return Err(DigitsError::Length);
    }

    let mut digits = [0u8; CODE_LENGTH];
    for (slot, c) in digits.iter_mut().zip(input.chars()) {
        *slot = c.to_digit(10).ok_or(DigitsError::Format)? as u8;
    }

    let mut seen = [false; 10];
    for &d in &digits {
        if std::mem::replace(&mut seen[d as usize], true) {
            return Err(DigitsError::Duplicate);
        }
    }

    Ok(digits)
}

/// A syntactically valid guess: four distinct decimal digits.
///
/// Unlike a [`Secret`], a guess may start with `0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Guess([u8; CODE_LENGTH]);

impl Guess {
    /// Validate raw input.
    ///
    /// Checks length, then format, then uniqueness.
    pub fn parse(input: &str) -> Result<Self, GuessError> {
        Ok(Self(parse_distinct_digits(input)?))
    }

    /// Digit values, most significant first.
    pub fn digits(&self) -> &[u8; CODE_LENGTH] {
        &self.0
    }

    /// Whether this guess spells out the secret exactly.
    pub fn matches(&self, secret: &Secret) -> bool {
        &self.0 == secret.digits()
    }
}

impl fmt::Display for Guess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in self.0 {
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

/// Feedback for a single guess.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    /// Digits present in both guess and secret, regardless of position.
    pub digits_correct: u8,
    /// Positions where guess and secret hold the same digit.
    pub positions_correct: u8,
}

impl Score {
    /// Score `guess` against `secret`.
    pub fn compute(secret: &Secret, guess: &Guess) -> Self {
        Self {
            digits_correct: digits_correct(secret.digits(), guess.digits()),
            positions_correct: positions_correct(secret.digits(), guess.digits()),
        }
    }
}

/// Size of the multiset intersection of two digit sequences.
///
/// Repeated digits count at most as often as they appear in both inputs.
pub fn digits_correct(secret: &[u8], guess: &[u8]) -> u8 {
    let mut secret_counts = [0u8; 10];
    let mut guess_counts = [0u8; 10];
    for &d in secret {
        secret_counts[d as usize] += 1;
    }
    for &d in guess {
        guess_counts[d as usize] += 1;
    }

    secret_counts
        .iter()
        .zip(guess_counts.iter())
        .map(|(s, g)| (*s).min(*g))
        .sum()
}

/// Count of positions holding the same digit.
pub fn positions_correct(secret: &[u8], guess: &[u8]) -> u8 {
    secret
        .iter()
        .zip(guess.iter())
        .filter(|(s, g)| s == g)
        .count() as u8
}

// =============================================================================
// TESTS
// =============================================================================
