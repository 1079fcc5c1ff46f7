//! Secret Generation
//!
//! A secret is four distinct decimal digits whose first digit is non-zero.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::core::rng::DeterministicRng;
use crate::game::guess::{parse_distinct_digits, DigitsError};
use crate::CODE_LENGTH;

/// The hidden 4-digit value a player is trying to guess.
///
/// Can only be built through [`Secret::generate`] or validated parsing, so a
/// `Secret` always holds distinct digits with a non-zero lead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Secret([u8; CODE_LENGTH]);

/// Reasons a string cannot be used as a secret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    /// Wrong number of characters.
    #[error("secret must be {CODE_LENGTH} digits")]
    InvalidLength,
    /// A character outside `0`-`9`.
    #[error("secret must contain only decimal digits")]
    InvalidFormat,
    /// A digit appears more than once.
    #[error("secret digits must be unique")]
    DuplicateDigits,
    /// The first digit is zero.
    #[error("secret must not start with 0")]
    LeadingZero,
}

impl From<DigitsError> for SecretError {
    fn from(e: DigitsError) -> Self {
        match e {
            DigitsError::Length => SecretError::InvalidLength,
            DigitsError::Format => SecretError::InvalidFormat,
            DigitsError::Duplicate => SecretError::DuplicateDigits,
        }
    }
}

impl Secret {
    /// Generate a fresh secret.
    ///
    /// Shuffles all ten digits and keeps the first four. A leading zero is
    /// swapped with the second digit.
    pub fn generate(rng: &mut DeterministicRng) -> Self {
        let mut digits = [0u8, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        rng.shuffle(&mut digits);
        Self::from_permutation(&digits)
    }

    /// Build a secret from the head of a digit permutation.
    pub(crate) fn from_permutation(permutation: &[u8; 10]) -> Self {
        let mut digits = [0u8; CODE_LENGTH];
        digits.copy_from_slice(&permutation[..CODE_LENGTH]);
        if digits[0] == 0 {
            digits.swap(0, 1);
        }
        Self(digits)
    }

    /// Digit values, most significant first.
    pub fn digits(&self) -> &[u8; CODE_LENGTH] {
        &self.0
    }
}

impl FromStr for Secret {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = parse_distinct_digits(s)?;
        if digits[0] == 0 {
            return Err(SecretError::LeadingZero);
        }

        Ok(Self(digits))
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in self.0 {
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
