//! Core primitives.
//!
//! Randomness lives here so that the game layer can be driven by an explicit,
//! seedable source in tests and by entropy in production.

pub mod rng;

pub use rng::{derive_session_seed, DeterministicRng};
