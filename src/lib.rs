//! # Digit Guess Game Server
//!
//! Authoritative server for a 4-digit number guessing game. The server holds
//! a secret with four unique digits and scores guesses against it, reporting
//! how many digits match by value and how many match by value and position.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DIGIT GUESS SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Seedable Xorshift128+ PRNG                │
//! │                                                              │
//! │  game/           - Game logic (synchronous, no I/O)          │
//! │  ├── secret.rs   - Secret generation and validation          │
//! │  ├── guess.rs    - Guess validation and scoring              │
//! │  └── engine.rs   - Session state machine                     │
//! │                                                              │
//! │  network/        - Transport (async)                         │
//! │  ├── config.rs   - Environment configuration                 │
//! │  ├── cors.rs     - Cross-origin allow-list                   │
//! │  ├── http.rs     - HTTP/1.1 request/response codec           │
//! │  ├── protocol.rs - JSON wire shapes                          │
//! │  ├── session.rs  - Shared session handle                     │
//! │  └── server.rs   - HTTP + WebSocket server                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `game/` modules hold all rules and never touch the network; the
//! `network/` modules only translate requests into engine calls.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::engine::{GuessOutcome, PastGuess, Session};
pub use game::guess::{Guess, GuessError, Score};
pub use game::secret::{Secret, SecretError};
pub use network::{GameServer, ServerConfig, SharedSession};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of digits in a secret and in a guess.
pub const CODE_LENGTH: usize = 4;

/// Attempt limit used when `Start` gets neither a limit nor the unlimited flag.
pub const DEFAULT_ATTEMPT_LIMIT: u32 = 10;
