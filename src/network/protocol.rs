//! Protocol Messages
//!
//! JSON shapes for the HTTP endpoints and the WebSocket channel.
//! The HTTP bodies use the camelCase field names of the published API
//! (`digitsCorrect`, `pastGuesses`) and keep the capitalised `Guess` key.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::engine::{GuessOutcome, PastGuess};
use crate::game::guess::GuessError;

/// Result text for a winning guess.
pub const WIN_MESSAGE: &str = "You win";

// =============================================================================
// HTTP BODIES
// =============================================================================

/// Body of `POST /guess`.
///
/// Untagged: the variant is recognisable by its fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuessResponse {
    /// The guess was rejected.
    Error {
        /// Human readable reason.
        error: String,
    },
    /// Attempts used up; the secret is revealed.
    #[serde(rename_all = "camelCase")]
    GameOver {
        /// "Game Over - ..." message.
        result: String,
        /// The revealed secret.
        secret: String,
        /// The guess that ended the game.
        #[serde(rename = "Guess")]
        guess: String,
        /// Digits matched by value.
        digits_correct: u8,
        /// Digits matched by value and position.
        positions_correct: u8,
    },
    /// The guess equals the secret.
    Win {
        /// Always [`WIN_MESSAGE`].
        result: String,
    },
    /// Ordinary feedback.
    #[serde(rename_all = "camelCase")]
    Feedback {
        /// The scored guess.
        #[serde(rename = "Guess")]
        guess: String,
        /// Digits matched by value.
        digits_correct: u8,
        /// Digits matched by value and position.
        positions_correct: u8,
    },
}

impl GuessResponse {
    /// Whether this response reports a rejection.
    pub fn is_error(&self) -> bool {
        matches!(self, GuessResponse::Error { .. })
    }
}

impl From<Result<GuessOutcome, GuessError>> for GuessResponse {
    fn from(result: Result<GuessOutcome, GuessError>) -> Self {
        match result {
            Err(e) => GuessResponse::Error { error: e.to_string() },
            Ok(GuessOutcome::Win) => GuessResponse::Win {
                result: WIN_MESSAGE.to_string(),
            },
            Ok(GuessOutcome::Feedback { guess, score }) => GuessResponse::Feedback {
                guess: guess.to_string(),
                digits_correct: score.digits_correct,
                positions_correct: score.positions_correct,
            },
            Ok(GuessOutcome::GameOver { attempt_limit, secret, guess, score }) => {
                GuessResponse::GameOver {
                    result: game_over_message(attempt_limit),
                    secret: secret.to_string(),
                    guess: guess.to_string(),
                    digits_correct: score.digits_correct,
                    positions_correct: score.positions_correct,
                }
            }
        }
    }
}

/// Result text for an exhausted game.
pub fn game_over_message(attempt_limit: u32) -> String {
    format!("Game Over - You've used all {} attempts!", attempt_limit)
}

/// One entry of `GET /past_guesses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PastGuessEntry {
    /// The guess as submitted.
    pub guess: String,
    /// Digits matched by value.
    pub digits_correct: u8,
    /// Digits matched by value and position.
    pub positions_correct: u8,
}

impl From<&PastGuess> for PastGuessEntry {
    fn from(past: &PastGuess) -> Self {
        Self {
            guess: past.guess.to_string(),
            digits_correct: past.score.digits_correct,
            positions_correct: past.score.positions_correct,
        }
    }
}

/// Body of `GET /past_guesses`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PastGuessesResponse {
    /// Recorded guesses, oldest first.
    pub past_guesses: Vec<PastGuessEntry>,
}

impl PastGuessesResponse {
    /// Build from engine history.
    pub fn from_history(history: &[PastGuess]) -> Self {
        Self {
            past_guesses: history.iter().map(PastGuessEntry::from).collect(),
        }
    }
}

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Whether a game has been started.
    pub started: bool,
}

// =============================================================================
// START PARAMETERS
// =============================================================================

/// Parameters of `start`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartParams {
    /// Explicit attempt limit; `0` means unlimited.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Legacy flag, used only when `limit` is absent.
    #[serde(default)]
    pub unlimited: bool,
}

/// Query parameter errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    /// A required parameter is absent.
    #[error("missing required parameter: {0}")]
    Missing(&'static str),
    /// A parameter has the wrong type.
    #[error("invalid value for parameter {name}: {value:?}")]
    Invalid {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

impl StartParams {
    /// Parse from raw query values.
    pub fn parse(limit: Option<&str>, unlimited: Option<&str>) -> Result<Self, ParamError> {
        let limit = match limit {
            Some(value) => Some(value.trim().parse::<u32>().map_err(|_| ParamError::Invalid {
                name: "limit",
                value: value.to_string(),
            })?),
            None => None,
        };
        let unlimited = match unlimited {
            Some(value) => parse_bool(value).ok_or_else(|| ParamError::Invalid {
                name: "unlimited",
                value: value.to_string(),
            })?,
            None => false,
        };
        Ok(Self { limit, unlimited })
    }
}

/// Parse a boolean query value. Case-insensitive.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// WEBSOCKET MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a new game.
    Start(StartParams),

    /// Submit a guess.
    Guess {
        /// Raw guess text.
        guess: String,
    },

    /// Request the guess history.
    PastGuesses,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A game was started.
    Started {
        /// Resolved attempt limit; `0` means unlimited.
        attempt_limit: u32,
    },

    /// Answer to a guess.
    GuessResult(GuessResponse),

    /// Guess history.
    PastGuesses(PastGuessesResponse),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time in milliseconds since the Unix epoch.
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Server error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed or is not supported.
    InvalidInput,
}

impl ClientMessage {
    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// TESTS
// =============================================================================
