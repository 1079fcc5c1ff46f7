//! Network Layer
//!
//! HTTP and WebSocket transport around the game engine.
//! Holds no game rules; every request becomes one engine call.

pub mod config;
pub mod cors;
pub mod http;
pub mod protocol;
pub mod server;
pub mod session;

pub use config::{ConfigError, ServerConfig};
pub use cors::CorsPolicy;
pub use http::{HttpError, Request, Response};
pub use protocol::{ClientMessage, GuessResponse, PastGuessesResponse, ServerMessage, StartParams};
pub use server::{handle_request, GameServer, GameServerError};
pub use session::SharedSession;
