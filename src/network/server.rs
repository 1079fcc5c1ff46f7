//! Game Server
//!
//! Async TCP server speaking HTTP/1.1 for the JSON API and upgrading
//! `/ws` connections to WebSocket. Every connection runs on its own task;
//! all of them share the one game session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, instrument, warn};

use crate::network::config::ServerConfig;
use crate::network::cors::CorsPolicy;
use crate::network::http::{Request, Response};
use crate::network::protocol::{
    ClientMessage, ErrorCode, GuessResponse, ParamError, PastGuessesResponse, ServerError,
    ServerMessage, StartParams, StatusResponse,
};
use crate::network::session::SharedSession;

/// Path that accepts WebSocket upgrades.
pub const WEBSOCKET_PATH: &str = "/ws";

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Socket or bind failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The single game session.
    session: SharedSession,
    /// Cross-origin policy.
    cors: CorsPolicy,
    /// One permit per open connection.
    connections: Arc<Semaphore>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server with a fresh, entropy-seeded session.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_session(config, SharedSession::default())
    }

    /// Create a server around an existing session.
    pub fn with_session(config: ServerConfig, session: SharedSession) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            cors: CorsPolicy::new(config.allowed_origins.clone()),
            connections: Arc::new(Semaphore::new(config.max_connections)),
            config,
            session,
            shutdown_tx,
        }
    }

    /// The shared game session.
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.config.max_connections - self.connections.available_permits()
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);
        if self.cors.is_enabled() {
            info!("CORS enabled for {:?}", self.config.allowed_origins);
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            match self.connections.clone().try_acquire_owned() {
                                Ok(permit) => {
                                    debug!("New connection from {}", addr);
                                    self.handle_connection(stream, addr, permit);
                                }
                                Err(_) => {
                                    warn!("Connection limit reached, rejecting {}", addr);
                                    tokio::spawn(async move {
                                        let mut stream = stream;
                                        let _ = Response::error(503, "Server busy")
                                            .write_to(&mut stream)
                                            .await;
                                    });
                                }
                            }
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Signal the accept loop and open WebSocket connections to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Serve one connection on its own task.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr, permit: OwnedSemaphorePermit) {
        let session = self.session.clone();
        let cors = self.cors.clone();
        let config = self.config.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) =
                Self::serve_connection(stream, addr, &session, &cors, &config, shutdown_rx).await
            {
                debug!("Connection {} ended with error: {}", addr, e);
            }
        });
    }

    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        session: &SharedSession,
        cors: &CorsPolicy,
        config: &ServerConfig,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), GameServerError> {
        let mut reader = BufReader::new(stream);

        let request = match timeout(config.request_timeout, Request::read(&mut reader)).await {
            Ok(Ok(Some(request))) => request,
            Ok(Ok(None)) => return Ok(()),
            Ok(Err(e)) => {
                debug!("Bad request from {}: {}", addr, e);
                if let Some(response) = e.to_response() {
                    response.write_to(reader.get_mut()).await?;
                }
                return Ok(());
            }
            Err(_) => {
                debug!("Request from {} timed out", addr);
                return Ok(());
            }
        };

        if request.path() == WEBSOCKET_PATH && request.is_websocket_upgrade() {
            return Self::serve_websocket(reader, &request, addr, session, cors, shutdown_rx).await;
        }

        let response = handle_request(&request, session, cors, &config.version).await;
        debug!(
            method = request.method(),
            path = request.path(),
            status = response.status,
            "{} served",
            addr
        );
        response.write_to(reader.get_mut()).await?;

        Ok(())
    }

    /// Complete the upgrade handshake and run the message loop.
    async fn serve_websocket(
        mut reader: BufReader<TcpStream>,
        request: &Request,
        addr: SocketAddr,
        session: &SharedSession,
        cors: &CorsPolicy,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), GameServerError> {
        if let Some(origin) = request.header("origin") {
            if cors.is_enabled() && !cors.is_allowed(origin) {
                warn!("Rejecting WebSocket from {} with origin {}", addr, origin);
                Response::error(403, "Disallowed origin")
                    .write_to(reader.get_mut())
                    .await?;
                return Ok(());
            }
        }

        let key = match request.header("sec-websocket-key") {
            Some(key) => key,
            None => {
                Response::error(400, "Missing Sec-WebSocket-Key")
                    .write_to(reader.get_mut())
                    .await?;
                return Ok(());
            }
        };

        Response::new(101)
            .with_header("Upgrade", "websocket")
            .with_header("Connection", "Upgrade")
            .with_header("Sec-WebSocket-Accept", &derive_accept_key(key.as_bytes()))
            .write_to(reader.get_mut())
            .await?;

        let ws_stream = WebSocketStream::from_raw_socket(reader, Role::Server, None).await;
        info!("WebSocket client connected from {}", addr);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

        // Spawn message sender task
        let sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    let reply = match msg {
                        Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                            Ok(client_msg) => Self::handle_client_message(client_msg, session).await,
                            Err(e) => {
                                debug!("Invalid message from {}: {}", addr, e);
                                invalid_input("Invalid message format")
                            }
                        },
                        Some(Ok(Message::Binary(_))) => invalid_input("Binary frames are not supported"),
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error for {}: {}", addr, e);
                            break;
                        }
                        Some(Ok(_)) => continue,
                    };
                    if msg_tx.send(reply).await.is_err() {
                        break;
                    }
                }
                _ = shutdown_rx.recv() => {
                    let _ = msg_tx.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }

        // Let queued replies drain before the socket closes
        drop(msg_tx);
        let _ = sender_task.await;

        info!("WebSocket client {} cleaned up", addr);
        Ok(())
    }

    /// Handle a WebSocket client message.
    async fn handle_client_message(msg: ClientMessage, session: &SharedSession) -> ServerMessage {
        match msg {
            ClientMessage::Start(params) => ServerMessage::Started {
                attempt_limit: session.start(params.limit, params.unlimited).await,
            },
            ClientMessage::Guess { guess } => {
                ServerMessage::GuessResult(GuessResponse::from(session.guess(&guess).await))
            }
            ClientMessage::PastGuesses => ServerMessage::PastGuesses(
                PastGuessesResponse::from_history(&session.past_guesses().await),
            ),
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
            },
        }
    }
}

fn invalid_input(message: &str) -> ServerMessage {
    ServerMessage::Error(ServerError {
        code: ErrorCode::InvalidInput,
        message: message.to_string(),
    })
}

/// Answer one HTTP request, including CORS handling.
pub async fn handle_request(
    request: &Request,
    session: &SharedSession,
    cors: &CorsPolicy,
    version: &str,
) -> Response {
    if let Some(preflight) = cors.preflight(request) {
        return preflight;
    }
    let response = route(request, session, version).await;
    cors.apply(request, response)
}

async fn route(request: &Request, session: &SharedSession, version: &str) -> Response {
    match (request.method(), request.path()) {
        ("GET", "/") => Response::json(
            200,
            &StatusResponse {
                status: "ok".to_string(),
                version: version.to_string(),
                started: session.is_started().await,
            },
        ),
        ("POST", "/start") => {
            match StartParams::parse(request.query_param("limit"), request.query_param("unlimited")) {
                Ok(params) => {
                    session.start(params.limit, params.unlimited).await;
                    Response::json(200, &serde_json::Value::Null)
                }
                Err(e) => Response::error(422, &e.to_string()),
            }
        }
        ("POST", "/guess") => match request.query_param("guess") {
            Some(guess) => Response::json(200, &GuessResponse::from(session.guess(guess).await)),
            None => Response::error(422, &ParamError::Missing("guess").to_string()),
        },
        ("GET", "/past_guesses") => Response::json(
            200,
            &PastGuessesResponse::from_history(&session.past_guesses().await),
        ),
        ("GET", WEBSOCKET_PATH) => Response::error(400, "Expected WebSocket upgrade"),
        (_, "/" | "/start" | "/guess" | "/past_guesses" | WEBSOCKET_PATH) => {
            Response::error(405, "Method Not Allowed")
        }
        _ => Response::error(404, "Not Found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn call(session: &SharedSession, method: &str, target: &str) -> (u16, Value) {
        let request = Request::new(method, target);
        let response = handle_request(&request, session, &CorsPolicy::default(), "test").await;
        (response.status, response.json_body().unwrap())
    }

    async fn started_session(secret: &str, limit: Option<u32>) -> SharedSession {
        let session = SharedSession::with_seed(5);
        session
            .start_with_secret(secret.parse().unwrap(), limit, false)
            .await;
        session
    }

    #[test]
    fn test_server_creation() {
        let server = GameServer::new(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        });
        assert_eq!(server.connection_count(), 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let session = SharedSession::with_seed(5);
        let (status, body) = call(&session, "GET", "/").await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "status": "ok", "version": "test", "started": false }));
    }

    #[tokio::test]
    async fn test_guess_before_start() {
        let session = SharedSession::with_seed(5);
        let (status, body) = call(&session, "POST", "/guess?guess=1234").await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "error": "Game not started" }));
    }

    #[tokio::test]
    async fn test_start_endpoint() {
        let session = SharedSession::with_seed(5);

        let (status, body) = call(&session, "POST", "/start?limit=15").await;
        assert_eq!(status, 200);
        assert_eq!(body, Value::Null);
        assert!(session.is_started().await);

        let (status, body) = call(&session, "POST", "/start?limit=abc").await;
        assert_eq!(status, 422);
        assert!(body["error"].as_str().unwrap().contains("limit"));
    }

    #[tokio::test]
    async fn test_full_game_over_http() {
        let session = started_session("1234", Some(2)).await;

        let (_, body) = call(&session, "POST", "/guess?guess=1243").await;
        assert_eq!(body, json!({ "Guess": "1243", "digitsCorrect": 4, "positionsCorrect": 2 }));

        let (_, body) = call(&session, "POST", "/guess?guess=1243").await;
        assert_eq!(body, json!({ "error": "Guess already made" }));

        let (_, body) = call(&session, "POST", "/guess?guess=5674").await;
        assert_eq!(body["result"], "Game Over - You've used all 2 attempts!");
        assert_eq!(body["secret"], "1234");
        assert_eq!(body["Guess"], "5674");
        assert_eq!(body["digitsCorrect"], 1);
        assert_eq!(body["positionsCorrect"], 1);

        let (_, body) = call(&session, "GET", "/past_guesses").await;
        assert_eq!(
            body,
            json!({ "pastGuesses": [
                { "guess": "1243", "digitsCorrect": 4, "positionsCorrect": 2 },
                { "guess": "5674", "digitsCorrect": 1, "positionsCorrect": 1 },
            ]})
        );
    }

    #[tokio::test]
    async fn test_win_over_http() {
        let session = started_session("9051", None).await;
        call(&session, "POST", "/guess?guess=1234").await;

        let (_, body) = call(&session, "POST", "/guess?guess=9051").await;
        assert_eq!(body, json!({ "result": "You win" }));

        let (_, body) = call(&session, "GET", "/past_guesses").await;
        assert_eq!(body, json!({ "pastGuesses": [] }));
    }

    #[tokio::test]
    async fn test_validation_errors_over_http() {
        let session = started_session("1234", None).await;

        let (_, body) = call(&session, "POST", "/guess?guess=112").await;
        assert_eq!(body["error"], "Guess must be 4 digits");
        let (_, body) = call(&session, "POST", "/guess?guess=11a2").await;
        assert_eq!(body["error"], "Guess must be a number");
        let (_, body) = call(&session, "POST", "/guess?guess=1123").await;
        assert_eq!(body["error"], "Digits must be unique (no repeats)");

        let (status, body) = call(&session, "POST", "/guess").await;
        assert_eq!(status, 422);
        assert_eq!(body["error"], "missing required parameter: guess");

        let (_, body) = call(&session, "GET", "/past_guesses").await;
        assert_eq!(body, json!({ "pastGuesses": [] }));
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let session = SharedSession::with_seed(5);
        assert_eq!(call(&session, "GET", "/nope").await.0, 404);
        assert_eq!(call(&session, "GET", "/guess").await.0, 405);
        assert_eq!(call(&session, "DELETE", "/start").await.0, 405);
        assert_eq!(call(&session, "GET", WEBSOCKET_PATH).await.0, 400);
    }

    #[tokio::test]
    async fn test_cors_headers_applied() {
        let session = SharedSession::with_seed(5);
        let cors = CorsPolicy::new(vec!["https://game.example".to_string()]);

        let request = Request::new("GET", "/past_guesses").with_header("Origin", "https://game.example");
        let response = handle_request(&request, &session, &cors, "test").await;
        assert_eq!(
            response.header("access-control-allow-origin"),
            Some("https://game.example")
        );

        let preflight = Request::new("OPTIONS", "/start")
            .with_header("Origin", "https://other.example")
            .with_header("Access-Control-Request-Method", "POST");
        let response = handle_request(&preflight, &session, &cors, "test").await;
        assert_eq!(response.status, 400);
    }

    async fn spawn_server() -> (Arc<GameServer>, SocketAddr) {
        spawn_server_with_origins(Vec::new()).await
    }

    async fn spawn_server_with_origins(allowed_origins: Vec<String>) -> (Arc<GameServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(GameServer::with_session(
            ServerConfig {
                bind_addr: addr,
                allowed_origins,
                ..Default::default()
            },
            SharedSession::with_seed(11),
        ));
        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, addr)
    }

    async fn raw_request(addr: SocketAddr, request: &str) -> String {
        raw_request_bytes(addr, request.as_bytes()).await
    }

    async fn raw_request_bytes(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    const UPGRADE_HEAD: &str = "GET /ws HTTP/1.1\r\n\
        Host: localhost\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n";

    #[tokio::test]
    async fn test_http_over_socket() {
        let (server, addr) = spawn_server().await;

        let response = raw_request(addr, "POST /start?unlimited=true HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("null"));

        let response = raw_request(addr, "POST /guess?guess=11 HTTP/1.1\r\n\r\n").await;
        assert!(response.ends_with(r#"{"error":"Guess must be 4 digits"}"#));

        let response = raw_request(addr, "BROKEN\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));

        assert_eq!(server.session().attempt_limit().await, 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_utf8_request_gets_bad_request() {
        let (server, addr) = spawn_server().await;

        let response = raw_request_bytes(addr, b"POST /guess?guess=\xff\xfe HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));

        server.shutdown();
    }

    #[tokio::test]
    async fn test_websocket_rejects_disallowed_origin() {
        let (server, addr) = spawn_server_with_origins(vec!["https://game.example".to_string()]).await;

        let request = format!("{}Origin: https://evil.example\r\n\r\n", UPGRADE_HEAD);
        let response = raw_request(addr, &request).await;
        assert!(response.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{}", response);

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("{}Origin: https://game.example\r\n\r\n", UPGRADE_HEAD);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 101 "));

        server.shutdown();
    }

    #[tokio::test]
    async fn test_guesses_after_game_over_over_http() {
        let session = started_session("1234", Some(1)).await;

        let (_, body) = call(&session, "POST", "/guess?guess=5678").await;
        assert_eq!(body["result"], "Game Over - You've used all 1 attempts!");

        let (_, body) = call(&session, "POST", "/guess?guess=9876").await;
        assert_eq!(body["Guess"], "9876");
        assert_eq!(body["secret"], "1234");

        let (_, body) = call(&session, "POST", "/guess?guess=9876").await;
        assert_eq!(body, json!({ "error": "Guess already made" }));

        let (_, body) = call(&session, "GET", "/past_guesses").await;
        assert_eq!(body["pastGuesses"].as_array().map(Vec::len), Some(2));
    }

    type Client = WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

    async fn roundtrip(ws: &mut Client, msg: &str) -> ServerMessage {
        ws.send(Message::Text(msg.to_string())).await.unwrap();
        loop {
            if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
                return ServerMessage::from_json(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_websocket_session() {
        let (server, addr) = spawn_server().await;

        let url = format!("ws://{}{}", addr, WEBSOCKET_PATH);
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let reply = roundtrip(&mut ws, r#"{"type":"start","limit":20}"#).await;
        assert!(matches!(reply, ServerMessage::Started { attempt_limit: 20 }));

        let reply = roundtrip(&mut ws, r#"{"type":"guess","guess":"11"}"#).await;
        match reply {
            ServerMessage::GuessResult(GuessResponse::Error { error }) => {
                assert_eq!(error, "Guess must be 4 digits")
            }
            other => panic!("unexpected reply {:?}", other),
        }

        let reply = roundtrip(&mut ws, r#"{"type":"past_guesses"}"#).await;
        assert!(matches!(reply, ServerMessage::PastGuesses(ref p) if p.past_guesses.is_empty()));

        let reply = roundtrip(&mut ws, r#"{"type":"ping","timestamp":7}"#).await;
        assert!(matches!(reply, ServerMessage::Pong { timestamp: 7, .. }));

        let reply = roundtrip(&mut ws, "not json").await;
        assert!(matches!(reply, ServerMessage::Error(ServerError { code: ErrorCode::InvalidInput, .. })));

        server.shutdown();
    }

    #[tokio::test]
    async fn test_websocket_receives_shutdown() {
        let (server, addr) = spawn_server().await;

        let url = format!("ws://{}{}", addr, WEBSOCKET_PATH);
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        // Make sure the connection loop is running before signalling
        let reply = roundtrip(&mut ws, r#"{"type":"ping","timestamp":1}"#).await;
        assert!(matches!(reply, ServerMessage::Pong { timestamp: 1, .. }));

        server.shutdown();

        let reply = loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => break ServerMessage::from_json(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended without shutdown message: {:?}", other),
            }
        };
        match reply {
            ServerMessage::Shutdown { reason } => assert_eq!(reason, "Server shutting down"),
            other => panic!("unexpected reply {:?}", other),
        }

        // The server closes the socket afterwards
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    }
}
