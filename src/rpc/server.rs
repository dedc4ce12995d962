//! Loopback RPC server.
//!
//! One task per connection.  Lines on a connection are handled strictly in
//! order; connections are independent of each other.  The handler itself
//! is synchronous (SQLite, PBKDF2) and runs on the blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use super::protocol::{
    EnvVariables, EnvironmentMetadata, GetEnvVariablesParams, Request, Response, VerifyTokenData,
    MAX_LINE_LEN,
};
use crate::audit::AuditLog;
use crate::auth::{AccessTokenRegistry, CredentialGate};
use crate::errors::{Result, VaultError};
use crate::resolver::VariableResolver;
use crate::store::Database;

/// Default time a connection may sit idle before the server drops it.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Dispatches parsed requests to the vault components.
///
/// Holds no per-connection state, so any number of connections can share one.
#[derive(Clone)]
pub struct RpcHandler {
    db: Database,
    tokens: AccessTokenRegistry,
    credentials: CredentialGate,
    resolver: VariableResolver,
    audit: AuditLog,
}

impl RpcHandler {
    pub fn new(db: Database) -> Self {
        Self {
            tokens: AccessTokenRegistry::new(db.clone()),
            credentials: CredentialGate::new(db.clone()),
            resolver: VariableResolver::new(db.clone()),
            audit: AuditLog::new(db.clone()),
            db,
        }
    }

    /// Handle one request line.  Never fails: every error becomes a reply.
    pub fn handle_line(&self, line: &str) -> Response {
        let result = Request::parse(line).and_then(|request| self.handle(request));
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "Request failed");
        }
        Response::from_result(result)
    }

    pub fn handle(&self, request: Request) -> Result<Value> {
        match request {
            Request::VerifyToken(p) => {
                let token_id = self.tokens.verify(&p.token)?;
                to_value(&VerifyTokenData { token_id })
            }
            Request::ListProjects(p) => {
                self.tokens.check(&p.token_id)?;
                to_value(&self.db.project_summaries()?)
            }
            Request::GetEnvVariables(p) => to_value(&self.env_variables(&p)?),
        }
    }

    fn env_variables(&self, p: &GetEnvVariablesParams) -> Result<EnvVariables> {
        let token = self.tokens.check(&p.token_id)?;
        let project = self.db.find_project(&p.project_id)?;
        let environment = self
            .db
            .find_environment_by_slug(&project.id, &p.environment_slug)?
            .ok_or_else(|| VaultError::EnvironmentNotFound(p.environment_slug.clone()))?;

        // An empty hash is treated the same as no hash.
        match p.master_key_hash.as_deref().filter(|h| !h.is_empty()) {
            Some(hash) => {
                let master_key = self.credentials.unlock(hash)?;
                let values = self
                    .resolver
                    .decrypted_map(&project.id, &environment.id, &master_key)?;
                self.audit.log(
                    "rpc_read",
                    Some(&format!("{}/{}", project.name, environment.slug)),
                    Some(&format!("{} values via token {}", values.len(), token.name)),
                );
                Ok(EnvVariables::Decrypted(values))
            }
            None => {
                let variables = self.resolver.describe(&project.id, &environment.id)?;
                Ok(EnvVariables::Metadata(EnvironmentMetadata {
                    environment: environment.summary(),
                    variables,
                }))
            }
        }
    }
}

fn to_value<T: serde::Serialize>(data: &T) -> Result<Value> {
    serde_json::to_value(data).map_err(|e| VaultError::SerializationError(e.to_string()))
}

/// A bound, not yet serving, RPC server.
pub struct RpcServer {
    listener: TcpListener,
    handler: Arc<RpcHandler>,
    idle_timeout: Duration,
}

impl RpcServer {
    /// Bind to `addr`, which must be a loopback address.
    pub async fn bind(addr: SocketAddr, handler: RpcHandler) -> Result<Self> {
        if !addr.ip().is_loopback() {
            return Err(VaultError::Validation(format!(
                "refusing to listen on non-loopback address {addr}"
            )));
        }
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            handler: Arc::new(handler),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "RPC server listening");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("RPC server shutting down");
                    break;
                }
                res = self.listener.accept() => {
                    match res {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "New connection");
                            tokio::spawn(handle_connection(
                                stream,
                                self.handler.clone(),
                                self.idle_timeout,
                            ));
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// A request line as seen by the connection loop.
enum Incoming {
    Line(String),
    /// Longer than `MAX_LINE_LEN`; the rest of it is skipped.
    TooLong,
    /// Not valid UTF-8.
    Undecodable,
}

/// `LinesCodec` that reports oversized and non-UTF-8 lines as items rather
/// than errors, so the stream keeps going after them.
struct RequestLines {
    inner: LinesCodec,
}

impl RequestLines {
    fn new() -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(MAX_LINE_LEN),
        }
    }

    fn map(
        result: std::result::Result<Option<String>, LinesCodecError>,
    ) -> std::io::Result<Option<Incoming>> {
        match result {
            Ok(line) => Ok(line.map(Incoming::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Incoming::TooLong)),
            Err(LinesCodecError::Io(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                Ok(Some(Incoming::Undecodable))
            }
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for RequestLines {
    type Item = Incoming;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> std::io::Result<Option<Incoming>> {
        Self::map(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> std::io::Result<Option<Incoming>> {
        Self::map(self.inner.decode_eof(buf))
    }
}

/// Serve one connection until the peer closes it, it goes idle, or the
/// socket fails.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    handler: Arc<RpcHandler>,
    idle_timeout: Duration,
) {
    let (reader, writer) = stream.into_split();
    let mut requests = FramedRead::new(reader, RequestLines::new());
    let mut replies = FramedWrite::new(writer, LinesCodec::new());

    loop {
        let next = match tokio::time::timeout(idle_timeout, requests.next()).await {
            Ok(Some(next)) => next,
            Ok(None) => break,
            Err(_) => {
                tracing::debug!("Closing idle connection");
                break;
            }
        };

        let response = match next {
            Ok(Incoming::Line(line)) if line.trim().is_empty() => continue,
            Ok(Incoming::Line(line)) => {
                let handler = handler.clone();
                tokio::task::spawn_blocking(move || handler.handle_line(&line))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::error!(error = %e, "Request handler panicked");
                        Response::failure("Internal error")
                    })
            }
            Ok(Incoming::TooLong) => Response::failure(format!(
                "Invalid request: line exceeds {MAX_LINE_LEN} bytes"
            )),
            Ok(Incoming::Undecodable) => {
                Response::failure("Invalid request: line is not valid UTF-8")
            }
            Err(e) => {
                tracing::debug!(error = %e, "Connection read failed");
                break;
            }
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(encoded) => encoded,
            Err(e) => json!({"success": false, "error": e.to_string()}).to_string(),
        };
        if let Err(e) = replies.send(encoded).await {
            tracing::debug!(error = %e, "Connection write failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{hash_password, Pbkdf2Params};
    use crate::rpc::protocol::VerifyTokenParams;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn handler() -> (RpcHandler, String) {
        let db = Database::open_in_memory().unwrap();
        let tokens = AccessTokenRegistry::new(db.clone());
        let issued = tokens.issue("cli-1", None).unwrap();
        CredentialGate::new(db.clone())
            .set_master_password_with_params(
                &hash_password("pw"),
                &Pbkdf2Params { iterations: 1_000 },
            )
            .unwrap();
        (RpcHandler::new(db), issued.raw_token.to_string())
    }

    #[test]
    fn handle_line_never_panics_on_garbage() {
        let (handler, _) = handler();
        for line in ["", "{", "[]", "null", r#"{"method":7}"#] {
            let response = handler.handle_line(line);
            assert!(!response.success, "{line}");
            assert!(response.error.is_some());
        }
    }

    #[test]
    fn verify_then_list() {
        let (handler, raw) = handler();
        let line = Request::VerifyToken(VerifyTokenParams { token: raw })
            .to_line()
            .unwrap();
        let data = handler.handle_line(&line).into_data().unwrap();
        let token_id = data["tokenId"].as_str().unwrap().to_string();

        let listed = handler
            .handle_line(&format!(
                r#"{{"method":"list_projects","params":{{"tokenId":"{token_id}"}}}}"#
            ))
            .into_data()
            .unwrap();
        assert_eq!(listed, json!([]));
    }

    #[test]
    fn unknown_token_id_is_denied() {
        let (handler, _) = handler();
        let response =
            handler.handle_line(r#"{"method":"list_projects","params":{"tokenId":"nope"}}"#);
        assert_eq!(response.error.as_deref(), Some("Invalid token"));
    }

    #[tokio::test]
    async fn refuses_non_loopback_bind() {
        let (handler, _) = handler();
        let addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        assert!(matches!(
            RpcServer::bind(addr, handler).await,
            Err(VaultError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn oversized_line_gets_failure_and_connection_survives() {
        let (handler, _) = handler();
        let server = RpcServer::bind("127.0.0.1:0".parse().unwrap(), handler)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.serve(shutdown.clone()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut read = BufReader::new(read).lines();

        let mut big = "x".repeat(MAX_LINE_LEN + 10);
        big.push('\n');
        write.write_all(big.as_bytes()).await.unwrap();
        write
            .write_all(b"{\"method\":\"nope\",\"params\":{}}\n")
            .await
            .unwrap();

        let first: Response =
            serde_json::from_str(&read.next_line().await.unwrap().unwrap()).unwrap();
        assert!(first.error.unwrap().contains("line exceeds"));
        let second: Response =
            serde_json::from_str(&read.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second.error.as_deref(), Some("Unknown method: nope"));

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let (handler, _) = handler();
        let server = RpcServer::bind("127.0.0.1:0".parse().unwrap(), handler)
            .await
            .unwrap()
            .with_idle_timeout(Duration::from_millis(100));
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.serve(shutdown.clone()));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let eof = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap();
        assert!(eof.is_none());

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }
}
