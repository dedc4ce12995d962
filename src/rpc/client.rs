//! Client side of the loopback RPC, used by the CLI.
//!
//! A client keeps one connection open for a sequence of calls.  Connecting
//! and every read are bounded by a timeout so a missing or wedged server
//! surfaces as an error instead of a hang.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use super::protocol::{
    EnvVariables, GetEnvVariablesParams, ListProjectsParams, Request, Response, VerifyTokenData,
    VerifyTokenParams,
};
use crate::errors::{Result, VaultError};
use crate::store::ProjectSummary;

/// Default connect and read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Replies can carry a whole environment's values; cap them generously.
const MAX_REPLY_LEN: usize = 16 * 1024 * 1024;

const RUNNING_HINT: &str = "Make sure the GeoSync app is running";

pub struct RpcClient {
    addr: SocketAddr,
    replies: FramedRead<OwnedReadHalf, LinesCodec>,
    requests: FramedWrite<OwnedWriteHalf, LinesCodec>,
    timeout: Duration,
}

impl RpcClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(VaultError::Transport(format!(
                    "Failed to connect to GeoSync server at {addr}. {RUNNING_HINT}. ({e})"
                )))
            }
            Err(_) => return Err(timed_out(addr, timeout)),
        };

        let (read, write) = stream.into_split();
        Ok(Self {
            addr,
            replies: FramedRead::new(read, LinesCodec::new_with_max_length(MAX_REPLY_LEN)),
            requests: FramedWrite::new(write, LinesCodec::new()),
            timeout,
        })
    }

    /// Send one request and wait for its reply.
    ///
    /// A failure reply comes back as `VaultError::Remote` with the server's
    /// message.
    pub async fn call(&mut self, request: &Request) -> Result<serde_json::Value> {
        let line = request.to_line()?;
        self.requests
            .send(line)
            .await
            .map_err(|e| VaultError::Transport(format!("Failed to send request: {e}")))?;

        let reply = match tokio::time::timeout(self.timeout, self.replies.next()).await {
            Ok(Some(Ok(reply))) => reply,
            Ok(Some(Err(e))) => {
                return Err(VaultError::Transport(format!("Failed to read reply: {e}")))
            }
            Ok(None) => {
                return Err(VaultError::Transport(format!(
                    "Connection closed by GeoSync server. {RUNNING_HINT}."
                )))
            }
            Err(_) => return Err(timed_out(self.addr, self.timeout)),
        };

        let response: Response = serde_json::from_str(&reply)
            .map_err(|e| VaultError::Transport(format!("Malformed reply from server: {e}")))?;
        response.into_data()
    }

    async fn call_typed<T: DeserializeOwned>(&mut self, request: &Request) -> Result<T> {
        let data = self.call(request).await?;
        serde_json::from_value(data)
            .map_err(|e| VaultError::Transport(format!("Unexpected reply from server: {e}")))
    }

    /// Exchange a raw token for its token id.
    pub async fn verify_token(&mut self, token: &str) -> Result<String> {
        let data: VerifyTokenData = self
            .call_typed(&Request::VerifyToken(VerifyTokenParams {
                token: token.to_string(),
            }))
            .await?;
        Ok(data.token_id)
    }

    pub async fn list_projects(&mut self, token_id: &str) -> Result<Vec<ProjectSummary>> {
        self.call_typed(&Request::ListProjects(ListProjectsParams {
            token_id: token_id.to_string(),
        }))
        .await
    }

    /// Values when `master_key_hash` is given, metadata otherwise.
    pub async fn get_env_variables(
        &mut self,
        token_id: &str,
        project_id: &str,
        environment_slug: &str,
        master_key_hash: Option<&str>,
    ) -> Result<EnvVariables> {
        self.call_typed(&Request::GetEnvVariables(GetEnvVariablesParams {
            token_id: token_id.to_string(),
            project_id: project_id.to_string(),
            environment_slug: environment_slug.to_string(),
            master_key_hash: master_key_hash.map(str::to_string),
        }))
        .await
    }
}

fn timed_out(addr: SocketAddr, timeout: Duration) -> VaultError {
    VaultError::Transport(format!(
        "Connection to GeoSync server at {addr} timed out after {}s. {RUNNING_HINT}.",
        timeout.as_secs_f32()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn refused_connection_mentions_the_app() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let err = RpcClient::connect(addr).await.err().unwrap();
        assert!(matches!(err, VaultError::Transport(_)));
        assert!(err.to_string().contains(RUNNING_HINT));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(stream);
        });

        let mut client = RpcClient::connect_with_timeout(addr, Duration::from_millis(100))
            .await
            .unwrap();
        let err = client.verify_token("gsk_x").await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
        server.abort();
    }

    #[tokio::test]
    async fn failure_reply_becomes_remote_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(_)) = lines.next_line().await {
                write
                    .write_all(b"{\"success\":false,\"error\":\"Invalid token\"}\n")
                    .await
                    .unwrap();
            }
        });

        let mut client = RpcClient::connect(addr).await.unwrap();
        let err = client.verify_token("gsk_x").await.unwrap_err();
        assert!(matches!(err, VaultError::Remote(ref m) if m == "Invalid token"));
    }
}
