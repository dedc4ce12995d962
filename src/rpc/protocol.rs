//! Wire format of the loopback RPC.
//!
//! One JSON object per `\n`-terminated line in each direction:
//!
//! ```text
//! → {"method":"verify_token","params":{"token":"gsk_…"}}
//! ← {"success":true,"data":{"tokenId":"…"}}
//! ```

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, VaultError};
use crate::resolver::VariableMetadata;
use crate::store::EnvironmentSummary;

/// Longest request line the server accepts, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyTokenParams {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProjectsParams {
    pub token_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEnvVariablesParams {
    pub token_id: String,
    pub project_id: String,
    pub environment_slug: String,
    /// Present for decrypted values; absent for metadata only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key_hash: Option<String>,
}

/// Every method the server understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    VerifyToken(VerifyTokenParams),
    ListProjects(ListProjectsParams),
    GetEnvVariables(GetEnvVariablesParams),
}

/// The untyped outer shape of a request line.
#[derive(Deserialize)]
struct RawRequest {
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Serialize)]
struct RequestEnvelope<'a, P> {
    method: &'a str,
    params: &'a P,
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Self::VerifyToken(_) => "verify_token",
            Self::ListProjects(_) => "list_projects",
            Self::GetEnvVariables(_) => "get_env_variables",
        }
    }

    /// Parse one request line.
    ///
    /// Fails with `UnknownMethod` for a well-formed request naming a method
    /// that does not exist, and with `Protocol` for anything else malformed.
    pub fn parse(line: &str) -> Result<Self> {
        let raw: RawRequest =
            serde_json::from_str(line).map_err(|e| VaultError::Protocol(e.to_string()))?;

        match raw.method.as_str() {
            "verify_token" => params(raw.params).map(Self::VerifyToken),
            "list_projects" => params(raw.params).map(Self::ListProjects),
            "get_env_variables" => params(raw.params).map(Self::GetEnvVariables),
            _ => Err(VaultError::UnknownMethod(raw.method)),
        }
    }

    /// Encode as one line, without the trailing newline.
    pub fn to_line(&self) -> Result<String> {
        let method = self.method();
        let encoded = match self {
            Self::VerifyToken(p) => serde_json::to_string(&RequestEnvelope { method, params: p }),
            Self::ListProjects(p) => serde_json::to_string(&RequestEnvelope { method, params: p }),
            Self::GetEnvVariables(p) => {
                serde_json::to_string(&RequestEnvelope { method, params: p })
            }
        };
        encoded.map_err(|e| VaultError::SerializationError(e.to_string()))
    }
}

fn params<P: DeserializeOwned>(value: Value) -> Result<P> {
    if value.is_null() {
        return Err(VaultError::Protocol("missing params".into()));
    }
    serde_json::from_value(value).map_err(|e| VaultError::Protocol(e.to_string()))
}

/// A reply line: `{success:true, data}` or `{success:false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Turn a handler outcome into a reply.
    pub fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(e.to_string()),
        }
    }

    /// Unwrap the payload, turning a failure reply into `Remote`.
    pub fn into_data(self) -> Result<Value> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(VaultError::Remote(
                self.error.unwrap_or_else(|| "Request failed".to_string()),
            ))
        }
    }
}

// --- Typed payloads ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTokenData {
    pub token_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentMetadata {
    pub environment: EnvironmentSummary,
    pub variables: Vec<VariableMetadata>,
}

/// Payload of `get_env_variables`.
///
/// `Metadata` is listed first so a structure reply is never mistaken for
/// a map of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvVariables {
    Metadata(EnvironmentMetadata),
    Decrypted(BTreeMap<String, String>),
}
