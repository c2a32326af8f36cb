//! Execution targets and their request payloads.
//!
//! Plain terminals use the bare paths. Every other target is wrapped as
//! `{type, query}` / `{type, body}` and routed by its `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Duplex path for plain terminals.
pub const TERMINAL_WS_PATH: &str = "/ws/terminal";
/// One-shot path for plain terminals.
pub const TERMINAL_EXECUTE_PATH: &str = "/terminal/execute";

/// Query encoding error.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query must serialize to an object")]
    NotAnObject,
    #[error("Query field '{0}' is not a scalar")]
    Nested(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Target type for wrapped (non-terminal) executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecKind {
    /// A container on a server.
    Container,
    /// The container of a deployment.
    Deployment,
    /// One service of a stack.
    Stack,
}

impl ExecKind {
    /// Wire name of the target type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Deployment => "deployment",
            Self::Stack => "stack",
        }
    }

    /// Duplex path, e.g. `/ws/container/terminal`.
    #[must_use]
    pub fn ws_path(self) -> String {
        format!("/ws/{}/terminal", self.as_str())
    }

    /// One-shot path, e.g. `/terminal/execute/container`.
    #[must_use]
    pub fn execute_path(self) -> String {
        format!("{TERMINAL_EXECUTE_PATH}/{}", self.as_str())
    }
}

/// Connect to a server terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectTerminalQuery {
    /// Server id or name.
    pub server: String,
    /// Terminal name on that server.
    pub terminal: String,
}

/// Run a command on a server terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteTerminalBody {
    /// Server id or name.
    pub server: String,
    /// Terminal name on that server.
    pub terminal: String,
    /// Command line to run.
    pub command: String,
}

/// Exec into a container on a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectContainerExecQuery {
    /// Server id or name.
    pub server: String,
    /// Container name.
    pub container: String,
    /// Shell to exec, e.g. `sh` or `bash`.
    pub shell: String,
}

/// Run a command in a container on a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteContainerExecBody {
    /// Server id or name.
    pub server: String,
    /// Container name.
    pub container: String,
    /// Shell the command runs in.
    pub shell: String,
    /// Command line to run.
    pub command: String,
}

/// Exec into the container of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectDeploymentExecQuery {
    /// Deployment id or name.
    pub deployment: String,
    /// Shell to exec.
    pub shell: String,
}

/// Run a command in the container of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteDeploymentExecBody {
    /// Deployment id or name.
    pub deployment: String,
    /// Shell the command runs in.
    pub shell: String,
    /// Command line to run.
    pub command: String,
}

/// Exec into one service of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectStackExecQuery {
    /// Stack id or name.
    pub stack: String,
    /// Service name within the stack.
    pub service: String,
    /// Shell to exec.
    pub shell: String,
}

/// Run a command in one service of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteStackExecBody {
    /// Stack id or name.
    pub stack: String,
    /// Service name within the stack.
    pub service: String,
    /// Shell the command runs in.
    pub shell: String,
    /// Command line to run.
    pub command: String,
}

/// Duplex query wrapped with its target type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "query", rename_all = "lowercase")]
pub enum ExecQuery {
    /// Routed to `/ws/container/terminal`.
    Container(ConnectContainerExecQuery),
    /// Routed to `/ws/deployment/terminal`.
    Deployment(ConnectDeploymentExecQuery),
    /// Routed to `/ws/stack/terminal`.
    Stack(ConnectStackExecQuery),
}

impl ExecQuery {
    /// Target type carried in the `type` tag.
    #[must_use]
    pub const fn kind(&self) -> ExecKind {
        match self {
            Self::Container(_) => ExecKind::Container,
            Self::Deployment(_) => ExecKind::Deployment,
            Self::Stack(_) => ExecKind::Stack,
        }
    }

    /// Query string pairs of the inner query.
    ///
    /// # Errors
    /// Returns error if the inner query is not a flat object.
    pub fn query_pairs(&self) -> Result<Vec<(String, String)>, QueryError> {
        match self {
            Self::Container(query) => query_pairs(query),
            Self::Deployment(query) => query_pairs(query),
            Self::Stack(query) => query_pairs(query),
        }
    }
}

/// One-shot body wrapped with its target type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "lowercase")]
pub enum ExecBody {
    /// Routed to `/terminal/execute/container`.
    Container(ExecuteContainerExecBody),
    /// Routed to `/terminal/execute/deployment`.
    Deployment(ExecuteDeploymentExecBody),
    /// Routed to `/terminal/execute/stack`.
    Stack(ExecuteStackExecBody),
}

impl ExecBody {
    /// Target type carried in the `type` tag.
    #[must_use]
    pub const fn kind(&self) -> ExecKind {
        match self {
            Self::Container(_) => ExecKind::Container,
            Self::Deployment(_) => ExecKind::Deployment,
            Self::Stack(_) => ExecKind::Stack,
        }
    }

    /// The inner body as sent on the wire (without the `type` wrapper).
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Container(body) => serde_json::to_value(body),
            Self::Deployment(body) => serde_json::to_value(body),
            Self::Stack(body) => serde_json::to_value(body),
        }
    }
}

/// Flatten a serializable query into form pairs.
///
/// Strings are used as-is, numbers and booleans are rendered, `null` fields
/// are skipped. Nested arrays or objects are rejected.
///
/// # Errors
/// Returns error if `query` is not a flat object.
pub fn query_pairs<T: Serialize + ?Sized>(query: &T) -> Result<Vec<(String, String)>, QueryError> {
    let Value::Object(map) = serde_json::to_value(query)? else {
        return Err(QueryError::NotAnObject);
    };
    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => return Err(QueryError::Nested(key)),
        };
        pairs.push((key, value));
    }
    Ok(pairs)
}
