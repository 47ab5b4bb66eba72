//! Request/response transport to the cluster.
//!
//! The exporter never talks to the cluster directly: every collector goes
//! through a [`Conn`], which takes an encoded request and returns raw bytes.
//! Admin commands are short monitor/manager calls; background commands are
//! long-running CLI subprocesses (gc listings, mirror status, mds op dumps).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod cli;

pub use cli::CliConn;

#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command `{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed request: {0}")]
    Request(#[from] serde_json::Error),
}

/// Reply to an admin command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminResponse {
    /// Payload, usually JSON
    pub data: Vec<u8>,
    /// Human-readable status line returned next to the payload
    pub info: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Conn: Send + Sync {
    /// Run a short administrative command encoded as an [`AdminCommand`].
    async fn run_admin_command(&self, request: &[u8]) -> Result<AdminResponse, ConnError>;

    /// Run a long-running CLI command encoded as a [`CliCommand`].
    async fn run_background_command(&self, request: &[u8]) -> Result<Vec<u8>, ConnError>;
}

/// Administrative command in the cluster's JSON command form,
/// e.g. `{"prefix": "pg dump", "dumpcontents": ["pgs_brief"], "format": "json"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminCommand {
    pub prefix: String,
    pub format: String,
    #[serde(flatten)]
    pub args: BTreeMap<String, serde_json::Value>,
}

impl AdminCommand {
    /// Command answering in JSON
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            format: "json".to_string(),
            args: BTreeMap::new(),
        }
    }

    /// Command answering in the human-readable plain format
    pub fn plain(prefix: impl Into<String>) -> Self {
        Self {
            format: "plain".to_string(),
            ..Self::new(prefix)
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConnError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConnError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Positional CLI form: prefix words, then argument values in key order,
    /// then `--format`.
    pub fn cli_args(&self) -> Vec<String> {
        let mut args: Vec<String> = self.prefix.split_whitespace().map(String::from).collect();

        for value in self.args.values() {
            match value {
                serde_json::Value::Array(items) => {
                    args.extend(items.iter().map(value_to_arg));
                }
                other => args.push(value_to_arg(other)),
            }
        }

        args.push("--format".to_string());
        args.push(self.format.clone());
        args
    }
}

fn value_to_arg(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// CLI tools a background command may run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Tool {
    Ceph,
    RadosgwAdmin,
    Rbd,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Ceph => "ceph",
            Tool::RadosgwAdmin => "radosgw-admin",
            Tool::Rbd => "rbd",
        }
    }
}

/// Long-running CLI invocation, e.g. `radosgw-admin gc list --include-all`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CliCommand {
    pub tool: Tool,
    pub args: Vec<String>,
}

impl CliCommand {
    pub fn new<I, S>(tool: Tool, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tool,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConnError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConnError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl std::fmt::Display for CliCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.tool.as_str(), self.args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_command_wire_form() {
        let cmd = AdminCommand::new("pg dump").with_arg("dumpcontents", vec!["pgs_brief"]);
        let bytes = cmd.to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["prefix"], "pg dump");
        assert_eq!(json["format"], "json");
        assert_eq!(json["dumpcontents"][0], "pgs_brief");
        assert_eq!(AdminCommand::from_bytes(&bytes).unwrap(), cmd);
    }

    #[test]
    fn test_admin_command_cli_args() {
        let cmd = AdminCommand::new("osd pool ls").with_arg("detail", "detail");
        assert_eq!(
            cmd.cli_args(),
            vec!["osd", "pool", "ls", "detail", "--format", "json"]
        );

        let cmd = AdminCommand::plain("status");
        assert_eq!(cmd.cli_args(), vec!["status", "--format", "plain"]);

        let cmd = AdminCommand::new("pg dump").with_arg("dumpcontents", vec!["pgs_brief"]);
        assert_eq!(
            cmd.cli_args(),
            vec!["pg", "dump", "pgs_brief", "--format", "json"]
        );
    }

    #[test]
    fn test_cli_command_wire_form() {
        let cmd = CliCommand::new(Tool::RadosgwAdmin, ["gc", "list", "--include-all"]);
        let bytes = cmd.to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["tool"], "radosgw-admin");
        assert_eq!(CliCommand::from_bytes(&bytes).unwrap(), cmd);
        assert_eq!(cmd.to_string(), "radosgw-admin gc list --include-all");
    }

    #[test]
    fn test_garbage_request_is_rejected() {
        assert!(matches!(
            AdminCommand::from_bytes(b"not json"),
            Err(ConnError::Request(_))
        ));
    }
}
