//! Test doubles for exercising collectors without a cluster.
//!
//! Only available with the `testing` feature or during tests.

pub mod fixtures;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::collectors::ScrapeContext;
use crate::conn::{AdminCommand, AdminResponse, CliCommand, Conn, ConnError};
use crate::topology::{OsdTree, Topology};
use crate::tracker::Trackers;
use crate::version::Version;

/// Canned transport keyed by command.
///
/// Admin replies are keyed by prefix and output format, background replies
/// by the rendered command line (`rbd mirror pool status --format json`).
/// Anything not registered fails like an unknown command would.
#[derive(Debug, Default)]
pub struct FakeConn {
    admin: HashMap<(String, String), Vec<u8>>,
    background: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    admin_requests: Mutex<Vec<AdminCommand>>,
    background_requests: Mutex<Vec<CliCommand>>,
}

impl FakeConn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer a JSON-format command
    pub fn with_json(mut self, prefix: &str, value: serde_json::Value) -> Self {
        let data = serde_json::to_vec(&value).expect("serializable fixture");
        self.admin.insert((prefix.to_string(), "json".to_string()), data);
        self
    }

    /// Answer a plain-format command
    pub fn with_plain(mut self, prefix: &str, text: &str) -> Self {
        self.admin
            .insert((prefix.to_string(), "plain".to_string()), text.as_bytes().to_vec());
        self
    }

    pub fn with_background(mut self, command_line: &str, value: serde_json::Value) -> Self {
        let data = serde_json::to_vec(&value).expect("serializable fixture");
        self.background.insert(command_line.to_string(), data);
        self
    }

    /// Make an admin prefix or background command line fail
    pub fn failing(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    pub fn admin_calls(&self) -> usize {
        self.admin_requests.lock().len()
    }

    pub fn background_calls(&self) -> usize {
        self.background_requests.lock().len()
    }

    /// Prefixes of the admin commands received so far, in order
    pub fn admin_prefixes(&self) -> Vec<String> {
        self.admin_requests
            .lock()
            .iter()
            .map(|c| c.prefix.clone())
            .collect()
    }

    fn unknown(command: String) -> ConnError {
        ConnError::Failed {
            command,
            status: "exit status: 22".to_string(),
            stderr: "Error EINVAL: command not available".to_string(),
        }
    }
}

#[async_trait]
impl Conn for FakeConn {
    async fn run_admin_command(&self, request: &[u8]) -> Result<AdminResponse, ConnError> {
        let command = AdminCommand::from_bytes(request)?;
        self.admin_requests.lock().push(command.clone());

        if self.failing.contains(&command.prefix) {
            return Err(Self::unknown(command.prefix));
        }

        self.admin
            .get(&(command.prefix.clone(), command.format.clone()))
            .map(|data| AdminResponse {
                data: data.clone(),
                info: String::new(),
            })
            .ok_or_else(|| Self::unknown(command.prefix))
    }

    async fn run_background_command(&self, request: &[u8]) -> Result<Vec<u8>, ConnError> {
        let command = CliCommand::from_bytes(request)?;
        let line = command.to_string();
        self.background_requests.lock().push(command);

        if self.failing.contains(&line) {
            return Err(Self::unknown(line));
        }

        self.background
            .get(&line)
            .cloned()
            .ok_or_else(|| Self::unknown(line))
    }
}

/// Owns the state a [`ScrapeContext`] borrows
#[derive(Debug, Default)]
pub struct ScrapeFixture {
    pub version: Option<Version>,
    pub topology: Topology,
    pub trackers: Trackers,
}

impl ScrapeFixture {
    pub fn new(version: Option<Version>) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Resolve placement labels from an `osd tree` payload
    pub fn with_topology(mut self, tree: serde_json::Value) -> Self {
        let data = serde_json::to_vec(&tree).expect("serializable fixture");
        let tree = OsdTree::from_slice(&data).expect("valid osd tree fixture");
        self.topology = Topology::from_tree(&tree);
        self
    }

    pub fn context<'a>(&'a self, conn: &'a dyn Conn) -> ScrapeContext<'a> {
        ScrapeContext {
            conn,
            version: self.version.as_ref(),
            topology: &self.topology,
            trackers: &self.trackers,
            admin_timeout: Duration::from_secs(5),
            background_timeout: Duration::from_secs(5),
            pg_briefs: OnceCell::new(),
        }
    }
}
