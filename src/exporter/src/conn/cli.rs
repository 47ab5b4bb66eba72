use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use common::config::ClusterConfig;
use tokio::process::Command;
use tracing::debug;

use super::{AdminCommand, AdminResponse, CliCommand, Conn, ConnError, Tool};

/// Transport that shells out to the cluster's command line tools.
///
/// Timeouts are applied by the caller; dropping the future kills the child.
#[derive(Debug, Clone)]
pub struct CliConn {
    ceph_binary: String,
    rgw_admin_binary: String,
    rbd_binary: String,
    user: String,
    config_path: PathBuf,
}

impl CliConn {
    pub fn new(cluster: &ClusterConfig) -> Self {
        Self {
            ceph_binary: cluster.ceph_binary.clone(),
            rgw_admin_binary: cluster.rgw_admin_binary.clone(),
            rbd_binary: cluster.rbd_binary.clone(),
            user: cluster.user.clone(),
            config_path: cluster.config_path.clone(),
        }
    }

    fn binary(&self, tool: Tool) -> &str {
        match tool {
            Tool::Ceph => &self.ceph_binary,
            Tool::RadosgwAdmin => &self.rgw_admin_binary,
            Tool::Rbd => &self.rbd_binary,
        }
    }

    fn auth_args(&self) -> [String; 4] {
        [
            "--conf".to_string(),
            self.config_path.display().to_string(),
            "--id".to_string(),
            self.user.clone(),
        ]
    }

    async fn run(&self, program: &str, args: Vec<String>) -> Result<(Vec<u8>, String), ConnError> {
        debug!(program, ?args, "Running cluster command");

        let output = Command::new(program)
            .args(&args)
            .args(self.auth_args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ConnError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(ConnError::Failed {
                command: format!("{program} {}", args.join(" ")),
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok((output.stdout, stderr))
    }
}

#[async_trait]
impl Conn for CliConn {
    async fn run_admin_command(&self, request: &[u8]) -> Result<AdminResponse, ConnError> {
        let command = AdminCommand::from_bytes(request)?;
        let (data, info) = self.run(&self.ceph_binary, command.cli_args()).await?;
        Ok(AdminResponse { data, info })
    }

    async fn run_background_command(&self, request: &[u8]) -> Result<Vec<u8>, ConnError> {
        let command = CliCommand::from_bytes(request)?;
        let (data, _) = self.run(self.binary(command.tool), command.args).await?;
        Ok(data)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn cluster_with(binary: &str) -> ClusterConfig {
        ClusterConfig {
            ceph_binary: binary.to_string(),
            rgw_admin_binary: binary.to_string(),
            rbd_binary: binary.to_string(),
            user: "exporter".to_string(),
            config_path: PathBuf::from("/etc/ceph/test.conf"),
            ..ClusterConfig::default()
        }
    }

    #[tokio::test]
    async fn test_admin_command_arguments() {
        let conn = CliConn::new(&cluster_with("echo"));
        let request = AdminCommand::new("osd tree").to_bytes().unwrap();

        let response = conn.run_admin_command(&request).await.unwrap();
        let stdout = String::from_utf8(response.data).unwrap();

        assert_eq!(
            stdout.trim(),
            "osd tree --format json --conf /etc/ceph/test.conf --id exporter"
        );
        assert!(response.info.is_empty());
    }

    #[tokio::test]
    async fn test_background_command_arguments() {
        let conn = CliConn::new(&cluster_with("echo"));
        let request = CliCommand::new(Tool::RadosgwAdmin, ["gc", "list", "--include-all"])
            .to_bytes()
            .unwrap();

        let stdout = conn.run_background_command(&request).await.unwrap();
        assert_eq!(
            String::from_utf8(stdout).unwrap().trim(),
            "gc list --include-all --conf /etc/ceph/test.conf --id exporter"
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let conn = CliConn::new(&cluster_with("false"));
        let request = AdminCommand::new("status").to_bytes().unwrap();

        let err = conn.run_admin_command(&request).await.unwrap_err();
        assert!(matches!(err, ConnError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let conn = CliConn::new(&cluster_with("/nonexistent/ceph-binary"));
        let request = AdminCommand::new("status").to_bytes().unwrap();

        let err = conn.run_admin_command(&request).await.unwrap_err();
        assert!(matches!(err, ConnError::Spawn { .. }));
    }
}
