use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use crate::cli::ops::absolute;
use arbor_daemon::http_server::api::client::ApiError;
use arbor_daemon::http_server::api::v0::mounts::{GetMountRequest, GetMountResponse, MountEntry};

#[derive(Args, Debug, Clone)]
pub struct Info {
    /// Mount point to describe
    pub mount_point: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug)]
pub enum InfoOutput {
    Json(String),
    Mount(MountEntry),
}

impl fmt::Display for InfoOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mount = match self {
            InfoOutput::Json(json) => return write!(f, "{}", json),
            InfoOutput::Mount(mount) => mount,
        };
        writeln!(f, "{}:", mount.mount_point.bold())?;
        writeln!(
            f,
            "  {} {}",
            "client dir:".dimmed(),
            mount.client_dir.display()
        )?;
        writeln!(f, "  {} {}", "type:".dimmed(), mount.repo_type)?;
        writeln!(f, "  {} {}", "source:".dimmed(), mount.repo_source)?;
        writeln!(f, "  {} {}", "stage:".dimmed(), mount.stage.green())?;
        writeln!(
            f,
            "  {} {}",
            "mounted at:".dimmed(),
            mount.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        write!(f, "  {} {}", "inodes:".dimmed(), mount.inodes_loaded)
    }
}

#[async_trait::async_trait]
impl Op for Info {
    type Error = InfoError;
    type Output = InfoOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();

        let request = GetMountRequest {
            mount_point: absolute(&self.mount_point)?.display().to_string(),
        };
        let response: GetMountResponse = client.call(request).await?;

        if self.json {
            return Ok(InfoOutput::Json(serde_json::to_string_pretty(
                &response.mount,
            )?));
        }
        Ok(InfoOutput::Mount(response.mount))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InfoError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid path: {0}")]
    Path(#[from] std::io::Error),
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "info {}", self.mount_point.display())
    }
}
