use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use crate::cli::ops::absolute;
use arbor_daemon::http_server::api::client::ApiError;
use arbor_daemon::http_server::api::v0::mounts::{CreateMountRequest, CreateMountResponse};

#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Where to mount
    pub mount_point: PathBuf,

    /// Client directory holding config.toml
    #[arg(long)]
    pub client_dir: PathBuf,
}

#[async_trait::async_trait]
impl Op for Mount {
    type Error = MountError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();

        let request = CreateMountRequest {
            mount_point: absolute(&self.mount_point)?.display().to_string(),
            client_dir: absolute(&self.client_dir)?,
        };
        let response: CreateMountResponse = client.call(request).await?;
        let mount = response.mount;

        Ok(format!(
            "{} {} ({} {})",
            "Mounted".green().bold(),
            mount.mount_point,
            mount.repo_type.dimmed(),
            mount.repo_source.dimmed()
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("invalid path: {0}")]
    Path(#[from] std::io::Error),
}

impl std::fmt::Display for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mount {}", self.mount_point.display())
    }
}
