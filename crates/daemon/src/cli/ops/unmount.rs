use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use crate::cli::ops::absolute;
use arbor_daemon::http_server::api::client::ApiError;
use arbor_daemon::http_server::api::v0::mounts::{UnmountRequest, UnmountResponse};

#[derive(Args, Debug, Clone)]
pub struct Unmount {
    /// Mount point to unmount
    pub mount_point: PathBuf,

    /// Seconds to wait for the daemon to confirm teardown
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

#[async_trait::async_trait]
impl Op for Unmount {
    type Error = UnmountError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let mount_point = absolute(&self.mount_point)?.display().to_string();

        let request = UnmountRequest {
            mount_point: mount_point.clone(),
        };
        let call = client.call(request);
        match tokio::time::timeout(Duration::from_secs(self.timeout), call).await {
            Ok(response) => {
                let response: UnmountResponse = response?;
                if response.unmounted {
                    Ok(format!("{} {}", "Unmounted".green().bold(), mount_point))
                } else {
                    Ok(format!("Failed to unmount {}", mount_point))
                }
            }
            // The daemon keeps going after we stop waiting.
            Err(_) => Ok(format!(
                "Unmount of {} requested, not yet confirmed after {}s",
                mount_point, self.timeout
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UnmountError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("invalid path: {0}")]
    Path(#[from] std::io::Error),
}

impl std::fmt::Display for Unmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unmount {}", self.mount_point.display())
    }
}
