use clap::Args;

use crate::cli::op::{Op, OpContext};
use crate::cli::ops::truncate;
use arbor_daemon::http_server::api::client::ApiError;
use arbor_daemon::http_server::api::v0::mounts::{ListMountsRequest, ListMountsResponse};

#[derive(Args, Debug, Clone)]
pub struct List {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[async_trait::async_trait]
impl Op for List {
    type Error = ListError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response: ListMountsResponse = client.call(ListMountsRequest {}).await?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&response.mounts)?);
        }

        if response.mounts.is_empty() {
            return Ok("No active mounts".to_string());
        }

        let mut output = String::new();
        output.push_str(&format!(
            "{:<32} {:<8} {:<40} {:<10} {:>8}\n",
            "MOUNT POINT", "TYPE", "SOURCE", "STAGE", "INODES"
        ));
        output.push_str(&"-".repeat(102));
        output.push('\n');

        for mount in response.mounts {
            output.push_str(&format!(
                "{:<32} {:<8} {:<40} {:<10} {:>8}\n",
                truncate(&mount.mount_point, 30),
                mount.repo_type,
                truncate(&mount.repo_source, 38),
                mount.stage,
                mount.inodes_loaded,
            ));
        }

        Ok(output)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl std::fmt::Display for List {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "list")
    }
}
