use clap::Args;
use owo_colors::OwoColorize;

use crate::cli::op::{Op, OpContext};
use arbor_daemon::http_server::api::client::ApiError;
use arbor_daemon::http_server::api::v0::stats::{StatsRequest, StatsResponse};

#[derive(Args, Debug, Clone)]
pub struct Stats {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[async_trait::async_trait]
impl Op for Stats {
    type Error = StatsError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response: StatsResponse = client.call(StatsRequest {}).await?;

        if self.json {
            return Ok(serde_json::to_string_pretty(&response)?);
        }

        let mut output = format!(
            "{} {}\n{} {}\n",
            "mounts:".dimmed(),
            response.mounts,
            "backing stores:".dimmed(),
            response.live_backing_stores
        );
        if !response.counters.is_empty() {
            output.push_str(&format!("{}:\n", "Counters".bold()));
        }
        for (name, value) in &response.counters {
            output.push_str(&format!("  {:<36} {:>12}\n", name, value));
        }
        Ok(output)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stats")
    }
}
