use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use arbor_daemon::http_server::api::client::ApiError;
use arbor_daemon::http_server::health::liveness::LivezRequest;
use arbor_daemon::http_server::health::version::VersionRequest;
use arbor_daemon::state::AppState;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug)]
pub struct ConfigInfo {
    pub directory: PathBuf,
    pub config_file: PathBuf,
    pub config_file_present: bool,
}

#[derive(Debug)]
pub enum EndpointStatus {
    Ok,
    Unhealthy(String),
    NotReachable,
}

#[derive(Debug)]
pub struct DaemonInfo {
    pub address: String,
    pub livez: EndpointStatus,
    pub version: Option<String>,
}

#[derive(Debug)]
pub struct HealthOutput {
    pub config: Option<ConfigInfo>,
    pub config_error: Option<String>,
    pub daemon: DaemonInfo,
}

impl fmt::Display for HealthOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", "Config".bold())?;
        match &self.config {
            Some(info) => {
                writeln!(
                    f,
                    "  {} {}",
                    "directory:".dimmed(),
                    info.directory.display()
                )?;
                let file_status = if info.config_file_present {
                    "OK".green().to_string()
                } else {
                    "defaults".yellow().to_string()
                };
                writeln!(
                    f,
                    "  {} {} ({})",
                    "daemon.toml:".dimmed(),
                    file_status,
                    info.config_file.display()
                )?;
            }
            None => {
                if let Some(err) = &self.config_error {
                    writeln!(f, "  {} {}", "error:".red(), err)?;
                }
            }
        }

        writeln!(f)?;
        writeln!(f, "{} ({}):", "Daemon".bold(), self.daemon.address)?;

        let status = match &self.daemon.livez {
            EndpointStatus::Ok => "OK".green().to_string(),
            EndpointStatus::Unhealthy(code) => format!("{} ({})", "UNHEALTHY".red(), code),
            EndpointStatus::NotReachable => "NOT REACHABLE".red().to_string(),
        };
        write!(f, "  {} {}", "livez:".dimmed(), status)?;
        if let Some(version) = &self.daemon.version {
            write!(f, "\n  {} {}", "version:".dimmed(), version)?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = std::convert::Infallible;
    type Output = HealthOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (config, config_error) = match AppState::load(ctx.config_path.clone()) {
            Ok(state) => (
                Some(ConfigInfo {
                    config_file_present: state.config_file().exists(),
                    config_file: state.config_path,
                    directory: state.data_dir,
                }),
                None,
            ),
            Err(e) => (None, Some(e.to_string())),
        };

        let mut client = ctx.client.clone();
        let livez = match client.call(LivezRequest {}).await {
            Ok(_) => EndpointStatus::Ok,
            Err(ApiError::HttpStatus(status, _)) => EndpointStatus::Unhealthy(status.to_string()),
            Err(_) => EndpointStatus::NotReachable,
        };
        let version = match livez {
            EndpointStatus::Ok => client
                .call(VersionRequest {})
                .await
                .ok()
                .map(|info| info.to_string()),
            _ => None,
        };

        Ok(HealthOutput {
            config,
            config_error,
            daemon: DaemonInfo {
                address: client.address().to_string(),
                livez,
                version,
            },
        })
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "health")
    }
}
