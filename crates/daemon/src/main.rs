use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;

mod cli;

use arbor_daemon::http_server::api::client::ApiClient;
use arbor_daemon::process::ListenAddress;
use arbor_daemon::state::AppState;
use cli::op::{Op, OpContext};
use cli::Args;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let ctx = match context(&args) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match args.command.execute(&ctx).await {
        Ok(output) => {
            let output = output.to_string();
            if !output.is_empty() {
                println!("{}", output.trim_end());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}: {}", "error:".red().bold(), args.command, e);
            ExitCode::FAILURE
        }
    }
}

/// Resolve the daemon address the same way the daemon does: `--address`,
/// then `daemon.toml`, then the socket in the data directory.
fn context(args: &Args) -> anyhow::Result<OpContext> {
    let state = AppState::load(args.data_dir.clone())?;
    let listen = args
        .address
        .clone()
        .or_else(|| state.config.listen_address.clone());
    let address = ListenAddress::resolve(listen.as_deref(), &state.data_dir);

    Ok(OpContext {
        client: ApiClient::new(address)?,
        config_path: args.data_dir.clone(),
    })
}
