use std::path::PathBuf;

use clap::Parser;

use super::ops::Command;

#[derive(Parser, Debug)]
#[command(name = "arbor", version, about = "Mount repository content as a read-only filesystem")]
pub struct Args {
    /// Data directory (defaults to ~/.arbor)
    #[arg(long, global = true, env = "ARBOR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Daemon address to talk to: a socket path, a port or host:port.
    /// Defaults to the daemon's configured address.
    #[arg(long, global = true, env = "ARBOR_ADDRESS")]
    pub address: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["arbor", "list", "--data-dir", "/tmp/a"]).unwrap();
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/a")));
        assert!(matches!(args.command, Command::List(_)));
    }
}
