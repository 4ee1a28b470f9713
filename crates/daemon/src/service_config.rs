use std::path::PathBuf;
use std::time::Duration;

pub const LOCK_FILE_NAME: &str = "lock";
pub const SOCKET_FILE_NAME: &str = "socket";
pub const CLIENTS_DIR_NAME: &str = "clients";
pub const DIRECTORY_MAP_FILE_NAME: &str = "config.json";
pub const STORAGE_DIR_NAME: &str = "storage";
pub const LOGS_DIR_NAME: &str = "logs";

pub const DEFAULT_WORKER_THREADS: usize = 12;
pub const DEFAULT_UNLOAD_START_DELAY: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_UNLOAD_AGE: Duration = Duration::from_secs(60 * 60);

/// Options the daemon process runs with, after defaults, `daemon.toml` and
/// command line flags have been merged.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub etc_dir: PathBuf,
    pub user_config_path: PathBuf,
    /// Raw listen address argument; see `process::ListenAddress::resolve`.
    pub listen_address: Option<String>,
    pub num_worker_threads: usize,
    pub debug: bool,
    /// Zero disables periodic inode unloading.
    pub unload_interval: Duration,
    pub unload_start_delay: Duration,
    pub unload_age: Duration,
    pub log_level: tracing::Level,
    /// Also write logs to a daily file under `<data_dir>/logs`.
    pub log_to_file: bool,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            etc_dir: PathBuf::from("/etc/arbor"),
            user_config_path: dirs::home_dir()
                .map(|home| home.join(".arborrc"))
                .unwrap_or_else(|| data_dir.join("arborrc")),
            data_dir,
            listen_address: None,
            num_worker_threads: DEFAULT_WORKER_THREADS,
            debug: false,
            unload_interval: Duration::ZERO,
            unload_start_delay: DEFAULT_UNLOAD_START_DELAY,
            unload_age: DEFAULT_UNLOAD_AGE,
            log_level: tracing::Level::INFO,
            log_to_file: true,
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join(LOCK_FILE_NAME)
    }

    pub fn clients_dir(&self) -> PathBuf {
        self.data_dir.join(CLIENTS_DIR_NAME)
    }

    pub fn directory_map_path(&self) -> PathBuf {
        self.data_dir.join(DIRECTORY_MAP_FILE_NAME)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(STORAGE_DIR_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_DIR_NAME)
    }
}
