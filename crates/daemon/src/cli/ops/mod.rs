use std::path::{Path, PathBuf};

pub mod daemon;
pub mod health;
pub mod info;
pub mod list;
pub mod mount;
pub mod stats;
pub mod unmount;
pub mod version;

pub use daemon::Daemon;
pub use health::Health;
pub use info::Info;
pub use list::List;
pub use mount::Mount;
pub use stats::Stats;
pub use unmount::Unmount;
pub use version::Version;

crate::command_enum! {
    (Daemon, Daemon),
    (Mount, Mount),
    (Unmount, Unmount),
    (List, List),
    (Info, Info),
    (Stats, Stats),
    (Health, Health),
    (Version, Version),
}

/// The daemon resolves paths in its own working directory, so relative
/// arguments are made absolute here.
pub(crate) fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let start = s.len() - max_len + 3;
        let start = (start..s.len())
            .find(|i| s.is_char_boundary(*i))
            .unwrap_or(s.len());
        format!("...{}", &s[start..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("/data/m1", 20), "/data/m1");
        assert_eq!(truncate("/very/long/mount/point", 12), "...unt/point");
        assert_eq!(truncate("/very/long/mount/point", 12).len(), 12);
    }

    #[test]
    fn test_absolute() {
        assert_eq!(absolute(Path::new("/a/b")).unwrap(), PathBuf::from("/a/b"));
        let relative = absolute(Path::new("m1")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("m1"));
    }
}
