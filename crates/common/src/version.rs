use serde::{Deserialize, Serialize};

/// Version and build metadata reported by `/_status/version` and `arbor version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub version: String,
    pub build_timestamp: String,
    pub build_profile: String,
    /// Comma separated list of enabled cargo features, or `none`.
    pub build_features: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildInfo {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
            build_profile: env!("BUILD_PROFILE").to_string(),
            build_features: option_env!("BUILD_FEATURES").unwrap_or("none").to_string(),
        }
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.build_features
            .split(',')
            .any(|enabled| enabled.trim() == feature)
    }
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arbor {} ({}, built {}, features: {})",
            self.version, self.build_profile, self.build_timestamp, self.build_features
        )
    }
}
