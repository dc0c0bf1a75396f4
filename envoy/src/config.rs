//! Dispatcher configuration
//!
//! Defaults are fixed at build time. A root-owned overlay at
//! [`SYSTEM_CONFIG_PATH`] may adjust them; the overlay location itself is
//! never taken from the environment or the command line.

use crate::error::{EnvoyError, Result};
use serde::{Deserialize, Serialize};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Owner required of the overlay
const ROOT_UID: u32 = 0;

/// Group- and world-write permission bits
const FOREIGN_WRITE_BITS: u32 = 0o022;

/// System configuration overlay
pub const SYSTEM_CONFIG_PATH: &str = "/grimoire/system/envoy.yaml";

/// Privileged helper
pub const DEFAULT_HELPER_PATH: &str = match option_env!("ENVOY_HELPER_PATH") {
    Some(path) => path,
    None => "/usr/lib/nyx/envoy-helper",
};

/// Graphics-capable sibling build
pub const DEFAULT_GRAPHICAL_PATH: &str = match option_env!("ENVOY_GRAPHICAL_PATH") {
    Some(path) => path,
    None => "/usr/lib/nyx/envoy-graphical",
};

/// Helper flag selecting the text interface
pub const DEFAULT_TEXT_FLAG: &str = match option_env!("ENVOY_TEXT_FLAG") {
    Some(flag) => flag,
    None => "-t",
};

/// Helper flag selecting wrap mode
pub const DEFAULT_WRAP_FLAG: &str = match option_env!("ENVOY_WRAP_FLAG") {
    Some(flag) => flag,
    None => "-w",
};

/// Envoy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvoyConfig {
    /// Privileged helper to hand off to
    pub helper_path: PathBuf,
    /// Flag telling the helper to use its text interface
    pub text_flag: String,
    /// Flag telling the helper to wrap a named target program
    pub wrap_flag: String,
    /// Allow graphical interaction. Can only turn off compiled-in support.
    pub graphical: bool,
    /// Sibling builds tried, in order, when graphical support is off
    pub fallbacks: Vec<PathBuf>,
    /// Environment variables holding a display address
    pub display_vars: Vec<String>,
    /// Startup-notification identifier preserved across the probe
    pub startup_id_var: Option<String>,
    /// Timeout for remote display connections (milliseconds)
    pub connect_timeout_ms: u64,
    /// Discard stderr while probing
    pub silence_probe: bool,
}

impl Default for EnvoyConfig {
    fn default() -> Self {
        Self {
            helper_path: PathBuf::from(DEFAULT_HELPER_PATH),
            text_flag: DEFAULT_TEXT_FLAG.to_string(),
            wrap_flag: DEFAULT_WRAP_FLAG.to_string(),
            graphical: true,
            fallbacks: vec![PathBuf::from(DEFAULT_GRAPHICAL_PATH)],
            display_vars: vec!["DISPLAY".to_string(), "WAYLAND_DISPLAY".to_string()],
            startup_id_var: Some("DESKTOP_STARTUP_ID".to_string()),
            connect_timeout_ms: 2000,
            silence_probe: true,
        }
    }
}

impl EnvoyConfig {
    /// Whether this build may ever select graphical interaction
    pub fn graphical_support(&self) -> bool {
        cfg!(feature = "graphical") && self.graphical
    }

    /// Check paths and flags
    pub fn validate(&self) -> Result<()> {
        if !self.helper_path.is_absolute() {
            return Err(EnvoyError::InvalidConfig(format!(
                "helper_path must be absolute: {}",
                self.helper_path.display()
            )));
        }

        for fallback in &self.fallbacks {
            if !fallback.is_absolute() {
                return Err(EnvoyError::InvalidConfig(format!(
                    "fallback path must be absolute: {}",
                    fallback.display()
                )));
            }
        }

        for (name, flag) in [("text_flag", &self.text_flag), ("wrap_flag", &self.wrap_flag)] {
            if flag.len() < 2 || !flag.starts_with('-') {
                return Err(EnvoyError::InvalidConfig(format!(
                    "{} must be an option string: {:?}",
                    name, flag
                )));
            }
        }

        Ok(())
    }

    /// Parse a YAML overlay
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration, falling back to built-in defaults
///
/// A missing overlay is normal. An overlay not owned by root, or writable
/// by group or others, is ignored: it can redirect the helper path. An
/// unreadable or invalid one is logged and ignored.
pub fn load_config(path: &Path) -> EnvoyConfig {
    load_config_owned_by(path, ROOT_UID)
}

fn load_config_owned_by(path: &Path, owner: u32) -> EnvoyConfig {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No overlay at {}, using defaults", path.display());
            return EnvoyConfig::default();
        }
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            return EnvoyConfig::default();
        }
    };

    if let Err(e) = check_overlay_permissions(&metadata, owner) {
        warn!("Ignoring {}: {}", path.display(), e);
        return EnvoyConfig::default();
    }

    let loaded = std::fs::read_to_string(path)
        .map_err(EnvoyError::from)
        .and_then(|content| EnvoyConfig::from_yaml(&content));

    match loaded {
        Ok(config) => {
            debug!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            EnvoyConfig::default()
        }
    }
}

fn check_overlay_permissions(metadata: &std::fs::Metadata, owner: u32) -> Result<()> {
    if !metadata.is_file() {
        return Err(EnvoyError::InvalidConfig("overlay is not a regular file".into()));
    }

    if metadata.uid() != owner {
        return Err(EnvoyError::InvalidConfig(format!(
            "overlay owned by uid {}, expected {}",
            metadata.uid(),
            owner
        )));
    }

    if metadata.mode() & FOREIGN_WRITE_BITS != 0 {
        return Err(EnvoyError::InvalidConfig(format!(
            "overlay is group or world writable (mode {:o})",
            metadata.mode() & 0o7777
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EnvoyConfig::default();
        config.validate().unwrap();
        assert_eq!(config.text_flag, DEFAULT_TEXT_FLAG);
        assert_eq!(config.wrap_flag, DEFAULT_WRAP_FLAG);
        assert_eq!(config.fallbacks, vec![PathBuf::from(DEFAULT_GRAPHICAL_PATH)]);
    }

    #[test]
    fn test_partial_overlay() {
        let config = EnvoyConfig::from_yaml(
            "helper_path: /usr/sbin/userhelper\nstartup_id_var: null\n",
        )
        .unwrap();

        assert_eq!(config.helper_path, PathBuf::from("/usr/sbin/userhelper"));
        assert!(config.startup_id_var.is_none());
        assert_eq!(config.wrap_flag, DEFAULT_WRAP_FLAG);
        assert!(config.silence_probe);
    }

    #[test]
    fn test_relative_paths_rejected() {
        let err = EnvoyConfig::from_yaml("helper_path: bin/helper\n").unwrap_err();
        assert!(matches!(err, EnvoyError::InvalidConfig(_)));

        let err = EnvoyConfig::from_yaml("fallbacks: [envoy-graphical]\n").unwrap_err();
        assert!(matches!(err, EnvoyError::InvalidConfig(_)));
    }

    #[test]
    fn test_flags_must_be_options() {
        let err = EnvoyConfig::from_yaml("text_flag: t\n").unwrap_err();
        assert!(matches!(err, EnvoyError::InvalidConfig(_)));

        let err = EnvoyConfig::from_yaml("wrap_flag: \"-\"\n").unwrap_err();
        assert!(matches!(err, EnvoyError::InvalidConfig(_)));
    }

    #[test]
    fn test_graphical_can_only_be_disabled() {
        let config = EnvoyConfig::from_yaml("graphical: false\n").unwrap();
        assert!(!config.graphical_support());

        let config = EnvoyConfig::default();
        assert_eq!(config.graphical_support(), cfg!(feature = "graphical"));
    }

    fn write_overlay(dir: &Path, name: &str, content: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn owner_of(path: &Path) -> u32 {
        std::fs::metadata(path).unwrap().uid()
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("envoy.yaml");
        let config = load_config_owned_by(&missing, ROOT_UID);
        assert_eq!(config.helper_path, PathBuf::from(DEFAULT_HELPER_PATH));

        let broken = write_overlay(dir.path(), "broken.yaml", "helper_path: [not, a, path\n", 0o644);
        let config = load_config_owned_by(&broken, owner_of(&broken));
        assert_eq!(config.helper_path, PathBuf::from(DEFAULT_HELPER_PATH));

        let good = write_overlay(dir.path(), "good.yaml", "helper_path: /opt/nyx/helper\n", 0o644);
        let config = load_config_owned_by(&good, owner_of(&good));
        assert_eq!(config.helper_path, PathBuf::from("/opt/nyx/helper"));
    }

    #[test]
    fn test_writable_overlay_is_ignored() {
        let dir = tempfile::tempdir().unwrap();

        for mode in [0o666, 0o646, 0o664] {
            let path = write_overlay(dir.path(), "envoy.yaml", "helper_path: /tmp/not-the-helper\n", mode);
            let config = load_config_owned_by(&path, owner_of(&path));
            assert_eq!(config.helper_path, PathBuf::from(DEFAULT_HELPER_PATH), "mode {:o}", mode);
        }
    }

    #[test]
    fn test_foreign_owned_overlay_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_overlay(dir.path(), "envoy.yaml", "helper_path: /tmp/not-the-helper\n", 0o644);

        let stranger = owner_of(&path).wrapping_add(1);
        let config = load_config_owned_by(&path, stranger);
        assert_eq!(config.helper_path, PathBuf::from(DEFAULT_HELPER_PATH));

        // Tests normally run unprivileged, so the file is not root's.
        if owner_of(&path) != ROOT_UID {
            assert_eq!(load_config(&path).helper_path, PathBuf::from(DEFAULT_HELPER_PATH));
        }
    }

    #[test]
    fn test_overlay_must_be_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_owned_by(dir.path(), owner_of(dir.path()));
        assert_eq!(config.helper_path, PathBuf::from(DEFAULT_HELPER_PATH));
    }
}
