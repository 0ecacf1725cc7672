use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "PaceVault";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8088";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 25;

const DATABASE_FILE: &str = "pacevault.db";

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "pacevault=info,tower_http=info"
}

/// Get the application data directory
/// ~/PaceVault/ unless overridden by `PACEVAULT_DATA_DIR`
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime settings read from the environment (and `.env`, when present).
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("PACEVAULT_DATA_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(app_data_dir);

        let bind_raw = lookup("PACEVAULT_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        let bind_addr = bind_raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key: "PACEVAULT_BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let max_upload_mb = match lookup("PACEVAULT_MAX_UPLOAD_MB") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|mb| *mb > 0)
                .ok_or(ConfigError::Invalid {
                    key: "PACEVAULT_MAX_UPLOAD_MB",
                    value: raw,
                })?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };

        Ok(Self {
            data_dir,
            bind_addr,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
        assert!(config.data_dir.ends_with(APP_NAME));
    }

    #[test]
    fn overrides_are_read() {
        let config = config_from(&[
            ("PACEVAULT_DATA_DIR", "/srv/pacevault"),
            ("PACEVAULT_BIND_ADDR", "0.0.0.0:9000"),
            ("PACEVAULT_MAX_UPLOAD_MB", "5"),
        ])
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/pacevault"));
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.uploads_dir(), PathBuf::from("/srv/pacevault/uploads"));
        assert_eq!(config.database_path(), PathBuf::from("/srv/pacevault/pacevault.db"));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            config_from(&[("PACEVAULT_BIND_ADDR", "nowhere")]),
            Err(ConfigError::Invalid { key: "PACEVAULT_BIND_ADDR", .. })
        ));
        assert!(matches!(
            config_from(&[("PACEVAULT_MAX_UPLOAD_MB", "0")]),
            Err(ConfigError::Invalid { key: "PACEVAULT_MAX_UPLOAD_MB", .. })
        ));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }
}
