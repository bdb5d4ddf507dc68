use crate::error::AppError;
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Environment variable selecting the optional overlay file (`local`, `production`, ...).
pub const ENVIRONMENT_VAR: &str = "APP_ENVIRONMENT";

/// Loads settings from `base.yaml`, an optional `{APP_ENVIRONMENT}.yaml` overlay and
/// `APP_`-prefixed environment variables, in that order of precedence.
///
/// Nested keys use a double underscore: `APP_DATABASE__URL` sets `database.url`.
pub fn load_settings<T: DeserializeOwned>(config_dir: &Path) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let environment = std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "local".into());

    let settings = Config::builder()
        .add_source(File::from(config_dir.join("base")).required(false))
        .add_source(File::from(config_dir.join(&environment)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        server: Server,
    }

    #[derive(Debug, Deserialize)]
    struct Server {
        port: u16,
        #[serde(default)]
        host: Option<String>,
    }

    fn write_base(dir: &Path, contents: &str) {
        std::fs::write(dir.join("base.yaml"), contents).unwrap();
    }

    #[test]
    fn reads_base_file() {
        let dir = std::env::temp_dir().join(format!("service-core-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        write_base(&dir, "server:\n  port: 9000\n  host: 0.0.0.0\n");

        let sample: Sample = load_settings(&dir).unwrap();
        assert_eq!(sample.server.port, 9000);
        assert_eq!(sample.server.host.as_deref(), Some("0.0.0.0"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_required_key_is_config_error() {
        let dir = std::env::temp_dir().join(format!("service-core-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        write_base(&dir, "other: 1\n");

        let result: Result<Sample, AppError> = load_settings(&dir);
        assert!(matches!(result, Err(AppError::ConfigError(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
