use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,
    pub installer: Vec<String>,
    /// Requirement name mapped to the package that provides it.
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

/// Name of the optional overlay file picked by `APP_ENVIRONMENT`.
fn overlay_name(environment: Option<String>) -> Result<String, String> {
    let environment = environment
        .unwrap_or_else(|| "local".into())
        .to_lowercase();
    match environment.as_str() {
        "local" | "production" => Ok(format!("{}.yaml", environment)),
        other => Err(format!(
            "APP_ENVIRONMENT must be local or production, got {:?}",
            other
        )),
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("No current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let overlay = overlay_name(std::env::var("APP_ENVIRONMENT").ok())
        .map_err(config::ConfigError::Message)?;

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(configuration_directory.join(overlay)).required(false),
        )
        .add_source(
            config::Environment::with_prefix("DC")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_from(yaml: &str) -> Result<Settings, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }

    #[test]
    fn test_log_level_defaults_to_warn() {
        let settings = settings_from("installer: [apt-get]\ndependencies: {}\n").unwrap();

        assert_eq!(settings.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_log_level_rejects_unknown_names() {
        let settings =
            settings_from("log_level: debug\ninstaller: [apt-get]\ndependencies: {}\n").unwrap();
        assert_eq!(settings.log_level.as_str(), "debug");

        assert!(settings_from("log_level: trace\ninstaller: []\ndependencies: {}\n").is_err());
    }

    #[test]
    fn test_overlay_follows_environment() {
        assert_eq!(overlay_name(None).unwrap(), "local.yaml");
        assert_eq!(
            overlay_name(Some("Production".into())).unwrap(),
            "production.yaml"
        );
        assert!(overlay_name(Some("staging".into())).is_err());
    }
}
