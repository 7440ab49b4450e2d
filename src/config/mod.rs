//! Configuration management
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file,
//! then `SIPEXT__*` environment variables (e.g. `SIPEXT__EXTENSIONS__ROUTE_TIMEOUT_MS`).

use ::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub extensions: ExtensionsConfig,
    pub conference: ConferenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Unit answering `provide_route`
    pub active_route: Option<String>,
    /// Unit receiving conference callbacks
    pub active_conference: Option<String>,
    pub route_timeout_ms: u64,
    pub units: Vec<UnitConfig>,
}

/// One extension unit to load at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub kind: String,
    /// Interpreted by the unit kind
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferenceConfig {
    /// Whether incoming calls are offered with auto-answer
    pub auto_answer: bool,
    /// Final response when the hook leaves a call undecided and auto-answer is off
    pub fallback_reject_code: u16,
    /// Whether the media stack can inject tones and prompts
    pub media_resources: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            active_route: None,
            active_conference: None,
            route_timeout_ms: 2000,
            units: Vec::new(),
        }
    }
}

impl ExtensionsConfig {
    pub fn route_timeout(&self) -> Duration {
        Duration::from_millis(self.route_timeout_ms)
    }
}

impl Default for ConferenceConfig {
    fn default() -> Self {
        Self {
            auto_answer: true,
            fallback_reject_code: 480,
            media_resources: false,
        }
    }
}

impl ConferenceConfig {
    /// The fallback code must be a final non-2xx status
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(300..=699).contains(&self.fallback_reject_code) {
            return Err(ConfigError::Message(format!(
                "conference.fallback_reject_code {} is not a 3xx-6xx status",
                self.fallback_reject_code
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder
            .add_source(::config::Environment::with_prefix("SIPEXT").separator("__"))
            .build()?
            .try_deserialize::<Config>()?
            .validated()
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str::<Config>(source)
            .map_err(|err| ConfigError::Foreign(Box::new(err)))?
            .validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.conference.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.extensions.route_timeout(), Duration::from_secs(2));
        assert!(config.extensions.units.is_empty());
        assert!(config.conference.auto_answer);
        assert_eq!(config.conference.fallback_reject_code, 480);
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml_str(
            r#"
            [extensions]
            active_route = "router"
            route_timeout_ms = 500

            [[extensions.units]]
            name = "router"
            kind = "static_route"

            [extensions.units.settings]
            cookie_headers = { WSSessionInfo = "X-WS-Session-Info" }

            [conference]
            auto_answer = false
            "#,
        )
        .unwrap();

        assert_eq!(config.extensions.active_route.as_deref(), Some("router"));
        assert_eq!(config.extensions.route_timeout_ms, 500);
        assert_eq!(config.extensions.units.len(), 1);
        assert_eq!(config.extensions.units[0].kind, "static_route");
        assert_eq!(
            config.extensions.units[0].settings["cookie_headers"]["WSSessionInfo"],
            "X-WS-Session-Info"
        );
        assert!(!config.conference.auto_answer);
        assert_eq!(config.conference.fallback_reject_code, 480);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.extensions.route_timeout_ms, 2000);
    }

    #[test]
    fn test_fallback_reject_code_must_be_final_failure() {
        for code in [0, 180, 200, 700] {
            let source = format!("[conference]\nfallback_reject_code = {}\n", code);
            let err = Config::from_toml_str(&source).unwrap_err();
            assert!(err.to_string().contains("fallback_reject_code"), "{}", err);
        }

        let config = Config::from_toml_str("[conference]\nfallback_reject_code = 603\n").unwrap();
        assert_eq!(config.conference.fallback_reject_code, 603);
    }
}
