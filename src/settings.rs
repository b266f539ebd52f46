//! Service settings using Figment
//!
//! These are the deployment-level settings of the overlay service, as opposed to
//! the per-navigation [`OverlayConfig`](crate::view::config::OverlayConfig) that
//! is derived from query parameters. Settings are loaded from:
//! 1. Built-in defaults (a working local configuration)
//! 2. config/overlay.toml (or an explicit path)
//! 3. Environment variables (prefixed with PRINTER_OVERLAY_, sections split on `__`)
//!
//! # Example
//! ```no_run
//! use printer_overlay::settings::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Application: {}", settings.application.name);
//! # Ok::<(), printer_overlay::error::OverlayError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{AppResult, OverlayError};

/// Placeholders every stream path template must carry.
pub const STREAM_TEMPLATE_PLACEHOLDERS: [&str; 3] = ["{printer_id}", "{fps}", "{token}"];

/// Top-level service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationSettings,
    /// Fleet-manager endpoints the overlay talks to
    #[serde(default)]
    pub endpoints: EndpointSettings,
    /// Corner logo link
    #[serde(default)]
    pub branding: BrandingSettings,
}

/// Application-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationSettings {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointSettings {
    /// Base URL of the fleet-manager REST API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// WebSocket URL of the push channel
    #[serde(default = "default_push_url")]
    pub push_url: String,
    /// Camera stream path, relative to `api_base_url`
    #[serde(default = "default_stream_path_template")]
    pub stream_path_template: String,
}

/// Branding settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrandingSettings {
    /// Logo image shown in the top corner
    #[serde(default = "default_logo_url")]
    pub logo_url: String,
    /// Where the logo links to
    #[serde(default = "default_logo_href")]
    pub logo_href: String,
}

// Default value functions
fn default_name() -> String {
    "Printer Overlay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_push_url() -> String {
    "ws://localhost:8000/api/v1/ws".to_string()
}

fn default_stream_path_template() -> String {
    "/api/v1/printers/{printer_id}/camera/stream?fps={fps}&t={token}".to_string()
}

fn default_logo_url() -> String {
    "/img/logo.svg".to_string()
}

fn default_logo_href() -> String {
    "https://github.com/maziggy/bambuddy".to_string()
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            push_url: default_push_url(),
            stream_path_template: default_stream_path_template(),
        }
    }
}

impl Default for BrandingSettings {
    fn default() -> Self {
        Self {
            logo_url: default_logo_url(),
            logo_href: default_logo_href(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application: ApplicationSettings::default(),
            endpoints: EndpointSettings::default(),
            branding: BrandingSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from config/overlay.toml and environment variables
    ///
    /// Environment variables override the file with prefix PRINTER_OVERLAY_
    /// Example: PRINTER_OVERLAY_APPLICATION__LOG_LEVEL=debug
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/overlay.toml")
    }

    /// Load settings from a specific file path
    ///
    /// A missing file is not an error; the defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PRINTER_OVERLAY_").split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(OverlayError::SettingsValidation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(OverlayError::SettingsValidation(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        for (field, value) in [
            ("api_base_url", &self.endpoints.api_base_url),
            ("push_url", &self.endpoints.push_url),
        ] {
            Url::parse(value).map_err(|e| {
                OverlayError::SettingsValidation(format!("Invalid {field} '{value}': {e}"))
            })?;
        }

        let missing: Vec<&str> = STREAM_TEMPLATE_PLACEHOLDERS
            .iter()
            .copied()
            .filter(|p| !self.endpoints.stream_path_template.contains(p))
            .collect();
        if !missing.is_empty() {
            return Err(OverlayError::SettingsValidation(format!(
                "stream_path_template is missing placeholders: {}",
                missing.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "loud".to_string();
        assert!(matches!(
            settings.validate(),
            Err(OverlayError::SettingsValidation(_))
        ));
    }

    #[test]
    fn test_template_must_carry_placeholders() {
        let mut settings = Settings::default();
        settings.endpoints.stream_path_template = "/camera/{printer_id}".to_string();
        let err = settings.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("{fps}"));
        assert!(message.contains("{token}"));
        assert!(!message.contains("{printer_id}"));
    }

    #[test]
    fn test_rejects_unparsable_push_url() {
        let mut settings = Settings::default();
        settings.endpoints.push_url = "not a url".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [application]
            log_level = "debug"

            [endpoints]
            api_base_url = "http://printers.local:8000"
            "#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.application.log_level, "debug");
        assert_eq!(settings.application.name, "Printer Overlay");
        assert_eq!(settings.endpoints.api_base_url, "http://printers.local:8000");
        assert_eq!(
            settings.endpoints.stream_path_template,
            default_stream_path_template()
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
