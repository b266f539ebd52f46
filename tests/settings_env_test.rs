//! Environment overrides for service settings.
//!
//! These tests mutate process environment variables and run serially.

use printer_overlay::settings::Settings;
use printer_overlay::view::keepalive::{StreamEndpoint, StreamKeepalive};
use serial_test::serial;
use std::env;
use std::io::Write;

fn settings_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let file = settings_file(
        r#"
        [endpoints]
        api_base_url = "http://from-file:8000"
        "#,
    );
    env::set_var("PRINTER_OVERLAY_ENDPOINTS__API_BASE_URL", "http://from-env:9000");
    env::set_var("PRINTER_OVERLAY_APPLICATION__LOG_FORMAT", "json");

    let loaded = Settings::load_from(file.path());

    env::remove_var("PRINTER_OVERLAY_ENDPOINTS__API_BASE_URL");
    env::remove_var("PRINTER_OVERLAY_APPLICATION__LOG_FORMAT");

    let settings = loaded.unwrap();
    assert_eq!(settings.endpoints.api_base_url, "http://from-env:9000");
    assert_eq!(settings.application.log_format, "json");

    let keepalive = StreamKeepalive::new(StreamEndpoint::from_settings(&settings.endpoints), 5, 10);
    assert!(keepalive
        .current_url()
        .starts_with("http://from-env:9000/api/v1/printers/5/camera/stream?fps=10&t="));
}

#[test]
#[serial]
fn test_invalid_env_value_is_rejected() {
    let file = settings_file("");
    env::set_var("PRINTER_OVERLAY_APPLICATION__LOG_LEVEL", "chatty");

    let loaded = Settings::load_from(file.path());

    env::remove_var("PRINTER_OVERLAY_APPLICATION__LOG_LEVEL");
    assert!(loaded.is_err());
}

#[test]
#[serial]
fn test_file_only() {
    let file = settings_file(
        r#"
        [branding]
        logo_href = "https://example.org/fleet"
        "#,
    );
    let settings = Settings::load_from(file.path()).unwrap();
    assert_eq!(settings.branding.logo_href, "https://example.org/fleet");
    assert_eq!(settings.branding.logo_url, Settings::default().branding.logo_url);
}
