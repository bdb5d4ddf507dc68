//! Settings loading from `config/base.yaml` plus environment overrides.

use budget_service::config::get_configuration;
use secrecy::ExposeSecret;
use serial_test::serial;

#[test]
#[serial]
fn base_file_provides_defaults() {
    let settings = get_configuration().expect("configuration loads");

    assert_eq!(settings.server.port, 8080);
    assert_eq!(settings.rate_limit.login_attempts, 5);
    assert_eq!(settings.insights.timeout_seconds, 8);
    assert!(!settings.rate_limit.trust_forwarded_for);
    assert!(settings.email.smtp_host.is_none());
    assert_eq!(settings.email.reset_token_minutes, 60);
    assert!(settings.static_dir().ends_with("static"));
}

#[test]
#[serial]
fn environment_overrides_nested_keys() {
    std::env::set_var("APP_DATABASE__URL", "postgres://override@localhost/other");
    std::env::set_var("APP_INSIGHTS__TIMEOUT_SECONDS", "3");

    let settings = get_configuration();

    std::env::remove_var("APP_DATABASE__URL");
    std::env::remove_var("APP_INSIGHTS__TIMEOUT_SECONDS");

    let settings = settings.expect("configuration loads");
    assert_eq!(
        settings.database.url.expose_secret(),
        "postgres://override@localhost/other"
    );
    assert_eq!(settings.insights.timeout_seconds, 3);
}
