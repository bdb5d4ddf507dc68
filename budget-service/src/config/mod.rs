use secrecy::Secret;
use serde::Deserialize;
use service_core::error::AppError;
use std::path::PathBuf;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub insights: InsightsSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub email: EmailSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Directory served under `/static`. Defaults to the crate's `static/` folder.
    #[serde(default)]
    pub static_dir: Option<String>,
    /// Set to true in production with HTTPS.
    #[serde(default)]
    pub secure_cookies: bool,
    #[serde(default = "default_session_inactivity_hours")]
    pub session_inactivity_hours: i64,
}

fn default_session_inactivity_hours() -> i64 {
    24
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout_seconds() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Clone)]
pub struct InsightsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Gemini API key. Insights report `Disabled` when absent.
    #[serde(default)]
    pub api_key: Option<Secret<String>>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: i32,
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_timeout_seconds() -> u64 {
    8
}

fn default_max_output_tokens() -> i32 {
    400
}

impl Default for InsightsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: default_model(),
            timeout_seconds: default_timeout_seconds(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct RateLimitSettings {
    #[serde(default = "default_login_attempts")]
    pub login_attempts: u32,
    #[serde(default = "default_login_window_seconds")]
    pub login_window_seconds: u64,
    /// Key on the last `X-Forwarded-For` hop instead of the peer address. Only enable
    /// behind a reverse proxy that appends it.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_login_attempts() -> u32 {
    5
}

fn default_login_window_seconds() -> u64 {
    60
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_attempts: default_login_attempts(),
            login_window_seconds: default_login_window_seconds(),
            trust_forwarded_for: false,
        }
    }
}

/// Outgoing mail. Without `smtp_host` messages are logged instead of sent.
#[derive(Deserialize, Clone)]
pub struct EmailSettings {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<Secret<String>>,
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Public origin used to build links in emails.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_reset_token_minutes")]
    pub reset_token_minutes: i64,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "Budget <no-reply@localhost>".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_reset_token_minutes() -> i64 {
    60
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: default_from_address(),
            base_url: default_base_url(),
            reset_token_minutes: default_reset_token_minutes(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct TelemetrySettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

impl Settings {
    /// Directory holding static assets, falling back to `<crate>/static`.
    pub fn static_dir(&self) -> PathBuf {
        match &self.server.static_dir {
            Some(dir) => PathBuf::from(dir),
            None => crate_dir().join("static"),
        }
    }
}

/// Resolves the crate directory whether the binary runs from the workspace root or from
/// `budget-service/` itself.
pub fn crate_dir() -> PathBuf {
    let base_path = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    if base_path.ends_with("budget-service") {
        base_path
    } else {
        base_path.join("budget-service")
    }
}

pub fn get_configuration() -> Result<Settings, AppError> {
    service_core::config::load_settings(&crate_dir().join("config"))
}
