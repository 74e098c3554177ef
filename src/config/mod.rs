//! Settings management

mod app_config;

pub use app_config::default_settings_path;
pub use app_config::AppConfig;
pub use app_config::LogLevel;
