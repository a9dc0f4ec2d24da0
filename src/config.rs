use serde::Deserialize;

/// Deployment environment. Destructive admin operations refuse to run
/// in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    Development,
    Test,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub ssl: bool,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub env: AppEnv,
    pub port: u16,
    pub log_level: String,
    /// Platform fee percentage applied at capture and refund, 0 to 100.
    pub platform_fee_percent: u32,
    /// Days before an authorization hold lapses, 1 to 30.
    pub auth_expiry_days: i64,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("database.ssl", false)?
            .set_default("database.pool_size", 5)?
            .set_default("application.env", "development")?
            .set_default("application.port", 8080)?
            .set_default("application.log_level", "info")?
            .set_default("application.platform_fee_percent", 3)?
            .set_default("application.auth_expiry_days", 7)?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "database.url is required".to_string(),
            ));
        }
        if self.application.platform_fee_percent > 100 {
            return Err(config::ConfigError::Message(format!(
                "application.platform_fee_percent must be between 0 and 100, got {}",
                self.application.platform_fee_percent
            )));
        }
        if !(1..=30).contains(&self.application.auth_expiry_days) {
            return Err(config::ConfigError::Message(format!(
                "application.auth_expiry_days must be between 1 and 30, got {}",
                self.application.auth_expiry_days
            )));
        }
        Ok(())
    }
}
