use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: GatewaySettings,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// Shared-secret redirect integration with the payment partner.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    pub pay_url: String,
    pub merchant_code: String,
    pub secret: String,
    pub return_url: String,
    pub currency: String,
    pub locale: String,
    pub order_type: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// A pending booking with no payment return after this long is fair
    /// game for the sweeper.
    pub pending_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_ledger_retries")]
    pub ledger_max_retries: u32,
}

fn default_ledger_retries() -> u32 {
    16
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Machine-local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `VOYA__GATEWAY__SECRET=...`
            .add_source(config::Environment::with_prefix("VOYA").separator("__"))
            .build()?;

        let cfg: Self = s.try_deserialize()?;

        // Never sign with an empty key; refuse to start instead.
        if cfg.gateway.secret.is_empty() {
            return Err(config::ConfigError::Message(
                "gateway.secret must not be empty".to_string(),
            ));
        }
        Ok(cfg)
    }
}
