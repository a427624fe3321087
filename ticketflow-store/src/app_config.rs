use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub merchant: MerchantConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_seconds: u64,
    #[serde(default = "default_transfer_expiry")]
    pub transfer_expiry_minutes: i64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_max_tickets")]
    pub max_tickets_per_sale: u32,
}

fn default_gateway_timeout() -> u64 { 10 }
fn default_transfer_expiry() -> i64 { 30 }
fn default_poll_interval() -> u64 { 10 }
fn default_max_tickets() -> u32 { 10 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            gateway_timeout_seconds: default_gateway_timeout(),
            transfer_expiry_minutes: default_transfer_expiry(),
            poll_interval_seconds: default_poll_interval(),
            max_tickets_per_sale: default_max_tickets(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MerchantConfig {
    #[serde(default = "default_merchant_name")]
    pub name: String,
    #[serde(default = "default_merchant_city")]
    pub city: String,
}

fn default_merchant_name() -> String { "TicketFlow Events".to_string() }
fn default_merchant_city() -> String { "Sao Paulo".to_string() }

impl Default for MerchantConfig {
    fn default() -> Self {
        Self {
            name: default_merchant_name(),
            city: default_merchant_city(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            // Environment-specific file, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // E.g. `TICKETFLOW_BUSINESS_RULES__POLL_INTERVAL_SECONDS=5`
            .add_source(
                config::Environment::with_prefix("TICKETFLOW")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }
}
