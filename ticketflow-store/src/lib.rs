pub mod app_config;
pub mod memory;

pub use app_config::{BusinessRules, Config, MerchantConfig};
pub use memory::MemoryLedger;
