//! Settlement configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults, so a bare test or dev environment works without any setup.

use serde::{Deserialize, Serialize};
use std::env;

use souk_core::pricing::PricingConfig;
use souk_core::{Money, TaxRate};

/// Settlement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Sales tax rate in basis points (825 = 8.25%)
    pub tax_rate_bps: u32,

    /// Flat shipping fee per order, in cents
    pub shipping_flat_cents: i64,

    /// Subtotal threshold (cents) at or above which shipping is waived
    pub free_shipping_threshold_cents: i64,
}

impl SettlementConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let config = SettlementConfig {
            tax_rate_bps: env::var("SOUK_TAX_RATE_BPS")
                .unwrap_or_else(|_| "825".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SOUK_TAX_RATE_BPS".to_string()))?,

            shipping_flat_cents: env::var("SOUK_SHIPPING_FLAT_CENTS")
                .unwrap_or_else(|_| "799".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SOUK_SHIPPING_FLAT_CENTS".to_string()))?,

            free_shipping_threshold_cents: env::var("SOUK_FREE_SHIPPING_THRESHOLD_CENTS")
                .unwrap_or_else(|_| "7500".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("SOUK_FREE_SHIPPING_THRESHOLD_CENTS".to_string())
                })?,
        };

        if config.tax_rate_bps > 10_000 {
            return Err(ConfigError::InvalidValue("SOUK_TAX_RATE_BPS".to_string()));
        }

        Ok(config)
    }

    /// The pure pricing view of this configuration.
    pub fn pricing(&self) -> PricingConfig {
        PricingConfig {
            tax_rate: TaxRate::from_bps(self.tax_rate_bps),
            shipping_flat: Money::from_cents(self.shipping_flat_cents),
            free_shipping_threshold: Money::from_cents(self.free_shipping_threshold_cents),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        SettlementConfig {
            tax_rate_bps: 825,
            shipping_flat_cents: 799,
            free_shipping_threshold_cents: 7500,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SettlementConfig::default();
        assert_eq!(config.tax_rate_bps, 825);

        let pricing = config.pricing();
        assert_eq!(pricing.tax_rate.bps(), 825);
        assert_eq!(pricing.shipping_flat.cents(), 799);
        assert_eq!(pricing.free_shipping_threshold.cents(), 7500);
    }
}
