//! Market configuration, passed in by the application layer

use serde::{Deserialize, Serialize};

use crate::error::{Result, WasmOrdinalsError};
use crate::networks::Network;

/// Historical minimum value for a taproot output
pub const DEFAULT_MIN_OUTPUT_VALUE: u64 = 330;
pub const DEFAULT_POSTAGE: u64 = 546;
pub const DEFAULT_DUMMY_VALUE: u64 = 600;
pub const DEFAULT_DUMMY_MAX_VALUE: u64 = 1000;

const MAX_BPS: u16 = 10_000;

/// Platform service fee charged per inscription, before discounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceFeeConfig {
    pub per_inscription: u64,
    /// Discount in basis points applied to the service fee
    pub discount_bps: u16,
}

impl Default for ServiceFeeConfig {
    fn default() -> Self {
        Self {
            per_inscription: 1_000,
            discount_bps: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketConfig {
    pub network: Network,
    pub min_output_value: u64,
    pub postage: u64,
    pub dummy_value: u64,
    pub dummy_max_value: u64,
    /// Buyer must hold `required_dummy_count + 1` dummy outputs before a swap
    pub required_dummy_count: usize,
    pub service_fee: ServiceFeeConfig,
    /// Receives the mint service fee and the trade platform fee
    pub platform_fee_address: Option<String>,
    pub platform_fee_bps: u16,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            min_output_value: DEFAULT_MIN_OUTPUT_VALUE,
            postage: DEFAULT_POSTAGE,
            dummy_value: DEFAULT_DUMMY_VALUE,
            dummy_max_value: DEFAULT_DUMMY_MAX_VALUE,
            required_dummy_count: 1,
            service_fee: ServiceFeeConfig::default(),
            platform_fee_address: None,
            platform_fee_bps: 0,
        }
    }
}

impl MarketConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: MarketConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_postage(mut self, postage: u64) -> Self {
        self.postage = postage;
        self
    }
    pub fn with_min_output_value(mut self, value: u64) -> Self {
        self.min_output_value = value;
        self
    }
    pub fn with_dummy_value(mut self, value: u64) -> Self {
        self.dummy_value = value;
        self
    }
    pub fn with_required_dummy_count(mut self, count: usize) -> Self {
        self.required_dummy_count = count;
        self
    }
    pub fn with_service_fee(mut self, service_fee: ServiceFeeConfig) -> Self {
        self.service_fee = service_fee;
        self
    }
    pub fn with_platform_fee(mut self, address: impl Into<String>, bps: u16) -> Self {
        self.platform_fee_address = Some(address.into());
        self.platform_fee_bps = bps;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_output_value == 0 {
            return Err(WasmOrdinalsError::new("minOutputValue must be positive"));
        }
        if self.postage < self.min_output_value {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "postage {} is below the minimum output value {}",
                self.postage, self.min_output_value
            )));
        }
        if self.dummy_value < self.min_output_value || self.dummy_value > self.dummy_max_value {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "dummyValue {} must be within [{}, {}]",
                self.dummy_value, self.min_output_value, self.dummy_max_value
            )));
        }
        if self.platform_fee_bps > MAX_BPS || self.service_fee.discount_bps > MAX_BPS {
            return Err(WasmOrdinalsError::new("basis points must not exceed 10000"));
        }
        Ok(())
    }

    /// Number of dummy outputs the buyer must hold before a swap
    pub fn dummies_needed(&self) -> usize {
        self.required_dummy_count + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MarketConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dummies_needed(), 2);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            MarketConfig::from_json(r#"{"network":"testnet","postage":10000,"platformFeeBps":150}"#)
                .unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.postage, 10_000);
        assert_eq!(config.platform_fee_bps, 150);
        assert_eq!(config.min_output_value, DEFAULT_MIN_OUTPUT_VALUE);
    }

    #[test]
    fn test_rejects_postage_below_floor() {
        let err = MarketConfig::from_json(r#"{"postage":100}"#).unwrap_err();
        assert!(err.to_string().contains("postage"));
    }
}
