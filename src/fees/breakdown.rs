use serde::{Deserialize, Serialize};

use crate::config::ServiceFeeConfig;

/// Fees shown to the user for a mint order
///
/// `total_fee` is everything the user pays: network fees, the discounted
/// service fee, and the postage locked in the inscription outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    pub network_fee: u64,
    pub service_fee: u64,
    pub discount_service_fee: u64,
    pub total_inscription_size: u64,
    pub total_fee: u64,
}

impl FeeBreakdown {
    pub fn compute(
        network_fee: u64,
        inscription_count: usize,
        total_inscription_size: u64,
        postage_total: u64,
        service: &ServiceFeeConfig,
    ) -> Self {
        let service_fee = service.per_inscription * inscription_count as u64;
        let discount_service_fee =
            service_fee * (10_000 - u64::from(service.discount_bps.min(10_000))) / 10_000;
        FeeBreakdown {
            network_fee,
            service_fee,
            discount_service_fee,
            total_inscription_size,
            total_fee: network_fee + discount_service_fee + postage_total,
        }
    }
}
