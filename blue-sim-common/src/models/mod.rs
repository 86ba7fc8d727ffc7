pub mod error;
pub mod holding;
pub mod market;
pub mod position;
pub mod token;
pub mod user;
pub mod vault;
pub mod vault_v2;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Hash of a market's immutable parameters, uniquely identifying it on the core contract.
pub type MarketId = B256;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Chain {
    #[default]
    Ethereum,
    Base,
    Arbitrum,
    Polygon,
    Unichain,
}

impl Chain {
    pub fn id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Base => 8453,
            Chain::Arbitrum => 42161,
            Chain::Polygon => 137,
            Chain::Unichain => 130,
        }
    }

    pub fn from_id(id: u64) -> Option<Self> {
        [Chain::Ethereum, Chain::Base, Chain::Arbitrum, Chain::Polygon, Chain::Unichain]
            .into_iter()
            .find(|chain| chain.id() == id)
    }
}
