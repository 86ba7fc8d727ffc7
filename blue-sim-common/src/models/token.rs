use std::hash::{Hash, Hasher};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::math::{
    mul_div_down, shares::virtual_shares_for_offset, w_div_down, w_mul_down, MathResult, WAD,
};

/// How a wrapped token converts to and from its underlying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WrapperRate {
    /// One to one, adjusted for the difference in decimals.
    Constant,
    /// Underlying assets per wrapped unit, WAD-scaled.
    ExchangeRate(U256),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapperConfig {
    pub underlying: Address,
    pub underlying_decimals: u8,
    /// ERC-20 wrappers unwrap to an arbitrary receiver. Other wrappers always pay the caller.
    pub erc20_wrapper: bool,
    pub rate: WrapperRate,
}

#[derive(Debug, Clone, Deserialize, Serialize, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub wrapper: Option<WrapperConfig>,
}

impl Token {
    pub fn new(address: Address, symbol: &str, decimals: u8) -> Self {
        Self { address, symbol: symbol.to_string(), decimals, wrapper: None }
    }

    pub fn with_wrapper(mut self, wrapper: WrapperConfig) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    /// One whole token in native units.
    pub fn one(&self) -> U256 {
        virtual_shares_for_offset(self.decimals)
    }

    /// Wrapped amount received for `assets` of underlying. Returns `None` if this is not a
    /// wrapper.
    pub fn to_wrapped(&self, assets: U256) -> MathResult<Option<U256>> {
        let Some(wrapper) = &self.wrapper else {
            return Ok(None);
        };

        let wrapped = match wrapper.rate {
            WrapperRate::Constant => mul_div_down(
                assets,
                self.one(),
                virtual_shares_for_offset(wrapper.underlying_decimals),
            )?,
            WrapperRate::ExchangeRate(rate) => w_div_down(assets, rate)?,
        };

        Ok(Some(wrapped))
    }

    /// Underlying amount received for `amount` of this wrapper.
    pub fn to_unwrapped(&self, amount: U256) -> MathResult<Option<U256>> {
        let Some(wrapper) = &self.wrapper else {
            return Ok(None);
        };

        let unwrapped = match wrapper.rate {
            WrapperRate::Constant => mul_div_down(
                amount,
                virtual_shares_for_offset(wrapper.underlying_decimals),
                self.one(),
            )?,
            WrapperRate::ExchangeRate(rate) => w_mul_down(amount, rate)?,
        };

        Ok(Some(unwrapped))
    }

    /// Wrapped amount guaranteed for `assets` of underlying within `slippage` (WAD).
    pub fn to_wrapped_exact_amount_in(
        &self,
        assets: U256,
        slippage: U256,
    ) -> MathResult<Option<U256>> {
        self.to_wrapped(assets)?
            .map(|wrapped| w_mul_down(wrapped, WAD.saturating_sub(slippage)))
            .transpose()
    }

    /// Underlying amount guaranteed for `amount` of this wrapper within `slippage` (WAD).
    pub fn to_unwrapped_exact_amount_in(
        &self,
        amount: U256,
        slippage: U256,
    ) -> MathResult<Option<U256>> {
        self.to_unwrapped(amount)?
            .map(|unwrapped| w_mul_down(unwrapped, WAD.saturating_sub(slippage)))
            .transpose()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}
