//! Lending markets of the core contract.
//!
//! A market is identified by the hash of five immutable parameters and tracks pooled supply and
//! borrow totals in both assets and shares. Positions are accounted in shares; the exchange rate
//! only grows through interest accrual.

use alloy_primitives::{keccak256, Address, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    display::{opt, wad},
    math::{
        checked_add, checked_sub, irm, mul_div_down, shares, w_div_down, w_div_up, w_mul_down,
        w_taylor_compounded, MathResult, RoundingDirection, ORACLE_PRICE_SCALE,
    },
    models::{error::BlueError, position::Position, MarketId},
};

/// Immutable parameters of a market. Their hash is the market id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParams {
    pub loan_token: Address,
    pub collateral_token: Address,
    pub oracle: Address,
    pub irm: Address,
    /// Liquidation loan-to-value, WAD-scaled.
    pub lltv: U256,
}

impl MarketParams {
    pub fn new(
        loan_token: Address,
        collateral_token: Address,
        oracle: Address,
        irm: Address,
        lltv: U256,
    ) -> Self {
        Self { loan_token, collateral_token, oracle, irm, lltv }
    }

    /// `keccak256(abi.encode(loanToken, collateralToken, oracle, irm, lltv))`.
    pub fn id(&self) -> MarketId {
        let mut encoded = [0u8; 160];
        for (i, address) in [self.loan_token, self.collateral_token, self.oracle, self.irm]
            .iter()
            .enumerate()
        {
            encoded[i * 32 + 12..(i + 1) * 32].copy_from_slice(address.as_slice());
        }
        encoded[128..].copy_from_slice(&self.lltv.to_be_bytes::<32>());

        keccak256(encoded)
    }
}

/// Outcome of an accrual: how much interest was added and how many fee shares were minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccrualResult {
    pub interest: U256,
    pub fee_shares: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub params: MarketParams,
    pub total_supply_assets: U256,
    pub total_supply_shares: U256,
    pub total_borrow_assets: U256,
    pub total_borrow_shares: U256,
    /// Timestamp of the last interest accrual.
    pub last_update: u64,
    /// Share of interest minted to the fee recipient, WAD-scaled.
    pub fee: U256,
    /// Collateral price in loan token, scaled by `ORACLE_PRICE_SCALE`. `None` when the oracle
    /// could not be read.
    #[serde(default)]
    pub price: Option<U256>,
    /// Stored rate at target of the adaptive curve model. `None` for markets whose rate model is
    /// not known, which then accrue no interest.
    #[serde(default)]
    pub rate_at_target: Option<U256>,
}

impl Market {
    pub fn new(params: MarketParams, last_update: u64) -> Self {
        Self {
            params,
            total_supply_assets: U256::ZERO,
            total_supply_shares: U256::ZERO,
            total_borrow_assets: U256::ZERO,
            total_borrow_shares: U256::ZERO,
            last_update,
            fee: U256::ZERO,
            price: None,
            rate_at_target: None,
        }
    }

    pub fn id(&self) -> MarketId {
        self.params.id()
    }

    /// Assets available to borrow or withdraw.
    pub fn liquidity(&self) -> U256 {
        self.total_supply_assets
            .saturating_sub(self.total_borrow_assets)
    }

    /// Borrowed over supplied assets, WAD-scaled. Zero on an empty market.
    pub fn utilization(&self) -> MathResult<U256> {
        if self.total_supply_assets.is_zero() {
            return Ok(U256::ZERO);
        }
        crate::math::w_div_down(self.total_borrow_assets, self.total_supply_assets)
    }

    pub fn to_supply_assets(&self, shares: U256, rounding: RoundingDirection) -> MathResult<U256> {
        shares::to_assets(shares, self.total_supply_assets, self.total_supply_shares, rounding)
    }

    pub fn to_supply_shares(&self, assets: U256, rounding: RoundingDirection) -> MathResult<U256> {
        shares::to_shares(assets, self.total_supply_assets, self.total_supply_shares, rounding)
    }

    pub fn to_borrow_assets(&self, shares: U256, rounding: RoundingDirection) -> MathResult<U256> {
        shares::to_assets(shares, self.total_borrow_assets, self.total_borrow_shares, rounding)
    }

    pub fn to_borrow_shares(&self, assets: U256, rounding: RoundingDirection) -> MathResult<U256> {
        shares::to_shares(assets, self.total_borrow_assets, self.total_borrow_shares, rounding)
    }

    /// Accrues interest up to `timestamp`.
    ///
    /// Interest is the borrow total compounded over the elapsed time with the model's average
    /// rate and is added to both borrow and supply totals. The fee part of it is minted as supply
    /// shares at the post-interest exchange rate; the caller credits them to the fee recipient.
    /// Calling this again at the same timestamp is a no-op.
    ///
    /// # Errors
    ///
    /// [`BlueError::InvalidInterestAccrual`] if `timestamp` is before the last update.
    pub fn accrue_interest(&mut self, timestamp: u64) -> Result<AccrualResult, BlueError> {
        if timestamp < self.last_update {
            return Err(BlueError::InvalidInterestAccrual {
                market_id: self.id(),
                timestamp,
                last_update: self.last_update,
            });
        }

        let elapsed = timestamp - self.last_update;
        if elapsed == 0 {
            return Ok(AccrualResult::default());
        }

        let Some(rate_at_target) = self.rate_at_target else {
            self.last_update = timestamp;
            return Ok(AccrualResult::default());
        };

        let rates = irm::get_borrow_rate(self.utilization()?, rate_at_target, elapsed);
        let interest = w_mul_down(
            self.total_borrow_assets,
            w_taylor_compounded(rates.avg_borrow_rate, U256::from(elapsed))?,
        )?;

        self.total_borrow_assets = checked_add(self.total_borrow_assets, interest)?;
        self.total_supply_assets = checked_add(self.total_supply_assets, interest)?;

        let mut fee_shares = U256::ZERO;
        if !self.fee.is_zero() {
            let fee_amount = w_mul_down(interest, self.fee)?;
            fee_shares = shares::to_shares(
                fee_amount,
                checked_sub(self.total_supply_assets, fee_amount)?,
                self.total_supply_shares,
                RoundingDirection::Down,
            )?;
            self.total_supply_shares = checked_add(self.total_supply_shares, fee_shares)?;
        }

        self.rate_at_target = Some(rates.end_rate_at_target);
        self.last_update = timestamp;

        debug!(
            market_id = %self.id(),
            elapsed,
            %interest,
            %fee_shares,
            "Accrued market interest"
        );

        Ok(AccrualResult { interest, fee_shares })
    }

    /// Returns a copy of this market accrued up to `timestamp`.
    pub fn accrued(&self, timestamp: u64) -> Result<Market, BlueError> {
        let mut market = self.clone();
        market.accrue_interest(timestamp)?;
        Ok(market)
    }

    /// Resolves an (assets, shares) pair where exactly one side is zero into both sides.
    fn resolve(
        assets: U256,
        shares: U256,
        to_shares: impl FnOnce(U256) -> MathResult<U256>,
        to_assets: impl FnOnce(U256) -> MathResult<U256>,
    ) -> Result<(U256, U256), BlueError> {
        match (assets.is_zero(), shares.is_zero()) {
            (false, true) => Ok((assets, to_shares(assets)?)),
            (true, false) => Ok((to_assets(shares)?, shares)),
            _ => Err(BlueError::InconsistentInput { assets, shares }),
        }
    }

    /// Adds supply to the pool. Returns the supplied `(assets, shares)`.
    pub fn supply(&mut self, assets: U256, shares: U256) -> Result<(U256, U256), BlueError> {
        let (assets, shares) = Self::resolve(
            assets,
            shares,
            |a| self.to_supply_shares(a, RoundingDirection::Down),
            |s| self.to_supply_assets(s, RoundingDirection::Up),
        )?;

        self.total_supply_assets = checked_add(self.total_supply_assets, assets)?;
        self.total_supply_shares = checked_add(self.total_supply_shares, shares)?;

        Ok((assets, shares))
    }

    /// Removes supply from the pool. Returns the withdrawn `(assets, shares)`.
    ///
    /// Liquidity is checked by the caller after the position update, see
    /// [`Market::has_enough_liquidity`].
    pub fn withdraw(&mut self, assets: U256, shares: U256) -> Result<(U256, U256), BlueError> {
        let id = self.id();
        let (assets, shares) = Self::resolve(
            assets,
            shares,
            |a| self.to_supply_shares(a, RoundingDirection::Up),
            |s| self.to_supply_assets(s, RoundingDirection::Down),
        )?;

        self.total_supply_shares = self
            .total_supply_shares
            .checked_sub(shares)
            .ok_or(BlueError::InsufficientLiquidity(id))?;
        self.total_supply_assets = self
            .total_supply_assets
            .checked_sub(assets)
            .ok_or(BlueError::InsufficientLiquidity(id))?;

        Ok((assets, shares))
    }

    /// Adds debt to the pool. Returns the borrowed `(assets, shares)`.
    ///
    /// Liquidity is checked by the caller after the health check, in contract order.
    pub fn borrow(&mut self, assets: U256, shares: U256) -> Result<(U256, U256), BlueError> {
        let (assets, shares) = Self::resolve(
            assets,
            shares,
            |a| self.to_borrow_shares(a, RoundingDirection::Up),
            |s| self.to_borrow_assets(s, RoundingDirection::Down),
        )?;

        self.total_borrow_assets = checked_add(self.total_borrow_assets, assets)?;
        self.total_borrow_shares = checked_add(self.total_borrow_shares, shares)?;

        Ok((assets, shares))
    }

    /// Removes debt from the pool. Returns the repaid `(assets, shares)`.
    pub fn repay(&mut self, assets: U256, shares: U256) -> Result<(U256, U256), BlueError> {
        let (assets, shares) = Self::resolve(
            assets,
            shares,
            |a| self.to_borrow_shares(a, RoundingDirection::Down),
            |s| self.to_borrow_assets(s, RoundingDirection::Up),
        )?;

        self.total_borrow_shares = checked_sub(self.total_borrow_shares, shares)?;
        // Rounding may leave a dust of debt assets above the total, hence the floor.
        self.total_borrow_assets = self
            .total_borrow_assets
            .saturating_sub(assets);

        Ok((assets, shares))
    }

    pub fn has_enough_liquidity(&self) -> bool {
        self.total_borrow_assets <= self.total_supply_assets
    }

    /// Value of `collateral` in loan token. `None` when the price is unknown.
    pub fn collateral_value(&self, collateral: U256) -> MathResult<Option<U256>> {
        self.price
            .map(|price| mul_div_down(collateral, price, ORACLE_PRICE_SCALE))
            .transpose()
    }

    /// Maximum debt `collateral` can back at the liquidation LTV.
    pub fn max_borrow_assets(&self, collateral: U256) -> MathResult<Option<U256>> {
        self.collateral_value(collateral)?
            .map(|value| w_mul_down(value, self.params.lltv))
            .transpose()
    }

    /// Whether the position's debt is covered by its discounted collateral. A position without
    /// debt is always healthy; one with debt on a market without price never is.
    pub fn is_healthy(&self, position: &Position) -> MathResult<bool> {
        if position.borrow_shares.is_zero() {
            return Ok(true);
        }

        let borrowed = self.to_borrow_assets(position.borrow_shares, RoundingDirection::Up)?;
        let healthy = match self.max_borrow_assets(position.collateral)? {
            Some(max_borrow) => max_borrow >= borrowed,
            None => false,
        };

        if !healthy {
            debug!(
                user = %position.user,
                market_id = %self.id(),
                %borrowed,
                price = opt(&self.price),
                lltv = wad(self.params.lltv),
                "Position is unhealthy"
            );
        }

        Ok(healthy)
    }

    /// Loan-to-value of a position, WAD-scaled. `None` when the price is unknown.
    pub fn ltv(&self, position: &Position) -> MathResult<Option<U256>> {
        if position.borrow_shares.is_zero() {
            return Ok(Some(U256::ZERO));
        }

        let Some(collateral_value) = self.collateral_value(position.collateral)? else {
            return Ok(None);
        };
        if collateral_value.is_zero() {
            return Ok(Some(U256::MAX));
        }

        let borrowed = self.to_borrow_assets(position.borrow_shares, RoundingDirection::Up)?;
        w_div_up(borrowed, collateral_value).map(Some)
    }

    /// Max borrow over current debt, WAD-scaled. `U256::MAX` without debt.
    pub fn health_factor(&self, position: &Position) -> MathResult<Option<U256>> {
        let borrowed = self.to_borrow_assets(position.borrow_shares, RoundingDirection::Up)?;
        if borrowed.is_zero() {
            return Ok(Some(U256::MAX));
        }

        self.max_borrow_assets(position.collateral)?
            .map(|max_borrow| w_div_down(max_borrow, borrowed))
            .transpose()
    }
}

#[cfg(test)]
mod test {
    use alloy_primitives::{address, b256};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::math::WAD;

    fn params() -> MarketParams {
        MarketParams::new(
            address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
            address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            address!("dddd770badd886df3864029e4b377b5f6a2b6b83"),
            address!("870ac11d48b15db9a138cf899d20f13f79ba00bc"),
            U256::from(860_000_000_000_000_000u64),
        )
    }

    #[fixture]
    fn market() -> Market {
        Market {
            params: params(),
            total_supply_assets: U256::from(1_000_000_000_000u64),
            total_supply_shares: U256::from(1_000_000_000_000_000_000u64),
            total_borrow_assets: U256::from(800_000_000_000u64),
            total_borrow_shares: U256::from(800_000_000_000_000_000u64),
            last_update: 1_000,
            fee: WAD / U256::from(10),
            price: Some(ORACLE_PRICE_SCALE),
            rate_at_target: Some(U256::from(1_268_391_679u64)),
        }
    }

    #[test]
    fn test_market_id() {
        assert_eq!(
            params().id(),
            b256!("9cd7e77c4da7cb0216f7525af26271a2281f5fca5f16f78b83f36043d6e0a194")
        );

        let other = MarketParams { lltv: U256::from(915_000_000_000_000_000u64), ..params() };
        assert_ne!(other.id(), params().id());
    }

    #[rstest]
    fn test_accrue_interest_is_idempotent(mut market: Market) {
        market.accrue_interest(1_000 + 86_400).unwrap();
        let accrued = market.clone();

        let result = market.accrue_interest(1_000 + 86_400).unwrap();

        assert_eq!(result, AccrualResult::default());
        assert_eq!(market, accrued);
    }

    #[rstest]
    fn test_accrue_interest_grows_both_sides(market: Market) {
        let accrued = market.accrued(1_000 + 86_400).unwrap();
        let interest = accrued.total_borrow_assets - market.total_borrow_assets;

        assert!(interest > U256::ZERO);
        assert_eq!(accrued.total_supply_assets - market.total_supply_assets, interest);
        assert!(accrued.total_supply_shares > market.total_supply_shares);
        assert_eq!(accrued.last_update, 1_000 + 86_400);
        assert_ne!(accrued.rate_at_target, market.rate_at_target);
    }

    #[rstest]
    fn test_accrue_interest_backwards_fails(mut market: Market) {
        let err = market.accrue_interest(999).unwrap_err();

        assert_eq!(
            err,
            BlueError::InvalidInterestAccrual {
                market_id: market.id(),
                timestamp: 999,
                last_update: 1_000
            }
        );
    }

    #[rstest]
    fn test_accrue_without_rate_model_only_moves_clock(mut market: Market) {
        market.rate_at_target = None;
        let before = market.clone();

        market.accrue_interest(5_000).unwrap();

        assert_eq!(market.total_borrow_assets, before.total_borrow_assets);
        assert_eq!(market.last_update, 5_000);
    }

    #[rstest]
    fn test_supply_requires_exactly_one_amount(mut market: Market) {
        assert_eq!(
            market.supply(U256::from(1), U256::from(1)),
            Err(BlueError::InconsistentInput { assets: U256::from(1), shares: U256::from(1) })
        );
        assert_eq!(
            market.supply(U256::ZERO, U256::ZERO),
            Err(BlueError::InconsistentInput { assets: U256::ZERO, shares: U256::ZERO })
        );
    }

    #[rstest]
    fn test_withdraw_more_than_liquidity(mut market: Market) {
        let id = market.id();

        market
            .withdraw(U256::from(300_000_000_000u64), U256::ZERO)
            .unwrap();
        assert!(!market.has_enough_liquidity());

        assert_eq!(
            market.withdraw(U256::from(800_000_000_000u64), U256::ZERO),
            Err(BlueError::InsufficientLiquidity(id))
        );
    }

    #[rstest]
    fn test_health_boundary(market: Market) {
        let user = address!("0000000000000000000000000000000000000001");
        let id = market.id();
        // At a price of 1, 1e6 collateral backs exactly 860_000 of debt.
        let collateral = U256::from(1_000_000u64);
        let max_debt = U256::from(860_000u64);
        let at_lltv = market
            .to_borrow_shares(max_debt, RoundingDirection::Down)
            .unwrap();

        let position = Position { borrow_shares: at_lltv, collateral, ..Position::new(user, id) };
        assert!(market.is_healthy(&position).unwrap());
        assert_eq!(market.ltv(&position).unwrap(), Some(market.params.lltv));
        assert_eq!(market.health_factor(&position).unwrap(), Some(WAD));

        let more_debt = Position {
            borrow_shares: market
                .to_borrow_shares(max_debt + U256::from(1), RoundingDirection::Up)
                .unwrap(),
            ..position.clone()
        };
        assert!(!market.is_healthy(&more_debt).unwrap());

        let less_collateral = Position { collateral: collateral - U256::from(1), ..position };
        assert!(!market.is_healthy(&less_collateral).unwrap());
    }

    #[rstest]
    fn test_unknown_price_is_unhealthy_with_debt(mut market: Market) {
        market.price = None;
        let position = Position {
            borrow_shares: U256::from(1),
            collateral: U256::MAX / U256::from(2),
            ..Position::new(Address::ZERO, market.id())
        };

        assert!(!market.is_healthy(&position).unwrap());
        assert_eq!(market.health_factor(&position).unwrap(), None);
        let no_debt = Position::new(Address::ZERO, market.id());
        assert!(market.is_healthy(&no_debt).unwrap());
        assert_eq!(market.health_factor(&no_debt).unwrap(), Some(U256::MAX));
    }
}
