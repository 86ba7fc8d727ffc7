//! Failure kinds of a simulation.
//!
//! Each subsystem has its own closed enum. They compose into [`ErrorKind`], which the dispatcher
//! wraps into a [`SimulationError`] carrying the failing action and its position in the list.
//! Callers match on the kind to decide whether to retry with different amounts.

use alloy_primitives::{Address, I256, U256};
use blue_sim_common::{
    math::MathError,
    models::{error::BlueError, MarketId},
};
use thiserror::Error;

use crate::{action::Action, state::SimulationState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Negative {field}: {value}")]
    NegativeAmount { field: &'static str, value: I256 },
    #[error("Slippage {0} exceeds 100%")]
    SlippageOutOfRange(I256),
    #[error("Inconsistent input: exactly one of assets ({assets}) and shares ({shares}) must be zero")]
    InconsistentInput { assets: U256, shares: U256 },
    #[error("Malformed swap payload: no 32-byte word at offset {offset} of {len} bytes")]
    MalformedSwapPayload { offset: usize, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Erc20Error {
    #[error("Insufficient balance of {user} for {token}: {balance} < {amount}")]
    InsufficientBalance { token: Address, user: Address, balance: U256, amount: U256 },
    #[error("Insufficient allowance of {owner} to {spender} for {token}: {allowance} < {amount}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        allowance: U256,
        amount: U256,
    },
    #[error("Insufficient permit2 allowance of {owner} to {spender} for {token}")]
    InsufficientPermit2Allowance { token: Address, owner: Address, spender: Address },
    #[error("Unknown allowance of {owner} to {spender} for {token}")]
    UnknownAllowance { token: Address, owner: Address, spender: Address },
    #[error("Permit of {owner} for {token} expired at {deadline}")]
    ExpiredPermit { token: Address, owner: Address, deadline: u64 },
    #[error("Invalid permit nonce of {owner} for {token}: expected {expected}, got {nonce}")]
    InvalidPermitNonce { token: Address, owner: Address, expected: U256, nonce: U256 },
    #[error("Token {0} does not support permits")]
    PermitNotSupported(Address),
    #[error("{user} cannot receive {token}")]
    UnauthorizedTransfer { token: Address, user: Address },
    #[error("Unexpected permit2 transfer sender {0}")]
    UnexpectedTransfer2Sender(Address),
    #[error("Token {0} is not a wrapper")]
    NotWrapper(Address),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundlerError {
    #[error("Bundler is not authorized to manage positions of {0}")]
    UnauthorizedBundler(Address),
    #[error("Zero amount")]
    ZeroAmount,
    #[error("Zero shares")]
    ZeroShares,
    #[error("Slippage exceeded: share price {price} beyond limit {limit}")]
    SlippageExceeded { price: U256, limit: U256 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("All caps of vault {vault} reached with {remaining} assets left to supply")]
    AllCapsReached { vault: Address, remaining: U256 },
    #[error("Not enough liquidity in vault {vault}: {remaining} assets left to withdraw")]
    NotEnoughLiquidity { vault: Address, remaining: U256 },
    #[error(
        "Inconsistent reallocation of vault {vault}: supplied {total_supplied}, withdrawn \
         {total_withdrawn}"
    )]
    InconsistentReallocation { vault: Address, total_supplied: U256, total_withdrawn: U256 },
    #[error("{sender} is not an allocator of vault {vault}")]
    NotAllocatorRole { vault: Address, sender: Address },
    #[error("Market {market_id} is not enabled on vault {vault}")]
    UnauthorizedMarket { vault: Address, market_id: MarketId },
    #[error("Supply cap of vault {vault} exceeded on market {market_id}")]
    SupplyCapExceeded { vault: Address, market_id: MarketId },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublicAllocatorError {
    #[error("Public allocator is not configured on vault {0}")]
    NotConfigured(Address),
    #[error("Max inflow exceeded on market {0}")]
    MaxInflowExceeded(MarketId),
    #[error("Max outflow exceeded on market {0}")]
    MaxOutflowExceeded(MarketId),
    #[error("Not enough supply to withdraw from market {0}")]
    NotEnoughSupply(MarketId),
    #[error("Zero withdrawal on market {0}")]
    WithdrawZero(MarketId),
    #[error("Deposit market {0} is also withdrawn from")]
    DepositMarketInWithdrawals(MarketId),
    #[error("Withdrawals are not sorted by market id")]
    InconsistentWithdrawals,
    #[error("Market {0} is not enabled")]
    MarketNotEnabled(MarketId),
    #[error("Empty withdrawals")]
    EmptyWithdrawals,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnknownDataError {
    #[error("Unknown market {0}")]
    UnknownMarket(MarketId),
    #[error("Unknown token {0}")]
    UnknownToken(Address),
    #[error("Unknown vault {0}")]
    UnknownVault(Address),
    #[error("Unknown config of market {market_id} on vault {vault}")]
    UnknownVaultMarketConfig { vault: Address, market_id: MarketId },
    #[error("Unknown vault v2 {0}")]
    UnknownVaultV2(Address),
    #[error("Unknown vault v2 adapter {0}")]
    UnknownVaultV2Adapter(Address),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Math(#[from] MathError),
    #[error(transparent)]
    Blue(#[from] BlueError),
    #[error(transparent)]
    Erc20(#[from] Erc20Error),
    #[error(transparent)]
    Bundler(#[from] BundlerError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    PublicAllocator(#[from] PublicAllocatorError),
    #[error(transparent)]
    UnknownData(#[from] UnknownDataError),
    /// A nested action of the failing action failed.
    #[error("Callback failed: {0}")]
    Callback(Box<SimulationError>),
}

/// A failed action, with its position in the list it was run from.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Action #{index} ({}) failed: {kind}", .action.kind.name())]
pub struct SimulationError {
    pub index: usize,
    pub action: Box<Action>,
    pub kind: ErrorKind,
}

impl SimulationError {
    pub fn new(index: usize, action: Action, kind: ErrorKind) -> Self {
        Self { index, action: Box::new(action), kind }
    }

    /// The kind that caused the failure, looking through nested action failures.
    pub fn root_kind(&self) -> &ErrorKind {
        match &self.kind {
            ErrorKind::Callback(inner) => inner.root_kind(),
            kind => kind,
        }
    }
}

/// Failure of a stepwise run: the snapshots produced before the failing action, the full list
/// of actions and the wrapped error.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct StepwiseFailure {
    pub steps: Vec<SimulationState>,
    pub actions: Vec<Action>,
    pub error: SimulationError,
}

impl StepwiseFailure {
    pub fn index(&self) -> usize {
        self.error.index
    }
}
