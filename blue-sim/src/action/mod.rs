//! Actions a simulation can run.
//!
//! Every action has a `sender` (the account calling the contract) and an `address` (the
//! contract being called: the core contract, a token, a vault or a swap router). The kind is a
//! closed set; the dispatcher matches on it exhaustively.
//!
//! Amounts supplied by callers are signed so that negative input can be represented and
//! rejected. [`MAX_AMOUNT`] asks the bundling adapter to use its entire available balance.

use alloy_primitives::{Address, Bytes, I256, U256};
use blue_sim_common::{math::WAD, models::MarketId};
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;

use crate::errors::InputError;

/// Sentinel amount resolved by the bundling adapter to its full available balance.
pub const MAX_AMOUNT: I256 = I256::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub sender: Address,
    pub address: Address,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn new(sender: Address, address: Address, kind: ActionKind) -> Self {
        Self { sender, address, kind }
    }
}

/// Supply, withdraw, borrow or repay on a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketArgs {
    pub id: MarketId,
    #[serde(default)]
    pub assets: I256,
    #[serde(default)]
    pub shares: I256,
    pub on_behalf: Address,
    /// Recipient of withdrawn or borrowed assets. Defaults to the sender.
    #[serde(default)]
    pub receiver: Option<Address>,
    /// Tolerance on the executed share price, WAD-scaled. Only enforced for the bundling adapter.
    #[serde(default)]
    pub slippage: Option<I256>,
    #[serde(default)]
    pub callback: Option<Vec<Action>>,
}

impl MarketArgs {
    pub fn new(id: MarketId, assets: I256, shares: I256, on_behalf: Address) -> Self {
        Self { id, assets, shares, on_behalf, receiver: None, slippage: None, callback: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollateralArgs {
    pub id: MarketId,
    pub assets: I256,
    pub on_behalf: Address,
    #[serde(default)]
    pub receiver: Option<Address>,
    #[serde(default)]
    pub callback: Option<Vec<Action>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashLoanArgs {
    pub token: Address,
    pub assets: I256,
    #[serde(default)]
    pub callback: Option<Vec<Action>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrueInterestArgs {
    pub id: MarketId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAuthorizationArgs {
    pub owner: Address,
    pub is_bundler_authorized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferArgs {
    pub amount: I256,
    pub from: Address,
    pub to: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveArgs {
    pub spender: Address,
    pub amount: I256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitArgs {
    pub spender: Address,
    pub amount: I256,
    pub nonce: U256,
    #[serde(default)]
    pub deadline: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit2Args {
    pub spender: Address,
    pub amount: I256,
    pub expiration: u64,
    pub nonce: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapArgs {
    pub amount: I256,
    /// Recipient of the wrapped tokens.
    pub owner: Address,
    #[serde(default)]
    pub slippage: Option<I256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwrapArgs {
    pub amount: I256,
    pub receiver: Address,
    #[serde(default)]
    pub slippage: Option<I256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultDepositArgs {
    #[serde(default)]
    pub assets: I256,
    #[serde(default)]
    pub shares: I256,
    /// Recipient of the minted shares.
    pub owner: Address,
    #[serde(default)]
    pub slippage: Option<I256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultWithdrawArgs {
    #[serde(default)]
    pub assets: I256,
    #[serde(default)]
    pub shares: I256,
    /// Holder of the burnt shares.
    pub owner: Address,
    pub receiver: Address,
    #[serde(default)]
    pub slippage: Option<I256>,
}

/// Target supply of a vault on a market. [`MAX_AMOUNT`] supplies everything withdrawn so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub id: MarketId,
    pub assets: I256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicReallocateArgs {
    /// Amounts to pull from each market, sorted by market id.
    pub withdrawals: Vec<Allocation>,
    pub supply_market_id: MarketId,
}

/// Byte offsets of 32-byte big-endian words inside a swap payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapOffsets {
    pub exact_amount: usize,
    pub quoted_amount: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwapAmounts {
    Explicit { amount: I256, quoted_amount: I256 },
    Payload { data: Bytes, offsets: SwapOffsets },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapArgs {
    pub src_token: Address,
    pub dst_token: Address,
    /// For a buy, the exact destination amount and the quoted source amount. For a sell, the
    /// exact source amount and the quoted destination amount.
    pub amounts: SwapAmounts,
    pub receiver: Address,
    #[serde(default)]
    pub slippage: Option<I256>,
    /// Sell only: sell the sender's whole source balance, scaling the quote accordingly.
    #[serde(default)]
    pub sell_entire_balance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", content = "args")]
pub enum ActionKind {
    #[serde(rename = "Blue_Supply")]
    #[strum(serialize = "Blue_Supply")]
    BlueSupply(MarketArgs),
    #[serde(rename = "Blue_Withdraw")]
    #[strum(serialize = "Blue_Withdraw")]
    BlueWithdraw(MarketArgs),
    #[serde(rename = "Blue_Borrow")]
    #[strum(serialize = "Blue_Borrow")]
    BlueBorrow(MarketArgs),
    #[serde(rename = "Blue_Repay")]
    #[strum(serialize = "Blue_Repay")]
    BlueRepay(MarketArgs),
    #[serde(rename = "Blue_SupplyCollateral")]
    #[strum(serialize = "Blue_SupplyCollateral")]
    BlueSupplyCollateral(CollateralArgs),
    #[serde(rename = "Blue_WithdrawCollateral")]
    #[strum(serialize = "Blue_WithdrawCollateral")]
    BlueWithdrawCollateral(CollateralArgs),
    #[serde(rename = "Blue_FlashLoan")]
    #[strum(serialize = "Blue_FlashLoan")]
    BlueFlashLoan(FlashLoanArgs),
    #[serde(rename = "Blue_AccrueInterest")]
    #[strum(serialize = "Blue_AccrueInterest")]
    BlueAccrueInterest(AccrueInterestArgs),
    #[serde(rename = "Blue_SetAuthorization")]
    #[strum(serialize = "Blue_SetAuthorization")]
    BlueSetAuthorization(SetAuthorizationArgs),
    #[serde(rename = "Erc20_Transfer")]
    #[strum(serialize = "Erc20_Transfer")]
    Erc20Transfer(TransferArgs),
    #[serde(rename = "Erc20_Transfer2")]
    #[strum(serialize = "Erc20_Transfer2")]
    Erc20Transfer2(TransferArgs),
    #[serde(rename = "Erc20_Approve")]
    #[strum(serialize = "Erc20_Approve")]
    Erc20Approve(ApproveArgs),
    #[serde(rename = "Erc20_Permit")]
    #[strum(serialize = "Erc20_Permit")]
    Erc20Permit(PermitArgs),
    #[serde(rename = "Erc20_Permit2")]
    #[strum(serialize = "Erc20_Permit2")]
    Erc20Permit2(Permit2Args),
    #[serde(rename = "Erc20_Wrap")]
    #[strum(serialize = "Erc20_Wrap")]
    Erc20Wrap(WrapArgs),
    #[serde(rename = "Erc20_Unwrap")]
    #[strum(serialize = "Erc20_Unwrap")]
    Erc20Unwrap(UnwrapArgs),
    #[serde(rename = "MetaMorpho_AccrueInterest")]
    #[strum(serialize = "MetaMorpho_AccrueInterest")]
    MetaMorphoAccrueInterest,
    #[serde(rename = "MetaMorpho_Deposit")]
    #[strum(serialize = "MetaMorpho_Deposit")]
    MetaMorphoDeposit(VaultDepositArgs),
    #[serde(rename = "MetaMorpho_Withdraw")]
    #[strum(serialize = "MetaMorpho_Withdraw")]
    MetaMorphoWithdraw(VaultWithdrawArgs),
    #[serde(rename = "MetaMorpho_Reallocate")]
    #[strum(serialize = "MetaMorpho_Reallocate")]
    MetaMorphoReallocate(Vec<Allocation>),
    #[serde(rename = "MetaMorpho_PublicReallocate")]
    #[strum(serialize = "MetaMorpho_PublicReallocate")]
    MetaMorphoPublicReallocate(PublicReallocateArgs),
    #[serde(rename = "VaultV2_AccrueInterest")]
    #[strum(serialize = "VaultV2_AccrueInterest")]
    VaultV2AccrueInterest,
    #[serde(rename = "VaultV2_Deposit")]
    #[strum(serialize = "VaultV2_Deposit")]
    VaultV2Deposit(VaultDepositArgs),
    #[serde(rename = "VaultV2_Withdraw")]
    #[strum(serialize = "VaultV2_Withdraw")]
    VaultV2Withdraw(VaultWithdrawArgs),
    #[serde(rename = "Paraswap_Buy")]
    #[strum(serialize = "Paraswap_Buy")]
    ParaswapBuy(SwapArgs),
    #[serde(rename = "Paraswap_Sell")]
    #[strum(serialize = "Paraswap_Sell")]
    ParaswapSell(SwapArgs),
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Signed amounts carried by this action, by field name. Nested actions are not included;
    /// they are checked when they run.
    fn amounts(&self) -> Vec<(&'static str, I256)> {
        match self {
            ActionKind::BlueSupply(args) |
            ActionKind::BlueWithdraw(args) |
            ActionKind::BlueBorrow(args) |
            ActionKind::BlueRepay(args) => {
                vec![("assets", args.assets), ("shares", args.shares)]
            }
            ActionKind::BlueSupplyCollateral(args) | ActionKind::BlueWithdrawCollateral(args) => {
                vec![("assets", args.assets)]
            }
            ActionKind::BlueFlashLoan(args) => vec![("assets", args.assets)],
            ActionKind::Erc20Transfer(args) | ActionKind::Erc20Transfer2(args) => {
                vec![("amount", args.amount)]
            }
            ActionKind::Erc20Approve(args) => vec![("amount", args.amount)],
            ActionKind::Erc20Permit(args) => vec![("amount", args.amount)],
            ActionKind::Erc20Permit2(args) => vec![("amount", args.amount)],
            ActionKind::Erc20Wrap(args) => vec![("amount", args.amount)],
            ActionKind::Erc20Unwrap(args) => vec![("amount", args.amount)],
            ActionKind::MetaMorphoDeposit(args) | ActionKind::VaultV2Deposit(args) => {
                vec![("assets", args.assets), ("shares", args.shares)]
            }
            ActionKind::MetaMorphoWithdraw(args) | ActionKind::VaultV2Withdraw(args) => {
                vec![("assets", args.assets), ("shares", args.shares)]
            }
            ActionKind::MetaMorphoReallocate(allocations) => allocations
                .iter()
                .map(|allocation| ("assets", allocation.assets))
                .collect(),
            ActionKind::MetaMorphoPublicReallocate(args) => args
                .withdrawals
                .iter()
                .map(|withdrawal| ("assets", withdrawal.assets))
                .collect(),
            ActionKind::ParaswapBuy(args) | ActionKind::ParaswapSell(args) => match &args.amounts {
                SwapAmounts::Explicit { amount, quoted_amount } => {
                    vec![("amount", *amount), ("quotedAmount", *quoted_amount)]
                }
                SwapAmounts::Payload { .. } => Vec::new(),
            },
            ActionKind::BlueAccrueInterest(_) |
            ActionKind::BlueSetAuthorization(_) |
            ActionKind::MetaMorphoAccrueInterest |
            ActionKind::VaultV2AccrueInterest => Vec::new(),
        }
    }

    fn slippage(&self) -> Option<I256> {
        match self {
            ActionKind::BlueSupply(args) |
            ActionKind::BlueWithdraw(args) |
            ActionKind::BlueBorrow(args) |
            ActionKind::BlueRepay(args) => args.slippage,
            ActionKind::Erc20Wrap(args) => args.slippage,
            ActionKind::Erc20Unwrap(args) => args.slippage,
            ActionKind::MetaMorphoDeposit(args) | ActionKind::VaultV2Deposit(args) => args.slippage,
            ActionKind::MetaMorphoWithdraw(args) | ActionKind::VaultV2Withdraw(args) => {
                args.slippage
            }
            ActionKind::ParaswapBuy(args) | ActionKind::ParaswapSell(args) => args.slippage,
            _ => None,
        }
    }

    /// Checks that apply to every action regardless of state: amounts are non-negative and
    /// slippage is within 0% and 100%. Nested actions are not inspected; the dispatcher validates
    /// each of them when it runs.
    pub fn validate(&self) -> Result<(), InputError> {
        for (field, value) in self.amounts() {
            if value.is_negative() {
                return Err(InputError::NegativeAmount { field, value });
            }
        }

        if let Some(slippage) = self.slippage() {
            if slippage.is_negative() {
                return Err(InputError::NegativeAmount { field: "slippage", value: slippage });
            }
            if slippage.into_raw() > WAD {
                return Err(InputError::SlippageOutOfRange(slippage));
            }
        }

        Ok(())
    }
}

/// Converts a validated, non-negative amount.
pub(crate) fn amount(value: I256) -> U256 {
    value.into_raw()
}

/// Slippage of a validated action, zero when absent.
pub(crate) fn slippage(value: Option<I256>) -> U256 {
    value.map(amount).unwrap_or_default()
}

pub(crate) fn is_max(value: I256) -> bool {
    value == MAX_AMOUNT
}
