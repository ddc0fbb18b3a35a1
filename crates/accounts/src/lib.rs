//! Accounts module (event-sourced balances and transfer legs).
//!
//! Pure domain logic only: no IO, no persistence concerns.

pub mod account;
pub mod transfer;

pub use account::{
    Account, AccountCommand, AccountCreated, AccountEvent, AccountId, CreateAccount,
    CreditDestinationAccount, DebitSourceAccount, DepositMoney, DestinationCredited,
    MoneyDeposited, MoneyReturned, MoneyWithdrawn, ReturnMoneyOfFailedTransfer, SourceDebited,
    WithdrawMoney,
};
pub use transfer::{DestinationAccountNotFound, SourceAccountNotFound, TransferLegEvent};

/// Aggregate type under which account streams are stored.
pub const ACCOUNT_AGGREGATE_TYPE: &str = "accounts.account";
