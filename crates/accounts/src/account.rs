use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use moneyflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, TransferId};
use moneyflow_events::{Command, Event};

/// Account identifier (one account stream per id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub AggregateId);

impl AccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl From<AggregateId> for AccountId {
    fn from(value: AggregateId) -> Self {
        Self(value)
    }
}

impl From<AccountId> for AggregateId {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Account.
///
/// State is only ever the fold of the account's events; `balance` is never
/// below `-overdraft_limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    /// Minor units (e.g. cents).
    balance: i64,
    overdraft_limit: i64,
    version: u64,
    created: bool,
}

impl Account {
    /// Empty, not-yet-created instance for rehydration.
    pub fn empty(id: AccountId) -> Self {
        Self {
            id,
            balance: 0,
            overdraft_limit: 0,
            version: 0,
            created: false,
        }
    }

    /// Rebuild an account by folding its full history from scratch.
    pub fn from_history<'a>(
        id: AccountId,
        events: impl IntoIterator<Item = &'a AccountEvent>,
    ) -> Self {
        let mut account = Self::empty(id);
        for event in events {
            account.apply(event);
        }
        account
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn overdraft_limit(&self) -> i64 {
        self.overdraft_limit
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccount {
    pub account_id: AccountId,
    pub overdraft_limit: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DepositMoney.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositMoney {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WithdrawMoney.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawMoney {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DebitSourceAccount (outgoing transfer leg).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitSourceAccount {
    pub account_id: AccountId,
    pub transfer_id: TransferId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CreditDestinationAccount (incoming transfer leg).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDestinationAccount {
    pub account_id: AccountId,
    pub transfer_id: TransferId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnMoneyOfFailedTransfer (compensates a debit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnMoneyOfFailedTransfer {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCommand {
    CreateAccount(CreateAccount),
    DepositMoney(DepositMoney),
    WithdrawMoney(WithdrawMoney),
    DebitSourceAccount(DebitSourceAccount),
    CreditDestinationAccount(CreditDestinationAccount),
    ReturnMoneyOfFailedTransfer(ReturnMoneyOfFailedTransfer),
}

impl AccountCommand {
    pub fn account_id(&self) -> AccountId {
        match self {
            AccountCommand::CreateAccount(c) => c.account_id,
            AccountCommand::DepositMoney(c) => c.account_id,
            AccountCommand::WithdrawMoney(c) => c.account_id,
            AccountCommand::DebitSourceAccount(c) => c.account_id,
            AccountCommand::CreditDestinationAccount(c) => c.account_id,
            AccountCommand::ReturnMoneyOfFailedTransfer(c) => c.account_id,
        }
    }

    /// Transfer the command belongs to, for the two transfer legs.
    pub fn transfer_id(&self) -> Option<TransferId> {
        match self {
            AccountCommand::DebitSourceAccount(c) => Some(c.transfer_id),
            AccountCommand::CreditDestinationAccount(c) => Some(c.transfer_id),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AccountCommand::CreateAccount(_) => "CreateAccount",
            AccountCommand::DepositMoney(_) => "DepositMoney",
            AccountCommand::WithdrawMoney(_) => "WithdrawMoney",
            AccountCommand::DebitSourceAccount(_) => "DebitSourceAccount",
            AccountCommand::CreditDestinationAccount(_) => "CreditDestinationAccount",
            AccountCommand::ReturnMoneyOfFailedTransfer(_) => "ReturnMoneyOfFailedTransfer",
        }
    }
}

impl Command for AccountCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.account_id().0
    }
}

/// Event: AccountCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub account_id: AccountId,
    pub overdraft_limit: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MoneyDeposited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyDeposited {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MoneyWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyWithdrawn {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SourceDebited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDebited {
    pub account_id: AccountId,
    pub transfer_id: TransferId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DestinationCredited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationCredited {
    pub account_id: AccountId,
    pub transfer_id: TransferId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MoneyReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyReturned {
    pub account_id: AccountId,
    pub amount: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    Created(AccountCreated),
    MoneyDeposited(MoneyDeposited),
    MoneyWithdrawn(MoneyWithdrawn),
    SourceDebited(SourceDebited),
    DestinationCredited(DestinationCredited),
    MoneyReturned(MoneyReturned),
}

impl AccountEvent {
    /// Signed effect of this event on the balance.
    pub fn balance_delta(&self) -> i64 {
        match self {
            AccountEvent::Created(_) => 0,
            AccountEvent::MoneyDeposited(e) => e.amount,
            AccountEvent::DestinationCredited(e) => e.amount,
            AccountEvent::MoneyReturned(e) => e.amount,
            AccountEvent::MoneyWithdrawn(e) => -e.amount,
            AccountEvent::SourceDebited(e) => -e.amount,
        }
    }
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::Created(_) => "accounts.account.created",
            AccountEvent::MoneyDeposited(_) => "accounts.account.money_deposited",
            AccountEvent::MoneyWithdrawn(_) => "accounts.account.money_withdrawn",
            AccountEvent::SourceDebited(_) => "accounts.account.source_debited",
            AccountEvent::DestinationCredited(_) => "accounts.account.destination_credited",
            AccountEvent::MoneyReturned(_) => "accounts.account.money_returned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::Created(e) => e.occurred_at,
            AccountEvent::MoneyDeposited(e) => e.occurred_at,
            AccountEvent::MoneyWithdrawn(e) => e.occurred_at,
            AccountEvent::SourceDebited(e) => e.occurred_at,
            AccountEvent::DestinationCredited(e) => e.occurred_at,
            AccountEvent::MoneyReturned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Account {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::Created(e) => {
                self.id = e.account_id;
                self.overdraft_limit = e.overdraft_limit;
                self.balance = 0;
                self.created = true;
            }
            AccountEvent::MoneyDeposited(_)
            | AccountEvent::MoneyWithdrawn(_)
            | AccountEvent::SourceDebited(_)
            | AccountEvent::DestinationCredited(_)
            | AccountEvent::MoneyReturned(_) => {
                self.balance += event.balance_delta();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.decide(command).map(|event| vec![event])
    }
}

// Method-style operations: decide one event, apply it, return it. State is
// untouched on error. These stamp `Utc::now()`; the command path carries its
// own `occurred_at`.
impl Account {
    pub fn create(&mut self, overdraft_limit: i64) -> DomainResult<AccountEvent> {
        self.run(AccountCommand::CreateAccount(CreateAccount {
            account_id: self.id,
            overdraft_limit,
            occurred_at: Utc::now(),
        }))
    }

    pub fn deposit(&mut self, amount: i64) -> DomainResult<AccountEvent> {
        self.run(AccountCommand::DepositMoney(DepositMoney {
            account_id: self.id,
            amount,
            occurred_at: Utc::now(),
        }))
    }

    pub fn withdraw(&mut self, amount: i64) -> DomainResult<AccountEvent> {
        self.run(AccountCommand::WithdrawMoney(WithdrawMoney {
            account_id: self.id,
            amount,
            occurred_at: Utc::now(),
        }))
    }

    pub fn debit(&mut self, amount: i64, transfer_id: TransferId) -> DomainResult<AccountEvent> {
        self.run(AccountCommand::DebitSourceAccount(DebitSourceAccount {
            account_id: self.id,
            transfer_id,
            amount,
            occurred_at: Utc::now(),
        }))
    }

    pub fn credit(&mut self, amount: i64, transfer_id: TransferId) -> DomainResult<AccountEvent> {
        self.run(AccountCommand::CreditDestinationAccount(CreditDestinationAccount {
            account_id: self.id,
            transfer_id,
            amount,
            occurred_at: Utc::now(),
        }))
    }

    pub fn return_money(&mut self, amount: i64) -> DomainResult<AccountEvent> {
        self.run(AccountCommand::ReturnMoneyOfFailedTransfer(
            ReturnMoneyOfFailedTransfer {
                account_id: self.id,
                amount,
                occurred_at: Utc::now(),
            },
        ))
    }

    fn run(&mut self, command: AccountCommand) -> DomainResult<AccountEvent> {
        let event = self.decide(&command)?;
        self.apply(&event);
        Ok(event)
    }
}

impl Account {
    fn decide(&self, command: &AccountCommand) -> DomainResult<AccountEvent> {
        match command {
            AccountCommand::CreateAccount(cmd) => self.decide_create(cmd),
            AccountCommand::DepositMoney(cmd) => {
                self.ensure_exists(cmd.account_id)?;
                self.ensure_can_receive(cmd.amount)?;
                Ok(AccountEvent::MoneyDeposited(MoneyDeposited {
                    account_id: self.id,
                    amount: cmd.amount,
                    occurred_at: cmd.occurred_at,
                }))
            }
            AccountCommand::WithdrawMoney(cmd) => {
                self.ensure_exists(cmd.account_id)?;
                self.ensure_can_cover(cmd.amount)?;
                Ok(AccountEvent::MoneyWithdrawn(MoneyWithdrawn {
                    account_id: self.id,
                    amount: cmd.amount,
                    occurred_at: cmd.occurred_at,
                }))
            }
            AccountCommand::DebitSourceAccount(cmd) => {
                self.ensure_exists(cmd.account_id)?;
                self.ensure_can_cover(cmd.amount)?;
                Ok(AccountEvent::SourceDebited(SourceDebited {
                    account_id: self.id,
                    transfer_id: cmd.transfer_id,
                    amount: cmd.amount,
                    occurred_at: cmd.occurred_at,
                }))
            }
            AccountCommand::CreditDestinationAccount(cmd) => {
                self.ensure_exists(cmd.account_id)?;
                self.ensure_can_receive(cmd.amount)?;
                Ok(AccountEvent::DestinationCredited(DestinationCredited {
                    account_id: self.id,
                    transfer_id: cmd.transfer_id,
                    amount: cmd.amount,
                    occurred_at: cmd.occurred_at,
                }))
            }
            AccountCommand::ReturnMoneyOfFailedTransfer(cmd) => {
                self.ensure_exists(cmd.account_id)?;
                self.ensure_can_receive(cmd.amount)?;
                Ok(AccountEvent::MoneyReturned(MoneyReturned {
                    account_id: self.id,
                    amount: cmd.amount,
                    occurred_at: cmd.occurred_at,
                }))
            }
        }
    }

    fn decide_create(&self, cmd: &CreateAccount) -> DomainResult<AccountEvent> {
        if self.created || self.version > 0 {
            return Err(DomainError::conflict("account already exists"));
        }
        self.ensure_account_id(cmd.account_id)?;
        if cmd.overdraft_limit < 0 {
            return Err(DomainError::invalid_argument(
                "overdraft limit cannot be negative",
            ));
        }
        Ok(AccountEvent::Created(AccountCreated {
            account_id: cmd.account_id,
            overdraft_limit: cmd.overdraft_limit,
            occurred_at: cmd.occurred_at,
        }))
    }

    fn ensure_exists(&self, account_id: AccountId) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_account_id(account_id)
    }

    fn ensure_account_id(&self, account_id: AccountId) -> DomainResult<()> {
        if self.id != account_id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        Ok(())
    }

    fn ensure_positive(amount: i64) -> DomainResult<()> {
        if amount <= 0 {
            return Err(DomainError::invalid_argument("amount must be positive"));
        }
        Ok(())
    }

    fn ensure_can_receive(&self, amount: i64) -> DomainResult<()> {
        Self::ensure_positive(amount)?;
        if self.balance.checked_add(amount).is_none() {
            return Err(DomainError::invalid_argument("balance would overflow"));
        }
        Ok(())
    }

    fn ensure_can_cover(&self, amount: i64) -> DomainResult<()> {
        Self::ensure_positive(amount)?;
        let remaining = self.balance as i128 - amount as i128;
        if remaining < -(self.overdraft_limit as i128) {
            return Err(DomainError::InsufficientFunds {
                requested: amount,
                balance: self.balance,
                overdraft_limit: self.overdraft_limit,
            });
        }
        Ok(())
    }
}
