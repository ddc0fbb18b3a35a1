//! Account command handling (application-level orchestration).
//!
//! ```text
//! AccountCommand
//!   ↓ match (closed set)
//! CreateAccount            → repository.new_instance
//! Deposit/Withdraw/Return  → repository.load → execute      (not found: error)
//! Debit/Credit (legs)      → repository.load → execute      (not found: publish
//!                                                             standalone event)
//! ```
//!
//! The handler keeps no transfer state and never retries. Concurrency retries
//! belong to the repository.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use moneyflow_accounts::{
    Account, AccountCommand, AccountId, CreditDestinationAccount, DebitSourceAccount,
    TransferLegEvent,
};
use moneyflow_core::{AggregateId, DomainError, TransferId};
use moneyflow_events::{Event, EventBus, EventEnvelope};

use crate::event_store::{EventStoreError, StoredEvent};
use crate::repository::{Repository, RepositoryError};

/// Caller-facing error of a handled command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "insufficient funds: requested {requested}, balance {balance}, overdraft limit {overdraft_limit}"
    )]
    InsufficientFunds {
        requested: i64,
        balance: i64,
        overdraft_limit: i64,
    },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The aggregate exists in the store but has no creation event.
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    #[error("aggregate already exists: {0}")]
    AlreadyExists(AggregateId),

    /// Optimistic concurrency retries were exhausted.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Stored history could not be turned back into an aggregate.
    #[error("corrupt history: {0}")]
    CorruptHistory(String),

    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// A standalone failure event could not be published.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument(msg) => CommandError::InvalidArgument(msg),
            DomainError::InsufficientFunds {
                requested,
                balance,
                overdraft_limit,
            } => CommandError::InsufficientFunds {
                requested,
                balance,
                overdraft_limit,
            },
            DomainError::InvalidId(msg) => CommandError::InvalidId(msg),
            DomainError::InvariantViolation(msg) => CommandError::InvariantViolation(msg),
            DomainError::NotFound => CommandError::NotFound,
            DomainError::Conflict(msg) => CommandError::Conflict(msg),
        }
    }
}

impl From<RepositoryError> for CommandError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::AggregateNotFound(id) => CommandError::AggregateNotFound(id),
            RepositoryError::AlreadyExists(id) => CommandError::AlreadyExists(id),
            RepositoryError::Concurrency(msg) => CommandError::Concurrency(msg),
            RepositoryError::CorruptStream(msg) | RepositoryError::Deserialize(msg) => {
                CommandError::CorruptHistory(msg)
            }
            RepositoryError::Store(EventStoreError::Publish(msg)) => CommandError::Publish(msg),
            RepositoryError::Store(err) => CommandError::Store(err),
            RepositoryError::Domain(err) => err.into(),
        }
    }
}

/// What a successfully handled command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Events appended to the target account's stream (exactly one per command).
    Committed(Vec<StoredEvent>),
    /// A transfer leg found no account; this standalone event was published
    /// and nothing was persisted.
    Reported(TransferLegEvent),
}

impl CommandOutcome {
    pub fn committed(&self) -> &[StoredEvent] {
        match self {
            CommandOutcome::Committed(events) => events,
            CommandOutcome::Reported(_) => &[],
        }
    }

    pub fn reported(&self) -> Option<&TransferLegEvent> {
        match self {
            CommandOutcome::Committed(_) => None,
            CommandOutcome::Reported(event) => Some(event),
        }
    }
}

/// Routes account commands to the account aggregate.
///
/// `R` persists and rehydrates accounts; `B` receives the standalone
/// transfer-leg failure events that have no stream to live in.
pub struct AccountCommandHandler<R, B> {
    repository: R,
    bus: B,
}

impl<R, B> AccountCommandHandler<R, B> {
    pub fn new(repository: R, bus: B) -> Self {
        Self { repository, bus }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<R, B> AccountCommandHandler<R, B>
where
    R: Repository<Account>,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn handle(&self, command: AccountCommand) -> Result<CommandOutcome, CommandError> {
        let account_id = command.account_id();
        let span = tracing::debug_span!(
            "account_command",
            command = command.name(),
            account_id = %account_id
        );
        let _entered = span.enter();

        let result = match &command {
            AccountCommand::CreateAccount(_) => self
                .repository
                .new_instance(account_id, &command)
                .map(|committed| CommandOutcome::Committed(committed.events))
                .map_err(CommandError::from),
            AccountCommand::DepositMoney(_)
            | AccountCommand::WithdrawMoney(_)
            | AccountCommand::ReturnMoneyOfFailedTransfer(_) => self.load_and_execute(&command),
            AccountCommand::DebitSourceAccount(cmd) => self.execute_leg(&command, || {
                TransferLegEvent::source_not_found(cmd.transfer_id, cmd.occurred_at)
            }),
            AccountCommand::CreditDestinationAccount(cmd) => self.execute_leg(&command, || {
                TransferLegEvent::destination_not_found(cmd.transfer_id, cmd.occurred_at)
            }),
        };

        match &result {
            Ok(CommandOutcome::Committed(events)) => {
                tracing::info!(
                    command = command.name(),
                    account_id = %account_id,
                    version = events.last().map(|e| e.sequence_number).unwrap_or_default(),
                    "command committed"
                );
            }
            Ok(CommandOutcome::Reported(_)) => {}
            Err(err) => {
                tracing::debug!(command = command.name(), error = %err, "command rejected");
            }
        }

        result
    }

    fn load_and_execute(&self, command: &AccountCommand) -> Result<CommandOutcome, CommandError> {
        let mut account = self.repository.load(command.account_id())?;
        let events = self.repository.execute(&mut account, command)?;
        Ok(CommandOutcome::Committed(events))
    }

    /// Transfer legs: a missing account is reported on the bus, not returned
    /// as an error. Every other failure surfaces.
    fn execute_leg(
        &self,
        command: &AccountCommand,
        not_found: impl FnOnce() -> TransferLegEvent,
    ) -> Result<CommandOutcome, CommandError> {
        let mut account = match self.repository.load(command.account_id()) {
            Ok(account) => account,
            Err(RepositoryError::AggregateNotFound(id)) => {
                let event = not_found();
                self.report(id, &event)?;
                return Ok(CommandOutcome::Reported(event));
            }
            Err(err) => return Err(err.into()),
        };

        let events = self.repository.execute(&mut account, command)?;
        Ok(CommandOutcome::Committed(events))
    }

    fn report(&self, missing: AggregateId, event: &TransferLegEvent) -> Result<(), CommandError> {
        let envelope = EventEnvelope::standalone(event).map_err(|e| {
            CommandError::Publish(format!("failed to encode {}: {e}", event.event_type()))
        })?;

        self.bus
            .publish(envelope)
            .map_err(|e| CommandError::Publish(format!("{e:?}")))?;

        tracing::warn!(
            missing_account_id = %missing,
            transfer_id = %event.transfer_id(),
            event_type = event.event_type(),
            "transfer leg targets unknown account; failure event published"
        );
        Ok(())
    }
}

/// Convenience for building transfer-leg commands with a shared transfer id.
pub fn transfer_legs(
    source: AccountId,
    destination: AccountId,
    amount: i64,
    transfer_id: TransferId,
    occurred_at: DateTime<Utc>,
) -> (AccountCommand, AccountCommand) {
    (
        AccountCommand::DebitSourceAccount(DebitSourceAccount {
            account_id: source,
            transfer_id,
            amount,
            occurred_at,
        }),
        AccountCommand::CreditDestinationAccount(CreditDestinationAccount {
            account_id: destination,
            transfer_id,
            amount,
            occurred_at,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_kind() {
        let err: CommandError = DomainError::InsufficientFunds {
            requested: 50,
            balance: 0,
            overdraft_limit: 0,
        }
        .into();
        assert!(matches!(err, CommandError::InsufficientFunds { requested: 50, .. }));

        let err: CommandError = RepositoryError::Domain(DomainError::NotFound).into();
        assert!(matches!(err, CommandError::NotFound));
    }

    #[test]
    fn publish_failures_after_append_are_publish_errors() {
        let err: CommandError =
            RepositoryError::Store(EventStoreError::Publish("bus down".to_string())).into();
        assert!(matches!(err, CommandError::Publish(msg) if msg == "bus down"));
    }

    #[test]
    fn outcome_accessors() {
        let reported = CommandOutcome::Reported(TransferLegEvent::source_not_found(
            TransferId::new(),
            Utc::now(),
        ));
        assert!(reported.committed().is_empty());
        assert!(reported.reported().is_some());
        assert!(CommandOutcome::Committed(vec![]).reported().is_none());
    }
}
