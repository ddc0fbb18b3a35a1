//! Ad hoc transfer coordinator for the demo.
//!
//! Runs the two legs of a transfer and watches the bus. When the credit leg
//! reports `DestinationAccountNotFound`, the debited amount is returned to the
//! source.

use std::collections::HashMap;

use anyhow::Context;
use chrono::Utc;
use serde_json::Value as JsonValue;

use moneyflow_accounts::{
    AccountCommand, AccountEvent, AccountId, ReturnMoneyOfFailedTransfer, TransferLegEvent,
};
use moneyflow_core::TransferId;
use moneyflow_events::EventEnvelope;
use moneyflow_infra::{CommandError, CommandOutcome, InMemoryStack, transfer_legs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTransfer {
    source: AccountId,
    amount: i64,
}

#[derive(Debug, Default)]
pub struct TransferCoordinator {
    pending: HashMap<TransferId, PendingTransfer>,
}

impl TransferCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transfers whose outcome has not been observed yet.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Debit the source, then credit the destination.
    ///
    /// A missing source stops the transfer before anything is debited.
    pub fn start(
        &mut self,
        stack: &InMemoryStack,
        source: AccountId,
        destination: AccountId,
        amount: i64,
    ) -> anyhow::Result<TransferId> {
        let transfer_id = TransferId::new();
        let (debit, credit) = transfer_legs(source, destination, amount, transfer_id, Utc::now());

        tracing::info!(%transfer_id, %source, %destination, amount, "transfer started");

        if let CommandOutcome::Reported(_) = stack.handle(debit).context("debit leg failed")? {
            return Ok(transfer_id);
        }

        let pending = PendingTransfer { source, amount };
        self.pending.insert(transfer_id, pending);

        match stack.handle(credit) {
            Ok(_) => Ok(transfer_id),
            Err(err) => {
                self.pending.remove(&transfer_id);
                // A publish failure may come after the credit was stored, so
                // returning the money could pay it out twice.
                if !matches!(err, CommandError::Publish(_)) {
                    tracing::warn!(
                        %transfer_id,
                        error = %err,
                        "credit leg failed; returning money to source"
                    );
                    Self::compensate(stack, pending)?;
                }
                Err(anyhow::Error::new(err).context("credit leg failed"))
            }
        }
    }

    /// React to one observed envelope. Returns the compensation outcome if one
    /// was issued.
    pub fn observe(
        &mut self,
        stack: &InMemoryStack,
        envelope: &EventEnvelope<JsonValue>,
    ) -> anyhow::Result<Option<CommandOutcome>> {
        if envelope.is_standalone() {
            let event: TransferLegEvent = envelope
                .decode()
                .with_context(|| format!("undecodable {}", envelope.event_type()))?;

            return match event {
                TransferLegEvent::DestinationAccountNotFound(e) => {
                    let Some(pending) = self.pending.remove(&e.transfer_id) else {
                        return Ok(None);
                    };
                    tracing::warn!(
                        transfer_id = %e.transfer_id,
                        source = %pending.source,
                        amount = pending.amount,
                        "destination missing; returning money to source"
                    );
                    Self::compensate(stack, pending).map(Some)
                }
                TransferLegEvent::SourceAccountNotFound(_) => Ok(None),
            };
        }

        let event: AccountEvent = envelope
            .decode()
            .with_context(|| format!("undecodable {}", envelope.event_type()))?;
        if let AccountEvent::DestinationCredited(e) = event {
            self.pending.remove(&e.transfer_id);
        }
        Ok(None)
    }

    fn compensate(
        stack: &InMemoryStack,
        pending: PendingTransfer,
    ) -> anyhow::Result<CommandOutcome> {
        stack
            .handle(AccountCommand::ReturnMoneyOfFailedTransfer(
                ReturnMoneyOfFailedTransfer {
                    account_id: pending.source,
                    amount: pending.amount,
                    occurred_at: Utc::now(),
                },
            ))
            .context("compensation failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moneyflow_accounts::{CreateAccount, DepositMoney};
    use moneyflow_core::{AggregateId, AggregateRoot};
    use moneyflow_events::Subscription;
    use moneyflow_infra::Repository;

    fn open(stack: &InMemoryStack, balance: i64) -> AccountId {
        let id = AccountId::new(AggregateId::new());
        stack
            .handle(AccountCommand::CreateAccount(CreateAccount {
                account_id: id,
                overdraft_limit: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        if balance > 0 {
            stack
                .handle(AccountCommand::DepositMoney(DepositMoney {
                    account_id: id,
                    amount: balance,
                    occurred_at: Utc::now(),
                }))
                .unwrap();
        }
        id
    }

    fn drain(
        coordinator: &mut TransferCoordinator,
        stack: &InMemoryStack,
        sub: &Subscription<EventEnvelope<JsonValue>>,
    ) -> usize {
        let mut compensations = 0;
        for envelope in sub.drain() {
            if coordinator.observe(stack, &envelope).unwrap().is_some() {
                compensations += 1;
            }
        }
        compensations
    }

    #[test]
    fn successful_transfer_needs_no_compensation() {
        let stack = InMemoryStack::default();
        let source = open(&stack, 100);
        let destination = open(&stack, 0);
        let sub = stack.subscribe();
        let mut coordinator = TransferCoordinator::new();

        coordinator.start(&stack, source, destination, 30).unwrap();

        assert_eq!(drain(&mut coordinator, &stack, &sub), 0);
        assert_eq!(coordinator.pending(), 0);
        let repo = stack.handler.repository();
        assert_eq!(repo.load(source).unwrap().balance(), 70);
        assert_eq!(repo.load(destination).unwrap().balance(), 30);
    }

    #[test]
    fn missing_destination_is_compensated() {
        let stack = InMemoryStack::default();
        let source = open(&stack, 100);
        let sub = stack.subscribe();
        let mut coordinator = TransferCoordinator::new();

        coordinator
            .start(&stack, source, AccountId::new(AggregateId::new()), 40)
            .unwrap();

        assert_eq!(drain(&mut coordinator, &stack, &sub), 1);
        assert_eq!(coordinator.pending(), 0);

        let account = stack.handler.repository().load(source).unwrap();
        assert_eq!(account.balance(), 100);
        // created, deposited, debited, returned
        assert_eq!(account.version(), 4);
    }

    #[test]
    fn missing_source_debits_nothing() {
        let stack = InMemoryStack::default();
        let destination = open(&stack, 0);
        let sub = stack.subscribe();
        let mut coordinator = TransferCoordinator::new();

        coordinator
            .start(&stack, AccountId::new(AggregateId::new()), destination, 40)
            .unwrap();

        assert_eq!(drain(&mut coordinator, &stack, &sub), 0);
        assert_eq!(coordinator.pending(), 0);
        assert_eq!(stack.handler.repository().load(destination).unwrap().balance(), 0);
    }

    #[test]
    fn rejected_credit_is_compensated_and_cleared() {
        let stack = InMemoryStack::default();
        let source = open(&stack, 100);
        let destination = open(&stack, i64::MAX - 10);
        let sub = stack.subscribe();
        let mut coordinator = TransferCoordinator::new();

        let err = coordinator
            .start(&stack, source, destination, 40)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::InvalidArgument(_))
        ));
        assert_eq!(coordinator.pending(), 0);
        assert_eq!(drain(&mut coordinator, &stack, &sub), 0);

        let repo = stack.handler.repository();
        assert_eq!(repo.load(source).unwrap().balance(), 100);
        assert_eq!(repo.load(destination).unwrap().balance(), i64::MAX - 10);
    }
}
