//! Demo: wires the in-memory stack, runs one transfer that succeeds and one
//! whose destination does not exist, and logs everything seen on the bus.

mod coordinator;

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;

use moneyflow_accounts::{AccountCommand, AccountId, CreateAccount, DepositMoney};
use moneyflow_core::{AggregateId, AggregateRoot};
use moneyflow_infra::{Config, InMemoryStack, Repository};

use crate::coordinator::TransferCoordinator;

fn open_account(stack: &InMemoryStack, deposit: i64) -> anyhow::Result<AccountId> {
    let id = AccountId::new(AggregateId::new());
    stack
        .handle(AccountCommand::CreateAccount(CreateAccount {
            account_id: id,
            overdraft_limit: 0,
            occurred_at: Utc::now(),
        }))
        .with_context(|| format!("failed to create account {id}"))?;
    stack
        .handle(AccountCommand::DepositMoney(DepositMoney {
            account_id: id,
            amount: deposit,
            occurred_at: Utc::now(),
        }))
        .with_context(|| format!("failed to fund account {id}"))?;
    Ok(id)
}

fn main() -> anyhow::Result<()> {
    let log_format = moneyflow_observability::init()?;
    let config = Config::from_env()?;
    tracing::info!(?log_format, ?config, "starting moneyflow demo");

    let stack = InMemoryStack::new(&config);
    let subscription = stack.subscribe();
    let mut coordinator = TransferCoordinator::new();

    let alice = open_account(&stack, 100)?;
    let bob = open_account(&stack, 0)?;
    let nobody = AccountId::new(AggregateId::new());

    coordinator.start(&stack, alice, bob, 40)?;
    coordinator.start(&stack, alice, nobody, 25)?;

    // Compensations publish further events, so keep going until the bus is quiet.
    while let Ok(envelope) = subscription.recv_timeout(Duration::from_millis(100)) {
        tracing::info!(
            event_type = envelope.event_type(),
            aggregate_id = ?envelope.aggregate_id(),
            sequence_number = ?envelope.sequence_number(),
            payload = %envelope.payload(),
            "event observed"
        );
        coordinator.observe(&stack, &envelope)?;
    }

    let repository = stack.handler.repository();
    for (name, id) in [("alice", alice), ("bob", bob)] {
        let account = repository.load(id)?;
        tracing::info!(
            account = name,
            account_id = %id,
            balance = account.balance(),
            version = account.version(),
            "final balance"
        );
    }
    tracing::info!(unresolved_transfers = coordinator.pending(), "demo finished");

    Ok(())
}
