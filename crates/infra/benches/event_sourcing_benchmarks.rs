use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};

use chrono::Utc;
use moneyflow_accounts::{
    Account, AccountCommand, AccountEvent, AccountId, CreateAccount, DepositMoney, MoneyDeposited,
    ACCOUNT_AGGREGATE_TYPE,
};
use moneyflow_core::{AggregateId, ExpectedVersion, TransferId};
use moneyflow_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use moneyflow_infra::{Config, InMemoryStack, Repository, transfer_legs};

fn create(id: AccountId) -> AccountCommand {
    AccountCommand::CreateAccount(CreateAccount {
        account_id: id,
        overdraft_limit: 0,
        occurred_at: Utc::now(),
    })
}

fn deposit(id: AccountId, amount: i64) -> AccountCommand {
    AccountCommand::DepositMoney(DepositMoney {
        account_id: id,
        amount,
        occurred_at: Utc::now(),
    })
}

fn deposited(id: AccountId, amount: i64) -> UncommittedEvent {
    let event = AccountEvent::MoneyDeposited(MoneyDeposited {
        account_id: id,
        amount,
        occurred_at: Utc::now(),
    });
    UncommittedEvent::from_typed(id.0, ACCOUNT_AGGREGATE_TYPE, uuid::Uuid::now_v7(), &event)
        .unwrap()
}

/// Stack holding one account with `event_count` events in its stream.
fn account_with_history(event_count: usize) -> (InMemoryStack, AccountId) {
    let stack = InMemoryStack::new(&Config::default());
    let id = AccountId::new(AggregateId::new());
    stack.handle(create(id)).unwrap();

    let history: Vec<UncommittedEvent> = (1..event_count).map(|_| deposited(id, 1)).collect();
    stack
        .store
        .append(history, ExpectedVersion::Exact(1))
        .unwrap();
    (stack, id)
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    // No history: a fresh stream per iteration.
    group.bench_function("create_account_fresh", |b| {
        let stack = InMemoryStack::new(&Config::default());
        b.iter(|| {
            let id = AccountId::new(AggregateId::new());
            stack.handle(black_box(create(id))).unwrap();
        });
    });

    // Fresh stack per input so every sample replays the same history length.
    group.bench_function("deposit_with_history", |b| {
        b.iter_batched(
            || account_with_history(100),
            // Returning the stack keeps its teardown out of the measurement.
            |(stack, id)| {
                let outcome = stack.handle(deposit(id, black_box(5))).unwrap();
                (stack, outcome)
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("transfer_to_missing_destination", |b| {
        let stack = InMemoryStack::new(&Config::default());
        let source = AccountId::new(AggregateId::new());
        stack.handle(create(source)).unwrap();
        stack.handle(deposit(source, 1_000_000_000)).unwrap();
        let missing = AccountId::new(AggregateId::new());

        b.iter(|| {
            let (_, credit) = transfer_legs(source, missing, 1, TransferId::new(), Utc::now());
            black_box(stack.handle(credit).unwrap());
        });
    });

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let id = AccountId::new(AggregateId::new());

                b.iter(|| {
                    let events: Vec<UncommittedEvent> =
                        (0..size).map(|i| deposited(id, i as i64 + 1)).collect();
                    black_box(store.append(events, ExpectedVersion::Any).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_account_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("account_replay");

    for event_count in [10, 100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*event_count as u64));
        group.bench_with_input(
            BenchmarkId::new("load", event_count),
            event_count,
            |b, &count| {
                let (stack, id) = account_with_history(count);

                b.iter(|| {
                    let account: Account = stack.handler.repository().load(id).unwrap();
                    black_box(account.balance());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_account_replay
);
criterion_main!(benches);
