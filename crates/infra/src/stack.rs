//! In-memory wiring of the command side: store, bus, repository and handler.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use moneyflow_accounts::{Account, AccountCommand};
use moneyflow_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};

use crate::command_handler::{AccountCommandHandler, CommandError, CommandOutcome};
use crate::config::Config;
use crate::event_store::{InMemoryEventStore, PublishingEventStore};
use crate::repository::EventSourcedRepository;

pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

pub type AccountRepository =
    EventSourcedRepository<Account, PublishingEventStore<Arc<InMemoryEventStore>, SharedBus>>;

pub type InMemoryAccountHandler = AccountCommandHandler<AccountRepository, SharedBus>;

/// Everything needed to run account commands in one process.
///
/// Committed account events and standalone transfer-leg events go to the
/// same bus.
pub struct InMemoryStack {
    pub handler: InMemoryAccountHandler,
    pub store: Arc<InMemoryEventStore>,
    pub bus: SharedBus,
}

impl InMemoryStack {
    pub fn new(config: &Config) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());

        let repository = EventSourcedRepository::new(
            PublishingEventStore::new(store.clone(), bus.clone()),
            config.account_aggregate_type.clone(),
            Account::empty,
        )
        .with_max_conflict_retries(config.max_conflict_retries);

        tracing::debug!(
            aggregate_type = %config.account_aggregate_type,
            max_conflict_retries = config.max_conflict_retries,
            "in-memory account stack ready"
        );

        Self {
            handler: AccountCommandHandler::new(repository, bus.clone()),
            store,
            bus,
        }
    }

    pub fn handle(&self, command: AccountCommand) -> Result<CommandOutcome, CommandError> {
        self.handler.handle(command)
    }

    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.bus.subscribe()
    }
}

impl Default for InMemoryStack {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}
