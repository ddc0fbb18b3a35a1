//! Infrastructure layer: event store, repository, command handling, config.
//!
//! Everything here is synchronous and in-process. Storage and the bus are
//! reached only through the `EventStore` and `EventBus` traits.

pub mod command_handler;
pub mod config;
pub mod event_store;
pub mod repository;
pub mod stack;

pub use command_handler::{AccountCommandHandler, CommandError, CommandOutcome, transfer_legs};
pub use config::{Config, ConfigError};
pub use event_store::{
    EventStore, EventStoreError, InMemoryEventStore, PublishingEventStore, StoredEvent,
    UncommittedEvent,
};
pub use repository::{Committed, EventSourcedRepository, Repository, RepositoryError};
pub use stack::InMemoryStack;
