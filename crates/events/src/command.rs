use moneyflow_core::AggregateId;

/// A command targets exactly one aggregate.
///
/// Commands are transient intent; the events they produce are what gets
/// persisted. The target id is what routes a command to its stream and what
/// scopes the optimistic concurrency check, so one command never spans two
/// aggregates.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
