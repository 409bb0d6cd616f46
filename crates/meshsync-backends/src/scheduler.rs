//! Capability traits for the workload scheduler.

use std::future::Future;

use crate::error::SchedulerResult;
use crate::instance::{Instance, InstanceEvent};

/// A subscription to the scheduler's live instance-event feed.
pub trait InstanceEventSource: Send {
    /// Wait for the next event.
    ///
    /// `Ok(None)` means the feed ended and the caller should subscribe
    /// again. An `Err` is a transient read failure; the source stays usable.
    fn next(&mut self) -> impl Future<Output = SchedulerResult<Option<InstanceEvent>>> + Send;
}

/// The scheduler's instance registry.
pub trait SchedulerClient: Send + Sync + 'static {
    type Events: InstanceEventSource + 'static;

    /// Open a live instance-event feed.
    fn subscribe(&self) -> impl Future<Output = SchedulerResult<Self::Events>> + Send;

    /// List every instance the scheduler currently knows about.
    fn list_running(&self) -> impl Future<Output = SchedulerResult<Vec<Instance>>> + Send;
}
