//! Batch job scheduling and execution.
//!
//! Jobs are declared in [`JOB_TABLE`], filtered per environment by
//! [`ScheduleRegistry`], and driven by a [`SchedulerLoop`]. Each invocation
//! runs through the [`JobExecutor`], which applies the unit of work, the
//! deadline and panic recovery.

mod cadence;
mod context;
mod executor;
mod handle;
mod job;
pub mod jobs;
mod registry;
mod scheduler;
mod unit_of_work;

pub use cadence::{Cadence, CadenceParseError};
pub use context::JobContext;
pub use executor::JobExecutor;
pub use handle::{JobInfo, SchedulerError, SchedulerHandle};
pub use job::{
    DirectJob, JobError, JobHandler, JobOutcome, JobRun, TransactionalJob, TriggerSource,
};
pub use registry::{
    JobDefinition, JobOverride, RegisteredJob, RegistryError, ScheduleRegistry, JOB_TABLE,
};
pub use scheduler::{create_scheduler, DispatchedRun, ScheduledJob, SchedulerLoop};
pub use unit_of_work::{run_direct, run_in_transaction};
