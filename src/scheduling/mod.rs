//! Time-based recurring jobs
//!
//! `evaluator::should_run` is a pure function of policy, state and the current
//! time; `ScheduledInvoker` runs a handler and records the invocation;
//! `SchedulerEngine` drives one tick loop per scheduled binding.

pub mod clock;
pub mod engine;
pub mod evaluator;
pub mod invoker;
pub mod state;

pub use clock::{Clock, FrozenClock, SystemClock, Timestamp};
pub use engine::{ScheduleEntry, SchedulerEngine};
pub use evaluator::should_run;
pub use invoker::ScheduledInvoker;
pub use state::ScheduleState;
