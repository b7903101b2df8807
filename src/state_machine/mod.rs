mod job;
mod state;

#[cfg(test)]
pub(crate) use job::test_keys;
pub use job::{Job, JobKeys, JobStatus, ParseStatusError, RepliconTableType, sanitize_name};
pub use state::{JobChange, StateMachine, Transition};
