pub mod policy;
pub mod probe;
pub mod scheduler;

pub use policy::LivenessPolicy;
pub use probe::{ChannelProber, ProbeError, ProbeOutcome, StreamProbe};
pub use scheduler::{HealthScheduler, SchedulerError, SchedulerHandle, SweepSummary};
