pub mod config;
pub mod error;
pub mod health;
pub mod playlist;
pub mod registry;
pub mod sqlite;

pub use config::{
    load_canaltv_config, CanaltvConfig, MonitorSection, PathsSection, ProbeSection,
    RegistrySection, SystemSection,
};
pub use error::{ConfigError, Result};
pub use health::{
    ChannelProber, HealthScheduler, LivenessPolicy, ProbeError, ProbeOutcome, SchedulerError,
    SchedulerHandle, StreamProbe, SweepSummary,
};
pub use playlist::{load_m3u, parse_m3u, PlaylistError};
pub use registry::{
    ChannelFilter, ChannelHealth, ChannelRecord, ChannelRegistry, ChannelRegistryBuilder,
    NewChannel, RegistryError, RegistrySummary,
};
