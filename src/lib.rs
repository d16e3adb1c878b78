//! Site Limiter Library
//!
//! This library provides the core functionality for the site limiter CLI.
//! It includes:
//! - URL matcher resolving navigations to configured site patterns
//! - Bypass and content policy (learning mode, whitelists, educational
//!   keyword heuristic)
//! - Per-tab timer lifecycle management with scheduled expiry alarms
//! - Cooldown management with lazily-expired block windows
//! - Typed key-value storage split into sync and session scopes
//! - IPC server/client for daemon-CLI communication

pub mod cli;
pub mod cooldown;
pub mod daemon;
pub mod matcher;
pub mod policy;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    ActiveTimer, ActiveTimerView, BlockedSite, BlockedSites, CooldownSettings, IpcRequest,
    IpcResponse, LearningMode, ResponseData, SiteConfigs, TabId,
};

// Re-export the coordinator building blocks
pub use cooldown::CooldownManager;
pub use daemon::{Coordinator, ShellCommand, TimerManager, TimerStatus};

// Re-export storage and scheduling seams (mock implementations included)
pub use scheduler::{AlarmScheduler, MockAlarmScheduler, TokioAlarmScheduler};
pub use storage::{JsonFileStorage, MemoryStorage, Repository, StorageArea, StorageError};
