//! Timer lifecycle management.
//!
//! This module owns per-tab countdown state:
//! - NoTimer -> Running on a monitored, non-bypassed navigation
//! - Running -> Cancelled on close, re-navigation, or preemption
//! - Running -> Expired when the scheduled alarm fires
//!
//! Terminal states converge back to NoTimer by deleting the stored record
//! and releasing the alarm. Every state change pushes the running-timer
//! count to the shell as a badge update.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::scheduler::AlarmScheduler;
use crate::storage::{Repository, StorageError};
use crate::types::{now_ms, ActiveTimer, TabId};

// ============================================================================
// Constants
// ============================================================================

/// Prefix for per-tab alarm names.
const ALARM_PREFIX: &str = "close_tab_";

/// Builds the alarm name for a tab.
pub fn alarm_name(tab_id: TabId) -> String {
    format!("{ALARM_PREFIX}{tab_id}")
}

/// Recovers the tab id from an alarm name.
pub fn tab_id_from_alarm(name: &str) -> Option<TabId> {
    name.strip_prefix(ALARM_PREFIX)?.parse().ok()
}

// ============================================================================
// ShellCommand
// ============================================================================

/// Commands the coordinator asks the surrounding shell to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Navigate a tab to the blocking view.
    RedirectTab {
        /// Target tab
        tab_id: TabId,
        /// Blocking view URL carrying the original URL and a timestamp
        url: String,
    },
    /// Update the badge counter with the number of running timers.
    SetBadge {
        /// Running timer count
        count: usize,
    },
}

// ============================================================================
// TimerStatus
// ============================================================================

/// Explicit per-tab timer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerStatus {
    /// No timer recorded for the tab.
    NoTimer,
    /// A countdown is running.
    Running(ActiveTimer),
}

impl TimerStatus {
    /// Returns true if a countdown is running.
    pub fn is_running(&self) -> bool {
        matches!(self, TimerStatus::Running(_))
    }
}

// ============================================================================
// TimerManager
// ============================================================================

/// Manages per-tab countdowns: storage records, scheduled alarms, and the
/// badge counter.
pub struct TimerManager {
    repo: Repository,
    scheduler: Arc<dyn AlarmScheduler>,
    shell_tx: mpsc::UnboundedSender<ShellCommand>,
}

impl TimerManager {
    /// Creates a manager over the given repository and scheduler.
    pub fn new(
        repo: Repository,
        scheduler: Arc<dyn AlarmScheduler>,
        shell_tx: mpsc::UnboundedSender<ShellCommand>,
    ) -> Self {
        Self {
            repo,
            scheduler,
            shell_tx,
        }
    }

    /// Starts a countdown for `tab_id` on `site`.
    ///
    /// Any existing timer for the tab is cancelled first, so exactly one
    /// timer exists per tab at any time.
    pub fn start(&self, tab_id: TabId, site: &str, minutes: u32) -> Result<(), StorageError> {
        self.clear(tab_id)?;

        let name = alarm_name(tab_id);
        self.scheduler
            .schedule(&name, Duration::from_secs(u64::from(minutes) * 60));

        let mut timers = self.repo.active_timers();
        timers.insert(
            tab_id,
            ActiveTimer {
                site: site.to_string(),
                minutes,
                start_time: now_ms(),
                alarm_name: name,
            },
        );
        self.repo.set_active_timers(&timers)?;

        self.update_badge();
        tracing::info!("started {} minute timer for {} (tab {})", minutes, site, tab_id);
        Ok(())
    }

    /// Cancels the timer for `tab_id`, if any.
    ///
    /// Idempotent: the alarm is cancelled and the record deleted before this
    /// returns, so a replacement timer can be armed immediately after.
    pub fn clear(&self, tab_id: TabId) -> Result<(), StorageError> {
        let mut timers = self.repo.active_timers();
        if let Some(timer) = timers.remove(&tab_id) {
            self.scheduler.cancel(&timer.alarm_name);
            self.repo.set_active_timers(&timers)?;
            self.update_badge();
        }
        Ok(())
    }

    /// Takes the timer record for an alarm that just fired.
    ///
    /// The record is deleted (the alarm has already released itself) and the
    /// badge updated; the caller decides whether the expiry was genuine by
    /// re-resolving the tab's current URL.
    pub fn take_expired(&self, tab_id: TabId) -> Result<Option<ActiveTimer>, StorageError> {
        let mut timers = self.repo.active_timers();
        let taken = timers.remove(&tab_id);
        if taken.is_some() {
            self.repo.set_active_timers(&timers)?;
            self.update_badge();
        }
        Ok(taken)
    }

    /// Returns the explicit timer state for `tab_id`.
    pub fn status(&self, tab_id: TabId) -> TimerStatus {
        match self.repo.active_timers().remove(&tab_id) {
            Some(timer) => TimerStatus::Running(timer),
            None => TimerStatus::NoTimer,
        }
    }

    /// Number of tabs currently in the Running state.
    pub fn running_count(&self) -> usize {
        self.repo.active_timers().len()
    }

    /// Pushes the current running-timer count to the shell.
    fn update_badge(&self) {
        let count = self.running_count();
        // The daemon loop may have shut the channel down already.
        let _ = self.shell_tx.send(ShellCommand::SetBadge { count });
    }
}

// ============================================================================
// Tests
// ============================================================================
