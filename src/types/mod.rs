//! Core data types for the site limiter.
//!
//! This module defines the data structures used for:
//! - Site pattern configuration (domain[/path] -> minutes)
//! - Per-tab active timers and their lifecycle metadata
//! - Cooldown settings and the blocked-site records they produce
//! - Whitelists and learning mode
//! - IPC request/response serialization

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers and time
// ============================================================================

/// Browser tab identifier as reported by the navigation observer.
pub type TabId = u32;

/// Site configuration mapping: pattern (`domain` or `domain/path`) -> minutes.
///
/// A `BTreeMap` keeps iteration order deterministic, which the matcher
/// relies on for replayable results.
pub type SiteConfigs = BTreeMap<String, u32>;

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ============================================================================
// Built-in defaults
// ============================================================================

/// Default monitored sites with timer durations (in minutes).
///
/// Merged under any existing user configuration at install time, so new
/// defaults never override user edits.
pub fn default_site_configs() -> SiteConfigs {
    let mut sites = SiteConfigs::new();
    sites.insert("youtube.com/shorts".to_string(), 1);
    sites.insert("youtube.com".to_string(), 5);
    sites.insert("facebook.com".to_string(), 2);
    sites.insert("twitter.com".to_string(), 3);
    sites.insert("instagram.com".to_string(), 2);
    sites.insert("tiktok.com".to_string(), 2);
    sites.insert("reddit.com".to_string(), 10);
    sites
}

/// Default whitelisted channel fragments.
pub fn default_whitelist_channels() -> Vec<String> {
    vec![
        "/c/khanacademy".to_string(),
        "/c/freecodecamp".to_string(),
        "/@crashcourse".to_string(),
    ]
}

// ============================================================================
// ActiveTimer
// ============================================================================

/// A running countdown for a single tab.
///
/// At most one exists per tab; starting a new timer always cancels the
/// previous one first. Active timers do not survive a daemon restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTimer {
    /// The matched site pattern that triggered this timer.
    pub site: String,
    /// Timer duration in minutes.
    pub minutes: u32,
    /// Epoch milliseconds when the timer was started.
    #[serde(rename = "startTime")]
    pub start_time: u64,
    /// Name of the scheduled alarm (`close_tab_<tabId>`).
    #[serde(rename = "alarmName")]
    pub alarm_name: String,
}

impl ActiveTimer {
    /// Epoch milliseconds at which this timer expires.
    pub fn expires_at(&self) -> u64 {
        self.start_time + u64::from(self.minutes) * 60_000
    }

    /// Remaining milliseconds at `now`, clamped to zero.
    pub fn time_remaining(&self, now: u64) -> u64 {
        self.expires_at().saturating_sub(now)
    }
}

/// An active timer enriched with live tab details for status display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTimerView {
    #[serde(flatten)]
    pub timer: ActiveTimer,
    /// Current URL of the tab.
    pub url: String,
    /// Current title of the tab, when the observer reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Remaining milliseconds until expiry.
    #[serde(rename = "timeRemaining")]
    pub time_remaining: u64,
}

// ============================================================================
// CooldownSettings
// ============================================================================

/// Process-wide cooldown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownSettings {
    /// Whether expired timers open a block window at all.
    pub enabled: bool,
    /// Block window duration in minutes (5-480).
    #[serde(rename = "durationMinutes")]
    pub duration_minutes: u32,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_minutes: 60,
        }
    }
}

impl CooldownSettings {
    /// Validates the settings.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.duration_minutes < 5 || self.duration_minutes > 480 {
            return Err("クールダウン時間は5-480分の範囲で指定してください".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// BlockedSite
// ============================================================================

/// A cooldown block window for a single site pattern.
///
/// Created when a timer expires while cooldown is enabled; lazily deleted
/// once `now >= blocked_until` is observed. Survives a daemon restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedSite {
    /// Epoch milliseconds when the block window opened.
    #[serde(rename = "blockedAt")]
    pub blocked_at: u64,
    /// Epoch milliseconds when the block window closes.
    #[serde(rename = "blockedUntil")]
    pub blocked_until: u64,
    /// Cooldown duration in minutes at block time.
    #[serde(rename = "durationMinutes")]
    pub duration_minutes: u32,
}

impl BlockedSite {
    /// Creates a block window opening at `now` for `duration_minutes`.
    pub fn open(now: u64, duration_minutes: u32) -> Self {
        Self {
            blocked_at: now,
            blocked_until: now + u64::from(duration_minutes) * 60_000,
            duration_minutes,
        }
    }

    /// Returns true while the block window is still active at `now`.
    pub fn is_active(&self, now: u64) -> bool {
        now < self.blocked_until
    }
}

/// Blocked-site records keyed by site pattern.
pub type BlockedSites = HashMap<String, BlockedSite>;

/// Active timers keyed by tab id.
pub type ActiveTimers = HashMap<TabId, ActiveTimer>;

// ============================================================================
// LearningMode
// ============================================================================

/// Global bypass switch with its own expiry.
///
/// Logically active only while `enabled && now < enabled_until`; a stale
/// `enabled` flag past its expiry counts as inactive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningMode {
    /// Whether learning mode has been switched on.
    pub enabled: bool,
    /// Epoch milliseconds at which the switch stops applying.
    #[serde(rename = "enabledUntil", default)]
    pub enabled_until: u64,
    /// Session length in minutes used when (re-)enabling.
    #[serde(rename = "durationMinutes")]
    pub duration_minutes: u32,
}

impl Default for LearningMode {
    fn default() -> Self {
        Self {
            enabled: false,
            enabled_until: 0,
            duration_minutes: 60,
        }
    }
}

impl LearningMode {
    /// Returns true if learning mode is logically active at `now`.
    pub fn is_active(&self, now: u64) -> bool {
        self.enabled && now < self.enabled_until
    }

    /// Validates the settings.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.duration_minutes < 1 || self.duration_minutes > 480 {
            return Err("学習モードの時間は1-480分の範囲で指定してください".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validates a per-site timer duration.
///
/// Returns an error message if the value is outside 1-120 minutes.
pub fn validate_site_minutes(minutes: u32) -> Result<(), String> {
    if minutes < 1 || minutes > 120 {
        return Err("タイマー時間は1-120分の範囲で指定してください".to_string());
    }
    Ok(())
}

// ============================================================================
// IPC Types
// ============================================================================

/// IPC request from a client (CLI, popup shell, or navigation observer)
/// to the daemon.
///
/// The `action` tag matches the message format the popup shell speaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum IpcRequest {
    /// Query site configs and live timers
    GetStatus,
    /// Create or update a site configuration
    UpdateSiteConfig { site: String, minutes: u32 },
    /// Remove a site configuration
    RemoveSite { site: String },
    /// Query cooldown settings
    GetCooldownSettings,
    /// Replace cooldown settings
    UpdateCooldownSettings { settings: CooldownSettings },
    /// Query the blocked-site records
    GetBlockedSites,
    /// Query whitelisted channels
    GetWhitelistChannels,
    /// Replace whitelisted channels
    UpdateWhitelistChannels { channels: Vec<String> },
    /// Query whitelisted videos
    GetWhitelistVideos,
    /// Replace whitelisted videos
    UpdateWhitelistVideos { videos: Vec<String> },
    /// Query learning mode settings
    GetLearningMode,
    /// Replace learning mode settings
    UpdateLearningMode { settings: LearningMode },
    /// Whitelist the video the given URL points at
    AddCurrentVideoToWhitelist { url: String },
    /// Navigation observer: a tab finished loading a URL
    TabUpdated {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Navigation observer: a tab became the active tab
    TabActivated {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    /// Navigation observer: a tab was closed
    TabRemoved {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
}

/// Response data for IPC responses.
///
/// Only the fields relevant to the answered verb are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    /// Site configurations (getStatus)
    #[serde(rename = "siteConfigs", skip_serializing_if = "Option::is_none")]
    pub site_configs: Option<SiteConfigs>,
    /// Live timers keyed by tab id (getStatus)
    #[serde(rename = "activeTimers", skip_serializing_if = "Option::is_none")]
    pub active_timers: Option<HashMap<TabId, ActiveTimerView>>,
    /// Cooldown settings (get/updateCooldownSettings)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<CooldownSettings>,
    /// Blocked-site records (getBlockedSites)
    #[serde(rename = "blockedSites", skip_serializing_if = "Option::is_none")]
    pub blocked_sites: Option<BlockedSites>,
    /// Whitelisted channels (get/updateWhitelistChannels)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    /// Whitelisted videos (get/updateWhitelistVideos)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub videos: Option<Vec<String>>,
    /// Learning mode settings (get/updateLearningMode)
    #[serde(rename = "learningMode", skip_serializing_if = "Option::is_none")]
    pub learning_mode: Option<LearningMode>,
}

impl ResponseData {
    /// Creates status data from configs and live timer views.
    pub fn status(site_configs: SiteConfigs, active_timers: HashMap<TabId, ActiveTimerView>) -> Self {
        Self {
            site_configs: Some(site_configs),
            active_timers: Some(active_timers),
            ..Self::default()
        }
    }

    /// Creates data carrying cooldown settings.
    pub fn cooldown(settings: CooldownSettings) -> Self {
        Self {
            cooldown: Some(settings),
            ..Self::default()
        }
    }

    /// Creates data carrying blocked-site records.
    pub fn blocked_sites(blocked: BlockedSites) -> Self {
        Self {
            blocked_sites: Some(blocked),
            ..Self::default()
        }
    }

    /// Creates data carrying whitelisted channels.
    pub fn channels(channels: Vec<String>) -> Self {
        Self {
            channels: Some(channels),
            ..Self::default()
        }
    }

    /// Creates data carrying whitelisted videos.
    pub fn videos(videos: Vec<String>) -> Self {
        Self {
            videos: Some(videos),
            ..Self::default()
        }
    }

    /// Creates data carrying learning mode settings.
    pub fn learning_mode(settings: LearningMode) -> Self {
        Self {
            learning_mode: Some(settings),
            ..Self::default()
        }
    }
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Response status ("success" or "error")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Optional response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<ResponseData>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // Defaults Tests
    // ------------------------------------------------------------------------

    mod defaults_tests {
        use super::*;

        #[test]
        fn test_default_site_configs() {
            let sites = default_site_configs();
            assert_eq!(sites.get("youtube.com/shorts"), Some(&1));
            assert_eq!(sites.get("youtube.com"), Some(&5));
            assert_eq!(sites.get("reddit.com"), Some(&10));
            assert_eq!(sites.len(), 7);
        }

        #[test]
        fn test_default_whitelist_channels_non_empty() {
            let channels = default_whitelist_channels();
            assert!(channels.iter().any(|c| c.contains("khanacademy")));
        }
    }

    // ------------------------------------------------------------------------
    // ActiveTimer Tests
    // ------------------------------------------------------------------------

    mod active_timer_tests {
        use super::*;

        fn timer() -> ActiveTimer {
            ActiveTimer {
                site: "youtube.com".to_string(),
                minutes: 5,
                start_time: 1_000_000,
                alarm_name: "close_tab_7".to_string(),
            }
        }

        #[test]
        fn test_expires_at() {
            assert_eq!(timer().expires_at(), 1_000_000 + 5 * 60_000);
        }

        #[test]
        fn test_time_remaining() {
            let t = timer();
            assert_eq!(t.time_remaining(1_000_000), 5 * 60_000);
            assert_eq!(t.time_remaining(1_000_000 + 60_000), 4 * 60_000);
        }

        #[test]
        fn test_time_remaining_clamped_after_expiry() {
            let t = timer();
            assert_eq!(t.time_remaining(t.expires_at() + 1), 0);
        }

        #[test]
        fn test_serialize_camel_case() {
            let json = serde_json::to_string(&timer()).unwrap();
            assert!(json.contains("\"startTime\":1000000"));
            assert!(json.contains("\"alarmName\":\"close_tab_7\""));
        }

        #[test]
        fn test_round_trip() {
            let t = timer();
            let json = serde_json::to_string(&t).unwrap();
            let back: ActiveTimer = serde_json::from_str(&json).unwrap();
            assert_eq!(t, back);
        }
    }

    // ------------------------------------------------------------------------
    // CooldownSettings Tests
    // ------------------------------------------------------------------------

    mod cooldown_settings_tests {
        use super::*;

        #[test]
        fn test_default_values() {
            let settings = CooldownSettings::default();
            assert!(settings.enabled);
            assert_eq!(settings.duration_minutes, 60);
        }

        #[test]
        fn test_validate_boundaries() {
            for minutes in [5, 480] {
                let settings = CooldownSettings {
                    enabled: true,
                    duration_minutes: minutes,
                };
                assert!(settings.validate().is_ok());
            }
            for minutes in [4, 481] {
                let settings = CooldownSettings {
                    enabled: true,
                    duration_minutes: minutes,
                };
                assert!(settings.validate().is_err());
            }
        }

        #[test]
        fn test_serialize_camel_case() {
            let json = serde_json::to_string(&CooldownSettings::default()).unwrap();
            assert!(json.contains("\"durationMinutes\":60"));
        }
    }

    // ------------------------------------------------------------------------
    // BlockedSite Tests
    // ------------------------------------------------------------------------

    mod blocked_site_tests {
        use super::*;

        #[test]
        fn test_open() {
            let block = BlockedSite::open(1_000, 60);
            assert_eq!(block.blocked_at, 1_000);
            assert_eq!(block.blocked_until, 1_000 + 60 * 60_000);
            assert_eq!(block.duration_minutes, 60);
        }

        #[test]
        fn test_is_active_window() {
            let block = BlockedSite::open(1_000, 60);
            assert!(block.is_active(1_000));
            assert!(block.is_active(block.blocked_until - 1));
            assert!(!block.is_active(block.blocked_until));
            assert!(!block.is_active(block.blocked_until + 1));
        }

        #[test]
        fn test_round_trip() {
            let block = BlockedSite::open(now_ms(), 30);
            let json = serde_json::to_string(&block).unwrap();
            assert!(json.contains("blockedUntil"));
            let back: BlockedSite = serde_json::from_str(&json).unwrap();
            assert_eq!(block, back);
        }
    }

    // ------------------------------------------------------------------------
    // LearningMode Tests
    // ------------------------------------------------------------------------

    mod learning_mode_tests {
        use super::*;

        #[test]
        fn test_default_inactive() {
            let mode = LearningMode::default();
            assert!(!mode.enabled);
            assert!(!mode.is_active(now_ms()));
        }

        #[test]
        fn test_active_within_window() {
            let mode = LearningMode {
                enabled: true,
                enabled_until: 10_000,
                duration_minutes: 60,
            };
            assert!(mode.is_active(9_999));
            assert!(!mode.is_active(10_000));
        }

        #[test]
        fn test_enabled_flag_alone_is_not_active() {
            // A stale enabled flag past its expiry must not bypass timers.
            let mode = LearningMode {
                enabled: true,
                enabled_until: 1_000,
                duration_minutes: 60,
            };
            assert!(!mode.is_active(2_000));
        }

        #[test]
        fn test_validate() {
            let mut mode = LearningMode::default();
            assert!(mode.validate().is_ok());
            mode.duration_minutes = 0;
            assert!(mode.validate().is_err());
            mode.duration_minutes = 481;
            assert!(mode.validate().is_err());
        }

        #[test]
        fn test_deserialize_missing_enabled_until_defaults() {
            let json = r#"{"enabled":false,"durationMinutes":45}"#;
            let mode: LearningMode = serde_json::from_str(json).unwrap();
            assert_eq!(mode.enabled_until, 0);
            assert_eq!(mode.duration_minutes, 45);
        }
    }

    // ------------------------------------------------------------------------
    // Validation Tests
    // ------------------------------------------------------------------------

    mod validation_tests {
        use super::*;

        #[test]
        fn test_site_minutes_boundaries() {
            assert!(validate_site_minutes(1).is_ok());
            assert!(validate_site_minutes(120).is_ok());
            assert!(validate_site_minutes(0).is_err());
            assert!(validate_site_minutes(121).is_err());
        }
    }

    // ------------------------------------------------------------------------
    // IPC Types Tests
    // ------------------------------------------------------------------------

    mod ipc_tests {
        use super::*;

        #[test]
        fn test_get_status_serialize() {
            let json = serde_json::to_string(&IpcRequest::GetStatus).unwrap();
            assert_eq!(json, r#"{"action":"getStatus"}"#);
        }

        #[test]
        fn test_update_site_config_round_trip() {
            let json = r#"{"action":"updateSiteConfig","site":"reddit.com","minutes":10}"#;
            let request: IpcRequest = serde_json::from_str(json).unwrap();
            match request {
                IpcRequest::UpdateSiteConfig { site, minutes } => {
                    assert_eq!(site, "reddit.com");
                    assert_eq!(minutes, 10);
                }
                _ => panic!("Expected UpdateSiteConfig"),
            }
        }

        #[test]
        fn test_tab_updated_deserialize() {
            let json = r#"{"action":"tabUpdated","tabId":12,"url":"https://youtube.com/watch?v=abc"}"#;
            let request: IpcRequest = serde_json::from_str(json).unwrap();
            match request {
                IpcRequest::TabUpdated { tab_id, url, title } => {
                    assert_eq!(tab_id, 12);
                    assert_eq!(url, "https://youtube.com/watch?v=abc");
                    assert!(title.is_none());
                }
                _ => panic!("Expected TabUpdated"),
            }
        }

        #[test]
        fn test_all_query_verbs_deserialize() {
            let verbs = [
                (r#"{"action":"getStatus"}"#, "getStatus"),
                (r#"{"action":"getCooldownSettings"}"#, "getCooldownSettings"),
                (r#"{"action":"getBlockedSites"}"#, "getBlockedSites"),
                (r#"{"action":"getWhitelistChannels"}"#, "getWhitelistChannels"),
                (r#"{"action":"getWhitelistVideos"}"#, "getWhitelistVideos"),
                (r#"{"action":"getLearningMode"}"#, "getLearningMode"),
            ];
            for (json, verb) in verbs {
                let request: IpcRequest = serde_json::from_str(json)
                    .unwrap_or_else(|e| panic!("{verb} failed to parse: {e}"));
                let back = serde_json::to_string(&request).unwrap();
                assert_eq!(back, json);
            }
        }

        #[test]
        fn test_update_learning_mode_deserialize() {
            let json = r#"{"action":"updateLearningMode","settings":{"enabled":true,"enabledUntil":0,"durationMinutes":90}}"#;
            let request: IpcRequest = serde_json::from_str(json).unwrap();
            match request {
                IpcRequest::UpdateLearningMode { settings } => {
                    assert!(settings.enabled);
                    assert_eq!(settings.duration_minutes, 90);
                }
                _ => panic!("Expected UpdateLearningMode"),
            }
        }

        #[test]
        fn test_response_data_status_skips_unrelated_fields() {
            let data = ResponseData::status(default_site_configs(), HashMap::new());
            let json = serde_json::to_string(&data).unwrap();
            assert!(json.contains("siteConfigs"));
            assert!(json.contains("activeTimers"));
            assert!(!json.contains("blockedSites"));
            assert!(!json.contains("learningMode"));
        }

        #[test]
        fn test_response_success_and_error() {
            let ok = IpcResponse::success("ok", None);
            assert_eq!(ok.status, "success");
            assert!(ok.data.is_none());

            let err = IpcResponse::error("だめでした");
            assert_eq!(err.status, "error");
            assert_eq!(err.message, "だめでした");
        }

        #[test]
        fn test_active_timer_view_serialize() {
            let view = ActiveTimerView {
                timer: ActiveTimer {
                    site: "reddit.com".to_string(),
                    minutes: 10,
                    start_time: 500,
                    alarm_name: "close_tab_3".to_string(),
                },
                url: "https://reddit.com/r/rust".to_string(),
                title: Some("rust".to_string()),
                time_remaining: 123,
            };
            let json = serde_json::to_string(&view).unwrap();
            assert!(json.contains("\"timeRemaining\":123"));
            assert!(json.contains("\"site\":\"reddit.com\""));
        }
    }
}
