//! Background coordinator.
//!
//! Processes one event at a time: navigation and activation events from the
//! observer, tab removals, fired alarms, and message-API requests from UI
//! clients. Control flow for a navigation is block check -> match -> bypass
//! -> timer; on expiry the matcher re-runs before the cooldown manager opens
//! a block window.
//!
//! No failure here is fatal: unknown tabs clear their timer, unparseable
//! URLs count as unmonitored, storage problems degrade to defaults.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use url::form_urlencoded;

use crate::cooldown::CooldownManager;
use crate::daemon::timer::{tab_id_from_alarm, ShellCommand, TimerManager};
use crate::matcher;
use crate::policy;
use crate::scheduler::AlarmScheduler;
use crate::storage::{dedup_preserving_order, Repository};
use crate::types::{
    now_ms, ActiveTimerView, IpcRequest, IpcResponse, LearningMode, ResponseData, TabId,
    validate_site_minutes,
};

// ============================================================================
// Constants
// ============================================================================

/// Path of the internal blocking view the shell navigates blocked tabs to.
const BLOCKED_PAGE_PATH: &str = "blocked.html";

// ============================================================================
// TabInfo
// ============================================================================

/// Last-known details of a tab, maintained from observer events.
#[derive(Debug, Clone)]
pub struct TabInfo {
    /// Last reported URL.
    pub url: String,
    /// Last reported title, if any.
    pub title: Option<String>,
}

// ============================================================================
// Coordinator
// ============================================================================

/// The background coordinator: site matching, timer lifecycle, cooldown and
/// bypass policy, and the message API over it all.
pub struct Coordinator {
    repo: Repository,
    timers: TimerManager,
    cooldown: CooldownManager,
    shell_tx: mpsc::UnboundedSender<ShellCommand>,
    tabs: HashMap<TabId, TabInfo>,
}

impl Coordinator {
    /// Creates a coordinator over the given repository and scheduler.
    pub fn new(
        repo: Repository,
        scheduler: Arc<dyn AlarmScheduler>,
        shell_tx: mpsc::UnboundedSender<ShellCommand>,
    ) -> Self {
        let timers = TimerManager::new(repo.clone(), scheduler, shell_tx.clone());
        let cooldown = CooldownManager::new(repo.clone());
        Self {
            repo,
            timers,
            cooldown,
            shell_tx,
            tabs: HashMap::new(),
        }
    }

    // ── Event handling ───────────────────────────────────────────────

    /// Handles a completed navigation in a tab.
    ///
    /// The cooldown block check runs first; a blocked tab is redirected to
    /// the blocking view and never reaches the timer path.
    pub fn on_tab_updated(&mut self, tab_id: TabId, url: &str, title: Option<String>) {
        self.tabs.insert(
            tab_id,
            TabInfo {
                url: url.to_string(),
                title,
            },
        );

        if self.cooldown.is_blocked(url) {
            self.redirect_to_blocked_page(tab_id, url);
            return;
        }

        self.handle_navigation(tab_id, url);
    }

    /// Handles a tab becoming the active tab.
    pub fn on_tab_activated(&mut self, tab_id: TabId) {
        let Some(url) = self.tabs.get(&tab_id).map(|tab| tab.url.clone()) else {
            return;
        };
        self.handle_navigation(tab_id, &url);
    }

    /// Handles a tab being closed.
    pub fn on_tab_removed(&mut self, tab_id: TabId) {
        self.tabs.remove(&tab_id);
        if let Err(e) = self.timers.clear(tab_id) {
            tracing::warn!("clearing timer for closed tab {} failed: {}", tab_id, e);
        }
    }

    /// Handles a fired alarm.
    ///
    /// The expiry is genuine only if the tab still exists and its current
    /// URL still resolves to the site recorded when the timer started; a
    /// stale firing is silently discarded. Cooldown applies only to genuine
    /// expiries.
    pub fn on_alarm(&mut self, name: &str) {
        let Some(tab_id) = tab_id_from_alarm(name) else {
            tracing::debug!("ignoring unrelated alarm '{}'", name);
            return;
        };

        let timer = match self.timers.take_expired(tab_id) {
            Ok(Some(timer)) => timer,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("taking expired timer for tab {} failed: {}", tab_id, e);
                return;
            }
        };

        // Tab already closed: Expired -> NoTimer with no side effect.
        let Some(tab) = self.tabs.get(&tab_id).cloned() else {
            tracing::info!("tab {} no longer exists", tab_id);
            return;
        };

        let configs = self.repo.site_configs();
        let current_match = matcher::match_url(&tab.url, &configs);
        if current_match != Some(timer.site.as_str()) {
            tracing::info!(
                "stale expiry for tab {}: moved off {} already",
                tab_id,
                timer.site
            );
            return;
        }

        tracing::info!(
            "timer expired for {} (tab {}) after {} minutes",
            timer.site,
            tab_id,
            timer.minutes
        );
        if let Err(e) = self.cooldown.block(&timer.site) {
            tracing::warn!("opening cooldown for {} failed: {}", timer.site, e);
        }
        self.redirect_to_blocked_page(tab_id, &tab.url);
    }

    /// Runs the match -> bypass -> timer path for a navigation.
    fn handle_navigation(&mut self, tab_id: TabId, url: &str) {
        let configs = self.repo.site_configs();
        let Some(site) = matcher::match_url(url, &configs).map(str::to_string) else {
            // Not a monitored site; drop any timer left from the previous URL.
            if let Err(e) = self.timers.clear(tab_id) {
                tracing::warn!("clearing timer for tab {} failed: {}", tab_id, e);
            }
            return;
        };

        let decision = policy::decide(
            url,
            &self.repo.learning_mode(),
            &self.repo.whitelist_videos(),
            &self.repo.whitelist_channels(),
            now_ms(),
        );
        if decision.bypass {
            let reason = decision.reason.map(|r| r.as_str()).unwrap_or("unknown");
            tracing::info!("bypassing timer for tab {} ({})", tab_id, reason);
            // A bypassed navigation behaves like a non-monitored one.
            if let Err(e) = self.timers.clear(tab_id) {
                tracing::warn!("clearing timer for tab {} failed: {}", tab_id, e);
            }
            return;
        }

        let configured = configs.get(&site).copied().unwrap_or_default();
        let adjustment = policy::adjust(url, configured);
        if adjustment.extended {
            tracing::info!(
                "educational content ({}): extending timer to {} minutes",
                adjustment.reason.unwrap_or(""),
                adjustment.minutes
            );
        }

        if let Err(e) = self.timers.start(tab_id, &site, adjustment.minutes) {
            tracing::warn!("starting timer for tab {} failed: {}", tab_id, e);
        }
    }

    /// Asks the shell to navigate a tab to the blocking view.
    fn redirect_to_blocked_page(&self, tab_id: TabId, original_url: &str) {
        let url = blocked_page_url(original_url, now_ms());
        tracing::info!("redirecting tab {} to blocked page", tab_id);
        let _ = self.shell_tx.send(ShellCommand::RedirectTab { tab_id, url });
    }

    // ── Message API ──────────────────────────────────────────────────

    /// Handles a message-API request and returns the response.
    pub fn handle_request(&mut self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::GetStatus => self.handle_get_status(),
            IpcRequest::UpdateSiteConfig { site, minutes } => {
                self.handle_update_site_config(&site, minutes)
            }
            IpcRequest::RemoveSite { site } => self.handle_remove_site(&site),
            IpcRequest::GetCooldownSettings => {
                IpcResponse::success("", Some(ResponseData::cooldown(self.repo.cooldown_settings())))
            }
            IpcRequest::UpdateCooldownSettings { settings } => {
                if let Err(message) = settings.validate() {
                    return IpcResponse::error(message);
                }
                match self.repo.set_cooldown_settings(&settings) {
                    Ok(()) => IpcResponse::success(
                        "クールダウン設定を更新しました",
                        Some(ResponseData::cooldown(settings)),
                    ),
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }
            IpcRequest::GetBlockedSites => self.handle_get_blocked_sites(),
            IpcRequest::GetWhitelistChannels => {
                IpcResponse::success("", Some(ResponseData::channels(self.repo.whitelist_channels())))
            }
            IpcRequest::UpdateWhitelistChannels { channels } => {
                let channels = dedup_preserving_order(channels);
                match self.repo.set_whitelist_channels(&channels) {
                    Ok(()) => IpcResponse::success(
                        "チャンネルのホワイトリストを更新しました",
                        Some(ResponseData::channels(channels)),
                    ),
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }
            IpcRequest::GetWhitelistVideos => {
                IpcResponse::success("", Some(ResponseData::videos(self.repo.whitelist_videos())))
            }
            IpcRequest::UpdateWhitelistVideos { videos } => {
                let videos = dedup_preserving_order(videos);
                match self.repo.set_whitelist_videos(&videos) {
                    Ok(()) => IpcResponse::success(
                        "動画のホワイトリストを更新しました",
                        Some(ResponseData::videos(videos)),
                    ),
                    Err(e) => IpcResponse::error(e.to_string()),
                }
            }
            IpcRequest::GetLearningMode => {
                IpcResponse::success("", Some(ResponseData::learning_mode(self.repo.learning_mode())))
            }
            IpcRequest::UpdateLearningMode { settings } => self.handle_update_learning_mode(settings),
            IpcRequest::AddCurrentVideoToWhitelist { url } => self.handle_add_video(&url),
            IpcRequest::TabUpdated { tab_id, url, title } => {
                self.on_tab_updated(tab_id, &url, title);
                IpcResponse::success("", None)
            }
            IpcRequest::TabActivated { tab_id } => {
                self.on_tab_activated(tab_id);
                IpcResponse::success("", None)
            }
            IpcRequest::TabRemoved { tab_id } => {
                self.on_tab_removed(tab_id);
                IpcResponse::success("", None)
            }
        }
    }

    /// Builds the status payload: configs plus live timers enriched with
    /// tab details. Timers whose tab is gone are omitted.
    fn handle_get_status(&self) -> IpcResponse {
        let now = now_ms();
        let mut views = HashMap::new();
        for (tab_id, timer) in self.repo.active_timers() {
            let Some(tab) = self.tabs.get(&tab_id) else {
                continue;
            };
            let time_remaining = timer.time_remaining(now);
            views.insert(
                tab_id,
                ActiveTimerView {
                    timer,
                    url: tab.url.clone(),
                    title: tab.title.clone(),
                    time_remaining,
                },
            );
        }
        IpcResponse::success(
            "",
            Some(ResponseData::status(self.repo.site_configs(), views)),
        )
    }

    fn handle_update_site_config(&mut self, site: &str, minutes: u32) -> IpcResponse {
        if site.is_empty() {
            return IpcResponse::error("サイトを指定してください");
        }
        if let Err(message) = validate_site_minutes(minutes) {
            return IpcResponse::error(message);
        }

        let mut configs = self.repo.site_configs();
        configs.insert(site.to_string(), minutes);
        match self.repo.set_site_configs(&configs) {
            Ok(()) => IpcResponse::success("サイト設定を更新しました", None),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    /// Removes a site configuration.
    ///
    /// Already-running timers for the site keep running; removal is not
    /// retroactive.
    fn handle_remove_site(&mut self, site: &str) -> IpcResponse {
        let mut configs = self.repo.site_configs();
        configs.remove(site);
        match self.repo.set_site_configs(&configs) {
            Ok(()) => IpcResponse::success("サイトを削除しました", None),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    /// Returns the block list, evicting expired entries on the way
    /// (housekeeping half of lazy expiry).
    fn handle_get_blocked_sites(&mut self) -> IpcResponse {
        let now = now_ms();
        let mut blocked = self.repo.blocked_sites();
        let before = blocked.len();
        blocked.retain(|_, entry| entry.is_active(now));
        if blocked.len() != before {
            if let Err(e) = self.repo.set_blocked_sites(&blocked) {
                tracing::warn!("evicting expired blocks failed: {}", e);
            }
        }
        IpcResponse::success("", Some(ResponseData::blocked_sites(blocked)))
    }

    fn handle_update_learning_mode(&mut self, mut settings: LearningMode) -> IpcResponse {
        if let Err(message) = settings.validate() {
            return IpcResponse::error(message);
        }

        // Enabling without a usable expiry starts a session now.
        if settings.enabled && settings.enabled_until <= now_ms() {
            settings.enabled_until = now_ms() + u64::from(settings.duration_minutes) * 60_000;
        }

        match self.repo.set_learning_mode(&settings) {
            Ok(()) => IpcResponse::success(
                "学習モードを更新しました",
                Some(ResponseData::learning_mode(settings)),
            ),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

    /// Whitelists the video a URL points at, deduplicating by canonical
    /// video identity.
    fn handle_add_video(&mut self, url: &str) -> IpcResponse {
        if url.is_empty() {
            return IpcResponse::error("URLを指定してください");
        }

        let identity = policy::canonical_video_identity(url);
        let mut videos = self.repo.whitelist_videos();
        if videos
            .iter()
            .any(|entry| policy::canonical_video_identity(entry) == identity)
        {
            return IpcResponse::success(
                "この動画は既にホワイトリストに登録されています",
                Some(ResponseData::videos(videos)),
            );
        }

        videos.push(url.to_string());
        match self.repo.set_whitelist_videos(&videos) {
            Ok(()) => IpcResponse::success(
                "動画をホワイトリストに追加しました",
                Some(ResponseData::videos(videos)),
            ),
            Err(e) => IpcResponse::error(e.to_string()),
        }
    }

}

/// Builds the blocking view URL carrying the original URL and a timestamp.
fn blocked_page_url(original_url: &str, timestamp: u64) -> String {
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("site", original_url)
        .append_pair("timestamp", &timestamp.to_string())
        .finish();
    format!("{BLOCKED_PAGE_PATH}?{query}")
}

// ============================================================================
// Tests
// ============================================================================
