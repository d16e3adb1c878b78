//! Cooldown management.
//!
//! After a timer expires, the matched site enters a block window. The block
//! list is keyed by site pattern and expires lazily: whoever observes an
//! entry past its `blockedUntil` evicts it. There is no background sweep.

use crate::matcher;
use crate::storage::{Repository, StorageError};
use crate::types::{now_ms, BlockedSite};

// ============================================================================
// CooldownManager
// ============================================================================

/// Owns the per-site block list.
pub struct CooldownManager {
    repo: Repository,
}

impl CooldownManager {
    /// Creates a manager over the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Returns true if navigating to `url` is currently blocked.
    ///
    /// False immediately when cooldown is disabled or the URL matches no
    /// configured site. An expired entry found on the way is evicted and
    /// reported as not blocked.
    pub fn is_blocked(&self, url: &str) -> bool {
        let settings = self.repo.cooldown_settings();
        if !settings.enabled {
            return false;
        }

        let configs = self.repo.site_configs();
        let Some(site) = matcher::match_url(url, &configs) else {
            return false;
        };

        self.is_site_blocked(site)
    }

    /// Returns true if the given site pattern is currently blocked,
    /// evicting an expired entry on the way.
    pub fn is_site_blocked(&self, site: &str) -> bool {
        let mut blocked = self.repo.blocked_sites();
        match blocked.get(site) {
            None => false,
            Some(entry) if entry.is_active(now_ms()) => true,
            Some(_) => {
                blocked.remove(site);
                if let Err(e) = self.repo.set_blocked_sites(&blocked) {
                    tracing::warn!("evicting expired block for {} failed: {}", site, e);
                }
                false
            }
        }
    }

    /// Opens (or re-opens) a block window for `site`.
    ///
    /// No-op while cooldown is disabled; otherwise overwrites any prior
    /// entry for the site.
    pub fn block(&self, site: &str) -> Result<(), StorageError> {
        let settings = self.repo.cooldown_settings();
        if !settings.enabled {
            return Ok(());
        }

        let mut blocked = self.repo.blocked_sites();
        blocked.insert(
            site.to_string(),
            BlockedSite::open(now_ms(), settings.duration_minutes),
        );
        self.repo.set_blocked_sites(&blocked)?;
        tracing::info!(
            "added {} to cooldown for {} minutes",
            site,
            settings.duration_minutes
        );
        Ok(())
    }

    /// Deletes the block entry for `site` unconditionally.
    pub fn unblock(&self, site: &str) -> Result<(), StorageError> {
        let mut blocked = self.repo.blocked_sites();
        if blocked.remove(site).is_some() {
            self.repo.set_blocked_sites(&blocked)?;
            tracing::info!("removed {} from cooldown", site);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockedSites, CooldownSettings, SiteConfigs};

    fn setup() -> (Repository, CooldownManager) {
        let repo = Repository::in_memory();
        let mut sites = SiteConfigs::new();
        sites.insert("reddit.com".to_string(), 10);
        sites.insert("youtube.com".to_string(), 5);
        sites.insert("youtube.com/shorts".to_string(), 1);
        repo.set_site_configs(&sites).unwrap();
        let manager = CooldownManager::new(repo.clone());
        (repo, manager)
    }

    #[test]
    fn test_not_blocked_without_entry() {
        let (_repo, manager) = setup();
        assert!(!manager.is_blocked("https://reddit.com/r/rust"));
    }

    #[test]
    fn test_block_then_is_blocked() {
        let (_repo, manager) = setup();
        manager.block("reddit.com").unwrap();
        assert!(manager.is_blocked("https://reddit.com/r/rust"));
        assert!(manager.is_blocked("https://www.reddit.com/"));
    }

    #[test]
    fn test_unmonitored_url_never_blocked() {
        let (_repo, manager) = setup();
        manager.block("reddit.com").unwrap();
        assert!(!manager.is_blocked("https://example.com/"));
    }

    #[test]
    fn test_disabled_cooldown_blocks_nothing() {
        let (repo, manager) = setup();
        repo.set_cooldown_settings(&CooldownSettings {
            enabled: false,
            duration_minutes: 60,
        })
        .unwrap();

        manager.block("reddit.com").unwrap();
        assert!(repo.blocked_sites().is_empty(), "block must be a no-op");
        assert!(!manager.is_blocked("https://reddit.com/"));
    }

    #[test]
    fn test_expired_entry_lazily_evicted() {
        let (repo, manager) = setup();

        let mut blocked = BlockedSites::new();
        blocked.insert(
            "reddit.com".to_string(),
            BlockedSite {
                blocked_at: 0,
                blocked_until: 1, // long past
                duration_minutes: 60,
            },
        );
        repo.set_blocked_sites(&blocked).unwrap();

        assert!(!manager.is_blocked("https://reddit.com/"));
        assert!(repo.blocked_sites().is_empty(), "entry must be evicted");

        // Idempotent: a second query stays false and recreates nothing.
        assert!(!manager.is_blocked("https://reddit.com/"));
        assert!(repo.blocked_sites().is_empty());
    }

    #[test]
    fn test_block_overwrites_prior_entry() {
        let (repo, manager) = setup();

        let mut blocked = BlockedSites::new();
        blocked.insert(
            "reddit.com".to_string(),
            BlockedSite {
                blocked_at: 0,
                blocked_until: 10,
                duration_minutes: 1,
            },
        );
        repo.set_blocked_sites(&blocked).unwrap();

        manager.block("reddit.com").unwrap();
        let entry = repo.blocked_sites().get("reddit.com").cloned().unwrap();
        assert_eq!(entry.duration_minutes, 60);
        assert!(entry.blocked_until > now_ms());
    }

    #[test]
    fn test_unblock_removes_entry() {
        let (repo, manager) = setup();
        manager.block("reddit.com").unwrap();
        manager.unblock("reddit.com").unwrap();
        assert!(repo.blocked_sites().is_empty());
        assert!(!manager.is_blocked("https://reddit.com/"));
    }

    #[test]
    fn test_unblock_unknown_site_is_noop() {
        let (_repo, manager) = setup();
        manager.unblock("never-blocked.com").unwrap();
    }

    #[test]
    fn test_block_check_uses_most_specific_match() {
        let (_repo, manager) = setup();
        manager.block("youtube.com/shorts").unwrap();

        // The shorts path resolves to the blocked pattern...
        assert!(manager.is_blocked("https://youtube.com/shorts/abc"));
        // ...but plain youtube resolves to the unblocked domain pattern.
        assert!(!manager.is_blocked("https://youtube.com/watch?v=abc"));
    }

    #[test]
    fn test_block_window_boundaries() {
        let (repo, manager) = setup();

        // One minute into a 60-minute window: blocked.
        let mut blocked = BlockedSites::new();
        blocked.insert(
            "reddit.com".to_string(),
            BlockedSite::open(now_ms() - 60_000, 60),
        );
        repo.set_blocked_sites(&blocked).unwrap();
        assert!(manager.is_blocked("https://reddit.com/"));

        // Sixty-one minutes in: expired.
        let mut blocked = BlockedSites::new();
        blocked.insert(
            "reddit.com".to_string(),
            BlockedSite::open(now_ms() - 61 * 60_000, 60),
        );
        repo.set_blocked_sites(&blocked).unwrap();
        assert!(!manager.is_blocked("https://reddit.com/"));
    }
}
