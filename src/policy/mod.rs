//! Bypass and content policy.
//!
//! Decides, for a navigation event, whether the timer should be skipped
//! entirely (learning mode, whitelisted video or channel) or extended
//! (educational-content keyword heuristic). Pure functions over the supplied
//! settings; the coordinator fetches those from storage.
//!
//! The keyword heuristic is best-effort classification, not a security
//! boundary: false positives and negatives are acceptable.

use url::Url;

use crate::types::LearningMode;

// ============================================================================
// Constants
// ============================================================================

/// Keywords that classify a URL as educational content.
const EDUCATIONAL_KEYWORDS: &[&str] = &[
    "tutorial",
    "course",
    "learn",
    "education",
    "how-to",
    "explained",
    "masterclass",
    "lesson",
    "training",
    "workshop",
    "lecture",
    "study",
    "guide",
    "tips",
    "strategy",
    "business",
    "marketing",
    "programming",
    "coding",
    "development",
    "design",
    "productivity",
    "skill",
    "career",
];

/// Narrower subset applied to the `list` (playlist) query parameter.
const PLAYLIST_EDUCATIONAL_KEYWORDS: &[&str] = &[
    "tutorial",
    "course",
    "learn",
    "education",
    "lesson",
    "training",
    "lecture",
    "study",
];

/// Minimum effective timer for educational content, in minutes.
const MIN_EDUCATIONAL_MINUTES: u32 = 30;

// ============================================================================
// BypassDecision
// ============================================================================

/// Why a navigation bypasses timer creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    /// Learning mode is active
    LearningMode,
    /// The video identity is whitelisted
    WhitelistedVideo,
    /// The channel is whitelisted
    WhitelistedChannel,
}

impl BypassReason {
    /// Returns the string representation of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            BypassReason::LearningMode => "learning_mode",
            BypassReason::WhitelistedVideo => "whitelisted_video",
            BypassReason::WhitelistedChannel => "whitelisted_channel",
        }
    }
}

/// Outcome of the bypass check for a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BypassDecision {
    /// Whether timer creation is suppressed entirely.
    pub bypass: bool,
    /// The first rule that matched, if any.
    pub reason: Option<BypassReason>,
}

impl BypassDecision {
    fn allow(reason: BypassReason) -> Self {
        Self {
            bypass: true,
            reason: Some(reason),
        }
    }

    fn none() -> Self {
        Self {
            bypass: false,
            reason: None,
        }
    }
}

/// Outcome of the educational-content adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentAdjustment {
    /// Whether the timer was extended.
    pub extended: bool,
    /// Effective timer duration in minutes.
    pub minutes: u32,
    /// The keyword that triggered the extension, if any.
    pub reason: Option<&'static str>,
}

// ============================================================================
// Bypass check
// ============================================================================

/// Decides whether a navigation bypasses timer creation.
///
/// Rules are checked in order; the first match wins:
/// 1. learning mode active (`enabled && now < enabled_until`)
/// 2. canonical video identity matches a whitelisted video
/// 3. channel path substring-matches a whitelisted channel
pub fn decide(
    url: &str,
    learning_mode: &LearningMode,
    whitelist_videos: &[String],
    whitelist_channels: &[String],
    now: u64,
) -> BypassDecision {
    if learning_mode.is_active(now) {
        return BypassDecision::allow(BypassReason::LearningMode);
    }

    let identity = canonical_video_identity(url);
    if whitelist_videos
        .iter()
        .any(|entry| canonical_video_identity(entry) == identity)
    {
        return BypassDecision::allow(BypassReason::WhitelistedVideo);
    }

    if let Some(channel) = channel_path(url) {
        if whitelist_channels
            .iter()
            .any(|entry| entry.contains(&channel) || channel.contains(entry.as_str()))
        {
            return BypassDecision::allow(BypassReason::WhitelistedChannel);
        }
    }

    BypassDecision::none()
}

/// Reduces a URL to its canonical video identity.
///
/// The `v` query parameter when present, otherwise the raw URL, so the same
/// video compares equal regardless of surrounding parameters.
pub fn canonical_video_identity(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
            return id.into_owned();
        }
    }
    url.to_string()
}

/// Extracts a channel path from the URL: `/c/<name>`, `/channel/<id>`,
/// or `/@<handle>`.
pub fn channel_path(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;

    match segments.next()? {
        "c" | "channel" => {
            let prefix = if parsed.path().starts_with("/c/") {
                "/c/"
            } else {
                "/channel/"
            };
            let name = segments.next().filter(|s| !s.is_empty())?;
            Some(format!("{prefix}{name}"))
        }
        handle if handle.starts_with('@') && handle.len() > 1 => Some(format!("/{handle}")),
        _ => None,
    }
}

// ============================================================================
// Educational-content adjustment
// ============================================================================

/// Adjusts a configured timer duration for educational content.
///
/// Scans the lower-cased URL for the keyword set, plus the narrower subset
/// against the `list` query parameter; a hit raises the effective duration
/// to at least [`MIN_EDUCATIONAL_MINUTES`].
pub fn adjust(url: &str, configured_minutes: u32) -> ContentAdjustment {
    let lowered = url.to_lowercase();

    let keyword = EDUCATIONAL_KEYWORDS
        .iter()
        .find(|keyword| lowered.contains(**keyword))
        .copied()
        .or_else(|| playlist_keyword(&lowered));

    match keyword {
        Some(keyword) if configured_minutes < MIN_EDUCATIONAL_MINUTES => ContentAdjustment {
            extended: true,
            minutes: MIN_EDUCATIONAL_MINUTES,
            reason: Some(keyword),
        },
        Some(keyword) => ContentAdjustment {
            extended: false,
            minutes: configured_minutes,
            reason: Some(keyword),
        },
        None => ContentAdjustment {
            extended: false,
            minutes: configured_minutes,
            reason: None,
        },
    }
}

/// Checks the `list` query parameter against the narrower educational subset.
fn playlist_keyword(lowered_url: &str) -> Option<&'static str> {
    let parsed = Url::parse(lowered_url).ok()?;
    let (_, list) = parsed.query_pairs().find(|(key, _)| key == "list")?;
    PLAYLIST_EDUCATIONAL_KEYWORDS
        .iter()
        .find(|keyword| list.contains(**keyword))
        .copied()
}

// ============================================================================
// Tests
// ============================================================================
