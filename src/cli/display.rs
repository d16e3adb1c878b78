//! Display utilities for the site limiter CLI.
//!
//! This module provides formatted output for:
//! - Status display (sites and running timers)
//! - Cooldown, whitelist, and learning mode settings
//! - Success and error messages

use crate::types::{now_ms, BlockedSites, CooldownSettings, IpcResponse, LearningMode};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows configured sites and running timers.
    pub fn show_status(response: &IpcResponse) {
        println!("サイト制限 ステータス");
        println!("─────────────────────────────");

        let Some(data) = &response.data else {
            println!("Daemonからデータを取得できませんでした");
            return;
        };

        if let Some(configs) = &data.site_configs {
            if configs.is_empty() {
                println!("監視対象サイトはありません");
            } else {
                println!("監視対象サイト:");
                for (site, minutes) in configs {
                    println!("  {site}: {minutes}分");
                }
            }
        }

        if let Some(timers) = &data.active_timers {
            if timers.is_empty() {
                println!("実行中のタイマーはありません");
            } else {
                println!("実行中のタイマー:");
                let mut entries: Vec<_> = timers.iter().collect();
                entries.sort_by_key(|(tab_id, _)| **tab_id);
                for (tab_id, view) in entries {
                    let (minutes, seconds) = Self::format_ms(view.time_remaining);
                    println!(
                        "  タブ{}: {} 残り {}:{:02}",
                        tab_id, view.timer.site, minutes, seconds
                    );
                }
            }
        }
    }

    /// Shows cooldown settings.
    pub fn show_cooldown(settings: &CooldownSettings) {
        let state = if settings.enabled { "有効" } else { "無効" };
        println!("クールダウン: {}", state);
        println!("ブロック時間: {}分", settings.duration_minutes);
    }

    /// Shows currently blocked sites with remaining block time.
    pub fn show_blocked(blocked: &BlockedSites) {
        if blocked.is_empty() {
            println!("ブロック中のサイトはありません");
            return;
        }

        println!("ブロック中のサイト:");
        let now = now_ms();
        let mut entries: Vec<_> = blocked.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (site, entry) in entries {
            let (minutes, seconds) = Self::format_ms(entry.blocked_until.saturating_sub(now));
            println!("  {}: あと {}:{:02}", site, minutes, seconds);
        }
    }

    /// Shows whitelisted channels.
    pub fn show_channels(channels: &[String]) {
        if channels.is_empty() {
            println!("ホワイトリストのチャンネルはありません");
            return;
        }
        println!("ホワイトリストのチャンネル:");
        for channel in channels {
            println!("  {channel}");
        }
    }

    /// Shows whitelisted videos.
    pub fn show_videos(videos: &[String]) {
        if videos.is_empty() {
            println!("ホワイトリストの動画はありません");
            return;
        }
        println!("ホワイトリストの動画:");
        for video in videos {
            println!("  {video}");
        }
    }

    /// Shows learning mode settings.
    pub fn show_learning(mode: &LearningMode) {
        if mode.is_active(now_ms()) {
            let (minutes, seconds) = Self::format_ms(mode.enabled_until.saturating_sub(now_ms()));
            println!("学習モード: 有効 (あと {}:{:02})", minutes, seconds);
        } else {
            println!("学習モード: 無効");
        }
        println!("セッション時間: {}分", mode.duration_minutes);
    }

    /// Shows the daemon's acknowledgement message.
    pub fn show_ack(response: &IpcResponse) {
        if !response.message.is_empty() {
            println!("* {}", response.message);
        }
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("エラー: {}", message);
    }

    /// Formats milliseconds as (minutes, seconds).
    fn format_ms(total_ms: u64) -> (u64, u64) {
        let total_seconds = total_ms / 1000;
        (total_seconds / 60, total_seconds % 60)
    }
}

// ============================================================================
// Tests
// ============================================================================
