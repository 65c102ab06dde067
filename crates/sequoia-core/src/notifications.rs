//! Desktop notifications.
//!
//! Short, transient notices for things the user should see while chatting:
//!
//! - compression paused or resumed
//! - daily message limit reached
//! - a prompt was compressed (before/after length)
//!
//! Notices are feedback only; nothing in the request pipeline depends on
//! whether one was shown. Repeated notices of the same kind are rate-limited
//! so a burst of requests does not flood the desktop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::provider::Provider;

/// Minimum time between two notices of the same kind.
const RATE_LIMIT_DURATION: Duration = Duration::from_secs(10);

/// Application name shown by the notification daemon.
const APP_NAME: &str = "Sequoia";

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Whether notifications are enabled.
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl NotificationSettings {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }
}

/// Something worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Compression was paused or resumed.
    PauseChanged { paused: bool },
    /// Today's message limit has been reached.
    DailyLimitReached { limit: u32, count: u32 },
    /// A prompt was replaced with a shorter one.
    Compressed {
        provider: Provider,
        original_chars: usize,
        compressed_chars: usize,
    },
}

/// Kind of notice, used for per-kind rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    PauseChanged,
    DailyLimitReached,
    Compressed,
}

impl Notice {
    pub fn kind(&self) -> NoticeKind {
        match self {
            Notice::PauseChanged { .. } => NoticeKind::PauseChanged,
            Notice::DailyLimitReached { .. } => NoticeKind::DailyLimitReached,
            Notice::Compressed { .. } => NoticeKind::Compressed,
        }
    }

    /// Notification title.
    pub fn title(&self) -> &'static str {
        match self {
            Notice::PauseChanged { paused: true } => "Sequoia - Compression Paused",
            Notice::PauseChanged { paused: false } => "Sequoia - Compression Resumed",
            Notice::DailyLimitReached { .. } => "Sequoia - Daily Limit Reached",
            Notice::Compressed { .. } => "Sequoia - Prompt Compressed",
        }
    }

    /// Notification body.
    pub fn body(&self) -> String {
        match self {
            Notice::PauseChanged { paused: true } => {
                "Messages are sent as typed until you resume.".to_string()
            }
            Notice::PauseChanged { paused: false } => {
                "Messages will be compressed before sending.".to_string()
            }
            Notice::DailyLimitReached { limit, count } => format!(
                "You have sent {} of {} messages today. This message was sent without compression.",
                count, limit
            ),
            Notice::Compressed {
                provider,
                original_chars,
                compressed_chars,
            } => format!(
                "{}: {} → {} characters",
                provider, original_chars, compressed_chars
            ),
        }
    }

    /// User-initiated notices are never rate-limited.
    fn is_rate_limited_kind(&self) -> bool {
        !matches!(self, Notice::PauseChanged { .. })
    }
}

/// Result of attempting to send a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    /// Notification was sent successfully.
    Sent,
    /// Notification was rate-limited (too soon after the last one).
    RateLimited,
    /// Notifications are disabled.
    Disabled,
    /// Failed to send notification.
    Failed(String),
}

impl NotificationResult {
    pub fn was_sent(&self) -> bool {
        matches!(self, NotificationResult::Sent)
    }

    pub fn was_rate_limited(&self) -> bool {
        matches!(self, NotificationResult::RateLimited)
    }

    pub fn was_disabled(&self) -> bool {
        matches!(self, NotificationResult::Disabled)
    }
}

/// Anything that can show a notice to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice) -> NotificationResult;
}

/// Desktop notifier with per-kind rate limiting.
#[derive(Debug, Clone, Default)]
pub struct NotificationManager {
    settings: Arc<RwLock<NotificationSettings>>,
    last_sent: Arc<RwLock<HashMap<NoticeKind, Instant>>>,
}

impl NotificationManager {
    /// Creates a new notification manager with default settings (enabled).
    pub fn new() -> Self {
        Self::with_settings(NotificationSettings::default())
    }

    pub fn with_settings(settings: NotificationSettings) -> Self {
        Self {
            settings: Arc::new(RwLock::new(settings)),
            last_sent: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.read().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.settings.write().enabled = enabled;
    }

    /// Returns the time until a notice of `kind` can be sent again.
    pub fn time_until_next(&self, kind: NoticeKind) -> Option<Duration> {
        let last_sent = self.last_sent.read();
        let elapsed = last_sent.get(&kind)?.elapsed();
        (elapsed < RATE_LIMIT_DURATION).then(|| RATE_LIMIT_DURATION - elapsed)
    }

    #[cfg(test)]
    fn reset_rate_limit(&self) {
        self.last_sent.write().clear();
    }

    #[cfg(feature = "notifications")]
    fn send_notification(&self, notice: &Notice) -> NotificationResult {
        use notify_rust::Notification;

        match Notification::new()
            .summary(notice.title())
            .body(&notice.body())
            .appname(APP_NAME)
            .timeout(notify_rust::Timeout::Milliseconds(3000))
            .show()
        {
            Ok(_) => NotificationResult::Sent,
            Err(e) => NotificationResult::Failed(e.to_string()),
        }
    }

    #[cfg(not(feature = "notifications"))]
    fn send_notification(&self, notice: &Notice) -> NotificationResult {
        tracing::info!(app = APP_NAME, title = notice.title(), "{}", notice.body());
        NotificationResult::Sent
    }
}

impl Notifier for NotificationManager {
    fn notify(&self, notice: &Notice) -> NotificationResult {
        if !self.is_enabled() {
            return NotificationResult::Disabled;
        }

        let kind = notice.kind();
        if notice.is_rate_limited_kind() && self.time_until_next(kind).is_some() {
            return NotificationResult::RateLimited;
        }

        let result = self.send_notification(notice);
        match &result {
            NotificationResult::Sent => {
                self.last_sent.write().insert(kind, Instant::now());
            }
            NotificationResult::Failed(e) => {
                tracing::debug!(error = %e, "Desktop notification failed");
            }
            _ => {}
        }

        result
    }
}
