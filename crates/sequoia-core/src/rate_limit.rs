//! Daily message limit.
//!
//! A persistent counter of messages sent today, compared against a user
//! configured limit. The counter belongs to a calendar day in the user's
//! local timezone; the first read or write on a new day resets it before
//! anything else looks at it.
//!
//! This module is the pure state machine. Persistence lives in
//! `sequoia-storage` and the single writer is the bridge actor.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Highest daily limit a user can configure.
pub const MAX_DAILY_LIMIT: u32 = 100;

/// Date format used when the reset day is stored as text.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Today's date in the local timezone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Clamps a requested limit into `0..=MAX_DAILY_LIMIT`.
pub fn clamp_daily_limit(limit: i64) -> u32 {
    limit.clamp(0, MAX_DAILY_LIMIT as i64) as u32
}

/// Persistent rate-limit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    /// Messages allowed per day; 0 means unlimited.
    pub daily_limit: u32,
    /// Messages counted on `last_reset_date`.
    pub daily_message_count: u32,
    /// Day the counter belongs to.
    pub last_reset_date: NaiveDate,
}

impl RateLimitState {
    /// Fresh install state: unlimited, nothing counted.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            daily_limit: 0,
            daily_message_count: 0,
            last_reset_date: today,
        }
    }

    /// Resets the counter if the stored day is not `today`.
    ///
    /// Returns true if a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date == today {
            return false;
        }
        self.daily_message_count = 0;
        self.last_reset_date = today;
        true
    }

    /// True iff a limit is set and today's count has reached it.
    pub fn is_exceeded(&self) -> bool {
        self.daily_limit > 0 && self.daily_message_count >= self.daily_limit
    }

    /// Rolls over, then reports the current status.
    pub fn check(&mut self, today: NaiveDate) -> DailyLimitStatus {
        self.roll_over(today);
        self.status()
    }

    /// Rolls over, then counts one message.
    ///
    /// With a limit set the counter is capped: an increment that would go
    /// past the limit is refused and reported as `capped`.
    pub fn increment(&mut self, today: NaiveDate) -> IncrementOutcome {
        self.roll_over(today);

        if self.is_exceeded() {
            return IncrementOutcome {
                count: self.daily_message_count,
                capped: true,
            };
        }

        self.daily_message_count = self.daily_message_count.saturating_add(1);
        IncrementOutcome {
            count: self.daily_message_count,
            capped: false,
        }
    }

    /// Current status without rolling over.
    pub fn status(&self) -> DailyLimitStatus {
        DailyLimitStatus {
            daily_limit: self.daily_limit,
            daily_message_count: self.daily_message_count,
            is_exceeded: self.is_exceeded(),
        }
    }
}

/// Result of a limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DailyLimitStatus {
    pub daily_limit: u32,
    pub daily_message_count: u32,
    pub is_exceeded: bool,
}

impl DailyLimitStatus {
    /// Status used when the store cannot be reached: never blocks.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Messages left today, `None` when unlimited.
    pub fn remaining(&self) -> Option<u32> {
        if self.daily_limit == 0 {
            None
        } else {
            Some(self.daily_limit.saturating_sub(self.daily_message_count))
        }
    }
}

/// Result of counting a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementOutcome {
    /// Count after the increment (unchanged when capped).
    pub count: u32,
    /// The limit was already reached, nothing was counted.
    pub capped: bool,
}
