//! Environmental savings estimates.
//!
//! Every token the compression service removes is credited with a fixed
//! amount of water and CO2. The totals only grow, except when the user
//! resets them explicitly.

use serde::{Deserialize, Serialize};

/// Water saved per token removed, in millilitres.
pub const WATER_PER_TOKEN_ML: f64 = 0.5;

/// CO2 saved per token removed, in grams.
pub const CO2_PER_TOKEN_G: f64 = 0.04;

/// Weekly water goal bounds, in litres.
pub const WATER_GOAL_MIN_L: f64 = 3.0;
pub const WATER_GOAL_MAX_L: f64 = 40.0;
pub const WATER_GOAL_DEFAULT_L: f64 = 10.0;

/// Weekly CO2 goal bounds, in kilograms.
pub const CO2_GOAL_MIN_KG: f64 = 0.4;
pub const CO2_GOAL_MAX_KG: f64 = 5.0;
pub const CO2_GOAL_DEFAULT_KG: f64 = 1.0;

/// Accumulated savings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentalSavings {
    /// Grams of CO2.
    pub co2_saved: f64,
    /// Millilitres of water.
    pub water_saved: f64,
}

impl EnvironmentalSavings {
    /// Savings credited for `tokens_saved` tokens.
    pub fn from_tokens(tokens_saved: u64) -> Self {
        let tokens = tokens_saved as f64;
        Self {
            co2_saved: tokens * CO2_PER_TOKEN_G,
            water_saved: tokens * WATER_PER_TOKEN_ML,
        }
    }

    /// Adds another delta to the totals.
    pub fn add(&mut self, other: EnvironmentalSavings) {
        self.co2_saved += other.co2_saved;
        self.water_saved += other.water_saved;
    }

    pub fn is_zero(&self) -> bool {
        self.co2_saved == 0.0 && self.water_saved == 0.0
    }

    /// Short human summary, e.g. `"12.5 mL water, 1.0 g CO2"`.
    pub fn summary(&self) -> String {
        format!(
            "{} water, {} CO2",
            format_volume(self.water_saved),
            format_mass(self.co2_saved)
        )
    }
}

/// Formats millilitres, switching to litres past 1000 mL.
pub fn format_volume(ml: f64) -> String {
    if ml >= 1000.0 {
        format!("{:.2} L", ml / 1000.0)
    } else {
        format!("{:.1} mL", ml)
    }
}

/// Formats grams, switching to kilograms past 1000 g.
pub fn format_mass(grams: f64) -> String {
    if grams >= 1000.0 {
        format!("{:.2} kg", grams / 1000.0)
    } else {
        format!("{:.1} g", grams)
    }
}

/// User's weekly targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeeklyGoals {
    /// Litres of water per week.
    pub water_liters: f64,
    /// Kilograms of CO2 per week.
    pub co2_kg: f64,
}

impl Default for WeeklyGoals {
    fn default() -> Self {
        Self {
            water_liters: WATER_GOAL_DEFAULT_L,
            co2_kg: CO2_GOAL_DEFAULT_KG,
        }
    }
}

impl WeeklyGoals {
    /// Builds goals, clamping each value into its allowed range.
    ///
    /// Non-finite input falls back to the default for that goal.
    pub fn clamped(water_liters: f64, co2_kg: f64) -> Self {
        Self {
            water_liters: clamp_goal(
                water_liters,
                WATER_GOAL_MIN_L,
                WATER_GOAL_MAX_L,
                WATER_GOAL_DEFAULT_L,
            ),
            co2_kg: clamp_goal(co2_kg, CO2_GOAL_MIN_KG, CO2_GOAL_MAX_KG, CO2_GOAL_DEFAULT_KG),
        }
    }

    /// Progress of a week's savings toward the goals.
    pub fn progress(&self, week: &EnvironmentalSavings) -> GoalProgress {
        GoalProgress {
            water_percent: percent(week.water_saved / 1000.0, self.water_liters),
            co2_percent: percent(week.co2_saved / 1000.0, self.co2_kg),
        }
    }
}

fn clamp_goal(value: f64, min: f64, max: f64, default: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    }
}

fn percent(achieved: f64, goal: f64) -> f64 {
    if goal <= 0.0 {
        return 0.0;
    }
    (achieved / goal * 100.0).clamp(0.0, 100.0)
}

/// Percentages toward the weekly goals, each capped at 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub water_percent: f64,
    pub co2_percent: f64,
}
