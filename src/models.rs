use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_TARGET_INTERVAL: f64 = 60.0;
pub const DEFAULT_DAILY_LIMIT: f64 = 10.0;
pub const DEFAULT_BASELINE_PER_DAY: f64 = 10.0;
pub const DEFAULT_PACK_PRICE: f64 = 8.0;
pub const DEFAULT_CIGS_PER_PACK: f64 = 20.0;
pub const DEFAULT_AUTO_INCREASE: f64 = 5.0;
pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CravingEntry {
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

/// Badge state: older saves store a flag, newer ones the unlock time in ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AchievementUnlock {
    Flag(bool),
    At(i64),
}

impl AchievementUnlock {
    pub fn is_unlocked(&self) -> bool {
        match self {
            AchievementUnlock::Flag(flag) => *flag,
            AchievementUnlock::At(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuitState {
    pub last_cigarette: Option<DateTime<Utc>>,
    pub quit_date: Option<DateTime<Utc>>,
    pub cigarette_log: Vec<DateTime<Utc>>,
    pub cravings_log: Vec<CravingEntry>,
    pub baseline_per_day: f64,
    pub daily_limit: f64,
    pub target_interval: f64,
    pub pack_price: f64,
    pub cigs_per_pack: f64,
    pub currency: String,
    pub auto_increase: bool,
    pub auto_increase_amount: f64,
    /// Local day the interval auto-increase last ran.
    pub last_auto_increase_check: Option<NaiveDate>,
    pub total_avoided: f64,
    pub streak: u32,
    pub smoke_free_streak: u32,
    pub achievements: BTreeMap<String, AchievementUnlock>,
    pub first_run: bool,
}

impl Default for QuitState {
    fn default() -> Self {
        Self {
            last_cigarette: None,
            quit_date: None,
            cigarette_log: Vec::new(),
            cravings_log: Vec::new(),
            baseline_per_day: DEFAULT_BASELINE_PER_DAY,
            daily_limit: DEFAULT_DAILY_LIMIT,
            target_interval: DEFAULT_TARGET_INTERVAL,
            pack_price: DEFAULT_PACK_PRICE,
            cigs_per_pack: DEFAULT_CIGS_PER_PACK,
            currency: DEFAULT_CURRENCY.to_string(),
            auto_increase: true,
            auto_increase_amount: DEFAULT_AUTO_INCREASE,
            last_auto_increase_check: None,
            total_avoided: 0.0,
            streak: 0,
            smoke_free_streak: 0,
            achievements: BTreeMap::new(),
            first_run: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub is_early: bool,
    pub elapsed_seconds: i64,
    pub remaining_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    pub under_limit: u32,
    pub smoke_free: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cigarettes_avoided: i64,
    pub money_saved: f64,
    pub currency: String,
    pub timer: TimerState,
    pub streak: u32,
    pub smoke_free_streak: u32,
    pub today_count: usize,
    pub daily_limit: f64,
    pub average_interval_minutes: Option<i64>,
    pub daily_average: f64,
    pub total_logged: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub target_interval: Option<f64>,
    pub daily_limit: Option<f64>,
    pub baseline_per_day: Option<f64>,
    pub pack_price: Option<f64>,
    pub cigs_per_pack: Option<f64>,
    pub currency: Option<String>,
    pub auto_increase: Option<bool>,
    pub auto_increase_amount: Option<f64>,
    pub quit_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CravingRequest {
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerCount {
    pub trigger: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Steady,
    Worsening,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CravingPatterns {
    pub top_triggers: Vec<TriggerCount>,
    pub peak_hour: u32,
    pub peak_weekday: Weekday,
    pub recent_count: usize,
    pub previous_count: usize,
    pub trend: Trend,
}

#[derive(Debug, Serialize)]
pub struct CravingsResponse {
    pub entries: Vec<CravingEntry>,
    pub patterns: Option<CravingPatterns>,
}

/// Result of a daily auto-increase run that raised the target interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalIncrease {
    pub from: f64,
    pub to: f64,
    pub yesterday_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareCodeResponse {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub restored: bool,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub logged_at: DateTime<Utc>,
    pub stats: StatsSnapshot,
    pub unlocked: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
