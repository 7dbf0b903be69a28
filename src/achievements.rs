use crate::models::{AchievementUnlock, QuitState};
use crate::stats::{
    cigarettes_avoided, effective_baseline, money_saved, streaks, timer_state, tracking_start,
};
use chrono::{DateTime, TimeZone, Timelike};
use tracing::info;

const HOUR: i64 = 3600;
const DAY: i64 = 86_400;

/// Values a badge condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub elapsed_seconds: i64,
    pub money_saved: f64,
    pub cigarettes_avoided: i64,
    pub streak: u32,
    pub smoke_free_streak: u32,
    pub night_log: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum Condition {
    ElapsedAtLeast(i64),
    SavedAtLeast(f64),
    AvoidedAtLeast(i64),
    StreakAtLeast(u32),
    SmokeFreeAtLeast(u32),
    NightLog,
}

impl Condition {
    pub fn is_met(&self, progress: &Progress) -> bool {
        match *self {
            Condition::ElapsedAtLeast(seconds) => progress.elapsed_seconds >= seconds,
            Condition::SavedAtLeast(amount) => progress.money_saved >= amount,
            Condition::AvoidedAtLeast(count) => progress.cigarettes_avoided >= count,
            Condition::StreakAtLeast(days) => progress.streak >= days,
            Condition::SmokeFreeAtLeast(days) => progress.smoke_free_streak >= days,
            Condition::NightLog => progress.night_log,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Achievement {
    pub id: &'static str,
    pub title: &'static str,
    pub condition: Condition,
}

const fn badge(id: &'static str, title: &'static str, condition: Condition) -> Achievement {
    Achievement {
        id,
        title,
        condition,
    }
}

pub const ACHIEVEMENTS: &[Achievement] = &[
    badge("first_hour", "First Hour", Condition::ElapsedAtLeast(HOUR)),
    badge("first_day", "Day One", Condition::ElapsedAtLeast(DAY)),
    badge("first_week", "Week Warrior", Condition::ElapsedAtLeast(7 * DAY)),
    badge("two_weeks", "Fortnight Fighter", Condition::ElapsedAtLeast(14 * DAY)),
    badge("first_month", "Monthly Master", Condition::ElapsedAtLeast(30 * DAY)),
    badge("saver_10", "$10 Saved", Condition::SavedAtLeast(10.0)),
    badge("saver_50", "$50 Saved", Condition::SavedAtLeast(50.0)),
    badge("saver_100", "$100 Club", Condition::SavedAtLeast(100.0)),
    badge("avoided_20", "Pack Saved", Condition::AvoidedAtLeast(20)),
    badge("avoided_100", "5 Packs Saved", Condition::AvoidedAtLeast(100)),
    badge("avoided_200", "Carton Saved", Condition::AvoidedAtLeast(200)),
    badge("avoided_500", "Freedom Fighter", Condition::AvoidedAtLeast(500)),
    badge("streak_3", "3 Day Streak", Condition::StreakAtLeast(3)),
    badge("streak_7", "Week Streak", Condition::StreakAtLeast(7)),
    badge("streak_30", "Month Streak", Condition::StreakAtLeast(30)),
    badge("clean_3", "3 Days Clean", Condition::SmokeFreeAtLeast(3)),
    badge("clean_7", "Week Clean", Condition::SmokeFreeAtLeast(7)),
    badge("clean_30", "Month Clean", Condition::SmokeFreeAtLeast(30)),
    badge("night_owl", "Night Owl", Condition::NightLog),
];

pub fn progress_at<Tz: TimeZone>(state: &QuitState, now: &DateTime<Tz>) -> Progress {
    let anchor = tracking_start(state);
    let baseline = effective_baseline(state);
    let streaks = streaks(state, now);
    let tz = now.timezone();

    Progress {
        elapsed_seconds: timer_state(state.last_cigarette, Some(state.target_interval), now)
            .elapsed_seconds,
        money_saved: money_saved(
            baseline,
            state.pack_price,
            state.cigs_per_pack,
            &state.cigarette_log,
            anchor,
            now,
        ),
        cigarettes_avoided: cigarettes_avoided(baseline, &state.cigarette_log, anchor, now),
        streak: streaks.under_limit,
        smoke_free_streak: streaks.smoke_free,
        night_log: state
            .cigarette_log
            .iter()
            .any(|ts| ts.with_timezone(&tz).hour() < 5),
    }
}

/// Records every newly met badge with its unlock time and returns their ids.
///
/// Badges already present in the map are left untouched.
pub fn check_achievements<Tz: TimeZone>(
    state: &mut QuitState,
    now: &DateTime<Tz>,
) -> Vec<String> {
    let progress = progress_at(state, now);
    let unlocked_at = now.timestamp_millis();
    let mut unlocked = Vec::new();

    for achievement in ACHIEVEMENTS {
        let already = state
            .achievements
            .get(achievement.id)
            .is_some_and(AchievementUnlock::is_unlocked);
        if already || !achievement.condition.is_met(&progress) {
            continue;
        }
        state
            .achievements
            .insert(achievement.id.to_string(), AchievementUnlock::At(unlocked_at));
        info!(
            target: "achievements",
            id = achievement.id,
            title = achievement.title,
            "achievement unlocked"
        );
        unlocked.push(achievement.id.to_string());
    }

    unlocked
}
