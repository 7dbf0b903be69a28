use crate::models::{
    IntervalIncrease, QuitState, StatsSnapshot, Streaks, TimerState, DEFAULT_AUTO_INCREASE,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;

const MS_PER_DAY: i64 = 86_400_000;
const STREAK_LOOKBACK_DAYS: usize = 365;
const MAX_TARGET_INTERVAL: f64 = 1440.0;

pub fn build_stats_at<Tz: TimeZone>(state: &QuitState, now: &DateTime<Tz>) -> StatsSnapshot {
    let anchor = tracking_start(state);
    let baseline = effective_baseline(state);
    let streaks = streaks(state, now);

    StatsSnapshot {
        cigarettes_avoided: cigarettes_avoided(baseline, &state.cigarette_log, anchor, now),
        money_saved: money_saved(
            baseline,
            state.pack_price,
            state.cigs_per_pack,
            &state.cigarette_log,
            anchor,
            now,
        ),
        currency: state.currency.clone(),
        timer: timer_state(state.last_cigarette, Some(state.target_interval), now),
        streak: streaks.under_limit,
        smoke_free_streak: streaks.smoke_free,
        today_count: count_on_day(&state.cigarette_log, now.date_naive(), &now.timezone()),
        daily_limit: state.daily_limit,
        average_interval_minutes: average_interval_minutes(&state.cigarette_log),
        daily_average: daily_average(state, now),
        total_logged: state.cigarette_log.len(),
    }
}

/// Baseline-implied cigarettes minus logged ones since the anchor day.
///
/// The anchor is midnight of `quit_date`, or of the earliest log entry when no
/// quit date is given. The anchor day counts as a full day of baseline even
/// when `now` falls on it. The result can be negative.
pub fn cigarettes_avoided<Tz: TimeZone>(
    baseline_per_day: f64,
    cigarette_log: &[DateTime<Utc>],
    quit_date: Option<DateTime<Utc>>,
    now: &DateTime<Tz>,
) -> i64 {
    if !(baseline_per_day > 0.0) {
        return 0;
    }

    let tz = now.timezone();
    let anchor_day = match quit_date {
        Some(quit) => local_day(&quit, &tz),
        None => match cigarette_log.iter().min() {
            Some(first) => local_day(first, &tz),
            None => return 0,
        },
    };

    let diff_ms = (midnight_ms(now.date_naive(), &tz) - midnight_ms(anchor_day, &tz)).max(0);
    let days = (diff_ms.div_euclid(MS_PER_DAY) + 1).max(1);

    round_half_up(baseline_per_day * days as f64 - cigarette_log.len() as f64) as i64
}

/// Money not spent on avoided cigarettes, rounded to cents.
pub fn money_saved<Tz: TimeZone>(
    baseline_per_day: f64,
    pack_price: f64,
    cigs_per_pack: f64,
    cigarette_log: &[DateTime<Utc>],
    quit_date: Option<DateTime<Utc>>,
    now: &DateTime<Tz>,
) -> f64 {
    if !(baseline_per_day > 0.0) || !(pack_price > 0.0) || !(cigs_per_pack > 0.0) {
        return 0.0;
    }

    let avoided = cigarettes_avoided(baseline_per_day, cigarette_log, quit_date, now);
    let cost_per_cigarette = pack_price / cigs_per_pack;
    let rounded = round_half_up(avoided as f64 * cost_per_cigarette * 100.0) / 100.0;

    // normalize -0.0
    if rounded == 0.0 { 0.0 } else { rounded }
}

pub fn timer_state<Tz: TimeZone>(
    last_cigarette: Option<DateTime<Utc>>,
    target_interval_minutes: Option<f64>,
    now: &DateTime<Tz>,
) -> TimerState {
    let idle = TimerState {
        is_early: false,
        elapsed_seconds: 0,
        remaining_seconds: 0,
    };

    let (Some(last), Some(interval)) = (last_cigarette, target_interval_minutes) else {
        return idle;
    };
    if interval == 0.0 || interval.is_nan() {
        return idle;
    }

    let elapsed_seconds = (now.timestamp_millis() - last.timestamp_millis())
        .div_euclid(1000)
        .max(0);
    let target_seconds = interval * 60.0;
    let remaining_seconds = (target_seconds - elapsed_seconds as f64).max(0.0).ceil() as i64;

    TimerState {
        is_early: (elapsed_seconds as f64) < target_seconds,
        elapsed_seconds,
        remaining_seconds,
    }
}

/// Start of tracking: the last cigarette when nothing has been logged yet
/// (set at onboarding), otherwise the earliest known timestamp.
pub fn tracking_start(state: &QuitState) -> Option<DateTime<Utc>> {
    if state.cigarette_log.is_empty() {
        if let Some(last) = state.last_cigarette {
            return Some(last);
        }
    }

    [
        state.quit_date,
        state.cigarette_log.iter().min().copied(),
        state.last_cigarette,
    ]
    .into_iter()
    .flatten()
    .min()
}

pub fn count_on_day<Tz: TimeZone>(log: &[DateTime<Utc>], day: NaiveDate, tz: &Tz) -> usize {
    log.iter().filter(|ts| local_day(ts, tz) == day).count()
}

/// Completed-day streaks, walking back from yesterday.
///
/// Days that start before tracking began are not counted.
pub fn streaks<Tz: TimeZone>(state: &QuitState, now: &DateTime<Tz>) -> Streaks {
    let none = Streaks {
        under_limit: 0,
        smoke_free: 0,
    };
    if state.cigarette_log.is_empty() && state.last_cigarette.is_none() {
        return none;
    }
    let Some(start) = tracking_start(state) else {
        return none;
    };

    let tz = now.timezone();
    let counts = daily_counts(&state.cigarette_log, &tz);
    let Some(yesterday) = now.date_naive().pred_opt() else {
        return none;
    };
    let start_ms = start.timestamp_millis();

    let walk = |accept: &dyn Fn(usize) -> bool| -> u32 {
        let mut streak = 0;
        let mut day = yesterday;
        for _ in 0..STREAK_LOOKBACK_DAYS {
            if midnight_ms(day, &tz) < start_ms {
                break;
            }
            let count = counts.get(&day).copied().unwrap_or(0);
            if !accept(count) {
                break;
            }
            streak += 1;
            match day.pred_opt() {
                Some(prev) => day = prev,
                None => break,
            }
        }
        streak
    };

    Streaks {
        under_limit: walk(&|count: usize| (count as f64) <= state.daily_limit),
        smoke_free: walk(&|count: usize| count == 0),
    }
}

/// Daily interval progression. Runs at most once per local day: when
/// yesterday had at least one cigarette and stayed within the daily limit,
/// the target interval grows by `auto_increase_amount`, capped at a day.
pub fn auto_increase<Tz: TimeZone>(
    state: &mut QuitState,
    now: &DateTime<Tz>,
) -> Option<IntervalIncrease> {
    if !state.auto_increase {
        return None;
    }
    let today = now.date_naive();
    if state.last_auto_increase_check == Some(today) {
        return None;
    }
    state.last_auto_increase_check = Some(today);

    let yesterday = today.pred_opt()?;
    let yesterday_count = count_on_day(&state.cigarette_log, yesterday, &now.timezone());
    if yesterday_count == 0 || (yesterday_count as f64) > state.daily_limit {
        return None;
    }

    let amount = if state.auto_increase_amount > 0.0 {
        state.auto_increase_amount
    } else {
        DEFAULT_AUTO_INCREASE
    };
    let from = state.target_interval;
    let to = (from + amount).min(MAX_TARGET_INTERVAL);
    if !(to > from) {
        return None;
    }
    state.target_interval = to;
    Some(IntervalIncrease {
        from,
        to,
        yesterday_count,
    })
}

/// Mean gap between consecutive log entries, in whole minutes.
pub fn average_interval_minutes(log: &[DateTime<Utc>]) -> Option<i64> {
    if log.len() < 2 {
        return None;
    }
    let total_ms: i64 = log
        .windows(2)
        .map(|pair| pair[1].timestamp_millis() - pair[0].timestamp_millis())
        .sum();
    Some(total_ms.div_euclid(log.len() as i64 - 1).div_euclid(60_000))
}

pub fn daily_average<Tz: TimeZone>(state: &QuitState, now: &DateTime<Tz>) -> f64 {
    let Some(start) = tracking_start(state) else {
        return 0.0;
    };
    let elapsed_days =
        ((now.timestamp_millis() - start.timestamp_millis()) as f64 / MS_PER_DAY as f64).max(1.0);
    state.cigarette_log.len() as f64 / elapsed_days
}

/// Baseline used for derived values; older saves may only carry a daily limit.
pub fn effective_baseline(state: &QuitState) -> f64 {
    if state.baseline_per_day > 0.0 {
        state.baseline_per_day
    } else if state.daily_limit > 0.0 {
        state.daily_limit
    } else {
        0.0
    }
}

fn daily_counts<Tz: TimeZone>(log: &[DateTime<Utc>], tz: &Tz) -> BTreeMap<NaiveDate, usize> {
    let mut counts = BTreeMap::new();
    for ts in log {
        *counts.entry(local_day(ts, tz)).or_insert(0) += 1;
    }
    counts
}

fn local_day<Tz: TimeZone>(ts: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}

fn midnight_ms<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> i64 {
    let naive = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}
