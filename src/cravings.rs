use crate::models::{CravingEntry, CravingPatterns, Trend, TriggerCount};
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};

const MIN_ENTRIES: usize = 3;
const TOP_TRIGGERS: usize = 5;

struct TrendCounts {
    recent: usize,
    previous: usize,
}

/// Pattern insights over the craving log, once there are enough entries to
/// say anything. Hours and weekdays are taken in the zone of `now`; ties go to
/// the earliest hour and to the week's first day (Sunday).
pub fn craving_patterns<Tz: TimeZone>(
    log: &[CravingEntry],
    now: &DateTime<Tz>,
) -> Option<CravingPatterns> {
    if log.len() < MIN_ENTRIES {
        return None;
    }

    let tz = now.timezone();
    let mut triggers: Vec<TriggerCount> = Vec::new();
    let mut hours = [0usize; 24];
    let mut weekdays = [0usize; 7];

    for entry in log {
        let trigger = entry.trigger.trim().to_lowercase();
        if !trigger.is_empty() {
            match triggers.iter_mut().find(|seen| seen.trigger == trigger) {
                Some(seen) => seen.count += 1,
                None => triggers.push(TriggerCount { trigger, count: 1 }),
            }
        }

        let local = entry.timestamp.with_timezone(&tz);
        hours[local.hour() as usize] += 1;
        weekdays[local.weekday().num_days_from_sunday() as usize] += 1;
    }

    // stable sort keeps first-seen order among equal counts
    triggers.sort_by(|a, b| b.count.cmp(&a.count));
    triggers.truncate(TOP_TRIGGERS);

    let week = trend_counts(log, now.with_timezone(&Utc));
    Some(CravingPatterns {
        top_triggers: triggers,
        peak_hour: peak_index(&hours) as u32,
        peak_weekday: weekday_from_sunday(peak_index(&weekdays)),
        recent_count: week.recent,
        previous_count: week.previous,
        trend: week.trend(),
    })
}

/// Removes every craving logged within the millisecond of `at`; returns how
/// many were removed.
pub fn delete_craving(log: &mut Vec<CravingEntry>, at: DateTime<Utc>) -> usize {
    let before = log.len();
    let at_ms = at.timestamp_millis();
    log.retain(|entry| entry.timestamp.timestamp_millis() != at_ms);
    before - log.len()
}

/// Cravings in the last seven days against the seven days before.
fn trend_counts(log: &[CravingEntry], now: DateTime<Utc>) -> TrendCounts {
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);
    TrendCounts {
        recent: log.iter().filter(|e| e.timestamp >= week_ago).count(),
        previous: log
            .iter()
            .filter(|e| e.timestamp >= two_weeks_ago && e.timestamp < week_ago)
            .count(),
    }
}

impl TrendCounts {
    fn trend(&self) -> Trend {
        match self.recent.cmp(&self.previous) {
            std::cmp::Ordering::Less => Trend::Improving,
            std::cmp::Ordering::Equal => Trend::Steady,
            std::cmp::Ordering::Greater => Trend::Worsening,
        }
    }
}

fn peak_index(counts: &[usize]) -> usize {
    let max = counts.iter().copied().max().unwrap_or(0);
    counts.iter().position(|&count| count == max).unwrap_or(0)
}

fn weekday_from_sunday(index: usize) -> Weekday {
    match index {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}
