use crate::achievements::check_achievements;
use crate::cravings::{craving_patterns, delete_craving as remove_craving};
use crate::errors::AppError;
use crate::models::{
    CravingEntry, CravingRequest, CravingsResponse, HealthResponse, LogResponse, QuitState,
    RestoreRequest, RestoreResponse, SettingsUpdate, ShareCodeResponse, StatsSnapshot, TimerState,
};
use crate::share_code::{
    self, AUTO_INCREASE_RANGE, BASELINE_RANGE, CIGS_PER_PACK_RANGE, DAILY_LIMIT_RANGE,
    PACK_PRICE_RANGE, TARGET_INTERVAL_RANGE,
};
use crate::state::AppState;
use crate::stats::{auto_increase, build_stats_at, timer_state};
use crate::storage::{clear_state, save_state};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Local, Utc};
use tracing::{info, warn};

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn get_state(State(state): State<AppState>) -> Json<QuitState> {
    let data = state.data.lock().await;
    Json(data.clone())
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    let now = state.clock.now();
    let mut data = state.data.lock().await;
    let derived = refresh_derived(&mut data, now);
    if derived.changed {
        save_state(state.store.as_ref(), &data).await;
    }
    Json(derived.stats)
}

pub async fn get_timer(State(state): State<AppState>) -> Json<TimerState> {
    let now = state.clock.now();
    let data = state.data.lock().await;
    Json(timer_state(data.last_cigarette, Some(data.target_interval), &now))
}

pub async fn complete_onboarding(
    State(state): State<AppState>,
    Json(payload): Json<SettingsUpdate>,
) -> Result<Json<QuitState>, AppError> {
    let now = state.clock.now();
    let mut data = state.data.lock().await;
    apply_settings(&mut data, payload)?;
    data.last_cigarette = Some(now);
    data.first_run = false;

    save_state(state.store.as_ref(), &data).await;
    info!(baseline = data.baseline_per_day, "onboarding completed");
    Ok(Json(data.clone()))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<SettingsUpdate>,
) -> Result<Json<QuitState>, AppError> {
    let mut data = state.data.lock().await;
    apply_settings(&mut data, payload)?;
    save_state(state.store.as_ref(), &data).await;
    Ok(Json(data.clone()))
}

pub async fn log_cigarette(State(state): State<AppState>) -> Json<LogResponse> {
    let now = state.clock.now();
    let mut data = state.data.lock().await;
    let early = timer_state(data.last_cigarette, Some(data.target_interval), &now).is_early;

    data.cigarette_log.push(now);
    data.last_cigarette = Some(now);
    let derived = refresh_derived(&mut data, now);

    save_state(state.store.as_ref(), &data).await;
    info!(early, today = derived.stats.today_count, "cigarette logged");

    Json(LogResponse {
        logged_at: now,
        stats: derived.stats,
        unlocked: derived.unlocked,
    })
}

pub async fn log_craving(
    State(state): State<AppState>,
    Json(payload): Json<CravingRequest>,
) -> Json<CravingEntry> {
    let entry = CravingEntry {
        trigger: payload.trigger.trim().to_string(),
        notes: payload.notes.trim().to_string(),
        timestamp: state.clock.now(),
    };
    let mut data = state.data.lock().await;
    data.cravings_log.push(entry.clone());
    save_state(state.store.as_ref(), &data).await;
    Json(entry)
}

pub async fn list_cravings(State(state): State<AppState>) -> Json<CravingsResponse> {
    let now = state.clock.now().with_timezone(&Local);
    let data = state.data.lock().await;
    Json(CravingsResponse {
        entries: data.cravings_log.clone(),
        patterns: craving_patterns(&data.cravings_log, &now),
    })
}

/// Deletes the craving logged at the given epoch milliseconds.
pub async fn delete_craving(
    State(state): State<AppState>,
    Path(at): Path<i64>,
) -> Result<Json<CravingsResponse>, AppError> {
    let at = DateTime::from_timestamp_millis(at)
        .ok_or_else(|| AppError::bad_request("invalid craving timestamp"))?;
    let now = state.clock.now().with_timezone(&Local);
    let mut data = state.data.lock().await;
    if remove_craving(&mut data.cravings_log, at) == 0 {
        return Err(AppError::not_found("craving not found"));
    }
    save_state(state.store.as_ref(), &data).await;
    info!(remaining = data.cravings_log.len(), "craving removed");

    Ok(Json(CravingsResponse {
        entries: data.cravings_log.clone(),
        patterns: craving_patterns(&data.cravings_log, &now),
    }))
}

pub async fn get_share_code(
    State(state): State<AppState>,
) -> Result<Json<ShareCodeResponse>, AppError> {
    let data = state.data.lock().await;
    let code = share_code::encode(&data)?;
    Ok(Json(ShareCodeResponse { code }))
}

pub async fn restore(
    State(state): State<AppState>,
    Json(payload): Json<RestoreRequest>,
) -> Result<Json<RestoreResponse>, AppError> {
    let now = state.clock.now();
    let mut data = state.data.lock().await;
    let restored = share_code::decode(&payload.code, &data, now).inspect_err(|err| {
        warn!("restore rejected: {err}");
    })?;

    *data = restored;
    let stats = refresh_derived(&mut data, now).stats;
    save_state(state.store.as_ref(), &data).await;
    info!(entries = data.cigarette_log.len(), "state restored from share code");

    Ok(Json(RestoreResponse {
        restored: true,
        stats,
    }))
}

pub async fn reset(State(state): State<AppState>) -> Json<QuitState> {
    let mut data = state.data.lock().await;
    *data = QuitState::default();
    clear_state(state.store.as_ref()).await;
    info!("progress reset");
    Json(data.clone())
}

struct Derived {
    stats: StatsSnapshot,
    unlocked: Vec<String>,
    /// Something worth persisting changed besides the streaks.
    changed: bool,
}

/// Runs the daily interval progression, unlocks new badges and recomputes
/// derived values, storing the streaks.
fn refresh_derived(data: &mut QuitState, now: DateTime<Utc>) -> Derived {
    let local = now.with_timezone(&Local);
    let checked_before = data.last_auto_increase_check;
    if let Some(raised) = auto_increase(data, &local) {
        info!(
            from = raised.from,
            to = raised.to,
            yesterday = raised.yesterday_count,
            "target interval increased"
        );
    }
    let unlocked = check_achievements(data, &local);
    let stats = build_stats_at(data, &local);
    data.streak = stats.streak;
    data.smoke_free_streak = stats.smoke_free_streak;

    Derived {
        changed: !unlocked.is_empty() || data.last_auto_increase_check != checked_before,
        stats,
        unlocked,
    }
}

fn apply_settings(data: &mut QuitState, update: SettingsUpdate) -> Result<(), AppError> {
    let checked = |name: &str, value: Option<f64>, (min, max): (f64, f64)| match value {
        Some(number) if !(number >= min && number <= max) => Err(AppError::bad_request(format!(
            "{name} must be between {min} and {max}"
        ))),
        other => Ok(other),
    };

    let target_interval = checked("targetInterval", update.target_interval, TARGET_INTERVAL_RANGE)?;
    let daily_limit = checked("dailyLimit", update.daily_limit, DAILY_LIMIT_RANGE)?;
    let baseline = checked("baselinePerDay", update.baseline_per_day, BASELINE_RANGE)?;
    let pack_price = checked("packPrice", update.pack_price, PACK_PRICE_RANGE)?;
    let cigs_per_pack = checked("cigsPerPack", update.cigs_per_pack, CIGS_PER_PACK_RANGE)?;
    let auto_increase_amount = checked(
        "autoIncreaseAmount",
        update.auto_increase_amount,
        AUTO_INCREASE_RANGE,
    )?;
    let currency = match update.currency {
        Some(code) if code.trim().is_empty() => {
            return Err(AppError::bad_request("currency must not be empty"));
        }
        other => other.map(|code| code.trim().to_string()),
    };

    if let Some(value) = target_interval {
        data.target_interval = value;
    }
    if let Some(value) = daily_limit {
        data.daily_limit = value;
    }
    if let Some(value) = baseline {
        data.baseline_per_day = value;
    }
    if let Some(value) = pack_price {
        data.pack_price = value;
    }
    if let Some(value) = cigs_per_pack {
        data.cigs_per_pack = value;
    }
    if let Some(value) = auto_increase_amount {
        data.auto_increase_amount = value;
    }
    if let Some(enabled) = update.auto_increase {
        data.auto_increase = enabled;
    }
    if let Some(value) = currency {
        data.currency = value;
    }
    if let Some(value) = update.quit_date {
        data.quit_date = Some(value);
    }
    Ok(())
}
