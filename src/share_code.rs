//! Share codes: a portable backup of the whole quit state.
//!
//! A code is the base64 form of URI-component-encoded JSON with compact keys.
//! Decoding never trusts the payload: every numeric field is range-checked and
//! falls back to the prior value (or a default), dates in the future or that
//! fail to parse are discarded, and only a payload that cannot be read at all
//! is reported as an error.

use crate::models::{
    AchievementUnlock, CravingEntry, QuitState, DEFAULT_AUTO_INCREASE, DEFAULT_BASELINE_PER_DAY,
    DEFAULT_CIGS_PER_PACK, DEFAULT_CURRENCY, DEFAULT_DAILY_LIMIT, DEFAULT_PACK_PRICE,
    DEFAULT_TARGET_INTERVAL,
};
use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD},
        DecodePaddingMode,
    },
    Engine,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

pub const SHARE_CODE_VERSION: u32 = 3;

/// Characters left untouched by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub const TARGET_INTERVAL_RANGE: (f64, f64) = (1.0, 1440.0);
pub const DAILY_LIMIT_RANGE: (f64, f64) = (1.0, 200.0);
pub const BASELINE_RANGE: (f64, f64) = (1.0, 200.0);
pub const PACK_PRICE_RANGE: (f64, f64) = (0.0, 1000.0);
pub const CIGS_PER_PACK_RANGE: (f64, f64) = (1.0, 100.0);
pub const AUTO_INCREASE_RANGE: (f64, f64) = (1.0, 60.0);
const COUNTER_RANGE: (f64, f64) = (0.0, 999_999.0);

#[derive(Debug, Error)]
pub enum ShareCodeError {
    #[error("enter a code")]
    Empty,
    #[error("invalid or corrupted code")]
    Invalid,
    #[error("failed to encode share code: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct SharePayload<'a> {
    v: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    lc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    qd: Option<String>,
    ti: f64,
    dl: f64,
    bp: f64,
    pp: f64,
    cpp: f64,
    curr: &'a str,
    ai: f64,
    cl: Vec<String>,
    cr: &'a [CravingEntry],
    ta: f64,
    s: u32,
    ach: &'a BTreeMap<String, AchievementUnlock>,
}

/// Decoded payload before validation. Values stay untyped so that a field of
/// the wrong type falls back instead of failing the whole restore. Saves that
/// carry the long field names take precedence over the compact keys.
#[derive(Debug)]
struct RawPayload<'a> {
    v: Option<&'a Value>,
    lc: Option<&'a Value>,
    qd: Option<&'a Value>,
    ti: Option<&'a Value>,
    dl: Option<&'a Value>,
    bp: Option<&'a Value>,
    pp: Option<&'a Value>,
    cpp: Option<&'a Value>,
    curr: Option<&'a Value>,
    ai: Option<&'a Value>,
    cl: Option<&'a Value>,
    cr: Option<&'a Value>,
    ta: Option<&'a Value>,
    s: Option<&'a Value>,
    ach: Option<&'a Value>,
}

impl<'a> RawPayload<'a> {
    fn from_object(object: &'a Map<String, Value>) -> Self {
        Self {
            v: object.get("v"),
            lc: field(object, "lastCigarette", "lc"),
            qd: field(object, "quitDate", "qd"),
            ti: field(object, "targetInterval", "ti"),
            dl: field(object, "dailyLimit", "dl"),
            bp: field(object, "baselinePerDay", "bp"),
            pp: field(object, "packPrice", "pp"),
            cpp: field(object, "cigsPerPack", "cpp"),
            curr: field(object, "currency", "curr"),
            ai: field(object, "autoIncreaseAmount", "ai"),
            cl: field(object, "cigaretteLog", "cl"),
            cr: field(object, "cravingsLog", "cr"),
            ta: field(object, "totalAvoided", "ta"),
            s: field(object, "streak", "s"),
            ach: field(object, "achievements", "ach"),
        }
    }
}

/// The long name when present and not null, else the compact key.
fn field<'a>(object: &'a Map<String, Value>, long: &str, short: &str) -> Option<&'a Value> {
    object
        .get(long)
        .filter(|value| !value.is_null())
        .or_else(|| object.get(short))
}

pub fn encode(state: &QuitState) -> Result<String, ShareCodeError> {
    let payload = SharePayload {
        v: SHARE_CODE_VERSION,
        lc: state.last_cigarette.map(iso_string),
        qd: state.quit_date.map(iso_string),
        ti: state.target_interval,
        dl: state.daily_limit,
        bp: state.baseline_per_day,
        pp: state.pack_price,
        cpp: state.cigs_per_pack,
        curr: &state.currency,
        ai: state.auto_increase_amount,
        cl: state.cigarette_log.iter().copied().map(iso_string).collect(),
        cr: &state.cravings_log,
        ta: state.total_avoided,
        s: state.streak,
        ach: &state.achievements,
    };

    let json = serde_json::to_string(&payload)?;
    let escaped = utf8_percent_encode(&json, URI_COMPONENT).to_string();
    Ok(STANDARD.encode(escaped))
}

/// Decodes `code` into a sanitized state. `prior` supplies fallbacks for
/// rejected fields and `now` is the cut-off for future dates.
pub fn decode(
    code: &str,
    prior: &QuitState,
    now: DateTime<Utc>,
) -> Result<QuitState, ShareCodeError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ShareCodeError::Empty);
    }

    let object = read_payload(code)?;
    let raw = RawPayload::from_object(&object);
    if let Some(version) = raw.v.and_then(Value::as_u64) {
        if version != u64::from(SHARE_CODE_VERSION) {
            debug!(version, "restoring share code from older schema");
        }
    }

    let log_len_before = raw.cl.and_then(Value::as_array).map_or(0, Vec::len);
    let cigarette_log = date_list(raw.cl, now);
    if cigarette_log.len() != log_len_before {
        warn!(
            dropped = log_len_before - cigarette_log.len(),
            "discarded invalid or future cigarette log entries"
        );
    }

    Ok(QuitState {
        last_cigarette: raw.lc.and_then(|value| parse_date(value, now)),
        quit_date: raw.qd.and_then(|value| parse_date(value, now)),
        cigarette_log,
        cravings_log: cravings(raw.cr, now),
        target_interval: bounded(
            raw.ti,
            TARGET_INTERVAL_RANGE,
            positive_or(prior.target_interval, DEFAULT_TARGET_INTERVAL),
        ),
        daily_limit: bounded(
            raw.dl,
            DAILY_LIMIT_RANGE,
            in_range_or(prior.daily_limit, DAILY_LIMIT_RANGE, DEFAULT_DAILY_LIMIT),
        ),
        baseline_per_day: bounded(
            raw.bp,
            BASELINE_RANGE,
            if prior.baseline_per_day >= 1.0 {
                prior.baseline_per_day
            } else {
                DEFAULT_BASELINE_PER_DAY
            },
        ),
        pack_price: bounded(
            raw.pp,
            PACK_PRICE_RANGE,
            if prior.pack_price >= 0.0 {
                prior.pack_price
            } else {
                DEFAULT_PACK_PRICE
            },
        ),
        cigs_per_pack: bounded(
            raw.cpp,
            CIGS_PER_PACK_RANGE,
            positive_or(prior.cigs_per_pack, DEFAULT_CIGS_PER_PACK),
        ),
        currency: match raw.curr.and_then(Value::as_str) {
            Some(code) if !code.trim().is_empty() => code.to_string(),
            _ if !prior.currency.is_empty() => prior.currency.clone(),
            _ => DEFAULT_CURRENCY.to_string(),
        },
        auto_increase: prior.auto_increase,
        auto_increase_amount: bounded(
            raw.ai,
            AUTO_INCREASE_RANGE,
            positive_or(prior.auto_increase_amount, DEFAULT_AUTO_INCREASE),
        ),
        last_auto_increase_check: prior.last_auto_increase_check,
        total_avoided: bounded(raw.ta, COUNTER_RANGE, 0.0),
        streak: bounded(raw.s, COUNTER_RANGE, 0.0) as u32,
        smoke_free_streak: prior.smoke_free_streak,
        achievements: match raw.ach {
            Some(Value::Object(map)) => achievements(map),
            _ => prior.achievements.clone(),
        },
        first_run: false,
    })
}

/// Accepts codes with or without `=` padding and with whitespace or line
/// breaks inside, the way pasted codes tend to arrive.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn read_payload(code: &str) -> Result<Map<String, Value>, ShareCodeError> {
    let compact: String = code.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = LENIENT.decode(compact).map_err(|err| {
        debug!(%err, "share code is not base64");
        ShareCodeError::Invalid
    })?;
    let escaped = String::from_utf8(bytes).map_err(|_| ShareCodeError::Invalid)?;
    let json = percent_decode_str(&escaped)
        .decode_utf8()
        .map_err(|_| ShareCodeError::Invalid)?;
    let value: Value = serde_json::from_str(&json).map_err(|err| {
        debug!(%err, "share code does not contain JSON");
        ShareCodeError::Invalid
    })?;

    let Value::Object(mut object) = value else {
        debug!("share code payload is not an object");
        return Err(ShareCodeError::Invalid);
    };
    if let Some(Value::Object(inner)) = object.remove("state") {
        object = inner;
    }
    Ok(object)
}

/// Numbers inside `[min, max]` pass; anything else, including non-numbers,
/// yields `fallback`.
fn bounded(value: Option<&Value>, (min, max): (f64, f64), fallback: f64) -> f64 {
    match value.and_then(Value::as_f64) {
        Some(number) if number >= min && number <= max => number,
        _ => fallback,
    }
}

fn positive_or(prior: f64, default: f64) -> f64 {
    if prior > 0.0 { prior } else { default }
}

fn in_range_or(prior: f64, (min, max): (f64, f64), default: f64) -> f64 {
    if prior >= min && prior <= max { prior } else { default }
}

fn parse_date(value: &Value, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::String(text) => parse_date_str(text),
        Value::Number(number) => number.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }?;
    (parsed <= now).then_some(parsed)
}

fn parse_date_str(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn date_list(value: Option<&Value>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| parse_date(item, now))
            .collect(),
        _ => Vec::new(),
    }
}

fn cravings(value: Option<&Value>, now: DateTime<Utc>) -> Vec<CravingEntry> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let entry = item.as_object()?;
            let timestamp = parse_date(entry.get("timestamp")?, now)?;
            let text = |key: &str| {
                entry
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Some(CravingEntry {
                trigger: text("trigger"),
                notes: text("notes"),
                timestamp,
            })
        })
        .collect()
}

fn achievements(map: &Map<String, Value>) -> BTreeMap<String, AchievementUnlock> {
    map.iter()
        .filter_map(|(id, value)| {
            let unlock = match value {
                Value::Bool(flag) => AchievementUnlock::Flag(*flag),
                Value::Number(number) => {
                    let at = number
                        .as_i64()
                        .or_else(|| number.as_f64().map(|ms| ms as i64))?;
                    AchievementUnlock::At(at)
                }
                _ => return None,
            };
            Some((id.clone(), unlock))
        })
        .collect()
}

fn iso_string(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
