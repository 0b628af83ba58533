//! Expiry day-index encoding.
//!
//! Expiry dates are stored as a day index: whole days since [`epoch`],
//! wrapped modulo [`LIFETIME_DAYS`]. Wrapping bounds the number of distinct
//! expiry commits a repository can ever accumulate. A TTL longer than the
//! lifetime would be indistinguishable from a short one, hence
//! [`MAX_TTL_DAYS`].
//!
//! Every date handed out is the end of a UTC day (23:59:59). A key whose
//! index equals yesterday's index is stale: it reads as absent and is
//! collected by the next GC run.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

/// Length of one index cycle, in days.
pub const LIFETIME_DAYS: i64 = 10002;

/// Exclusive upper bound on TTLs; permitted TTLs lie in `[-1, MAX_TTL_DAYS - 1]`.
pub const MAX_TTL_DAYS: i64 = LIFETIME_DAYS - 1;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Errors from expiry computations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExpiryError {
    #[error("expiry index {0} must be within [0, {max}]", max = LIFETIME_DAYS - 1)]
    IndexOutOfRange(i64),

    #[error("TTL {0} days must be within [-1, {max}]", max = MAX_TTL_DAYS - 1)]
    TtlOutOfRange(i64),
}

/// Result alias for expiry computations.
pub type ExpiryResult<T> = Result<T, ExpiryError>;

/// The time origin of the index: 2025-01-01T00:00:00Z.
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_735_689_600, 0)
        .single()
        .unwrap_or_default()
}

/// The same UTC day at 23:59:59.
pub fn end_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
    now.date_naive().and_time(last_second).and_utc()
}

/// Day index of a date.
///
/// Dates before the epoch wrap around into the previous cycle.
pub fn to_index(date: DateTime<Utc>) -> u32 {
    let days = (date - epoch()).num_milliseconds().div_euclid(MILLIS_PER_DAY);
    // rem_euclid keeps the result in [0, LIFETIME_DAYS), which fits in u32.
    days.rem_euclid(LIFETIME_DAYS) as u32
}

/// Index of today.
pub fn today_index(now: DateTime<Utc>) -> u32 {
    to_index(now)
}

/// Index of yesterday: keys carrying it are stale.
pub fn yesterday_index(now: DateTime<Utc>) -> u32 {
    to_index(now - Duration::days(1))
}

/// Days from index `begin` forward to index `end`, wrapping.
pub fn days_between(begin: u32, end: u32) -> i64 {
    (i64::from(end) - i64::from(begin)).rem_euclid(LIFETIME_DAYS)
}

/// The end-of-day date an index refers to, seen from `now`.
///
/// Today's and yesterday's indices map to those days. Any other index lies
/// in the future, possibly in the next cycle.
pub fn to_date(index: i64, now: DateTime<Utc>) -> ExpiryResult<DateTime<Utc>> {
    if !(0..LIFETIME_DAYS).contains(&index) {
        return Err(ExpiryError::IndexOutOfRange(index));
    }
    let index = index as u32;
    let today = end_of_day(now);
    let today_idx = today_index(now);
    if index == today_idx {
        return Ok(today);
    }
    if index == yesterday_index(now) {
        return Ok(today - Duration::days(1));
    }
    Ok(today + Duration::days(days_between(today_idx, index)))
}

/// Expiry date for a TTL in whole days counted from the end of today.
///
/// `-1` yields yesterday's end of day, which is already stale.
pub fn expiry_for_ttl(ttl_days: i64, now: DateTime<Utc>) -> ExpiryResult<DateTime<Utc>> {
    if !(-1..MAX_TTL_DAYS).contains(&ttl_days) {
        return Err(ExpiryError::TtlOutOfRange(ttl_days));
    }
    Ok(end_of_day(now) + Duration::days(ttl_days))
}

/// Whether an index marks a stale key.
pub fn is_stale(index: u32, now: DateTime<Utc>) -> bool {
    index == yesterday_index(now)
}

/// Remaining lifetime in fractional days, 0 once the expiry has passed.
pub fn ttl_days(expiry: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    if expiry < now {
        return 0.0;
    }
    (expiry - now).num_milliseconds() as f64 / MILLIS_PER_DAY as f64
}
