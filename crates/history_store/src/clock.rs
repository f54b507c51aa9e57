use time::OffsetDateTime;

/// Current wall-clock time as Unix epoch milliseconds.
#[must_use]
pub fn epoch_ms() -> u64 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    u64::try_from(millis).unwrap_or(0)
}
