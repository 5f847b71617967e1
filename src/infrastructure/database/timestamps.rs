use chrono::{DateTime, TimeZone, Utc};

// Values this large cannot be epoch seconds for any date we care about, so
// they are treated as milliseconds (and vice versa below).
const MILLIS_THRESHOLD: i64 = 10_000_000_000;

fn utc_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now)
}

/// Session rows store epoch seconds.
pub fn utc_from_epoch_seconds_lossy(ts: i64) -> DateTime<Utc> {
    if ts.abs() >= MILLIS_THRESHOLD
        && let Some(dt) = Utc.timestamp_opt(ts / 1000, 0).single()
    {
        log::warn!("Coerced milliseconds timestamp to seconds (ts={ts})");
        return dt;
    }

    if let Some(dt) = Utc.timestamp_opt(ts, 0).single() {
        return dt;
    }

    log::warn!("Invalid epoch seconds timestamp (ts={ts}); falling back to epoch");
    utc_epoch()
}

/// Message and task rows store epoch milliseconds so ordering survives bursts
/// of writes within one second.
pub fn utc_from_epoch_millis_lossy(ms: i64) -> DateTime<Utc> {
    let candidate = if ms.abs() < MILLIS_THRESHOLD { ms * 1000 } else { ms };

    if let Some(dt) = Utc.timestamp_millis_opt(candidate).single() {
        if candidate != ms {
            log::warn!("Coerced seconds timestamp to millis (ms={ms})");
        }
        return dt;
    }

    if let Some(dt) = Utc.timestamp_opt(ms, 0).single() {
        log::warn!("Coerced seconds timestamp to millis via seconds parse (ms={ms})");
        return dt;
    }

    log::warn!("Invalid epoch millis timestamp (ms={ms}); falling back to epoch");
    utc_epoch()
}

pub fn utc_from_epoch_millis_lossy_opt(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(utc_from_epoch_millis_lossy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_round_trip() {
        let now = Utc::now();
        let restored = utc_from_epoch_seconds_lossy(now.timestamp());
        assert_eq!(restored.timestamp(), now.timestamp());
    }

    #[test]
    fn millis_round_trip_keeps_sub_second_ordering() {
        let a = utc_from_epoch_millis_lossy(1_700_000_000_123);
        let b = utc_from_epoch_millis_lossy(1_700_000_000_124);
        assert!(a < b);
    }

    #[test]
    fn mixed_precision_is_coerced() {
        let millis_as_seconds = utc_from_epoch_seconds_lossy(1_700_000_000_000);
        assert_eq!(millis_as_seconds.timestamp(), 1_700_000_000);

        let seconds_as_millis = utc_from_epoch_millis_lossy(1_700_000_000);
        assert_eq!(seconds_as_millis.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn optional_millis_passthrough() {
        assert_eq!(utc_from_epoch_millis_lossy_opt(None), None);
        assert!(utc_from_epoch_millis_lossy_opt(Some(0)).is_some());
    }
}
