//! Wall-clock millisecond helpers and the three-timestamp synchronization echo.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Timestamps on the wire are always epoch milliseconds; clients combine them
/// with their own clocks through the sync echo below.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Server half of the NTP-style three-timestamp exchange.
///
/// The client sends its local send time `t1`; the server echoes it untouched
/// and stamps receive/transmit with the same instant (processing time on the
/// server is negligible next to network jitter). The client derives offset as
/// `((t2 - t1) + (t3 - t4)) / 2` with its own receive time `t4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncEcho {
    /// Client send time, echoed unchanged.
    pub t1: i64,
    /// Server receive time.
    pub t2: i64,
    /// Server transmit time.
    pub t3: i64,
}

/// Build the reply for a `TIME_SYNC_REQ` carrying client send time `t1`.
pub fn sync_echo(t1: i64, now: i64) -> SyncEcho {
    SyncEcho { t1, t2: now, t3: now }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_echo_preserves_t1() {
        let echo = sync_echo(123_456, 999_999);
        assert_eq!(echo.t1, 123_456);
        assert_eq!(echo.t2, 999_999);
        assert_eq!(echo.t3, echo.t2);
    }

    #[test]
    fn now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000, "epoch millis expected");
    }
}
