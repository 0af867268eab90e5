//! OPC UA DateTime
//!
//! Encoded as a signed 64-bit count of 100 nanosecond intervals since
//! 1601-01-01 00:00:00 UTC. A value of 0 means "no time".

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Ticks between 1601-01-01 and 1970-01-01
const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// OPC UA DateTime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DateTime {
    ticks: i64,
}

impl DateTime {
    /// The null DateTime
    pub const fn null() -> Self {
        Self { ticks: 0 }
    }

    /// Create from raw ticks
    pub const fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Raw ticks
    pub const fn ticks(&self) -> i64 {
        self.ticks
    }

    /// Whether this is the null value
    pub const fn is_null(&self) -> bool {
        self.ticks == 0
    }

    /// Convert to a `SystemTime`, `None` for values before the Unix epoch
    pub fn to_system_time(&self) -> Option<SystemTime> {
        let since_epoch = self.ticks.checked_sub(UNIX_EPOCH_TICKS)?;
        if since_epoch < 0 {
            return None;
        }
        let secs = (since_epoch / TICKS_PER_SECOND) as u64;
        let nanos = ((since_epoch % TICKS_PER_SECOND) * 100) as u32;
        Some(UNIX_EPOCH + Duration::new(secs, nanos))
    }
}

impl From<SystemTime> for DateTime {
    fn from(time: SystemTime) -> Self {
        let ticks = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => UNIX_EPOCH_TICKS + d.as_secs() as i64 * TICKS_PER_SECOND + (d.subsec_nanos() / 100) as i64,
            Err(e) => {
                let d = e.duration();
                UNIX_EPOCH_TICKS - d.as_secs() as i64 * TICKS_PER_SECOND - (d.subsec_nanos() / 100) as i64
            }
        };
        Self { ticks: ticks.max(0) }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_system_time() {
            Some(t) => {
                let d = t.duration_since(UNIX_EPOCH).unwrap_or_default();
                write!(f, "{}.{:07}s since epoch", d.as_secs(), d.subsec_nanos() / 100)
            }
            None => write!(f, "ticks({})", self.ticks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        let dt = DateTime::from(UNIX_EPOCH);
        assert_eq!(dt.ticks(), UNIX_EPOCH_TICKS);
        assert_eq!(dt.to_system_time(), Some(UNIX_EPOCH));
    }

    #[test]
    fn test_system_time_conversion() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let dt = DateTime::from(t);
        assert_eq!(dt.to_system_time(), Some(t));
        assert!(DateTime::null().is_null());
    }
}
