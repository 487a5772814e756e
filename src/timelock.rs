//! Time-lock evaluation against ledger time.
//!
//! The clock passed in here must come from the chain (latest block timestamp),
//! never from the local machine.

const SECS_PER_DAY: u64 = 86_400;
const SECS_PER_HOUR: u64 = 3_600;
const SECS_PER_MINUTE: u64 = 60;

/// Result of comparing a capsule's unlock time with chain time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLock {
    Dissolved,
    Remaining(u64),
}

impl TimeLock {
    pub fn evaluate(unlock_timestamp: u64, chain_time: u64) -> Self {
        match unlock_timestamp.checked_sub(chain_time) {
            Some(remaining) if remaining > 0 => TimeLock::Remaining(remaining),
            _ => TimeLock::Dissolved,
        }
    }

    pub fn is_dissolved(&self) -> bool {
        matches!(self, TimeLock::Dissolved)
    }
}

/// Days/hours/minutes split of a wait, floor division throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBreakdown {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
}

impl WaitBreakdown {
    pub fn from_secs(remaining: u64) -> Self {
        Self {
            days: remaining / SECS_PER_DAY,
            hours: (remaining % SECS_PER_DAY) / SECS_PER_HOUR,
            minutes: (remaining % SECS_PER_HOUR) / SECS_PER_MINUTE,
        }
    }
}

fn unit(count: u64, name: &str) -> String {
    if count == 1 {
        format!("1 {}", name)
    } else {
        format!("{} {}s", count, name)
    }
}

/// Render a remaining wait for humans.
///
/// Minutes are dropped once the wait is at least a day. A wait under a
/// minute reads as "moments".
pub fn format_remaining(remaining: u64) -> String {
    let WaitBreakdown { days, hours, minutes } = WaitBreakdown::from_secs(remaining);

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(unit(days, "day"));
    }
    if hours > 0 {
        parts.push(unit(hours, "hour"));
    }
    if minutes > 0 && days == 0 {
        parts.push(unit(minutes, "minute"));
    }

    if parts.is_empty() {
        "moments".to_string()
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_uses_chain_time() {
        assert_eq!(TimeLock::evaluate(1_000, 400), TimeLock::Remaining(600));
        assert_eq!(TimeLock::evaluate(1_000, 1_000), TimeLock::Dissolved);
        assert_eq!(TimeLock::evaluate(1_000, 5_000), TimeLock::Dissolved);
        assert!(TimeLock::evaluate(0, 1).is_dissolved());
    }

    #[test]
    fn test_breakdown_floor_division() {
        let b = WaitBreakdown::from_secs(90_061);
        assert_eq!(b, WaitBreakdown { days: 1, hours: 1, minutes: 1 });
    }

    #[test]
    fn test_day_scale_suppresses_minutes() {
        assert_eq!(format_remaining(90_000), "1 day, 1 hour");
        assert_eq!(format_remaining(90_061), "1 day, 1 hour");
        assert_eq!(format_remaining(2 * 86_400 + 120), "2 days");
    }

    #[test]
    fn test_sub_minute_is_moments() {
        assert_eq!(format_remaining(45), "moments");
        assert_eq!(format_remaining(0), "moments");
    }

    #[test]
    fn test_minutes_and_hours() {
        assert_eq!(format_remaining(59 * 60), "59 minutes");
        assert_eq!(format_remaining(60), "1 minute");
        assert_eq!(format_remaining(3_600 + 60), "1 hour, 1 minute");
        assert_eq!(format_remaining(2 * 3_600 + 5 * 60), "2 hours, 5 minutes");
    }
}
