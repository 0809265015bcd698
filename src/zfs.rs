use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::DrivePulseError;

/// Scrub/resilver state machine, driven by the free-form `zpool status`
/// scan line. The empty state means no scan was ever requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZfsScrubState {
    #[default]
    #[serde(rename = "")]
    None,
    Scanning,
    Finished,
    Canceled,
}

impl ZfsScrubState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZfsScrubState::None => "",
            ZfsScrubState::Scanning => "scanning",
            ZfsScrubState::Finished => "finished",
            ZfsScrubState::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> ZfsScrubState {
        match s {
            "scanning" => ZfsScrubState::Scanning,
            "finished" => ZfsScrubState::Finished,
            "canceled" => ZfsScrubState::Canceled,
            _ => ZfsScrubState::None,
        }
    }
}

/// A ZFS pool registered with the server, keyed by GUID.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZfsPool {
    pub guid: String,
    pub name: String,
    pub health: String,
    pub capacity_percent: f64,

    pub total_read_errors: i64,
    pub total_write_errors: i64,
    pub total_checksum_errors: i64,

    pub label: String,
    pub archived: bool,
    pub muted: bool,

    pub scrub_state: ZfsScrubState,
    pub scrub_start_time: Option<DateTime<Utc>>,
    pub scrub_end_time: Option<DateTime<Utc>>,
    pub scrub_percent_complete: f64,
    pub scrub_issued_bytes: i64,
    pub scrub_errors_count: i64,
    pub scrub_duration_seconds: Option<i64>,
}

static SCRUB_REPAIRED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:scrub|resilver) repaired (\S+) in (.+?) with (\d+) errors on (.+)$")
        .expect("scrub repaired regex must compile")
});

static PERCENT_DONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9.]+)% done").expect("percent done regex must compile"));

impl ZfsPool {
    /// Drive the scrub state machine from a `zpool status` output block.
    /// Trigger phrases are matched as substrings; "none requested" leaves the
    /// state untouched.
    pub fn parse_scrub_status(&mut self, output: &str) {
        for raw_line in output.lines() {
            let line = raw_line.trim();

            if let Some(date_part) = after_marker(line, "scrub in progress since ")
                .or_else(|| after_marker(line, "resilver in progress since "))
            {
                self.scrub_state = ZfsScrubState::Scanning;
                self.scrub_start_time = parse_zfs_date(date_part).ok();
                continue;
            }

            if let Some(caps) = SCRUB_REPAIRED_REGEX.captures(line) {
                self.scrub_state = ZfsScrubState::Finished;
                self.scrub_issued_bytes = parse_zfs_bytes(&caps[1]);
                self.scrub_duration_seconds = parse_zfs_duration(&caps[2]);
                self.scrub_errors_count = caps[3].parse().unwrap_or(0);
                self.scrub_end_time = parse_zfs_date(&caps[4]).ok();
                self.scrub_percent_complete = 100.0;
                continue;
            }

            if let Some(date_part) = after_marker(line, "scrub canceled on ")
                .or_else(|| after_marker(line, "resilver canceled on "))
            {
                self.scrub_state = ZfsScrubState::Canceled;
                self.scrub_end_time = parse_zfs_date(date_part).ok();
                continue;
            }

            if self.scrub_state == ZfsScrubState::Scanning {
                if let Some(caps) = PERCENT_DONE_REGEX.captures(line) {
                    self.scrub_percent_complete = caps[1].parse().unwrap_or(0.0);
                }
            }
        }
    }
}

fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker).map(|idx| &line[idx + marker.len()..])
}

/// Parse a ZFS byte value ("1.5K", "2.3M", "0B") to bytes. Suffixes are
/// binary multiples (K = 1024). Unparseable input yields 0.
pub fn parse_zfs_bytes(input: &str) -> i64 {
    let s = input.trim();
    if s.is_empty() {
        return 0;
    }

    let (number_part, multiplier) = match s.chars().last() {
        Some('B') | Some('b') => (&s[..s.len() - 1], 1_i64),
        Some('K') | Some('k') => (&s[..s.len() - 1], 1_i64 << 10),
        Some('M') | Some('m') => (&s[..s.len() - 1], 1_i64 << 20),
        Some('G') | Some('g') => (&s[..s.len() - 1], 1_i64 << 30),
        Some('T') | Some('t') => (&s[..s.len() - 1], 1_i64 << 40),
        Some('P') | Some('p') => (&s[..s.len() - 1], 1_i64 << 50),
        _ => (s, 1_i64),
    };

    match number_part.parse::<f64>() {
        Ok(value) => (value * multiplier as f64) as i64,
        Err(_) => 0,
    }
}

/// Parse a zpool scan-line date ("Sun Jan  5 00:34:31 2026"). The day of
/// month is space-padded, so single-digit days carry a double space;
/// tokenizing on whitespace accepts both paddings. Times are taken as UTC.
pub fn parse_zfs_date(input: &str) -> Result<DateTime<Utc>, DrivePulseError> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    if tokens.len() != 5 {
        return Err(DrivePulseError::Error(format!(
            "unrecognized zfs date: '{input}'"
        )));
    }

    let month = match tokens[1] {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        other => {
            return Err(DrivePulseError::Error(format!(
                "unrecognized zfs date month: '{other}'"
            )))
        }
    };

    let day: u32 = tokens[2]
        .parse()
        .map_err(|_| DrivePulseError::Error(format!("unrecognized zfs date day: '{}'", tokens[2])))?;
    let year: i32 = tokens[4]
        .parse()
        .map_err(|_| DrivePulseError::Error(format!("unrecognized zfs date year: '{}'", tokens[4])))?;

    let time_parts: Vec<&str> = tokens[3].split(':').collect();
    if time_parts.len() != 3 {
        return Err(DrivePulseError::Error(format!(
            "unrecognized zfs date time: '{}'",
            tokens[3]
        )));
    }
    let hour: u32 = time_parts[0]
        .parse()
        .map_err(|_| DrivePulseError::Error("unrecognized zfs date hour".to_string()))?;
    let minute: u32 = time_parts[1]
        .parse()
        .map_err(|_| DrivePulseError::Error("unrecognized zfs date minute".to_string()))?;
    let second: u32 = time_parts[2]
        .parse()
        .map_err(|_| DrivePulseError::Error("unrecognized zfs date second".to_string()))?;

    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .ok_or_else(|| DrivePulseError::Error(format!("invalid zfs date: '{input}'")))
}

/// Parse a scan duration: either "hh:mm:ss" or "N days hh:mm:ss".
/// Returns total seconds, or None when unrecognized.
pub fn parse_zfs_duration(input: &str) -> Option<i64> {
    let s = input.trim();
    let (days, clock) = match s.split_once(" days ") {
        Some((days_part, clock_part)) => (days_part.trim().parse::<i64>().ok()?, clock_part),
        None => match s.split_once(" day ") {
            Some((days_part, clock_part)) => (days_part.trim().parse::<i64>().ok()?, clock_part),
            None => (0, s),
        },
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: i64 = parts[0].parse().ok()?;
    let minutes: i64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(days * 86400 + hours * 3600 + minutes * 60 + seconds as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zfs_bytes() {
        let cases: &[(&str, i64)] = &[
            ("0B", 0),
            ("0", 0),
            ("", 0),
            ("512B", 512),
            ("1K", 1024),
            ("1.5K", 1536),
            ("2M", 2 * 1024 * 1024),
            ("2.3M", 2411724),
            ("1G", 1024 * 1024 * 1024),
            ("1T", 1024_i64.pow(4)),
            ("1P", 1024_i64.pow(5)),
            ("invalid", 0),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_zfs_bytes(input), *expected, "input {input:?}");
        }
    }

    #[test]
    fn test_parse_zfs_date_single_digit_day_double_space() {
        let parsed = parse_zfs_date("Sun Jan  5 00:34:31 2026").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 1, 5, 0, 34, 31).unwrap());
    }

    #[test]
    fn test_parse_zfs_date_double_digit_day() {
        let parsed = parse_zfs_date("Mon Jan 12 00:36:38 2026").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 1, 12, 0, 36, 38).unwrap());
    }

    #[test]
    fn test_parse_zfs_date_different_month() {
        let parsed = parse_zfs_date("Tue Feb 14 10:15:30 2026").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 2, 14, 10, 15, 30).unwrap());
    }

    #[test]
    fn test_parse_zfs_date_invalid() {
        assert!(parse_zfs_date("not a date").is_err());
    }

    #[test]
    fn test_parse_zfs_duration() {
        assert_eq!(parse_zfs_duration("00:10:30"), Some(630));
        assert_eq!(parse_zfs_duration("1 days 00:12:08"), Some(86400 + 728));
        assert_eq!(parse_zfs_duration("2 days 01:00:00"), Some(2 * 86400 + 3600));
        assert_eq!(parse_zfs_duration("bogus"), None);
    }

    #[test]
    fn test_scrub_finished_short_duration() {
        let mut pool = ZfsPool::default();
        pool.parse_scrub_status(
            "  pool: tank\n state: ONLINE\n  scan: scrub repaired 0B in 00:10:30 with 0 errors on Sun Jan  5 00:34:31 2026\nconfig:\n\n\tNAME        STATE     READ WRITE CKSUM\n\ttank        ONLINE       0     0     0\n",
        );
        assert_eq!(pool.scrub_state, ZfsScrubState::Finished);
        assert_eq!(pool.scrub_issued_bytes, 0);
        assert_eq!(pool.scrub_errors_count, 0);
        assert_eq!(pool.scrub_percent_complete, 100.0);
        assert_eq!(
            pool.scrub_end_time,
            Some(Utc.with_ymd_and_hms(2026, 1, 5, 0, 34, 31).unwrap())
        );
    }

    #[test]
    fn test_scrub_finished_multi_day_duration() {
        let mut pool = ZfsPool::default();
        pool.parse_scrub_status(
            "  scan: scrub repaired 0B in 1 days 00:12:08 with 0 errors on Mon Jan 12 00:36:38 2026\n",
        );
        assert_eq!(pool.scrub_state, ZfsScrubState::Finished);
        assert_eq!(pool.scrub_errors_count, 0);
        assert_eq!(pool.scrub_duration_seconds, Some(86400 + 728));
        assert_eq!(
            pool.scrub_end_time,
            Some(Utc.with_ymd_and_hms(2026, 1, 12, 0, 36, 38).unwrap())
        );
    }

    #[test]
    fn test_scrub_finished_with_repairs() {
        let mut pool = ZfsPool::default();
        pool.parse_scrub_status(
            "  scan: scrub repaired 1.5K in 00:10:30 with 2 errors on Sun Jan  5 00:34:31 2026\n",
        );
        assert_eq!(pool.scrub_state, ZfsScrubState::Finished);
        assert_eq!(pool.scrub_issued_bytes, 1536);
        assert_eq!(pool.scrub_errors_count, 2);
    }

    #[test]
    fn test_scrub_in_progress() {
        let mut pool = ZfsPool::default();
        pool.parse_scrub_status(
            "  scan: scrub in progress since Sun Jan  5 00:24:01 2026\n\ttank        ONLINE       0     0     0\n\t42.5% done, 0 days 00:05:12 to go\n",
        );
        assert_eq!(pool.scrub_state, ZfsScrubState::Scanning);
        assert_eq!(
            pool.scrub_start_time,
            Some(Utc.with_ymd_and_hms(2026, 1, 5, 0, 24, 1).unwrap())
        );
        assert_eq!(pool.scrub_percent_complete, 42.5);
    }

    #[test]
    fn test_scrub_canceled() {
        let mut pool = ZfsPool::default();
        pool.parse_scrub_status("  scan: scrub canceled on Sun Jan  5 00:30:00 2026\n");
        assert_eq!(pool.scrub_state, ZfsScrubState::Canceled);
        assert!(pool.scrub_end_time.is_some());
    }

    #[test]
    fn test_scrub_none_requested_leaves_state_empty() {
        let mut pool = ZfsPool::default();
        pool.parse_scrub_status("  scan: none requested\n");
        assert_eq!(pool.scrub_state, ZfsScrubState::None);
    }

    #[test]
    fn test_resilver_finished() {
        let mut pool = ZfsPool::default();
        pool.parse_scrub_status(
            "  scan: resilver repaired 1.5K in 00:05:30 with 0 errors on Tue Jan  6 12:00:00 2026\n",
        );
        assert_eq!(pool.scrub_state, ZfsScrubState::Finished);
        assert_eq!(pool.scrub_issued_bytes, 1536);
        assert!(pool.scrub_end_time.is_some());
    }

    #[test]
    fn test_resilver_in_progress() {
        let mut pool = ZfsPool::default();
        pool.parse_scrub_status(
            "  scan: resilver in progress since Tue Jan  6 11:54:30 2026\n\t15.3% done, 0 days 00:02:45 to go\n",
        );
        assert_eq!(pool.scrub_state, ZfsScrubState::Scanning);
        assert!(pool.scrub_start_time.is_some());
        assert_eq!(pool.scrub_percent_complete, 15.3);
    }

    #[test]
    fn test_resilver_canceled() {
        let mut pool = ZfsPool::default();
        pool.parse_scrub_status("  scan: resilver canceled on Tue Jan  6 12:30:00 2026\n");
        assert_eq!(pool.scrub_state, ZfsScrubState::Canceled);
    }
}
