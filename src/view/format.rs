//! Status field formatting
//!
//! Pure functions turning raw status values into display strings. They are
//! called on every render and never read the clock; "now" is passed in.

use chrono::{DateTime, Duration, TimeZone};

use crate::status::{OperatingState, PrinterStatus};

/// Job file suffixes hidden from the filename line, longest first
const FILENAME_SUFFIXES: [&str; 3] = [".gcode.3mf", ".3mf", ".gcode"];

/// Upper bound for remaining time, keeps clock arithmetic in range
const MAX_REMAINING_MINUTES: i64 = 60 * 24 * 366;

/// Status line text
///
/// A non-empty stage label reported by the printer wins and is shown as is.
/// Otherwise the operating state is mapped to a fixed label; states without a
/// label show verbatim, and a missing state shows "Unknown".
pub fn status_label(status: &PrinterStatus) -> String {
    if let Some(stage) = status.stg_cur_name.as_deref() {
        if !stage.is_empty() {
            return stage.to_string();
        }
    }
    match status.operating_state() {
        Some(OperatingState::Running) => "Printing".to_string(),
        Some(OperatingState::Paused) => "Paused".to_string(),
        Some(OperatingState::Finished) => "Finished".to_string(),
        Some(OperatingState::Failed) => "Failed".to_string(),
        Some(OperatingState::Idle) => "Idle".to_string(),
        Some(OperatingState::Other(raw)) => raw,
        None => "Unknown".to_string(),
    }
}

/// `{h}h {m}m`, or just `{m}m` under an hour. Negative input counts as zero.
pub fn duration(total_minutes: i64) -> String {
    let total_minutes = total_minutes.max(0);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Wall-clock arrival time `remaining_minutes` after `now`
///
/// Same calendar day: `HH:MM`. Next day: `Tomorrow HH:MM`. Later: the short
/// weekday name, e.g. `Thu HH:MM`. Days are compared on the local calendar
/// of `now`'s time zone.
pub fn eta<Tz: TimeZone>(remaining_minutes: i64, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let remaining = remaining_minutes.clamp(0, MAX_REMAINING_MINUTES);
    let arrival = now.clone() + Duration::minutes(remaining);
    let days_ahead = (arrival.date_naive() - now.date_naive()).num_days();
    let clock = arrival.format("%H:%M");
    match days_ahead {
        0 => clock.to_string(),
        1 => format!("Tomorrow {clock}"),
        _ => format!("{} {clock}", arrival.format("%a")),
    }
}

/// File name as shown on the overlay, without slicer/job suffixes
pub fn display_filename(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    FILENAME_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix) && lower.len() > suffix.len())
        .map(|suffix| &name[..name.len() - suffix.len()])
        .unwrap_or(name)
}

/// Whole-percent progress, clamped to 0..=100
pub fn progress_percent(progress: f64) -> u8 {
    if progress.is_nan() {
        return 0;
    }
    progress.round().clamp(0.0, 100.0) as u8
}

/// `current/total` layer text; the total is omitted when unknown
pub fn layers(current: u32, total: Option<u32>) -> String {
    match total {
        Some(total) if total > 0 => format!("{current}/{total}"),
        _ => current.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn status(state: Option<&str>, stage: Option<&str>) -> PrinterStatus {
        PrinterStatus {
            state: state.map(str::to_string),
            stg_cur_name: stage.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn duration_omits_zero_hours() {
        assert_eq!(duration(90), "1h 30m");
        assert_eq!(duration(45), "45m");
        assert_eq!(duration(60), "1h 0m");
        assert_eq!(duration(0), "0m");
        assert_eq!(duration(-4), "0m");
    }

    #[test]
    fn eta_same_day_shows_clock_only() {
        // Monday 2026-10-19
        assert_eq!(eta(90, &at(2026, 10, 19, 10, 0)), "11:30");
    }

    #[test]
    fn eta_crossing_midnight_says_tomorrow() {
        assert_eq!(eta(30, &at(2026, 10, 19, 23, 45)), "Tomorrow 00:15");
        assert_eq!(eta(24 * 60, &at(2026, 10, 19, 0, 0)), "Tomorrow 00:00");
    }

    #[test]
    fn eta_two_or_more_days_out_shows_weekday() {
        assert_eq!(eta(2 * 24 * 60, &at(2026, 10, 19, 8, 0)), "Wed 08:00");
        assert_eq!(eta(5 * 24 * 60 + 30, &at(2026, 10, 19, 23, 50)), "Sun 00:20");
    }

    #[test]
    fn eta_uses_local_calendar_of_now() {
        // 23:00 local; 22:30 UTC is already tomorrow at +02:00
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = at(2026, 10, 19, 21, 0).with_timezone(&tz);
        assert_eq!(eta(30, &now), "23:30");
        assert_eq!(eta(90, &now), "Tomorrow 00:30");
    }

    #[test]
    fn stage_label_wins_over_state() {
        assert_eq!(
            status_label(&status(Some("RUNNING"), Some("Auto bed leveling"))),
            "Auto bed leveling"
        );
        assert_eq!(status_label(&status(Some("RUNNING"), Some(" "))), " ");
        assert_eq!(status_label(&status(Some("RUNNING"), Some(""))), "Printing");
    }

    #[test]
    fn state_labels_and_fallbacks() {
        assert_eq!(status_label(&status(Some("PAUSE"), None)), "Paused");
        assert_eq!(status_label(&status(Some("FINISH"), None)), "Finished");
        assert_eq!(status_label(&status(Some("FAILED"), None)), "Failed");
        assert_eq!(status_label(&status(Some("IDLE"), None)), "Idle");
        assert_eq!(status_label(&status(Some("PREPARE"), None)), "PREPARE");
        assert_eq!(status_label(&status(None, None)), "Unknown");
    }

    #[test]
    fn filename_suffixes_are_stripped() {
        assert_eq!(display_filename("benchy.gcode.3mf"), "benchy");
        assert_eq!(display_filename("Bracket.3MF"), "Bracket");
        assert_eq!(display_filename("cube.gcode"), "cube");
        assert_eq!(display_filename("notes.txt"), "notes.txt");
        assert_eq!(display_filename(".gcode"), ".gcode");
    }

    #[test]
    fn progress_is_rounded_and_clamped() {
        assert_eq!(progress_percent(41.6), 42);
        assert_eq!(progress_percent(-3.0), 0);
        assert_eq!(progress_percent(140.0), 100);
        assert_eq!(progress_percent(f64::NAN), 0);
    }

    #[test]
    fn layer_text() {
        assert_eq!(layers(12, Some(240)), "12/240");
        assert_eq!(layers(12, None), "12");
        assert_eq!(layers(12, Some(0)), "12");
    }
}
