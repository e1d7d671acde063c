use time::{macros::format_description, Date, UtcOffset};

/// The machine's UTC offset, or UTC when it cannot be determined.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// `YYYY-MM-DD`, the date format the service expects in query strings.
pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_date(raw: &str) -> Result<Date, time::error::Parse> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
}

/// `HH:MM:SS` for a running counter.
pub fn format_hms(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// `Xh Ym` for an aggregated duration.
pub fn format_minutes(minutes: i64) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn formats_counters() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(3725), "01:02:05");
        assert_eq!(format_minutes(135), "2h 15m");
    }

    #[test]
    fn parses_and_formats_dates() {
        let date = parse_date("2024-03-04").unwrap();
        assert_eq!(date, date!(2024 - 03 - 04));
        assert_eq!(format_date(date), "2024-03-04");
        assert!(parse_date("04/03/2024").is_err());
    }
}
