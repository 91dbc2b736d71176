use crate::prelude::*;

/// Sanitize a time-of-day value into HH:MM.
///
/// The cloud API only accepts HH:MM, but callers send all sorts: HH:MM:SS
/// from time pickers, fractional seconds, or 12-hour clock with AM/PM.
/// Returns an error for anything that can't be normalized.
pub fn sanitize_time_format(time_str: &str) -> Result<String> {
    let time_str = time_str.trim();

    if time_str.is_empty() {
        bail!("empty time value");
    }

    // a bare entity id is a config mistake, not a time
    if time_str.starts_with("input_datetime.") || time_str.starts_with("sensor.") {
        bail!(
            "time value appears to be an entity id: {}. use the actual time value instead",
            time_str
        );
    }

    // 12-hour clock, eg "2:30 PM"
    if let Some((clock, meridiem)) = time_str.rsplit_once(' ') {
        let meridiem = meridiem.to_ascii_uppercase();
        if meridiem == "AM" || meridiem == "PM" {
            let (hours, minutes) = parse_hours_minutes(clock)?;
            if hours == 0 || hours > 12 {
                bail!("invalid 12-hour clock time: {}", time_str);
            }
            let hours = match (hours, meridiem.as_str()) {
                (12, "AM") => 0,
                (12, "PM") => 12,
                (h, "PM") => h + 12,
                (h, _) => h,
            };
            return Ok(format!("{:02}:{:02}", hours, minutes));
        }
    }

    // HH:MM, HH:MM:SS, HH:MM:SS.ms - ignore anything past the minutes
    let (hours, minutes) = parse_hours_minutes(time_str)?;
    if hours > 23 {
        bail!("invalid time format: {}. expected format: HH:MM", time_str);
    }

    Ok(format!("{:02}:{:02}", hours, minutes))
}

fn parse_hours_minutes(s: &str) -> Result<(u32, u32)> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        bail!("invalid time format: {}. expected format: HH:MM", s);
    }

    let hours: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow!("invalid time format: {}. expected format: HH:MM", s))?;
    let minutes: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow!("invalid time format: {}. expected format: HH:MM", s))?;

    // seconds (if present) must at least be numeric; the value is discarded
    if let Some(seconds) = parts.get(2) {
        let seconds = seconds.split('.').next().unwrap_or(seconds);
        let seconds: u32 = seconds
            .parse()
            .map_err(|_| anyhow!("invalid time format: {}. expected format: HH:MM", s))?;
        if seconds > 59 {
            bail!("invalid time format: {}. expected format: HH:MM", s);
        }
    }

    if minutes > 59 {
        bail!("invalid time format: {}. expected format: HH:MM", s);
    }

    Ok((hours, minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_hh_mm() {
        assert_eq!(sanitize_time_format("23:00").unwrap(), "23:00");
        assert_eq!(sanitize_time_format("9:5").unwrap(), "09:05");
        assert_eq!(sanitize_time_format("00:00").unwrap(), "00:00");
    }

    #[test]
    fn strips_seconds() {
        assert_eq!(sanitize_time_format("14:30:00").unwrap(), "14:30");
        assert_eq!(sanitize_time_format("14:30:59.123").unwrap(), "14:30");
    }

    #[test]
    fn accepts_twelve_hour_clock() {
        assert_eq!(sanitize_time_format("2:30 PM").unwrap(), "14:30");
        assert_eq!(sanitize_time_format("2:30 am").unwrap(), "02:30");
        assert_eq!(sanitize_time_format("12:00 AM").unwrap(), "00:00");
        assert_eq!(sanitize_time_format("12:00 PM").unwrap(), "12:00");
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(sanitize_time_format("24:00").is_err());
        assert!(sanitize_time_format("12:60").is_err());
        assert!(sanitize_time_format("13:00 PM").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(sanitize_time_format("").is_err());
        assert!(sanitize_time_format("noon").is_err());
        assert!(sanitize_time_format("12").is_err());
        assert!(sanitize_time_format("input_datetime.discharge_end").is_err());
    }
}
