use chrono::NaiveTime;

const TWELVE_HOUR_FORMATS: [&str; 4] = ["%I:%M %p", "%I:%M%p", "%I %p", "%I%p"];

/// Normalize a time string to 24-hour `HH:MM`. Only values carrying an
/// am/pm marker are converted; anything unparsable passes through trimmed,
/// never as an error.
pub fn to_24h(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lowered = trimmed.to_ascii_lowercase();
    if !lowered.contains("am") && !lowered.contains("pm") {
        return trimmed.to_string();
    }
    let upper = lowered.to_ascii_uppercase();
    for format in TWELVE_HOUR_FORMATS {
        if let Ok(parsed) = NaiveTime::parse_from_str(&upper, format) {
            return parsed.format("%H:%M").to_string();
        }
    }
    trimmed.to_string()
}

/// Convert a 24-hour `HH:MM` string to the legacy 12-hour form used by the
/// packed encoding (`8:00 AM`). Unparsable input passes through unchanged.
pub fn to_12h(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut parts = trimmed.splitn(2, ':');
    let hours: i64 = match parts.next().and_then(|p| p.trim().parse().ok()) {
        Some(h) => h,
        None => return trimmed.to_string(),
    };
    let minutes: i64 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(0);
    let suffix = if hours >= 12 { "PM" } else { "AM" };
    let display_hours = ((hours + 11) % 12) + 1;
    format!("{display_hours}:{minutes:02} {suffix}")
}
