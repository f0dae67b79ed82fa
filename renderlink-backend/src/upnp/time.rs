//! UPnP time strings (`H+:MM:SS[.F+]` or `H+:MM:SS[.F0/F1]`)

/// Seconds for a UPnP time string; `None` for `NOT_IMPLEMENTED` and garbage
pub fn parse_time(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value == "NOT_IMPLEMENTED" {
        return None;
    }

    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };

    let mut parts = value.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds = parse_seconds(parts.next()?)?;
    if parts.next().is_some() || minutes >= 60 {
        return None;
    }

    let total = hours.checked_mul(3600)?.checked_add(minutes * 60)? as f64 + seconds;
    Some(if negative { -total } else { total })
}

fn parse_seconds(value: &str) -> Option<f64> {
    let (whole, fraction) = match value.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (value, None),
    };
    let whole: u64 = whole.parse().ok()?;

    let fraction = match fraction {
        None | Some("") => 0.0,
        Some(f) => match f.split_once('/') {
            Some((num, den)) => {
                let num: f64 = num.parse().ok()?;
                let den: f64 = den.parse().ok()?;
                if den <= 0.0 || num >= den {
                    return None;
                }
                num / den
            }
            None => format!("0.{}", f).parse().ok()?,
        },
    };
    Some(whole as f64 + fraction)
}

/// `H:MM:SS.mmm` for a non-negative number of seconds
pub fn format_time(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let (secs, millis) = (millis / 1000, millis % 1000);
    format!("{}:{:02}:{:02}.{:03}", secs / 3600, (secs / 60) % 60, secs % 60, millis)
}
