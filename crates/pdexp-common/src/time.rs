use std::{fmt::Write, time::Duration};

use chrono::{
    DateTime, TimeDelta, Utc,
    format::{Item, StrftimeItems},
};

use crate::error::{PdexpError, Result};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parses the RFC 3339 timestamps PagerDuty returns. Missing or malformed
/// values yield `None`.
pub fn parse_api_time(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Epoch seconds as a metric value. Pre-epoch or unknown times are reported
/// as 1 so that dashboards can still tell "set" apart from "absent".
pub fn unix_value(value: Option<DateTime<Utc>>) -> f64 {
    match value {
        Some(time) if time.timestamp() > 0 => time.timestamp() as f64,
        _ => 1.0,
    }
}

/// Renders a time for use as a label value; unknown times and formats that
/// fail to render give an empty label.
pub fn format_label_time(value: Option<DateTime<Utc>>, format: &str) -> String {
    let Some(time) = value else {
        return String::new();
    };

    let mut rendered = String::new();
    if write!(rendered, "{}", time.format(format)).is_err() {
        return String::new();
    }
    rendered
}

/// Rejects strftime patterns chrono cannot render.
pub fn validate_time_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(PdexpError::InvalidArgument(format!(
            "invalid time format {format:?}"
        )));
    }
    Ok(())
}

/// `time` moved by `delta`, saturating to `time` itself when out of range.
pub fn shift(time: DateTime<Utc>, delta: Duration, forward: bool) -> DateTime<Utc> {
    let Ok(delta) = TimeDelta::from_std(delta) else {
        return time;
    };
    let shifted = if forward {
        time.checked_add_signed(delta)
    } else {
        time.checked_sub_signed(delta)
    };
    shifted.unwrap_or(time)
}

/// Parses durations such as `90s`, `5m`, `1h30m`, `730h`, `2d` or `250ms`.
/// A bare `0` is accepted and means "disabled" to callers.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PdexpError::InvalidArgument("empty duration".to_string()));
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| {
                PdexpError::InvalidArgument(format!("duration {input} is missing a unit"))
            })?;
        if number_len == 0 {
            return Err(PdexpError::InvalidArgument(format!(
                "invalid duration {input}"
            )));
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number
            .parse()
            .map_err(|_| PdexpError::InvalidArgument(format!("invalid duration {input}")))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let seconds_per_unit = match unit {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3_600.0,
            "d" => 86_400.0,
            _ => {
                return Err(PdexpError::InvalidArgument(format!(
                    "unknown duration unit {unit:?} in {input}"
                )));
            }
        };

        let out_of_range =
            || PdexpError::InvalidArgument(format!("duration {input} is out of range"));
        let part = Duration::try_from_secs_f64(value * seconds_per_unit)
            .map_err(|_| out_of_range())?;
        total = total.checked_add(part).ok_or_else(out_of_range)?;
        rest = tail;
    }

    Ok(total)
}
