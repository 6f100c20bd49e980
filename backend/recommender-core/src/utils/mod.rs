//! Small wire-format helpers shared across services.

use crate::error::{RecommenderError, Result};

/// Converts an ISO 8601 duration string (the catalog's upstream video
/// duration format, e.g. `PT1H2M30S`) into total seconds.
///
/// Months are counted as 30 days, matching the upstream ingest.
pub fn iso8601_duration_to_seconds(duration: &str) -> Result<u64> {
    let mut chars = duration.chars().peekable();

    if chars.next() != Some('P') {
        return Err(RecommenderError::InvalidInput(format!(
            "invalid ISO 8601 duration: {duration}"
        )));
    }

    let mut total: f64 = 0.0;
    let mut in_time_part = false;
    let mut number = String::new();
    let mut saw_component = false;

    for c in chars {
        match c {
            'T' => {
                if !number.is_empty() {
                    return Err(RecommenderError::InvalidInput(format!(
                        "invalid ISO 8601 duration: {duration}"
                    )));
                }
                in_time_part = true;
            }
            '0'..='9' | '.' => number.push(c),
            'Y' | 'M' | 'D' | 'H' | 'S' => {
                let value: f64 = number.parse().map_err(|_| {
                    RecommenderError::InvalidInput(format!(
                        "invalid ISO 8601 duration: {duration}"
                    ))
                })?;
                number.clear();
                saw_component = true;

                let seconds_per_unit = match (c, in_time_part) {
                    ('Y', false) => 365.0 * 24.0 * 3600.0,
                    ('M', false) => 30.0 * 24.0 * 3600.0,
                    ('D', false) => 24.0 * 3600.0,
                    ('H', true) => 3600.0,
                    ('M', true) => 60.0,
                    ('S', true) => 1.0,
                    _ => {
                        return Err(RecommenderError::InvalidInput(format!(
                            "invalid ISO 8601 duration: {duration}"
                        )))
                    }
                };
                total += value * seconds_per_unit;
            }
            _ => {
                return Err(RecommenderError::InvalidInput(format!(
                    "invalid ISO 8601 duration: {duration}"
                )))
            }
        }
    }

    if !number.is_empty() || !saw_component {
        return Err(RecommenderError::InvalidInput(format!(
            "invalid ISO 8601 duration: {duration}"
        )));
    }

    Ok(total as u64)
}

/// Formats a count using `K` for thousands, `M` for millions and `B` for
/// billions, for explanation strings ("1.2M views").
pub fn format_count(num: u64) -> String {
    if num < 1_000 {
        num.to_string()
    } else if num < 1_000_000 {
        format!("{:.1}K", num as f64 / 1_000.0)
    } else if num < 1_000_000_000 {
        format!("{:.1}M", num as f64 / 1_000_000.0)
    } else {
        format!("{:.1}B", num as f64 / 1_000_000_000.0)
    }
}
