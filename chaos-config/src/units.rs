//! Memory and CPU quantity parsing.
//!
//! Accepts the spellings people copy out of container specs: `512MB`, `512M`,
//! `512Mi`, `1.5GB`, `2048KB`, bare numbers as megabytes; CPU as `0.5`, `2`
//! or millicores (`500m`).

use crate::error::UnitError;

fn split_number(input: &str) -> (&str, &str) {
    let end = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    input.split_at(end)
}

fn parse_positive(number: &str, input: &str) -> Result<f64, UnitError> {
    let value: f64 = number
        .parse()
        .map_err(|_| UnitError::InvalidNumber(input.to_string()))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(UnitError::NonPositive(input.to_string()));
    }
    Ok(value)
}

/// Parse a memory quantity into whole megabytes (rounded up).
pub fn parse_memory_mb(input: &str) -> Result<u64, UnitError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UnitError::Empty);
    }
    let (number, unit) = split_number(trimmed);
    let value = parse_positive(number, trimmed)?;

    let factor = match unit.trim().to_ascii_lowercase().as_str() {
        "k" | "kb" | "ki" | "kib" => 1.0 / 1024.0,
        "" | "m" | "mb" | "mi" | "mib" => 1.0,
        "g" | "gb" | "gi" | "gib" => 1024.0,
        "t" | "tb" | "ti" | "tib" => 1024.0 * 1024.0,
        _ => {
            return Err(UnitError::UnknownUnit {
                input: trimmed.to_string(),
                unit: unit.to_string(),
            })
        }
    };
    Ok((value * factor).ceil() as u64)
}

/// Parse a CPU quantity into cores.
pub fn parse_cpu_cores(input: &str) -> Result<f64, UnitError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UnitError::Empty);
    }
    let (number, unit) = split_number(trimmed);
    let value = parse_positive(number, trimmed)?;
    match unit.trim() {
        "" => Ok(value),
        "m" => Ok(value / 1000.0),
        other => Err(UnitError::UnknownUnit {
            input: trimmed.to_string(),
            unit: other.to_string(),
        }),
    }
}
