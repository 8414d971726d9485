// src/config/duration.rs

use std::time::Duration;

/// Parse `"<integer><unit>"` with unit `ms`, `s`, `m` or `h` (e.g. `"250ms"`,
/// `"3s"`, `"10m"`).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit (ms, s, m or h)"))?;

    let (digits, unit) = s.split_at(idx);
    if digits.is_empty() {
        return Err(format!("duration '{s}' must start with a number"));
    }
    let value: u64 = digits
        .parse()
        .map_err(|e| format!("invalid duration number '{digits}': {e}"))?;

    let secs = |mult: u64| {
        value
            .checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };

    match unit.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => secs(1),
        "m" => secs(60),
        "h" => secs(60 * 60),
        other => Err(format!(
            "unsupported duration unit '{other}'; expected ms, s, m, or h"
        )),
    }
}
