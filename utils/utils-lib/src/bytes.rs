/// One KiB in bytes.
pub const KIB: u64 = 1024;
/// One MiB in bytes.
pub const MIB: u64 = 1024 * KIB;
/// One GiB in bytes.
pub const GIB: u64 = 1024 * MIB;
/// One TiB in bytes.
pub const TIB: u64 = 1024 * GIB;

const SUFFIX: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// Converts bytes to human-readable values.
pub fn into_human(bytes: u64) -> String {
    const UNIT: f64 = 1024.0;

    let size = bytes as f64;
    if size <= 0.0 {
        return "0 B".to_string();
    }
    let base = size.log10() / UNIT.log10();

    let human_size_prefix = format!("{:.1}", UNIT.powf(base - base.floor()));
    let human_size_prefix = human_size_prefix.trim_end_matches(".0");

    match SUFFIX.get(base.floor() as usize) {
        Some(units) => format!("{human_size_prefix}{units}"),
        None => format!("{bytes} B"),
    }
}

/// Parses a human-readable size, eg: "10GiB", "512MiB" or "4096" into bytes.
/// Only binary suffixes are supported.
pub fn parse_human(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    let number = number
        .parse::<u64>()
        .map_err(|error| format!("Invalid size '{value}': {error}"))?;
    let suffix = suffix.trim();
    if suffix.is_empty() {
        return Ok(number);
    }
    let power = SUFFIX
        .iter()
        .position(|s| s.eq_ignore_ascii_case(suffix))
        .ok_or_else(|| format!("Invalid size suffix '{suffix}'"))?;
    KIB.checked_pow(power as u32)
        .and_then(|multiplier| number.checked_mul(multiplier))
        .ok_or_else(|| format!("Size '{value}' is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human() {
        assert_eq!(into_human(0), "0 B");
        assert_eq!(into_human(GIB), "1GiB");
        assert_eq!(into_human(GIB + GIB / 2), "1.5GiB");

        assert_eq!(parse_human("4096"), Ok(4096));
        assert_eq!(parse_human("10GiB"), Ok(10 * GIB));
        assert_eq!(parse_human("2 tib"), Ok(2 * TIB));
        assert!(parse_human("10GB").is_err());
        assert!(parse_human("GiB").is_err());
    }
}
