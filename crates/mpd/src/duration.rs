//! Restricted ISO-8601 duration handling.
//!
//! Only the `PT<seconds>S` form used by DASH packagers for
//! `mediaPresentationDuration` and `maxSegmentDuration` is understood.
//! Compound forms such as `PT1M30S` or `P1D` are rejected.

use crate::error::ManifestError;

/// Parse a `PT<seconds>S` duration into seconds.
///
/// The `PT` prefix and `S` suffix are both optional, so a bare `"4.0"` is
/// accepted. The result must be positive and finite.
pub fn parse_seconds(field: &'static str, raw: &str) -> Result<f64, ManifestError> {
    let trimmed = raw.trim();
    let value = trimmed.strip_prefix("PT").unwrap_or(trimmed);
    let value = value.strip_suffix('S').unwrap_or(value);

    let seconds: f64 = value
        .parse()
        .map_err(|_| ManifestError::invalid_number(field, raw))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ManifestError::InvalidDuration {
            field,
            value: raw.to_string(),
        });
    }

    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_seconds() {
        assert_eq!(parse_seconds("d", "PT4S").unwrap(), 4.0);
        assert_eq!(parse_seconds("d", "PT183.466S").unwrap(), 183.466);
        assert_eq!(parse_seconds("d", " PT2.0S ").unwrap(), 2.0);
        assert_eq!(parse_seconds("d", "12.5").unwrap(), 12.5);
    }

    #[test]
    fn test_rejects_compound_durations() {
        assert!(matches!(
            parse_seconds("d", "PT1M30S"),
            Err(ManifestError::InvalidNumber { field: "d", .. })
        ));
        assert!(matches!(
            parse_seconds("d", "P1D"),
            Err(ManifestError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse_seconds("d", ""),
            Err(ManifestError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_rejects_non_positive_and_non_finite() {
        assert!(matches!(
            parse_seconds("maxSegmentDuration", "PT0S"),
            Err(ManifestError::InvalidDuration {
                field: "maxSegmentDuration",
                ..
            })
        ));
        assert!(matches!(
            parse_seconds("d", "PT-3S"),
            Err(ManifestError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_seconds("d", "PTinfS"),
            Err(ManifestError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_seconds("d", "PTNaNS"),
            Err(ManifestError::InvalidDuration { .. })
        ));
    }
}
