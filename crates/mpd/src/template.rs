//! `SegmentTemplate` identifier substitution.
//!
//! Supported identifiers:
//! - `$RepresentationID$` - the representation id
//! - `$Number$` - the segment number
//! - `$Number%0<width>d$` - the segment number, zero padded to `width`
//! - `$$` - a literal `$`

use crate::error::TemplateError;

/// Widest `$Number%0<width>d$` padding accepted; a u64 has at most 20 digits.
const MAX_NUMBER_WIDTH: usize = 32;

/// Expand a segment template.
///
/// `number` is `None` for the initialization template; a `$Number$`
/// identifier in that case is an error.
pub fn expand(
    template: &str,
    representation_id: &str,
    number: Option<u64>,
) -> Result<String, TemplateError> {
    let mut result = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(start) = rest.find('$') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('$').ok_or_else(|| TemplateError::Unterminated {
            template: template.to_string(),
        })?;
        let identifier = &after[..end];

        match identifier {
            "" => result.push('$'),
            "RepresentationID" => result.push_str(representation_id),
            _ if identifier.starts_with("Number") => {
                let number = number.ok_or_else(|| TemplateError::NumberUnavailable {
                    template: template.to_string(),
                })?;
                let width = number_width(identifier)?;
                result.push_str(&format!("{number:0width$}"));
            }
            _ => {
                return Err(TemplateError::UnsupportedIdentifier {
                    identifier: identifier.to_string(),
                });
            }
        }

        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Width requested by a `Number` identifier, 0 when unformatted.
fn number_width(identifier: &str) -> Result<usize, TemplateError> {
    let invalid = || TemplateError::InvalidFormat {
        identifier: identifier.to_string(),
    };

    let format = &identifier["Number".len()..];
    if format.is_empty() {
        return Ok(0);
    }

    let digits = format
        .strip_prefix("%0")
        .and_then(|f| f.strip_suffix('d'))
        .ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let width: usize = digits.parse().map_err(|_| invalid())?;
    if width > MAX_NUMBER_WIDTH {
        return Err(invalid());
    }
    Ok(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_representation_and_number() {
        assert_eq!(
            expand("seg_$RepresentationID$_$Number$.m4s", "audio=128000", Some(12)).unwrap(),
            "seg_audio=128000_12.m4s"
        );
        assert_eq!(
            expand("init_$RepresentationID$.mp4", "0", None).unwrap(),
            "init_0.mp4"
        );
    }

    #[test]
    fn test_expand_padded_number_and_escape() {
        assert_eq!(
            expand("chunk-$Number%05d$.m4s", "a", Some(42)).unwrap(),
            "chunk-00042.m4s"
        );
        assert_eq!(expand("price$$-$Number$", "a", Some(3)).unwrap(), "price$-3");
        assert_eq!(expand("no-identifiers", "a", Some(1)).unwrap(), "no-identifiers");
    }

    #[test]
    fn test_expand_errors() {
        assert!(matches!(
            expand("seg-$Number.m4s", "a", Some(1)),
            Err(TemplateError::Unterminated { .. })
        ));
        assert!(matches!(
            expand("seg-$Time$.m4s", "a", Some(1)),
            Err(TemplateError::UnsupportedIdentifier { identifier }) if identifier == "Time"
        ));
        assert!(matches!(
            expand("seg-$Number%5x$.m4s", "a", Some(1)),
            Err(TemplateError::InvalidFormat { .. })
        ));
        assert!(matches!(
            expand("init-$Number$.mp4", "a", None),
            Err(TemplateError::NumberUnavailable { .. })
        ));
    }

    #[test]
    fn test_expand_rejects_oversized_padding() {
        assert_eq!(
            expand("s-$Number%032d$", "a", Some(7)).unwrap().len(),
            "s-".len() + 32
        );
        for template in [
            "s-$Number%033d$.m4s",
            "s-$Number%0100000000d$.m4s",
            "s-$Number%0999999999999d$.m4s",
            "s-$Number%099999999999999999999999999d$.m4s",
        ] {
            assert!(
                matches!(
                    expand(template, "a", Some(1)),
                    Err(TemplateError::InvalidFormat { .. })
                ),
                "{template}"
            );
        }
    }
}
