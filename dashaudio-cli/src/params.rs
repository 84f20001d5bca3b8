use crate::error::AppError;
use tracing::debug;

/// Parses `key=value` header arguments.
///
/// Each entry is split at the first `=`, so values may themselves contain
/// `=`. Surrounding whitespace is trimmed from the key and the value.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if an entry has no `=` or an empty key.
pub fn parse_headers(params: &[String]) -> Result<Vec<(String, String)>, AppError> {
    debug!("Parsing {} headers", params.len());

    params
        .iter()
        .map(|param| {
            let (key, value) = param.split_once('=').ok_or_else(|| {
                AppError::InvalidInput(format!("invalid header `{param}`, expected KEY=VALUE"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "invalid header `{param}`, name is empty"
                )));
            }
            debug!("Added header: {key}");
            Ok((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_headers() {
        let parsed =
            parse_headers(&strings(&["Authorization=Bearer a=b", " X-Trace = 1 "])).unwrap();
        assert_eq!(
            parsed,
            vec![
                ("Authorization".to_string(), "Bearer a=b".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_value_is_allowed() {
        let parsed = parse_headers(&strings(&["X-Empty="])).unwrap();
        assert_eq!(parsed, vec![("X-Empty".to_string(), String::new())]);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            parse_headers(&strings(&["novalue"])),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_headers(&strings(&["=value"])),
            Err(AppError::InvalidInput(_))
        ));
    }
}
