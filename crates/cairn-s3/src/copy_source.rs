//! `x-amz-copy-source` parsing

use cairn_common::{Error, Result};

/// Split a copy source into (bucket, key).
///
/// The value is percent-decoded and one leading `/` is dropped. A missing
/// header is treated as an empty value.
pub fn parse_copy_source(header: Option<&str>) -> Result<(String, String)> {
    let raw = header.unwrap_or_default();
    let decoded = String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned();
    let trimmed = decoded.strip_prefix('/').unwrap_or(&decoded);
    trimmed
        .split_once('/')
        .map(|(bucket, key)| (bucket.to_string(), key.to_string()))
        .ok_or_else(|| Error::invalid_argument("Invalid copy source"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_slash_is_optional() {
        let with = parse_copy_source(Some("/src/dir/a.txt")).unwrap();
        let without = parse_copy_source(Some("src/dir/a.txt")).unwrap();
        assert_eq!(with, without);
        assert_eq!(with, ("src".to_string(), "dir/a.txt".to_string()));
    }

    #[test]
    fn test_percent_decoding() {
        assert_eq!(
            parse_copy_source(Some("%2Fsrc%2Fmy%20file")).unwrap(),
            ("src".to_string(), "my file".to_string())
        );
    }

    #[test]
    fn test_rejects_values_without_a_key() {
        for value in [Some("bucketonly"), Some("/bucketonly"), Some(""), None] {
            assert!(matches!(
                parse_copy_source(value),
                Err(Error::InvalidArgument(_))
            ));
        }
    }
}
