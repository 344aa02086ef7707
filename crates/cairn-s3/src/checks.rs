//! Body pre-checks for bucket configuration requests

use cairn_common::{Error, MfaDelete, Result, VersioningConfiguration, VersioningStatus};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct VersioningBody {
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(rename = "MfaDelete")]
    mfa_delete: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateBucketBody {
    #[serde(rename = "LocationConstraint")]
    location_constraint: Option<String>,
}

/// Local name of the document's root element
fn root_element(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(xml: &str, root: &str) -> Result<T> {
    if root_element(xml).as_deref() != Some(root) {
        debug!(expected = root, "Unexpected XML root element");
        return Err(Error::MalformedXml);
    }
    quick_xml::de::from_str(xml).map_err(|e| {
        debug!(error = %e, "Request XML is malformed");
        Error::MalformedXml
    })
}

/// Validate a `VersioningConfiguration` body
pub fn check_bucket_versioning(post: &str) -> Result<VersioningConfiguration> {
    if post.is_empty() {
        debug!("Request XML is missing");
        return Err(Error::MalformedXml);
    }
    let body: VersioningBody = parse(post, "VersioningConfiguration")?;
    let status = match body.status.as_deref() {
        Some("Enabled") => VersioningStatus::Enabled,
        Some("Suspended") => VersioningStatus::Suspended,
        _ => return Err(Error::IllegalVersioningConfiguration),
    };
    let mfa_delete = match body.mfa_delete.as_deref() {
        None => None,
        Some("Enabled") => Some(MfaDelete::Enabled),
        Some("Disabled") => Some(MfaDelete::Disabled),
        Some(_) => return Err(Error::IllegalVersioningConfiguration),
    };
    if mfa_delete.is_some() {
        return Err(Error::not_implemented("MFA Deletion is not supported yet."));
    }
    Ok(VersioningConfiguration { status, mfa_delete })
}

/// Extract the location constraint of a create-bucket body.
///
/// An empty body names no constraint.
pub fn check_bucket_put(post: &str) -> Result<Option<String>> {
    if post.is_empty() {
        return Ok(None);
    }
    let body: CreateBucketBody = parse(post, "CreateBucketConfiguration")?;
    match body.location_constraint {
        Some(constraint) if !constraint.is_empty() => Ok(Some(constraint)),
        _ => Err(Error::MalformedXml),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versioning(inner: &str) -> String {
        format!(
            r#"<VersioningConfiguration xmlns="http://s3.amazonaws.com/doc/2006-03-01/">{inner}</VersioningConfiguration>"#
        )
    }

    #[test]
    fn test_versioning_accepts_valid_status() {
        let config = check_bucket_versioning(&versioning("<Status>Enabled</Status>")).unwrap();
        assert_eq!(config.status, VersioningStatus::Enabled);
        assert_eq!(config.mfa_delete, None);

        let config = check_bucket_versioning(&versioning("<Status>Suspended</Status>")).unwrap();
        assert_eq!(config.status, VersioningStatus::Suspended);
    }

    #[test]
    fn test_versioning_malformed() {
        assert_eq!(check_bucket_versioning(""), Err(Error::MalformedXml));
        assert_eq!(
            check_bucket_versioning("<VersioningConfiguration><Status>"),
            Err(Error::MalformedXml)
        );
        assert_eq!(
            check_bucket_versioning("<Other><Status>Enabled</Status></Other>"),
            Err(Error::MalformedXml)
        );
    }

    #[test]
    fn test_versioning_illegal_values() {
        for inner in [
            "<Status>On</Status>",
            "",
            "<Status>Enabled</Status><MfaDelete>Maybe</MfaDelete>",
        ] {
            assert_eq!(
                check_bucket_versioning(&versioning(inner)),
                Err(Error::IllegalVersioningConfiguration),
                "{inner}"
            );
        }
    }

    #[test]
    fn test_versioning_mfa_delete_not_implemented() {
        for mfa in ["Enabled", "Disabled"] {
            let body = versioning(&format!("<Status>Enabled</Status><MfaDelete>{mfa}</MfaDelete>"));
            assert_eq!(
                check_bucket_versioning(&body),
                Err(Error::not_implemented("MFA Deletion is not supported yet."))
            );
        }
    }

    #[test]
    fn test_create_bucket_body() {
        assert_eq!(check_bucket_put(""), Ok(None));
        assert_eq!(
            check_bucket_put(
                "<CreateBucketConfiguration><LocationConstraint>us-west-1</LocationConstraint></CreateBucketConfiguration>"
            ),
            Ok(Some("us-west-1".to_string()))
        );
        assert_eq!(
            check_bucket_put("<CreateBucketConfiguration></CreateBucketConfiguration>"),
            Err(Error::MalformedXml)
        );
        assert_eq!(check_bucket_put("not xml"), Err(Error::MalformedXml));
    }
}
