//! npm registry document types
//!
//! Only the fields the gateway acts on are typed. Package documents are
//! otherwise kept as raw JSON so unknown fields survive a round trip.

use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use troc_core::error::TrocError;
use troc_core::utils::verify_tarball_integrity;
use crate::RegistryResult;

/// Distribution information for package tarball
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DistInfo {
    /// Tarball download URL
    pub tarball: Option<String>,
    /// SHA-1 checksum (legacy)
    pub shasum: Option<String>,
    /// Subresource integrity hash (preferred)
    pub integrity: Option<String>,
}

/// The part of a version manifest the gateway reads
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VersionManifest {
    pub version: Option<String>,
    #[serde(default)]
    pub dist: DistInfo,
}

/// Base64 tarball body inside a publish payload
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Attachment {
    pub content_type: Option<String>,
    pub data: String,
    /// Decoded length npm announces
    pub length: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawPublish {
    name: String,
    #[serde(default)]
    versions: BTreeMap<String, VersionManifest>,
    #[serde(rename = "_attachments", default)]
    attachments: BTreeMap<String, Attachment>,
}

/// One decoded tarball of a publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedTarball {
    pub version: String,
    pub bytes: Vec<u8>,
}

/// A decoded `npm publish` body
#[derive(Debug, Clone)]
pub struct PublishPayload {
    /// Full package name, `@scope/name` or `name`
    pub name: String,
    /// The payload as sent, `_attachments` included
    pub document: Value,
    pub tarballs: Vec<PublishedTarball>,
}

impl PublishPayload {
    /// Decode a publish body. Every version must come with its tarball and
    /// every tarball must match the checksum npm computed for it.
    pub fn parse(body: &[u8]) -> RegistryResult<Self> {
        let document: Value = serde_json::from_slice(body)
            .map_err(|e| TrocError::Validation(format!("publish payload is not JSON: {}", e)))?;
        let raw: RawPublish = serde_json::from_value(document.clone())
            .map_err(|e| TrocError::Validation(format!("malformed publish payload: {}", e)))?;

        if raw.versions.is_empty() {
            return Err(TrocError::Validation(format!("publish of {} has no versions", raw.name)));
        }

        let mut tarballs = Vec::with_capacity(raw.versions.len());
        for (version, manifest) in &raw.versions {
            let attachment = find_attachment(&raw.attachments, &raw.name, version).ok_or_else(|| {
                TrocError::Validation(format!("missing tarball for {}@{}", raw.name, version))
            })?;
            let bytes = attachment.decode()?;
            verify_tarball_integrity(
                &bytes,
                manifest.dist.shasum.as_deref(),
                manifest.dist.integrity.as_deref(),
            )?;
            tarballs.push(PublishedTarball {
                version: version.clone(),
                bytes,
            });
        }

        Ok(Self {
            name: raw.name,
            document,
            tarballs,
        })
    }

    /// `(scope, name)` split of the package name
    pub fn scope_and_name(&self) -> (Option<&str>, &str) {
        split_package_name(&self.name)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.tarballs.iter().map(|t| t.version.as_str())
    }
}

impl Attachment {
    fn decode(&self) -> RegistryResult<Vec<u8>> {
        let bytes = general_purpose::STANDARD
            .decode(self.data.trim())
            .map_err(|e| TrocError::Validation(format!("attachment is not base64: {}", e)))?;
        match self.length {
            Some(length) if length != bytes.len() as u64 => Err(TrocError::Validation(format!(
                "attachment length {} does not match announced {}",
                bytes.len(),
                length
            ))),
            _ => Ok(bytes),
        }
    }
}

/// npm keys attachments by `<full name>-<version>.tgz`; some clients use the
/// unscoped name instead
fn find_attachment<'a>(
    attachments: &'a BTreeMap<String, Attachment>,
    full_name: &str,
    version: &str,
) -> Option<&'a Attachment> {
    let (_, name) = split_package_name(full_name);
    attachments
        .get(&format!("{}-{}.tgz", full_name, version))
        .or_else(|| attachments.get(&format!("{}-{}.tgz", name, version)))
}

/// Split `@scope/name` into its parts; unscoped names have no scope
pub fn split_package_name(full_name: &str) -> (Option<&str>, &str) {
    match full_name.split_once('/') {
        Some((scope, name)) if scope.starts_with('@') => (Some(scope), name),
        _ => (None, full_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sha1::{Digest, Sha1};

    const TARBALL: &[u8] = b"not really a gzip stream";

    fn encoded() -> String {
        general_purpose::STANDARD.encode(TARBALL)
    }

    fn payload(name: &str, attachment_key: &str, shasum: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "name": name,
            "dist-tags": { "latest": "1.0.0" },
            "versions": {
                "1.0.0": {
                    "name": name,
                    "version": "1.0.0",
                    "dist": { "shasum": shasum, "tarball": "http://localhost/whatever.tgz" }
                }
            },
            "_attachments": {
                attachment_key: { "content_type": "application/octet-stream", "data": encoded(), "length": TARBALL.len() }
            }
        }))
        .unwrap()
    }

    fn shasum() -> String {
        hex::encode(Sha1::digest(TARBALL))
    }

    #[test]
    fn test_parse_scoped_publish() {
        let body = payload("@acme/widget", "@acme/widget-1.0.0.tgz", &shasum());
        let parsed = PublishPayload::parse(&body).unwrap();

        assert_eq!(parsed.name, "@acme/widget");
        assert_eq!(parsed.scope_and_name(), (Some("@acme"), "widget"));
        assert_eq!(parsed.versions().collect::<Vec<_>>(), vec!["1.0.0"]);
        assert_eq!(parsed.tarballs[0].bytes, TARBALL);
        assert!(parsed.document.get("_attachments").is_some());
    }

    #[test]
    fn test_attachment_key_fallback() {
        let body = payload("@acme/widget", "widget-1.0.0.tgz", &shasum());
        assert!(PublishPayload::parse(&body).is_ok());
    }

    #[test]
    fn test_missing_attachment() {
        let body = payload("left-pad", "other-1.0.0.tgz", &shasum());
        let err = PublishPayload::parse(&body).unwrap_err();
        assert!(matches!(err, TrocError::Validation(_)));
    }

    #[test]
    fn test_shasum_mismatch() {
        let body = payload("left-pad", "left-pad-1.0.0.tgz", "0000000000000000000000000000000000000000");
        let err = PublishPayload::parse(&body).unwrap_err();
        assert!(err.to_string().contains("shasum mismatch"));
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(
            PublishPayload::parse(b"{not json"),
            Err(TrocError::Validation(_))
        ));
    }

    #[test]
    fn test_no_versions() {
        let body = serde_json::to_vec(&json!({ "name": "left-pad", "versions": {} })).unwrap();
        assert!(matches!(
            PublishPayload::parse(&body),
            Err(TrocError::Validation(_))
        ));
    }

    #[test]
    fn test_split_package_name() {
        assert_eq!(split_package_name("left-pad"), (None, "left-pad"));
        assert_eq!(split_package_name("@acme/widget"), (Some("@acme"), "widget"));
        assert_eq!(split_package_name("odd/name"), (None, "odd/name"));
    }
}
