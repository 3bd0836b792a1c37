//! Off-chain certificate metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One display attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

impl Attribute {
    fn new(trait_type: &str, value: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.to_string(),
            value: value.into(),
        }
    }
}

/// Metadata document referenced by the minted asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    pub name: String,
    pub description: String,
    pub attributes: Vec<Attribute>,
}

impl CertificateMetadata {
    pub fn new(
        badge_title: &str,
        description: Option<&str>,
        certificate_number: &str,
        student_name: &str,
        department: Option<&str>,
        issuer: &str,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("{badge_title} awarded to {student_name} by {issuer}"));
        let mut attributes = vec![
            Attribute::new("Certificate Number", certificate_number),
            Attribute::new("Student Name", student_name),
        ];
        if let Some(department) = department {
            attributes.push(Attribute::new("Department", department));
        }
        attributes.push(Attribute::new("Issuer", issuer));
        attributes.push(Attribute::new("Issued", issued_at.format("%Y-%m-%d").to_string()));

        Self {
            name: badge_title.to_string(),
            description,
            attributes,
        }
    }

    /// `{base}/{sha256-hex}` of the serialized document.
    pub fn content_uri(&self, base: &str) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&bytes);
        Ok(format!("{}/{}", base.trim_end_matches('/'), hex::encode(digest)))
    }
}
