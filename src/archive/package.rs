//! Downloadable package descriptors and the manifest that lists them.
//!
//! Two manifest shapes are accepted:
//!
//! ```json
//! [{"name": "south-east", "fileUrl": "https://...", "fileSize": 1048576, "type": "tgz"}]
//! {"maps": [{"name": "south-east", "file_url": "https://...", "file_size": 1048576, "type": "tar"}]}
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ManifestError;
use crate::io::Upstream;

// =============================================================================
// Archive Kind
// =============================================================================

/// Container format of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    Tar,
    TarGzip,
    /// Unrecognized `type`; read as plain tar
    Unknown,
}

impl ArchiveKind {
    /// Map a manifest `type` value.
    pub fn from_type(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "tar" => ArchiveKind::Tar,
            "tgz" | "tar.gz" | "gzip" | "gz" => ArchiveKind::TarGzip,
            _ => ArchiveKind::Unknown,
        }
    }

    pub fn is_gzip(&self) -> bool {
        matches!(self, ArchiveKind::TarGzip)
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Tar => write!(f, "tar"),
            ArchiveKind::TarGzip => write!(f, "tar+gzip"),
            ArchiveKind::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Package Descriptor
// =============================================================================

/// A downloadable package as listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub description: String,
    pub file_url: String,

    /// Declared size in bytes; 0 when the manifest does not say
    pub file_size: u64,

    pub kind: ArchiveKind,
}

impl PackageDescriptor {
    pub fn new(name: impl Into<String>, file_url: impl Into<String>, kind: ArchiveKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            file_url: file_url.into(),
            file_size: 0,
            kind,
        }
    }

    pub fn with_size(mut self, file_size: u64) -> Self {
        self.file_size = file_size;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declared size, `None` when unknown.
    pub fn declared_size(&self) -> Option<u64> {
        (self.file_size > 0).then_some(self.file_size)
    }
}

#[derive(Deserialize)]
struct RawPackage {
    name: String,

    #[serde(default)]
    description: String,

    #[serde(rename = "fileUrl", alias = "file_url")]
    file_url: String,

    #[serde(rename = "fileSize", alias = "file_size", default)]
    file_size: u64,

    #[serde(rename = "type", default)]
    kind: String,
}

impl From<RawPackage> for PackageDescriptor {
    fn from(raw: RawPackage) -> Self {
        Self {
            name: raw.name,
            description: raw.description,
            file_url: raw.file_url,
            file_size: raw.file_size,
            kind: ArchiveKind::from_type(&raw.kind),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawManifest {
    List(Vec<RawPackage>),
    Wrapped { maps: Vec<RawPackage> },
}

// =============================================================================
// Manifest
// =============================================================================

/// Parsed package listing. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManifest {
    packages: Vec<PackageDescriptor>,
}

impl PackageManifest {
    /// Parse manifest JSON.
    pub fn parse(json: &str) -> Result<Self, ManifestError> {
        let raw = match serde_json::from_str::<RawManifest>(json) {
            Ok(raw) => raw,
            // The untagged error hides the cause; reparse as a list to report it
            Err(_) => RawManifest::List(serde_json::from_str::<Vec<RawPackage>>(json)?),
        };
        let records = match raw {
            RawManifest::List(records) | RawManifest::Wrapped { maps: records } => records,
        };

        let mut seen = HashSet::new();
        let mut packages = Vec::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.name.clone()) {
                return Err(ManifestError::DuplicateName(record.name));
            }
            packages.push(PackageDescriptor::from(record));
        }

        Ok(Self { packages })
    }

    /// Load a manifest from a local file or an `http(s)://` URL.
    pub async fn load(source: &str, upstream: &dyn Upstream) -> Result<Self, ManifestError> {
        let json = if source.starts_with("http://") || source.starts_with("https://") {
            let response = upstream.fetch(source).await?;
            if !response.is_success() {
                return Err(ManifestError::Read(format!(
                    "{source} returned HTTP {}",
                    response.status
                )));
            }
            String::from_utf8(response.body.to_vec())
                .map_err(|e| ManifestError::Read(format!("{source}: {e}")))?
        } else {
            tokio::fs::read_to_string(Path::new(source))
                .await
                .map_err(|e| ManifestError::Read(format!("{source}: {e}")))?
        };

        let manifest = Self::parse(&json)?;
        debug!(source = source, packages = manifest.len(), "Manifest loaded");
        Ok(manifest)
    }

    pub fn packages(&self) -> &[PackageDescriptor] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Look a package up by name.
    pub fn find(&self, name: &str) -> Result<&PackageDescriptor, ManifestError> {
        self.packages
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ManifestError::UnknownPackage(name.to_string()))
    }
}
