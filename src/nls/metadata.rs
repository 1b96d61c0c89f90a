//! Stage 3: the metadata index and header.
//!
//! `nls.metadata.json` maps every unit module to its ordered keys and default
//! messages, `nls.metadata.header.json` identifies the bundle. Both are
//! written to the output root and are the input of `transifex-push`.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::{Artifact, MetadataBundle, ResourceFile, Stage};
use crate::core::Hash32;
use crate::error::BundlingError;

pub const METADATA_FILE: &str = "nls.metadata.json";
pub const HEADER_FILE: &str = "nls.metadata.header.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataHeader {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Fingerprint of the metadata index.
    pub hash: String,
    pub out_dir: String,
}

pub struct BundleMetadataFiles {
    bundle_id: String,
    out_dir: Utf8PathBuf,
    bundle: MetadataBundle,
}

impl BundleMetadataFiles {
    pub fn new(bundle_id: &str, out_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            out_dir: out_dir.into(),
            bundle: MetadataBundle::new(),
        }
    }
}

impl Stage for BundleMetadataFiles {
    fn transform(&mut self, artifact: Artifact) -> Result<Vec<Artifact>, BundlingError> {
        if let Artifact::Unit(unit) = &artifact
            && let Some(nls) = &unit.nls
        {
            self.bundle.insert(unit.module(), nls.clone());
        }
        Ok(vec![artifact])
    }

    fn flush(&mut self) -> Result<Vec<Artifact>, BundlingError> {
        let bundle = std::mem::take(&mut self.bundle);
        let (header, metadata) = metadata_files(&self.bundle_id, &self.out_dir, &bundle)?;
        Ok(vec![Artifact::Resource(header), Artifact::Resource(metadata)])
    }
}

/// Renders the header and index of `bundle`. Output depends only on the
/// bundle contents.
pub fn metadata_files(
    bundle_id: &str,
    out_dir: &Utf8Path,
    bundle: &MetadataBundle,
) -> Result<(ResourceFile, ResourceFile), BundlingError> {
    let metadata_path = out_dir.join(METADATA_FILE);
    let metadata = super::to_json(&metadata_path, bundle)?;

    let header = MetadataHeader {
        id: bundle_id.to_string(),
        kind: "extensionBundle".into(),
        hash: Hash32::hash(&metadata).to_hex(),
        out_dir: out_dir.to_string(),
    };

    let header_path = out_dir.join(HEADER_FILE);
    let header = super::to_json(&header_path, &header)?;

    Ok((
        ResourceFile {
            path: header_path,
            contents: header,
        },
        ResourceFile {
            path: metadata_path,
            contents: metadata,
        },
    ))
}
