use crate::error::{Result, UpdateError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One remote file named by the update descriptor. The manifest order is the
/// download and verification order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteFile {
    /// Source URL for the file contents.
    pub url: String,
    /// Destination file name inside the install directory.
    pub file_name: String,
    /// Expected MD5 digest of the contents, hex encoded (case-insensitive).
    pub md5: String,
}

/// Immutable description of an available update, parsed from the remote
/// manifest document. Lives for the duration of one update attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateDescriptor {
    /// Semantic version string for the release.
    pub version: String,
    /// Files that make up the release, in download order.
    pub files: Vec<RemoteFile>,
    /// Human-readable release description.
    #[serde(default)]
    pub description: String,
    /// Argument string passed to the relaunched application.
    #[serde(default)]
    pub launch_args: String,
}

impl UpdateDescriptor {
    /// Parse the semantic version contained in the descriptor.
    pub fn version(&self) -> Result<semver::Version> {
        Ok(semver::Version::parse(&self.version)?)
    }

    /// Strict version ordering against the installed version; an equal
    /// version is not newer.
    pub fn is_newer_than(&self, installed: &semver::Version) -> Result<bool> {
        Ok(self.version()? > *installed)
    }

    /// True iff every destination file name already exists under
    /// `install_dir`. A missing file forces a repair download regardless of
    /// version comparison.
    pub fn has_all_files(&self, install_dir: &Path) -> bool {
        self.files
            .iter()
            .all(|file| install_dir.join(&file.file_name).exists())
    }

    /// Check the structural invariants: a non-empty file list with unique
    /// destination names.
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(UpdateError::validation("descriptor lists no files"));
        }
        let mut seen = HashSet::new();
        for file in &self.files {
            if !seen.insert(file.file_name.as_str()) {
                return Err(UpdateError::validation(format!(
                    "duplicate destination file name: {}",
                    file.file_name
                )));
            }
        }
        self.version()?;
        Ok(())
    }
}

/// Retrieves and parses the remote update manifest.
#[derive(Clone, Default)]
pub struct ManifestClient {
    client: Client,
}

impl ManifestClient {
    /// Create a manifest client around an existing reqwest client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch the descriptor from `url`. An unreachable endpoint or a
    /// non-success HTTP status is the defined "no update available"
    /// condition and yields `Ok(None)`; a manifest that exists but cannot
    /// be decoded or validated is an error.
    pub async fn fetch(&self, url: &str) -> Result<Option<UpdateDescriptor>> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%url, error = %err, "manifest endpoint unreachable");
                return Ok(None);
            }
        };
        if !response.status().is_success() {
            tracing::debug!(%url, status = %response.status(), "no manifest on server");
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        let descriptor: UpdateDescriptor = serde_json::from_slice(&bytes)?;
        descriptor.validate()?;
        Ok(Some(descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(files: Vec<RemoteFile>) -> UpdateDescriptor {
        UpdateDescriptor {
            version: "1.2.0".into(),
            files,
            description: "bug fixes".into(),
            launch_args: String::new(),
        }
    }

    fn remote(name: &str) -> RemoteFile {
        RemoteFile {
            url: format!("http://example.invalid/{name}"),
            file_name: name.into(),
            md5: "d41d8cd98f00b204e9800998ecf8427e".into(),
        }
    }

    #[test]
    fn parses_manifest_document() {
        let json = r#"{
            "version": "2.0.1",
            "description": "new things",
            "launch_args": "--relaunched",
            "files": [
                {"url": "http://host/app.bin", "file_name": "app.bin", "md5": "AABB"}
            ]
        }"#;
        let descriptor: UpdateDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.version().unwrap(), semver::Version::new(2, 0, 1));
        assert_eq!(descriptor.files.len(), 1);
        assert_eq!(descriptor.files[0].file_name, "app.bin");
        assert_eq!(descriptor.launch_args, "--relaunched");
    }

    #[test]
    fn equal_version_is_not_newer() {
        let descriptor = descriptor(vec![remote("app.bin")]);
        let installed = semver::Version::new(1, 2, 0);
        assert!(!descriptor.is_newer_than(&installed).unwrap());
        assert!(descriptor
            .is_newer_than(&semver::Version::new(1, 1, 9))
            .unwrap());
    }

    #[test]
    fn missing_file_fails_completeness_check() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = descriptor(vec![remote("present.bin"), remote("missing.bin")]);
        std::fs::write(dir.path().join("present.bin"), b"x").unwrap();
        assert!(!descriptor.has_all_files(dir.path()));

        std::fs::write(dir.path().join("missing.bin"), b"y").unwrap();
        assert!(descriptor.has_all_files(dir.path()));
    }

    #[test]
    fn validation_rejects_empty_and_duplicate_file_lists() {
        assert!(descriptor(vec![]).validate().is_err());
        assert!(descriptor(vec![remote("a.bin"), remote("a.bin")])
            .validate()
            .is_err());
        assert!(descriptor(vec![remote("a.bin"), remote("b.bin")])
            .validate()
            .is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_means_no_update() {
        let client = ManifestClient::default();
        // Reserved TLD, connection always fails.
        let result = client.fetch("http://manifest.invalid/update.json").await;
        assert!(matches!(result, Ok(None)));
    }
}
