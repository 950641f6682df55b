//! The File Serializer: writes one issue record to a deterministic path
//! under the working tree, atomically.

use isync_core::IssueRecord;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record for {identifier}: {source}")]
    Encode {
        identifier: String,
        #[source]
        source: serde_yaml::Error,
    },
}

type Result<T> = std::result::Result<T, SerializeError>;

/// File Serializer contract: deterministic path, atomic write.
pub trait FileSerializer {
    fn write(&self, record: &IssueRecord, repo_root: &Path) -> Result<PathBuf>;
}

/// Reference implementation: plain YAML, write-to-temp-then-rename.
pub struct YamlFileSerializer;

impl YamlFileSerializer {
    /// The deterministic repo-relative path for `record`: same record,
    /// same identifier, always resolves to the same path.
    pub fn path_for(record: &IssueRecord) -> PathBuf {
        PathBuf::from("projects")
            .join(record.project_key())
            .join("issues")
            .join(format!("{}.yaml", record.identifier.as_str()))
    }
}

impl FileSerializer for YamlFileSerializer {
    fn write(&self, record: &IssueRecord, repo_root: &Path) -> Result<PathBuf> {
        let relative = Self::path_for(record);
        let full_path = repo_root.join(&relative);
        let parent = full_path.parent().expect("issue path always has a parent");
        std::fs::create_dir_all(parent).map_err(|source| SerializeError::Io { path: parent.to_path_buf(), source })?;

        let encoded = serde_yaml::to_string(record).map_err(|source| SerializeError::Encode {
            identifier: record.identifier.as_str().to_owned(),
            source,
        })?;

        let tmp_path = full_path.with_extension("yaml.tmp");
        std::fs::write(&tmp_path, encoded).map_err(|source| SerializeError::Io { path: tmp_path.clone(), source })?;
        std::fs::rename(&tmp_path, &full_path).map_err(|source| SerializeError::Io { path: full_path.clone(), source })?;

        debug!(identifier = %record.identifier, path = %relative.display(), "issue record written");
        Ok(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isync_core::Identifier;

    fn record() -> IssueRecord {
        IssueRecord {
            identifier: Identifier::parse("PROJ-1").unwrap(),
            summary: "Fix the bug".into(),
            last_modified: chrono::Utc::now(),
            relationships: vec![],
            extra: Default::default(),
        }
    }

    #[test]
    fn path_for_is_deterministic() {
        let r = record();
        assert_eq!(YamlFileSerializer::path_for(&r), YamlFileSerializer::path_for(&r));
        assert_eq!(YamlFileSerializer::path_for(&r), PathBuf::from("projects/PROJ/issues/PROJ-1.yaml"));
    }

    #[test]
    fn write_creates_file_at_deterministic_path() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = YamlFileSerializer;
        let r = record();
        let relative = serializer.write(&r, dir.path()).unwrap();
        assert_eq!(relative, PathBuf::from("projects/PROJ/issues/PROJ-1.yaml"));
        assert!(dir.path().join(&relative).is_file());
        assert!(!dir.path().join("projects/PROJ/issues/PROJ-1.yaml.tmp").exists());
    }

    #[test]
    fn write_overwrites_on_resync() {
        let dir = tempfile::tempdir().unwrap();
        let serializer = YamlFileSerializer;
        let mut r = record();
        serializer.write(&r, dir.path()).unwrap();
        r.summary = "Updated".into();
        let relative = serializer.write(&r, dir.path()).unwrap();
        let contents = std::fs::read_to_string(dir.path().join(relative)).unwrap();
        assert!(contents.contains("Updated"));
    }
}
