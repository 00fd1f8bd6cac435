//! Local-filesystem storage backend.
//!
//! Implements the [`StorageBackend`] contract over a directory tree, mapping
//! object paths to files under a root directory. Writes go to a temporary
//! sibling file followed by a rename, so a committed object is never
//! observable half-written.
//!
//! This backend is for development and the CLI. Its precondition checks are
//! check-then-write rather than truly atomic, which is acceptable because
//! pipeline runs against one output location are serialized externally.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::{Error, Result};
use crate::storage::{ObjectMeta, StorageBackend, WritePrecondition, WriteResult};

/// Storage backend rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    /// Creates a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::storage_with_source(format!("create root {}", root.display()), e))?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::InvalidInput(format!(
                "object path must be relative and free of '..': {path}"
            )));
        }
        Ok(self.root.join(rel))
    }

    fn version_of(meta: &std::fs::Metadata) -> String {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        format!("{mtime}-{}", meta.len())
    }

    fn meta_of(path: String, meta: &std::fs::Metadata) -> ObjectMeta {
        let last_modified = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t));
        ObjectMeta {
            path,
            size: meta.len(),
            version: Self::version_of(meta),
            last_modified,
        }
    }

    async fn current_version(&self, file: &Path) -> Result<Option<String>> {
        match tokio::fs::metadata(file).await {
            Ok(meta) => Ok(Some(Self::version_of(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_with_source(
                format!("stat {}", file.display()),
                e,
            )),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalFsBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object not found: {path}")))
            }
            Err(e) => Err(Error::storage_with_source(format!("read {path}"), e)),
        }
    }

    async fn put(
        &self,
        path: &str,
        data: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let file = self.resolve(path)?;
        let current = self.current_version(&file).await?;

        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(version) = current {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: version,
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => match current {
                Some(version) if version != expected => {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: version,
                    });
                }
                None => {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: "0".to_string(),
                    });
                }
                _ => {}
            },
            WritePrecondition::None => {}
        }

        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage_with_source(format!("mkdir for {path}"), e))?;
        }

        // Stage then rename so readers never see a partial object.
        let staged = file.with_extension(format!(
            "tmp-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        tokio::fs::write(&staged, &data)
            .await
            .map_err(|e| Error::storage_with_source(format!("write staged {path}"), e))?;
        tokio::fs::rename(&staged, &file)
            .await
            .map_err(|e| Error::storage_with_source(format!("commit {path}"), e))?;

        let meta = tokio::fs::metadata(&file)
            .await
            .map_err(|e| Error::storage_with_source(format!("stat {path}"), e))?;
        Ok(WriteResult::Success {
            version: Self::version_of(&meta),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_with_source(format!("delete {path}"), e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut out = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::storage_with_source(
                        format!("list {}", dir.display()),
                        e,
                    ));
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::storage_with_source("list entry", e))?
            {
                let entry_path = entry.path();
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| Error::storage_with_source("stat entry", e))?;
                if meta.is_dir() {
                    pending.push(entry_path);
                    continue;
                }

                let Ok(rel) = entry_path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    out.push(Self::meta_of(key, &meta));
                }
            }
        }

        Ok(out)
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let file = self.resolve(path)?;
        match tokio::fs::metadata(&file).await {
            Ok(meta) => Ok(Some(Self::meta_of(path.to_string(), &meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage_with_source(format!("stat {path}"), e)),
        }
    }
}
