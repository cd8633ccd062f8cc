use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_core::{BuildStep, Fingerprint, Image};

const LAYERS_DIR: &str = "layers";
const IMAGES_DIR: &str = "images";
const RECORD_FILE: &str = "layer.json";
const ROOTFS_DIR: &str = "rootfs";
const PARTIAL_SUFFIX: &str = ".partial";

/// Metadata persisted next to each committed layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub fingerprint: Fingerprint,
    pub parent: Option<Fingerprint>,
    pub step: BuildStep,
    /// Identifier the builder resolved the base reference to (SET_BASE only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_id: Option<String>,
    /// Whether this layer owns a filesystem snapshot. Metadata-only layers
    /// share their parent's.
    pub has_rootfs: bool,
}

/// Content-addressed layer cache plus built image manifests.
///
/// ```text
/// <root>/layers/<fingerprint>/layer.json
/// <root>/layers/<fingerprint>/rootfs/...
/// <root>/layers/<fingerprint>.partial/   (in-progress, never read)
/// <root>/images/<tag>.json
/// ```
#[derive(Debug, Clone)]
pub struct LayerStore {
    root: PathBuf,
}

impl LayerStore {
    /// Opens (creating if needed) the store rooted at `root`.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        for dir in [root.join(LAYERS_DIR), root.join(IMAGES_DIR)] {
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::CreateDir {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn layer_dir(&self, fp: &Fingerprint) -> PathBuf {
        self.root.join(LAYERS_DIR).join(fp.as_str())
    }

    /// A layer is present once its record has been committed.
    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.layer_dir(fp).join(RECORD_FILE).is_file()
    }

    pub fn record(&self, fp: &Fingerprint) -> Result<LayerRecord, StoreError> {
        let path = self.layer_dir(fp).join(RECORD_FILE);
        let content =
            std::fs::read_to_string(&path).map_err(|e| StoreError::Read {
                path: path.clone(),
                source: e,
            })?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt { path, source: e })
    }

    /// Filesystem snapshot visible at layer `fp`: its own, or the nearest
    /// ancestor's for metadata-only layers.
    pub fn rootfs(&self, fp: &Fingerprint) -> Result<Option<PathBuf>, StoreError> {
        let mut current = Some(fp.clone());
        while let Some(fp) = current {
            let record = self.record(&fp)?;
            if record.has_rootfs {
                return Ok(Some(self.layer_dir(&fp).join(ROOTFS_DIR)));
            }
            current = record.parent;
        }
        Ok(None)
    }

    /// Committed layer fingerprints, sorted.
    pub fn layers(&self) -> Result<Vec<Fingerprint>, StoreError> {
        let dir = self.root.join(LAYERS_DIR);
        let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::Read {
            path: dir.clone(),
            source: e,
        })?;

        let mut layers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Read {
                path: dir.clone(),
                source: e,
            })?;
            let name = entry.file_name();
            let Some(fp) = name
                .to_str()
                // arch-lint: allow(no-silent-result-drop) reason="partial directories and stray entries are not layers"
                .and_then(|n| n.parse::<Fingerprint>().ok())
            else {
                continue;
            };
            if self.contains(&fp) {
                layers.push(fp);
            }
        }
        layers.sort();
        Ok(layers)
    }

    /// Starts building layer `fp` in a scratch directory, replacing any
    /// leftover from an aborted build.
    pub fn begin(&self, fp: &Fingerprint) -> Result<PendingLayer, StoreError> {
        let final_dir = self.layer_dir(fp);
        let dir = self
            .root
            .join(LAYERS_DIR)
            .join(format!("{}{PARTIAL_SUFFIX}", fp.as_str()));

        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| StoreError::Cleanup {
                path: dir.clone(),
                source: e,
            })?;
        }
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::CreateDir {
            path: dir.clone(),
            source: e,
        })?;

        Ok(PendingLayer { dir, final_dir })
    }

    pub fn write_image(&self, image: &Image) -> Result<PathBuf, StoreError> {
        let path = self.image_path(&image.tag)?;
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(image).map_err(|e| StoreError::Serialize {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&tmp, content).map_err(|e| StoreError::Write {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::Write {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    pub fn load_image(&self, tag: &str) -> Result<Image, StoreError> {
        let path = self.image_path(tag)?;
        if !path.is_file() {
            return Err(StoreError::ImageNotFound {
                tag: tag.to_owned(),
                path,
            });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| StoreError::Read {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt { path, source: e })
    }

    pub fn has_image(&self, tag: &str) -> bool {
        self.image_path(tag).is_ok_and(|path| path.is_file())
    }

    fn image_path(&self, tag: &str) -> Result<PathBuf, StoreError> {
        let valid = !tag.is_empty()
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !tag.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidTag {
                tag: tag.to_owned(),
            });
        }
        Ok(self.root.join(IMAGES_DIR).join(format!("{tag}.json")))
    }

    /// Deletes every layer and image.
    pub fn clear(&self) -> Result<(), StoreError> {
        for dir in [self.root.join(LAYERS_DIR), self.root.join(IMAGES_DIR)] {
            if dir.exists() {
                std::fs::remove_dir_all(&dir).map_err(|e| StoreError::Cleanup {
                    path: dir.clone(),
                    source: e,
                })?;
            }
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::CreateDir {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

/// A layer under construction. Either committed or discarded, never both.
#[derive(Debug)]
pub struct PendingLayer {
    dir: PathBuf,
    final_dir: PathBuf,
}

impl PendingLayer {
    pub fn rootfs(&self) -> PathBuf {
        self.dir.join(ROOTFS_DIR)
    }

    /// Populates this layer's rootfs with a copy of `parent`, or an empty
    /// tree when there is none.
    pub fn seed_from(&self, parent: Option<&Path>) -> Result<(), StoreError> {
        let rootfs = self.rootfs();
        match parent {
            Some(parent) => copy_tree(parent, &rootfs),
            None => std::fs::create_dir_all(&rootfs).map_err(|e| StoreError::CreateDir {
                path: rootfs.clone(),
                source: e,
            }),
        }
    }

    /// Writes the record and moves the layer into place.
    pub fn commit(self, record: &LayerRecord) -> Result<(), StoreError> {
        let record_path = self.dir.join(RECORD_FILE);
        let content =
            serde_json::to_string_pretty(record).map_err(|e| StoreError::Serialize {
                path: record_path.clone(),
                source: e,
            })?;
        std::fs::write(&record_path, content).map_err(|e| StoreError::Write {
            path: record_path.clone(),
            source: e,
        })?;

        if self.final_dir.exists() {
            std::fs::remove_dir_all(&self.final_dir).map_err(|e| StoreError::Cleanup {
                path: self.final_dir.clone(),
                source: e,
            })?;
        }
        std::fs::rename(&self.dir, &self.final_dir).map_err(|e| StoreError::Write {
            path: self.final_dir.clone(),
            source: e,
        })
    }

    /// Throws away the in-progress layer after a failed step.
    pub fn discard(self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::warn!(path = %self.dir.display(), error = %e, "failed to remove partial layer");
        }
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(dst).map_err(|e| StoreError::CreateDir {
        path: dst.to_path_buf(),
        source: e,
    })?;
    let entries = std::fs::read_dir(src).map_err(|e| StoreError::Read {
        path: src.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| StoreError::Read {
            path: src.to_path_buf(),
            source: e,
        })?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| StoreError::Read {
            path: from.clone(),
            source: e,
        })?;

        if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else if file_type.is_symlink() {
            copy_symlink(&from, &to).map_err(|e| StoreError::Write {
                path: to.clone(),
                source: e,
            })?;
        } else if file_type.is_file() {
            std::fs::copy(&from, &to).map_err(|e| StoreError::Write {
                path: to.clone(),
                source: e,
            })?;
        } else {
            tracing::debug!(path = %from.display(), "skipping special file");
        }
    }
    Ok(())
}

/// Recreates the symlink `from` at `to` without following it, replacing
/// whatever non-directory entry `to` holds.
#[cfg(unix)]
pub(crate) fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    let target = std::fs::read_link(from)?;
    if to.is_symlink() || to.is_file() {
        std::fs::remove_file(to)?;
    }
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
pub(crate) fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::copy(from, to).map(|_| ())
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to clean up {path}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt cache entry at {path}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize {path}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid image tag {tag:?}: use letters, digits, '-', '_' or '.'")]
    InvalidTag { tag: String },
    #[error("no image tagged {tag:?} (expected {path}); run `strata build` first")]
    ImageNotFound { tag: String, path: PathBuf },
}
