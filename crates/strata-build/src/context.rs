use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use strata_core::{ContentDigest, FileSet, Fingerprint, covers};

use crate::store::copy_symlink;

/// Paths strata always leaves out of the build context,
/// regardless of ignore-file content.
const STRATA_EXCLUDES: &[&str] = &[".strata", ".git"];

const DOCKERIGNORE: &str = ".dockerignore";

/// Snapshot of the files in a build context directory.
///
/// The walk applies two kinds of ignore file, both with gitignore pattern
/// semantics (`!` re-includes, a trailing `/` matches directories only):
///
/// - `.dockerignore`, read from the context root only, as Docker does.
///   Copies of it in subdirectories are ordinary files. A directory it
///   excludes is pruned, so a `!` rule cannot re-include something below it.
/// - `.gitignore` at any depth, scoped to its own directory. No git
///   repository is required.
///
/// Other ignore files (`.ignore`, `.rgignore`, the global git excludes) are
/// not consulted. Hidden files are part of the context. Symlinks are
/// entries of their own and are never followed.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root: PathBuf,
    /// Context-relative, `/`-separated, sorted.
    files: Vec<String>,
}

impl BuildContext {
    pub fn scan(root: &Path) -> Result<Self, ContextError> {
        Self::scan_excluding(root, &[])
    }

    /// Scans `root`, additionally leaving out `extra_excludes`
    /// (e.g. a relocated cache directory).
    pub fn scan_excluding(root: &Path, extra_excludes: &[String]) -> Result<Self, ContextError> {
        if !root.is_dir() {
            return Err(ContextError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        let dockerignore = load_dockerignore(root)?;
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .ignore(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .parents(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                entry.depth() == 0 || !dockerignore.matched(entry.path(), is_dir).is_ignore()
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| ContextError::Walk {
                root: root.to_path_buf(),
                source: e,
            })?;
            if !entry.file_type().is_some_and(|t| t.is_file() || t.is_symlink()) {
                continue;
            }

            let relative = to_context_path(root, entry.path())?;
            let excluded = STRATA_EXCLUDES
                .iter()
                .copied()
                .chain(extra_excludes.iter().map(String::as_str))
                .any(|ex| covers(ex, &relative));
            if excluded {
                continue;
            }
            files.push(relative);
        }
        files.sort();

        tracing::debug!(root = %root.display(), files = files.len(), "scanned build context");
        Ok(Self {
            root: root.to_path_buf(),
            files,
        })
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Files selected by `set`, in sorted order.
    ///
    /// Every path of an [`FileSet::Only`] set must match at least one file.
    pub fn select(&self, set: &FileSet) -> Result<Vec<&str>, ContextError> {
        if let FileSet::Only(paths) = set {
            for path in paths {
                if !self.files.iter().any(|file| covers(path, file)) {
                    return Err(ContextError::Missing {
                        path: path.clone(),
                        root: self.root.clone(),
                    });
                }
            }
        }

        Ok(self
            .files
            .iter()
            .map(String::as_str)
            .filter(|file| set.contains(file))
            .collect())
    }

    /// Content digest of `files`: path, mode and bytes of each. A symlink
    /// contributes its target instead of the bytes it points at.
    pub fn digest(&self, files: &[&str]) -> Result<Fingerprint, ContextError> {
        let mut digest = ContentDigest::new();
        for file in files {
            let path = self.root.join(file);
            let meta = std::fs::symlink_metadata(&path).map_err(|e| ContextError::Read {
                path: path.clone(),
                source: e,
            })?;
            let contents = if meta.file_type().is_symlink() {
                std::fs::read_link(&path)
                    .map(|target| target.into_os_string().into_encoded_bytes())
            } else {
                std::fs::read(&path)
            }
            .map_err(|e| ContextError::Read { path, source: e })?;
            digest.add_file(file, file_mode(&meta), &contents);
        }
        Ok(digest.finish())
    }

    /// Copies `files` (selected by `set`) under `destination`.
    ///
    /// Placement follows Docker's COPY rules: a named file lands directly in
    /// `destination`, a named directory contributes its contents, and the
    /// rest-of-context set keeps context-relative paths.
    pub fn copy_into(
        &self,
        set: &FileSet,
        files: &[&str],
        destination: &Path,
    ) -> Result<(), ContextError> {
        for file in files {
            let src = self.root.join(file);
            let dst = destination.join(placement(set, file));

            if let Some(parent) = dst.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ContextError::CreateDir {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }

            let copied = if src.is_symlink() {
                copy_symlink(&src, &dst)
            } else {
                replace_file(&src, &dst)
            };
            copied.map_err(|e| ContextError::CopyFile {
                path: src,
                source: e,
            })?;
        }
        Ok(())
    }
}

/// Copies a regular file, first unlinking a symlink or file already at `dst`
/// so the copy never writes through a link.
fn replace_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    if dst.is_symlink() || dst.is_file() {
        std::fs::remove_file(dst)?;
    }
    std::fs::copy(src, dst).map(|_| ())
}

fn load_dockerignore(root: &Path) -> Result<Gitignore, ContextError> {
    let path = root.join(DOCKERIGNORE);
    if !path.is_file() {
        return Ok(Gitignore::empty());
    }
    let mut builder = GitignoreBuilder::new(root);
    if let Some(e) = builder.add(&path) {
        return Err(ContextError::Dockerignore { path, source: e });
    }
    builder
        .build()
        .map_err(|e| ContextError::Dockerignore { path, source: e })
}

/// File type and permission bits, as `st_mode` reports them.
#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn file_mode(meta: &std::fs::Metadata) -> u32 {
    if meta.file_type().is_symlink() {
        0o120_777
    } else if meta.permissions().readonly() {
        0o100_444
    } else {
        0o100_644
    }
}

/// Path of `file` relative to the COPY destination.
pub fn placement<'f>(set: &FileSet, file: &'f str) -> &'f str {
    let FileSet::Only(paths) = set else {
        return file;
    };
    for path in paths {
        if path == "." {
            return file;
        }
        if path == file {
            return file.rsplit('/').next().unwrap_or(file);
        }
        if let Some(rest) = file.strip_prefix(path.as_str()).and_then(|r| r.strip_prefix('/')) {
            return rest;
        }
    }
    file
}

fn to_context_path(root: &Path, path: &Path) -> Result<String, ContextError> {
    // Walker entries are `root` joined with the relative path.
    let mut parts = Vec::new();
    for component in path.components().skip(root.components().count()) {
        if let Component::Normal(part) = component {
            let part = part.to_str().ok_or_else(|| ContextError::NonUtf8Path {
                path: path.to_path_buf(),
            })?;
            parts.push(part);
        }
    }
    Ok(parts.join("/"))
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("build context {path} is not a directory")]
    NotADirectory { path: PathBuf },
    #[error("failed to walk build context {root}")]
    Walk { root: PathBuf, source: ignore::Error },
    #[error("invalid ignore file {path}")]
    Dockerignore { path: PathBuf, source: ignore::Error },
    #[error("path {path} is not valid UTF-8")]
    NonUtf8Path { path: PathBuf },
    #[error("{path:?} is not present in build context {root}")]
    Missing { path: String, root: PathBuf },
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy file {path}")]
    CopyFile {
        path: PathBuf,
        source: std::io::Error,
    },
}
