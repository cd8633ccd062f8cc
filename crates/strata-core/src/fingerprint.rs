use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::step::{BuildStep, FileSet, StepInputs};

/// Bumped whenever the fingerprint encoding changes, so old caches miss.
const FINGERPRINT_DOMAIN: &[u8] = b"strata-layer-v2";

/// Content address of a layer (or of a set of copied files).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    fn from_hasher(hasher: Sha256) -> Self {
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for display.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let valid = s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if valid {
            Ok(Self(s.to_owned()))
        } else {
            Err(crate::Error::InvalidFingerprint {
                value: s.to_owned(),
            })
        }
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Length-prefixed write, so adjacent fields cannot run into each other.
fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Computes the layer fingerprint of `step` stacked on `upstream`.
///
/// `content` is the digest of the files a COPY step reads; it is ignored for
/// every other kind. A RUN step therefore depends only on its upstream
/// layers and its command string.
pub fn fingerprint(
    upstream: Option<&Fingerprint>,
    step: &BuildStep,
    content: Option<&Fingerprint>,
) -> Fingerprint {
    let mut hasher = Sha256::new();
    write_field(&mut hasher, FINGERPRINT_DOMAIN);
    write_field(&mut hasher, upstream.map(Fingerprint::as_str).unwrap_or("").as_bytes());
    write_field(&mut hasher, step.kind().as_str().as_bytes());
    write_field(&mut hasher, step.workdir.as_bytes());

    match &step.inputs {
        StepInputs::Image { reference } => write_field(&mut hasher, reference.as_bytes()),
        StepInputs::Files { files, destination } => {
            let (mode, paths) = match files {
                FileSet::Only(paths) => ("only", paths),
                FileSet::AllExcept(paths) => ("all_except", paths),
            };
            write_field(&mut hasher, mode.as_bytes());
            hasher.update((paths.len() as u64).to_le_bytes());
            for path in paths {
                write_field(&mut hasher, path.as_bytes());
            }
            write_field(&mut hasher, destination.as_bytes());
            write_field(&mut hasher, content.map(Fingerprint::as_str).unwrap_or("").as_bytes());
        }
        StepInputs::Command { command } => write_field(&mut hasher, command.as_bytes()),
        StepInputs::Port { port } => write_field(&mut hasher, &port.to_le_bytes()),
    }

    Fingerprint::from_hasher(hasher)
}

/// Incremental digest over a set of context files.
///
/// Callers must add files in a stable (sorted) order.
pub struct ContentDigest {
    hasher: Sha256,
    files: usize,
}

impl ContentDigest {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            files: 0,
        }
    }

    /// `mode` is the file's `st_mode`, so permission and file type changes
    /// count as content changes.
    pub fn add_file(&mut self, relative_path: &str, mode: u32, contents: &[u8]) {
        write_field(&mut self.hasher, relative_path.as_bytes());
        write_field(&mut self.hasher, &mode.to_le_bytes());
        write_field(&mut self.hasher, contents);
        self.files += 1;
    }

    pub fn len(&self) -> usize {
        self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files == 0
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint::from_hasher(self.hasher)
    }
}

impl Default for ContentDigest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(files: &[(&str, &str)]) -> Fingerprint {
        let mut digest = ContentDigest::new();
        for (path, contents) in files {
            digest.add_file(path, 0o100_644, contents.as_bytes());
        }
        digest.finish()
    }

    #[test]
    fn fingerprint_is_hex_and_parses_back() {
        let fp = fingerprint(None, &BuildStep::set_base("python:3.11-slim"), None);
        assert_eq!(fp.as_str().len(), 64);
        assert_eq!(fp.short().len(), 12);
        assert_eq!(fp.as_str().parse::<Fingerprint>().unwrap(), fp);
    }

    #[test]
    fn parse_rejects_uppercase_and_short_values() {
        assert!("ABC".parse::<Fingerprint>().is_err());
        assert!("A".repeat(64).parse::<Fingerprint>().is_err());
    }

    #[test]
    fn run_step_ignores_content_digest() {
        let base = fingerprint(None, &BuildStep::set_base("python:3.11-slim"), None);
        let run = BuildStep::run("pip install -r requirements.txt", "/app");
        let a = fingerprint(Some(&base), &run, Some(&digest_of(&[("main.py", "v1")])));
        let b = fingerprint(Some(&base), &run, Some(&digest_of(&[("main.py", "v2")])));
        assert_eq!(a, b);
    }

    #[test]
    fn copy_step_tracks_content() {
        let base = fingerprint(None, &BuildStep::set_base("python:3.11-slim"), None);
        let copy = BuildStep::copy(FileSet::Only(vec!["requirements.txt".into()]), ".", "/app");
        let a = fingerprint(Some(&base), &copy, Some(&digest_of(&[("requirements.txt", "flask==3.0")])));
        let b = fingerprint(Some(&base), &copy, Some(&digest_of(&[("requirements.txt", "flask==3.1")])));
        assert_ne!(a, b);
    }

    #[test]
    fn upstream_change_propagates() {
        let run = BuildStep::run("make", "/app");
        let up_a = fingerprint(None, &BuildStep::set_base("python:3.11-slim"), None);
        let up_b = fingerprint(None, &BuildStep::set_base("python:3.12-slim"), None);
        assert_ne!(fingerprint(Some(&up_a), &run, None), fingerprint(Some(&up_b), &run, None));
    }

    #[test]
    fn digest_is_path_sensitive() {
        assert_ne!(digest_of(&[("a", "x")]), digest_of(&[("b", "x")]));
        assert_ne!(digest_of(&[("ab", "")]), digest_of(&[("a", "b")]));
    }

    #[test]
    fn digest_is_mode_sensitive() {
        let mut plain = ContentDigest::new();
        plain.add_file("run.sh", 0o100_644, b"echo hi");
        let mut executable = ContentDigest::new();
        executable.add_file("run.sh", 0o100_755, b"echo hi");
        assert_ne!(plain.finish(), executable.finish());
    }
}
