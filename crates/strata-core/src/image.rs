use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::step::BuildStep;

/// How the container's single process is started.
///
/// The entry point is an opaque `module:attribute` reference resolved by the
/// server tool, never by strata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    pub server_tool: String,
    pub entrypoint: String,
    /// Taken from `launch.host`, `0.0.0.0` unless overridden. A loopback
    /// host is accepted but unreachable through the published port.
    pub listen_host: String,
    pub listen_port: u16,
}

impl LaunchDescriptor {
    /// Arguments handed to the server tool, without the tool itself.
    pub fn args(&self) -> Vec<String> {
        vec![
            self.entrypoint.clone(),
            "--host".to_owned(),
            self.listen_host.clone(),
            "--port".to_owned(),
            self.listen_port.to_string(),
        ]
    }

    /// Full argument vector, tool first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.server_tool.clone()];
        argv.extend(self.args());
        argv
    }
}

/// One layer of a build, as reported by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Zero-based position in the plan.
    pub index: usize,
    pub fingerprint: Fingerprint,
    pub step: BuildStep,
    /// True when the layer was reused from the cache instead of executed.
    pub cached: bool,
}

/// A built image: ordered layer fingerprints plus launch metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub tag: String,
    pub layers: Vec<Fingerprint>,
    pub launch: LaunchDescriptor,
    pub exposed_port: u16,
    /// Working directory of the final step, where the server tool starts.
    #[serde(default = "root_workdir")]
    pub workdir: String,
}

fn root_workdir() -> String {
    "/".to_owned()
}

impl Image {
    pub fn command(&self) -> &str {
        &self.launch.server_tool
    }

    /// Fingerprint of the topmost layer, which identifies the whole image.
    pub fn id(&self) -> Option<&Fingerprint> {
        self.layers.last()
    }

    /// The launch port must be the port the image declares.
    pub fn check_launch_port(&self) -> crate::Result<()> {
        if self.launch.listen_port == self.exposed_port {
            Ok(())
        } else {
            Err(crate::Error::PortMismatch {
                declared: self.exposed_port,
                launch: self.launch.listen_port,
            })
        }
    }
}
