//! Container start: one server process, launched verbatim from the image's
//! launch descriptor.
//!
//! ```text
//! strata launch
//!   images/<tag>.json → port check → <tool> <entrypoint> --host H --port P
//! ```
//!
//! With `build.pull` set the tool runs in a docker container made from the
//! image's top layer rootfs. Otherwise it runs on the host from the image's
//! working directory inside that rootfs.
//!
//! There is no supervision. The server tool's exit code is the launcher's.

pub mod executor;
pub mod launcher;

pub use executor::{ContainerServerTool, ProcessServerTool, ServerTool};
pub use launcher::{LaunchError, Launcher, container_reference};
