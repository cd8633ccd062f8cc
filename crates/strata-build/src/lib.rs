//! Layered image build pipeline, Dockerfile rendering/parsing, and eject.
//!
//! # Build pipeline
//!
//! ```text
//! strata build
//!   1. Plan       ── strata.toml → BuildPlan (or .strata/Dockerfile when ejected)
//!   2. Validate   ── manifest COPY → install RUN → source COPY, ports agree
//!   3. Context    ── walk build context (root .dockerignore, nested .gitignore)
//!   4. Fold       ── fp_n = fingerprint(fp_{n-1}, step_n, digest(copied files))
//!                    hit  → reuse layer, nothing runs
//!                    miss → build in <fp>.partial/, rename into place
//!   5. Image      ── .strata/images/<tag>.json, written only on success
//! ```
//!
//! # Layer store
//!
//! Every filesystem-mutating layer keeps a full snapshot of the image
//! filesystem under `.strata/layers/<fingerprint>/rootfs`. A failed step
//! discards only its own partial directory, so a retry resumes from the last
//! committed layer.
//!
//! # Execution
//!
//! With `pull` set, the base layer holds the exported filesystem of the
//! pulled image and each RUN step runs in a docker container made from the
//! current rootfs, which is then exported back. Without it, RUN uses the host
//! shell in `<rootfs>/<workdir>`.

pub mod context;
pub mod dockerfile;
pub mod eject;
pub mod executor;
pub mod pipeline;
pub mod store;

pub use context::BuildContext;
pub use dockerfile::{DockerfileGenerator, parse_dockerfile};
pub use executor::{DockerExecutor, HostExecutor, ShellExecutor, StepExecutor};
pub use pipeline::{BuildError, BuildReport, Builder};
pub use store::LayerStore;
