//! Core types and configuration for strata.
//!
//! This crate defines the `strata.toml` schema ([`StrataConfig`]), the build
//! data model ([`BuildStep`], [`Layer`], [`Image`], [`LaunchDescriptor`]),
//! the layer [`fingerprint`] function, and [`BuildPlan`] validation.
//!
//! # Cache-sensitive layering
//!
//! ```text
//! SET_BASE python:3.11-slim        fp0 = H(-,   base)
//! COPY requirements.txt .          fp1 = H(fp0, copy, digest(requirements.txt))
//! RUN pip install -r ...           fp2 = H(fp1, run)          <- reused while fp1 holds
//! COPY <rest of context> .         fp3 = H(fp2, copy, digest(rest))
//! DECLARE_PORT 8001                fp4 = H(fp3, port)
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod image;
pub mod plan;
pub mod step;

pub use config::{BuildConfig, CONFIG_FILE, ImageConfig, LaunchConfig, StrataConfig};
pub use error::{Error, Result};
pub use fingerprint::{ContentDigest, Fingerprint, fingerprint};
pub use image::{Image, LaunchDescriptor, Layer};
pub use plan::BuildPlan;
pub use step::{BuildStep, FileSet, StepInputs, StepKind, covers, normalize_context_path};
