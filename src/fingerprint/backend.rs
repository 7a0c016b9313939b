//! Face backend seam.
//!
//! The fingerprint never depends on a particular detector; it depends on
//! this trait. Deployments pick a backend by name in configuration. The
//! in-tree backends are heuristic stand-ins with a fixed landmark template;
//! the trait is where a real landmark model plugs in.
//!
//! Changing the backend (or its version) changes every hash it produces, so
//! a deployment must pin one backend for the lifetime of its provenance
//! store.

use anyhow::{anyhow, Result};

use super::FaceRecord;
use crate::fingerprint::backends::{luma::LumaBackend, stub::StubBackend};

pub trait FaceBackend {
    /// Backend identifier (also the configuration name).
    fn name(&self) -> &'static str;

    /// Detect faces on a luminance plane.
    ///
    /// Implementations must be deterministic: equal planes in, equal
    /// geometry out. Any model state must be fixed at construction.
    fn detect(&mut self, luma: &[u8], width: u32, height: u32) -> Result<Vec<FaceRecord>>;
}

/// Resolve a backend by configured name. `auto` prefers the luminance
/// backend.
pub fn face_backend(name: &str) -> Result<Box<dyn FaceBackend>> {
    match name {
        "auto" | "luma" => Ok(Box::new(LumaBackend::new())),
        "stub" => Ok(Box::new(StubBackend::new())),
        other => Err(anyhow!("unknown face backend '{}'", other)),
    }
}
