//! Fixed-geometry backend for tests and fixtures.

use anyhow::Result;

use super::landmarks_for_rect;
use crate::fingerprint::backend::FaceBackend;
use crate::fingerprint::{FaceRecord, FaceRect};

/// Reports one face filling the center half of every frame. Content-blind
/// on purpose: fixtures get stable geometry out of arbitrary pixels.
#[derive(Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl FaceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _luma: &[u8], width: u32, height: u32) -> Result<Vec<FaceRecord>> {
        let w = width as i64;
        let h = height as i64;
        let rect = FaceRect::new(h / 4, w * 3 / 4, h * 3 / 4, w / 4);
        Ok(vec![FaceRecord {
            landmarks: landmarks_for_rect(&rect),
            rect,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_the_center_box() {
        let mut backend = StubBackend::new();
        let faces = backend.detect(&[], 100, 80).unwrap();
        assert_eq!(faces.len(), 1);
        let rect = &faces[0].rect;
        assert_eq!((rect.top, rect.left, rect.bottom, rect.right), (20, 25, 60, 75));
    }
}
