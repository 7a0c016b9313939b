//! In-tree face backends.

pub mod luma;
pub mod stub;

use std::collections::BTreeMap;
use std::f64::consts::PI;

use super::FaceRect;

/// Synthesize the nine standard landmark groups from a bounding box.
///
/// Point counts match the 68-point convention (chin 17, eyebrows 5+5, nose
/// bridge 4, nose tip 5, eyes 6+6, lips 12+12). Positions come from a fixed
/// template scaled into the rect, so the geometry is a pure function of the
/// box.
pub(crate) fn landmarks_for_rect(rect: &FaceRect) -> BTreeMap<String, Vec<[i64; 2]>> {
    let mut groups: BTreeMap<String, Vec<[i64; 2]>> = BTreeMap::new();

    let chin = (0..17)
        .map(|i| {
            let t = i as f64 / 16.0;
            (t, 0.50 + 0.48 * (PI * t).sin())
        })
        .collect();
    groups.insert("chin".to_string(), scale(rect, chin));

    for (name, x0) in [("left_eyebrow", 0.12), ("right_eyebrow", 0.60)] {
        let brow = (0..5)
            .map(|i| {
                let t = i as f64 / 4.0;
                (x0 + 0.28 * t, 0.22 - 0.04 * (PI * t).sin())
            })
            .collect();
        groups.insert(name.to_string(), scale(rect, brow));
    }

    let bridge = (0..4).map(|i| (0.50, 0.30 + 0.08 * i as f64)).collect();
    groups.insert("nose_bridge".to_string(), scale(rect, bridge));

    let tip = (0..5).map(|i| (0.42 + 0.04 * i as f64, 0.60)).collect();
    groups.insert("nose_tip".to_string(), scale(rect, tip));

    for (name, cx) in [("left_eye", 0.30), ("right_eye", 0.70)] {
        let eye = (0..6)
            .map(|i| {
                let a = 2.0 * PI * i as f64 / 6.0;
                (cx + 0.08 * a.cos(), 0.32 + 0.03 * a.sin())
            })
            .collect();
        groups.insert(name.to_string(), scale(rect, eye));
    }

    let top_lip = (0..12)
        .map(|i| {
            let t = i as f64 / 11.0;
            (0.32 + 0.36 * t, 0.72 - 0.03 * (PI * t).sin())
        })
        .collect();
    groups.insert("top_lip".to_string(), scale(rect, top_lip));

    let bottom_lip = (0..12)
        .map(|i| {
            let t = i as f64 / 11.0;
            (0.68 - 0.36 * t, 0.72 + 0.05 * (PI * t).sin())
        })
        .collect();
    groups.insert("bottom_lip".to_string(), scale(rect, bottom_lip));

    groups
}

fn scale(rect: &FaceRect, normalized: Vec<(f64, f64)>) -> Vec<[i64; 2]> {
    let w = rect.width() as f64;
    let h = rect.height() as f64;
    normalized
        .into_iter()
        .map(|(fx, fy)| {
            [
                rect.left + (fx * w).round() as i64,
                rect.top + (fy * h).round() as i64,
            ]
        })
        .collect()
}
