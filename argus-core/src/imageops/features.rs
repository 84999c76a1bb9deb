//! Binary keypoint descriptors and Hamming matching for the baseline
//! comparator's feature-similarity signal.

use super::Gray;
use super::motion::{Point, good_corners};

/// 256-bit intensity-comparison descriptor.
pub type Descriptor = [u8; 32];

const PATCH_RADIUS: usize = 7;

/// Deterministic comparison pattern: 256 point pairs inside the patch,
/// generated once from a fixed linear congruential sequence so every
/// descriptor uses the same layout.
fn comparison_pairs() -> Vec<((isize, isize), (isize, isize))> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next = || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 33) as i64).unsigned_abs()
    };
    let span = (2 * PATCH_RADIUS + 1) as u64;
    let mut pairs = Vec::with_capacity(256);
    for _ in 0..256 {
        let a = (
            (next() % span) as isize - PATCH_RADIUS as isize,
            (next() % span) as isize - PATCH_RADIUS as isize,
        );
        let b = (
            (next() % span) as isize - PATCH_RADIUS as isize,
            (next() % span) as isize - PATCH_RADIUS as isize,
        );
        pairs.push((a, b));
    }
    pairs
}

/// Keypoints with descriptors for a plane. Points too close to the border
/// for a full patch are skipped.
pub fn extract_features(gray: &Gray, max_count: usize) -> Vec<(Point, Descriptor)> {
    let pairs = comparison_pairs();
    let corners = good_corners(gray, max_count, 10);
    let (w, h) = (gray.width(), gray.height());

    let mut features = Vec::with_capacity(corners.len());
    for (x, y) in corners {
        if x < PATCH_RADIUS || y < PATCH_RADIUS || x + PATCH_RADIUS >= w || y + PATCH_RADIUS >= h
        {
            continue;
        }
        let mut descriptor = [0u8; 32];
        for (bit, ((ax, ay), (bx, by))) in pairs.iter().enumerate() {
            let pa = gray.get((x as isize + ax) as usize, (y as isize + ay) as usize);
            let pb = gray.get((x as isize + bx) as usize, (y as isize + by) as usize);
            if pa > pb {
                descriptor[bit / 8] |= 1 << (bit % 8);
            }
        }
        features.push(((x, y), descriptor));
    }
    features
}

fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum()
}

/// Fraction of cross-checked nearest-neighbor matches under the distance
/// cap, relative to the larger feature set. 0.0 when either set is empty.
pub fn match_ratio(a: &[(Point, Descriptor)], b: &[(Point, Descriptor)]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    const MAX_DISTANCE: u32 = 64;

    let nearest = |from: &[(Point, Descriptor)], to: &[(Point, Descriptor)], i: usize| {
        let mut best = (u32::MAX, usize::MAX);
        for (j, (_, d)) in to.iter().enumerate() {
            let dist = hamming(&from[i].1, d);
            if dist < best.0 {
                best = (dist, j);
            }
        }
        best
    };

    let mut matches = 0usize;
    for i in 0..a.len() {
        let (dist, j) = nearest(a, b, i);
        if dist > MAX_DISTANCE || j == usize::MAX {
            continue;
        }
        // Cross-check: b[j]'s best match in a must be i.
        let (_, back) = nearest(b, a, j);
        if back == i {
            matches += 1;
        }
    }
    matches as f64 / a.len().max(b.len()) as f64
}
