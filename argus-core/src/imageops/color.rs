//! HSV decomposition and channel-level color statistics.
//!
//! Hue uses the half-degree convention (0..180) so the detector
//! calibration ranges carry over unchanged.

use argus_model::Frame;

/// Dense HSV planes of a frame. `h` in 0..180, `s` and `v` in 0..255.
#[derive(Debug, Clone)]
pub struct HsvPlanes {
    pub h: Vec<u8>,
    pub s: Vec<u8>,
    pub v: Vec<u8>,
}

pub fn hsv_planes(frame: &Frame) -> HsvPlanes {
    let pixels = frame.len();
    let mut h_plane = Vec::with_capacity(pixels);
    let mut s_plane = Vec::with_capacity(pixels);
    let mut v_plane = Vec::with_capacity(pixels);

    for chunk in frame.data().chunks_exact(3) {
        let (b, g, r) = (chunk[0] as f64, chunk[1] as f64, chunk[2] as f64);
        let max = b.max(g).max(r);
        let min = b.min(g).min(r);
        let delta = max - min;

        let v = max;
        let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
        let h = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * (g - b) / delta
        } else if max == g {
            120.0 + 60.0 * (b - r) / delta
        } else {
            240.0 + 60.0 * (r - g) / delta
        };
        let h = if h < 0.0 { h + 360.0 } else { h } / 2.0;

        h_plane.push(h.round().clamp(0.0, 179.0) as u8);
        s_plane.push(s.round().clamp(0.0, 255.0) as u8);
        v_plane.push(v.round().clamp(0.0, 255.0) as u8);
    }

    HsvPlanes {
        h: h_plane,
        s: s_plane,
        v: v_plane,
    }
}

/// Per-channel means in BGR order.
pub fn channel_means(frame: &Frame) -> (f64, f64, f64) {
    let mut sums = [0u64; 3];
    for chunk in frame.data().chunks_exact(3) {
        sums[0] += chunk[0] as u64;
        sums[1] += chunk[1] as u64;
        sums[2] += chunk[2] as u64;
    }
    let n = frame.len().max(1) as f64;
    (sums[0] as f64 / n, sums[1] as f64 / n, sums[2] as f64 / n)
}

/// Per-channel means restricted to pixels where `mask` is false.
/// Falls back to the global means when the mask covers everything.
pub fn channel_means_masked(frame: &Frame, exclude: &[bool]) -> (f64, f64, f64) {
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for (i, chunk) in frame.data().chunks_exact(3).enumerate() {
        if exclude[i] {
            continue;
        }
        sums[0] += chunk[0] as u64;
        sums[1] += chunk[1] as u64;
        sums[2] += chunk[2] as u64;
        count += 1;
    }
    if count == 0 {
        return channel_means(frame);
    }
    (
        sums[0] as f64 / count as f64,
        sums[1] as f64 / count as f64,
        sums[2] as f64 / count as f64,
    )
}

/// Fraction of pixels whose hue falls in `[h_lo, h_hi]` with saturation
/// and value both at least `sv_min`.
pub fn hue_range_ratio(hsv: &HsvPlanes, h_lo: u8, h_hi: u8, sv_min: u8) -> f64 {
    let total = hsv.h.len();
    if total == 0 {
        return 0.0;
    }
    let mut count = 0usize;
    for i in 0..total {
        if hsv.h[i] >= h_lo && hsv.h[i] <= h_hi && hsv.s[i] >= sv_min && hsv.v[i] >= sv_min {
            count += 1;
        }
    }
    count as f64 / total as f64
}

/// 180-bin hue histogram.
pub fn hue_histogram(hsv: &HsvPlanes) -> [u64; 180] {
    let mut hist = [0u64; 180];
    for &h in &hsv.h {
        hist[(h as usize).min(179)] += 1;
    }
    hist
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_blue_lands_in_the_blue_hue_band() {
        let frame = Frame::filled(4, 4, 255, 0, 0);
        let hsv = hsv_planes(&frame);
        assert_eq!(hsv.h[0], 120);
        assert_eq!(hsv.s[0], 255);
        assert_eq!(hsv.v[0], 255);
        assert_eq!(hue_range_ratio(&hsv, 100, 130, 100), 1.0);
    }

    #[test]
    fn pure_green_lands_in_the_green_hue_band() {
        let frame = Frame::filled(4, 4, 0, 255, 0);
        let hsv = hsv_planes(&frame);
        assert_eq!(hsv.h[0], 60);
        assert_eq!(hue_range_ratio(&hsv, 35, 85, 100), 1.0);
    }

    #[test]
    fn gray_has_zero_saturation() {
        let frame = Frame::filled(4, 4, 130, 130, 130);
        let hsv = hsv_planes(&frame);
        assert!(hsv.s.iter().all(|&s| s == 0));
    }

    #[test]
    fn channel_means_follow_the_fill() {
        let frame = Frame::filled(8, 8, 10, 20, 30);
        let (b, g, r) = channel_means(&frame);
        assert_eq!((b, g, r), (10.0, 20.0, 30.0));
    }

    #[test]
    fn masked_means_skip_excluded_pixels() {
        let mut frame = Frame::filled(2, 1, 0, 0, 0);
        frame.set_pixel(1, 0, [200, 200, 200]);
        let exclude = vec![false, true];
        let (b, _, _) = channel_means_masked(&frame, &exclude);
        assert_eq!(b, 0.0);
    }
}
