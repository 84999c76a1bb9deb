//! Derivative operators used by the sharpness and texture checks.

use super::Gray;

/// Variance of the 3x3 Laplacian response over the plane interior.
///
/// The classic focus measure: crisp frames have a wide second-derivative
/// distribution, defocused ones collapse toward zero.
pub fn laplacian_variance(gray: &Gray) -> f64 {
    let (w, h) = (gray.width(), gray.height());
    if w < 3 || h < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut sq_sum = 0.0;
    let mut count = 0usize;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let v = laplacian_at(gray, x, y);
            sum += v;
            sq_sum += v * v;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    (sq_sum / count as f64 - mean * mean).max(0.0)
}

/// Robust noise sigma: median absolute Laplacian response divided by the
/// 0.6745 consistency constant.
pub fn laplacian_mad_sigma(gray: &Gray) -> f64 {
    let (w, h) = (gray.width(), gray.height());
    if w < 3 || h < 3 {
        return 0.0;
    }
    // |laplacian| of 8-bit input is bounded by 4*255; a fixed-size
    // histogram gives the median without a sort.
    let mut hist = vec![0u64; 4 * 255 + 1];
    let mut count = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let v = laplacian_at(gray, x, y).abs().round() as usize;
            let idx = v.min(hist.len() - 1);
            hist[idx] += 1;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    let target = count.div_ceil(2);
    let mut cumulative = 0u64;
    let mut median = 0usize;
    for (value, &c) in hist.iter().enumerate() {
        cumulative += c;
        if cumulative >= target {
            median = value;
            break;
        }
    }
    median as f64 / 0.6745
}

#[inline]
fn laplacian_at(gray: &Gray, x: usize, y: usize) -> f64 {
    let c = gray.get(x, y) as f64;
    let up = gray.get(x, y - 1) as f64;
    let down = gray.get(x, y + 1) as f64;
    let left = gray.get(x - 1, y) as f64;
    let right = gray.get(x + 1, y) as f64;
    up + down + left + right - 4.0 * c
}

#[inline]
fn sobel_at(gray: &Gray, x: usize, y: usize) -> (f64, f64) {
    let p = |dx: isize, dy: isize| {
        gray.get((x as isize + dx) as usize, (y as isize + dy) as usize) as f64
    };
    let gx = -p(-1, -1) + p(1, -1) - 2.0 * p(-1, 0) + 2.0 * p(1, 0) - p(-1, 1) + p(1, 1);
    let gy = -p(-1, -1) - 2.0 * p(0, -1) - p(1, -1) + p(-1, 1) + 2.0 * p(0, 1) + p(1, 1);
    (gx, gy)
}

/// Mean Sobel gradient magnitude.
pub fn sobel_magnitude_mean(gray: &Gray) -> f64 {
    let (w, h) = (gray.width(), gray.height());
    if w < 3 || h < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let (gx, gy) = sobel_at(gray, x, y);
            sum += (gx * gx + gy * gy).sqrt();
        }
    }
    sum / ((w - 2) * (h - 2)) as f64
}

/// Tenengrad focus measure: mean squared Sobel gradient.
pub fn tenengrad(gray: &Gray) -> f64 {
    let (w, h) = (gray.width(), gray.height());
    if w < 3 || h < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let (gx, gy) = sobel_at(gray, x, y);
            sum += gx * gx + gy * gy;
        }
    }
    sum / ((w - 2) * (h - 2)) as f64
}

/// Brenner focus measure: mean squared two-pixel horizontal difference.
pub fn brenner(gray: &Gray) -> f64 {
    let (w, h) = (gray.width(), gray.height());
    if w < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for y in 0..h {
        let row = gray.row(y);
        for x in 0..w - 2 {
            let d = row[x + 2] as f64 - row[x] as f64;
            sum += d * d;
        }
    }
    sum / (h * (w - 2)) as f64
}

/// Binary edge map: pixels whose Sobel magnitude exceeds `threshold`.
/// Border pixels are never edges.
pub fn edge_map(gray: &Gray, threshold: f64) -> Vec<bool> {
    let (w, h) = (gray.width(), gray.height());
    let mut map = vec![false; w * h];
    if w < 3 || h < 3 {
        return map;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let (gx, gy) = sobel_at(gray, x, y);
            if (gx * gx + gy * gy).sqrt() > threshold {
                map[y * w + x] = true;
            }
        }
    }
    map
}

/// Fraction of pixels on an edge, per [`edge_map`].
pub fn edge_density(gray: &Gray, threshold: f64) -> f64 {
    if gray.is_empty() {
        return 0.0;
    }
    let map = edge_map(gray, threshold);
    map.iter().filter(|&&e| e).count() as f64 / map.len() as f64
}

/// Default magnitude threshold for [`edge_map`], tuned so that natural
/// scenes land near the edge densities the detectors were calibrated on.
pub const EDGE_THRESHOLD: f64 = 150.0;
