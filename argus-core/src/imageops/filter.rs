//! Spatial filters: integral-image box statistics, median filtering,
//! and bilinear resampling.

use argus_model::Frame;

use super::Gray;

/// Per-pixel local mean and standard deviation over a `k x k` box,
/// computed with summed-area tables. Windows are clipped at the borders.
pub fn local_mean_std(gray: &Gray, k: usize) -> (Vec<f64>, Vec<f64>) {
    let (w, h) = (gray.width(), gray.height());
    let mut integral = vec![0u64; (w + 1) * (h + 1)];
    let mut sq_integral = vec![0u64; (w + 1) * (h + 1)];
    for y in 0..h {
        let row = gray.row(y);
        let mut run = 0u64;
        let mut sq_run = 0u64;
        for x in 0..w {
            let v = row[x] as u64;
            run += v;
            sq_run += v * v;
            let idx = (y + 1) * (w + 1) + (x + 1);
            integral[idx] = integral[idx - (w + 1)] + run;
            sq_integral[idx] = sq_integral[idx - (w + 1)] + sq_run;
        }
    }

    let half = k / 2;
    let mut means = vec![0.0; w * h];
    let mut stds = vec![0.0; w * h];
    let box_sum = |table: &[u64], x0: usize, y0: usize, x1: usize, y1: usize| {
        // Inclusive box [x0, x1] x [y0, y1] in image coordinates.
        table[(y1 + 1) * (w + 1) + (x1 + 1)] + table[y0 * (w + 1) + x0]
            - table[y0 * (w + 1) + (x1 + 1)]
            - table[(y1 + 1) * (w + 1) + x0]
    };
    for y in 0..h {
        let y0 = y.saturating_sub(half);
        let y1 = (y + half).min(h - 1);
        for x in 0..w {
            let x0 = x.saturating_sub(half);
            let x1 = (x + half).min(w - 1);
            let count = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
            let sum = box_sum(&integral, x0, y0, x1, y1) as f64;
            let sq = box_sum(&sq_integral, x0, y0, x1, y1) as f64;
            let mean = sum / count;
            means[y * w + x] = mean;
            stds[y * w + x] = (sq / count - mean * mean).max(0.0).sqrt();
        }
    }
    (means, stds)
}

/// Median filter with a square window of `2 * radius + 1`. Border windows
/// are clipped rather than padded.
pub fn median_filter(gray: &Gray, radius: usize) -> Gray {
    let (w, h) = (gray.width(), gray.height());
    let mut out = vec![0u8; w * h];
    let mut window: Vec<u8> = Vec::with_capacity((2 * radius + 1) * (2 * radius + 1));
    for y in 0..h {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius).min(h - 1);
        for x in 0..w {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius).min(w - 1);
            window.clear();
            for wy in y0..=y1 {
                window.extend_from_slice(&gray.row(wy)[x0..=x1]);
            }
            let mid = window.len() / 2;
            let (_, median, _) = window.select_nth_unstable(mid);
            out[y * w + x] = *median;
        }
    }
    Gray::new(w, h, out)
}

/// Bilinear resampling of a grayscale plane.
pub fn resize_gray(gray: &Gray, new_width: usize, new_height: usize) -> Gray {
    let (w, h) = (gray.width(), gray.height());
    if new_width == 0 || new_height == 0 || w == 0 || h == 0 {
        return Gray::new(0, 0, Vec::new());
    }
    let mut out = Vec::with_capacity(new_width * new_height);
    let x_scale = w as f64 / new_width as f64;
    let y_scale = h as f64 / new_height as f64;
    for ny in 0..new_height {
        let fy = ((ny as f64 + 0.5) * y_scale - 0.5).clamp(0.0, (h - 1) as f64);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(h - 1);
        let wy = fy - y0 as f64;
        for nx in 0..new_width {
            let fx = ((nx as f64 + 0.5) * x_scale - 0.5).clamp(0.0, (w - 1) as f64);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);
            let wx = fx - x0 as f64;
            let top = gray.get(x0, y0) as f64 * (1.0 - wx) + gray.get(x1, y0) as f64 * wx;
            let bottom = gray.get(x0, y1) as f64 * (1.0 - wx) + gray.get(x1, y1) as f64 * wx;
            out.push((top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8);
        }
    }
    Gray::new(new_width, new_height, out)
}

/// Bilinear resampling of a BGR frame.
pub fn resize_frame(frame: &Frame, new_width: u32, new_height: u32) -> Frame {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let (nw, nh) = (new_width as usize, new_height as usize);
    let mut out = vec![0u8; nw * nh * 3];
    if w == 0 || h == 0 || nw == 0 || nh == 0 {
        return Frame::filled(0, 0, 0, 0, 0);
    }
    let x_scale = w as f64 / nw as f64;
    let y_scale = h as f64 / nh as f64;
    for ny in 0..nh {
        let fy = ((ny as f64 + 0.5) * y_scale - 0.5).clamp(0.0, (h - 1) as f64);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(h - 1);
        let wy = fy - y0 as f64;
        for nx in 0..nw {
            let fx = ((nx as f64 + 0.5) * x_scale - 0.5).clamp(0.0, (w - 1) as f64);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(w - 1);
            let wx = fx - x0 as f64;
            for c in 0..3 {
                let sample = |x: usize, y: usize| frame.data()[(y * w + x) * 3 + c] as f64;
                let top = sample(x0, y0) * (1.0 - wx) + sample(x1, y0) * wx;
                let bottom = sample(x0, y1) * (1.0 - wx) + sample(x1, y1) * wx;
                out[(ny * nw + nx) * 3 + c] =
                    (top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Frame::from_bgr(new_width, new_height, out).expect("sized buffer")
}

/// Mean squared error between two equally sized planes.
pub fn mse(a: &Gray, b: &Gray) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    for (&x, &y) in a.data().iter().zip(b.data().iter()) {
        let d = x as f64 - y as f64;
        sum += d * d;
    }
    sum / a.len() as f64
}
