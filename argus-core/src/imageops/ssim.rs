//! Windowed structural similarity between grayscale planes.

use super::Gray;

const K1: f64 = 0.01;
const K2: f64 = 0.03;
const L: f64 = 255.0;
const WINDOW: usize = 8;

/// Mean SSIM over non-overlapping 8x8 windows. Both planes must have the
/// same dimensions. Returns 1.0 for identical planes.
pub fn ssim(a: &Gray, b: &Gray) -> f64 {
    debug_assert_eq!(a.width(), b.width());
    debug_assert_eq!(a.height(), b.height());
    let (w, h) = (a.width(), a.height());
    if w == 0 || h == 0 {
        return 0.0;
    }

    let c1 = (K1 * L) * (K1 * L);
    let c2 = (K2 * L) * (K2 * L);

    let mut sum = 0.0;
    let mut count = 0usize;
    for wy in (0..h).step_by(WINDOW) {
        for wx in (0..w).step_by(WINDOW) {
            let win_w = WINDOW.min(w - wx);
            let win_h = WINDOW.min(h - wy);
            let n = (win_w * win_h) as f64;

            let mut sum_x = 0.0;
            let mut sum_y = 0.0;
            let mut sum_xx = 0.0;
            let mut sum_yy = 0.0;
            let mut sum_xy = 0.0;
            for y in wy..wy + win_h {
                for x in wx..wx + win_w {
                    let px = a.get(x, y) as f64;
                    let py = b.get(x, y) as f64;
                    sum_x += px;
                    sum_y += py;
                    sum_xx += px * px;
                    sum_yy += py * py;
                    sum_xy += px * py;
                }
            }
            let mean_x = sum_x / n;
            let mean_y = sum_y / n;
            let var_x = sum_xx / n - mean_x * mean_x;
            let var_y = sum_yy / n - mean_y * mean_y;
            let cov = sum_xy / n - mean_x * mean_y;

            let numerator = (2.0 * mean_x * mean_y + c1) * (2.0 * cov + c2);
            let denominator = (mean_x * mean_x + mean_y * mean_y + c1) * (var_x + var_y + c2);
            sum += numerator / denominator;
            count += 1;
        }
    }
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// SSIM per cell of a `grid x grid` partition, row-major. Trailing rows
/// and columns absorb the remainder.
pub fn grid_ssim(a: &Gray, b: &Gray, grid: usize) -> Vec<f64> {
    debug_assert_eq!(a.width(), b.width());
    debug_assert_eq!(a.height(), b.height());
    let (w, h) = (a.width(), a.height());
    if grid == 0 || w < grid || h < grid {
        return Vec::new();
    }
    let cell_w = w / grid;
    let cell_h = h / grid;
    let mut scores = Vec::with_capacity(grid * grid);
    for gy in 0..grid {
        let y0 = gy * cell_h;
        let y1 = if gy == grid - 1 { h } else { (gy + 1) * cell_h };
        for gx in 0..grid {
            let x0 = gx * cell_w;
            let x1 = if gx == grid - 1 { w } else { (gx + 1) * cell_w };
            scores.push(ssim(&crop(a, x0, y0, x1, y1), &crop(b, x0, y0, x1, y1)));
        }
    }
    scores
}

fn crop(gray: &Gray, x0: usize, y0: usize, x1: usize, y1: usize) -> Gray {
    let mut data = Vec::with_capacity((x1 - x0) * (y1 - y0));
    for y in y0..y1 {
        data.extend_from_slice(&gray.row(y)[x0..x1]);
    }
    Gray::new(x1 - x0, y1 - y0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_planes_score_one() {
        let a = Gray::new(16, 16, (0..256).map(|v| v as u8).collect());
        let score = ssim(&a, &a);
        assert!((score - 1.0).abs() < 1e-3, "score = {score}");
    }

    #[test]
    fn small_perturbation_stays_high() {
        let a = Gray::new(8, 8, vec![128; 64]);
        let mut data = vec![128u8; 64];
        data[30] = 130;
        let b = Gray::new(8, 8, data);
        let score = ssim(&a, &b);
        assert!(score > 0.95 && score < 1.0);
    }

    #[test]
    fn opposed_structure_scores_low() {
        // A gradient against its inversion: anti-correlated structure.
        let up: Vec<u8> = (0..256).map(|i| i as u8).collect();
        let down: Vec<u8> = (0..256).map(|i| 255 - i as u8).collect();
        let a = Gray::new(16, 16, up);
        let b = Gray::new(16, 16, down);
        let score = ssim(&a, &b);
        assert!(score < 0.5, "score = {score}");
    }

    #[test]
    fn grid_ssim_isolates_a_changed_cell() {
        let gradient: Vec<u8> = (0..900).map(|i| (i % 251) as u8).collect();
        let a = Gray::new(30, 30, gradient.clone());
        let mut data = gradient;
        // Flatten the bottom-right 10x10 cell only.
        for y in 20..30 {
            for x in 20..30 {
                data[y * 30 + x] = 120;
            }
        }
        let b = Gray::new(30, 30, data);
        let cells = grid_ssim(&a, &b, 3);
        assert_eq!(cells.len(), 9);
        assert!(cells[8] < 0.8, "corrupted cell = {}", cells[8]);
        assert!(cells[0] > 0.99);
    }
}
