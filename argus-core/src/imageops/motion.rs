//! Corner selection and local block matching for global-motion estimates.

use super::Gray;

/// A tracked point in pixel coordinates.
pub type Point = (usize, usize);

/// Shi-Tomasi style corner selection: per-pixel minimum eigenvalue of the
/// 3x3-summed structure tensor, greedy pick of the strongest responses at
/// least `min_distance` apart.
pub fn good_corners(gray: &Gray, max_count: usize, min_distance: usize) -> Vec<Point> {
    let (w, h) = (gray.width(), gray.height());
    if w < 8 || h < 8 || max_count == 0 {
        return Vec::new();
    }

    let mut responses: Vec<(f64, Point)> = Vec::new();
    // Stride 2 keeps the candidate list tractable on large frames.
    for y in (2..h - 2).step_by(2) {
        for x in (2..w - 2).step_by(2) {
            let mut ixx = 0.0;
            let mut iyy = 0.0;
            let mut ixy = 0.0;
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let px = (x as isize + dx) as usize;
                    let py = (y as isize + dy) as usize;
                    let gx = gray.get(px + 1, py) as f64 - gray.get(px - 1, py) as f64;
                    let gy = gray.get(px, py + 1) as f64 - gray.get(px, py - 1) as f64;
                    ixx += gx * gx;
                    iyy += gy * gy;
                    ixy += gx * gy;
                }
            }
            // Minimum eigenvalue of [[ixx, ixy], [ixy, iyy]].
            let trace_half = (ixx + iyy) / 2.0;
            let det_part = ((ixx - iyy) / 2.0).powi(2) + ixy * ixy;
            let min_eig = trace_half - det_part.sqrt();
            if min_eig > 0.0 {
                responses.push((min_eig, (x, y)));
            }
        }
    }
    responses.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut picked: Vec<Point> = Vec::with_capacity(max_count);
    let min_sq = (min_distance * min_distance) as isize;
    for (_, candidate) in responses {
        if picked.len() >= max_count {
            break;
        }
        let far_enough = picked.iter().all(|&(px, py)| {
            let dx = px as isize - candidate.0 as isize;
            let dy = py as isize - candidate.1 as isize;
            dx * dx + dy * dy >= min_sq
        });
        if far_enough {
            picked.push(candidate);
        }
    }
    picked
}

/// Track one point from `prev` to `curr` by SAD block matching: a
/// `(2*patch+1)^2` template searched over a `±search` window. Returns the
/// displacement, or None when the point sits too close to the border.
pub fn track_point(
    prev: &Gray,
    curr: &Gray,
    point: Point,
    patch: usize,
    search: usize,
) -> Option<(f64, f64)> {
    let (w, h) = (prev.width(), prev.height());
    let (x, y) = point;
    let reach = patch + search;
    if x < reach || y < reach || x + reach >= w || y + reach >= h {
        return None;
    }

    let sad = |dx: isize, dy: isize| -> u64 {
        let mut sum = 0u64;
        for py in -(patch as isize)..=(patch as isize) {
            for px in -(patch as isize)..=(patch as isize) {
                let a = prev.get((x as isize + px) as usize, (y as isize + py) as usize);
                let b = curr.get(
                    (x as isize + px + dx) as usize,
                    (y as isize + py + dy) as usize,
                );
                sum += (a as i32 - b as i32).unsigned_abs() as u64;
            }
        }
        sum
    };

    let mut best = (0isize, 0isize);
    let mut best_sad = u64::MAX;
    for dy in -(search as isize)..=(search as isize) {
        for dx in -(search as isize)..=(search as isize) {
            let cost = sad(dx, dy);
            // Ties favor the smaller displacement so static scenes report
            // zero motion.
            let better = cost < best_sad
                || (cost == best_sad
                    && dx * dx + dy * dy < best.0 * best.0 + best.1 * best.1);
            if better {
                best_sad = cost;
                best = (dx, dy);
            }
        }
    }
    Some((best.0 as f64, best.1 as f64))
}

/// Mean displacement of `points` between two frames, with the surviving
/// point positions for continued tracking.
pub fn estimate_motion(
    prev: &Gray,
    curr: &Gray,
    points: &[Point],
    patch: usize,
    search: usize,
) -> (Option<(f64, f64)>, Vec<Point>) {
    let mut sum_dx = 0.0;
    let mut sum_dy = 0.0;
    let mut moved: Vec<Point> = Vec::with_capacity(points.len());
    for &point in points {
        if let Some((dx, dy)) = track_point(prev, curr, point, patch, search) {
            sum_dx += dx;
            sum_dy += dy;
            let nx = (point.0 as isize + dx as isize).max(0) as usize;
            let ny = (point.1 as isize + dy as isize).max(0) as usize;
            moved.push((nx.min(curr.width() - 1), ny.min(curr.height() - 1)));
        }
    }
    if moved.is_empty() {
        (None, moved)
    } else {
        let n = moved.len() as f64;
        (Some((sum_dx / n, sum_dy / n)), moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured(w: usize, h: usize, shift_x: usize) -> Gray {
        let mut data = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let sx = (x + w - shift_x) % w;
                // Blocky pseudo-texture with plenty of corners.
                data[y * w + x] = (((sx / 4) * 37 + (y / 4) * 71) % 251) as u8;
            }
        }
        Gray::new(w, h, data)
    }

    #[test]
    fn finds_corners_in_texture() {
        let gray = textured(64, 64, 0);
        let corners = good_corners(&gray, 50, 8);
        assert!(corners.len() >= 10, "found {}", corners.len());
    }

    #[test]
    fn static_scene_reports_zero_motion() {
        let gray = textured(64, 64, 0);
        let corners = good_corners(&gray, 30, 8);
        let (motion, survivors) = estimate_motion(&gray, &gray, &corners, 4, 6);
        let (dx, dy) = motion.unwrap();
        assert_eq!((dx, dy), (0.0, 0.0));
        assert!(!survivors.is_empty());
    }

    #[test]
    fn recovers_a_global_shift() {
        let a = textured(64, 64, 0);
        let b = textured(64, 64, 3);
        let corners = good_corners(&a, 30, 8);
        let (motion, _) = estimate_motion(&a, &b, &corners, 4, 6);
        let (dx, _) = motion.unwrap();
        assert!((dx - 3.0).abs() <= 1.0, "dx = {dx}");
    }
}
