//! First-order statistics and histogram comparisons on byte planes.

/// Mean of a byte plane.
pub fn mean(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: u64 = data.iter().map(|&v| v as u64).sum();
    sum as f64 / data.len() as f64
}

/// Mean and population standard deviation in one pass.
pub fn mean_std(data: &[u8]) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let mut sum: u64 = 0;
    let mut sq_sum: u64 = 0;
    for &v in data {
        sum += v as u64;
        sq_sum += (v as u64) * (v as u64);
    }
    let n = data.len() as f64;
    let mean = sum as f64 / n;
    let variance = (sq_sum as f64 / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

pub fn min_max(data: &[u8]) -> (u8, u8) {
    let mut lo = u8::MAX;
    let mut hi = u8::MIN;
    for &v in data {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if data.is_empty() { (0, 0) } else { (lo, hi) }
}

/// 256-bin intensity histogram.
pub fn histogram256(data: &[u8]) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for &v in data {
        hist[v as usize] += 1;
    }
    hist
}

/// Value below which `p` percent of the samples fall, from the histogram.
pub fn percentile(data: &[u8], p: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let hist = histogram256(data);
    let target = (p / 100.0 * data.len() as f64).round() as u64;
    let mut cumulative = 0u64;
    for (value, &count) in hist.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return value as f64;
        }
    }
    255.0
}

/// Shannon entropy (base 2) of the intensity distribution.
pub fn histogram_entropy(hist: &[u64; 256]) -> f64 {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for &count in hist.iter() {
        if count > 0 {
            let p = count as f64 / total as f64;
            entropy -= p * p.log2();
        }
    }
    entropy
}

/// Pearson correlation between two histograms. 1.0 for identical
/// distributions, invariant to prior scaling of either histogram.
pub fn hist_correlation(a: &[u64], b: &[u64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len() as f64;
    let mean_a: f64 = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b: f64 = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        // Both flat: identical shape.
        if var_a == var_b { 1.0 } else { 0.0 }
    } else {
        cov / denom
    }
}

/// Bhattacharyya distance between two histograms. 0.0 for identical
/// distributions, 1.0 for disjoint ones.
pub fn hist_bhattacharyya(a: &[u64], b: &[u64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len() as f64;
    let mean_a: f64 = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b: f64 = b.iter().map(|&v| v as f64).sum::<f64>() / n;
    if mean_a == 0.0 || mean_b == 0.0 {
        return if mean_a == mean_b { 0.0 } else { 1.0 };
    }

    let mut bc = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        bc += ((x as f64) * (y as f64)).sqrt();
    }
    let normalized = bc / (mean_a * mean_b * n * n).sqrt();
    (1.0 - normalized.min(1.0)).max(0.0).sqrt()
}
