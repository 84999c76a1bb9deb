//! Frequency-domain views of a plane: directional stripe energy from the
//! central spectrum lines, and autocorrelation for period estimates.

use super::Gray;

/// Mean intensity per row.
pub fn row_profile(gray: &Gray) -> Vec<f64> {
    (0..gray.height())
        .map(|y| {
            let row = gray.row(y);
            row.iter().map(|&v| v as f64).sum::<f64>() / row.len().max(1) as f64
        })
        .collect()
}

/// Mean intensity per column.
pub fn col_profile(gray: &Gray) -> Vec<f64> {
    let (w, h) = (gray.width(), gray.height());
    let mut sums = vec![0.0; w];
    for y in 0..h {
        for (x, &v) in gray.row(y).iter().enumerate() {
            sums[x] += v as f64;
        }
    }
    sums.iter().map(|s| s / h.max(1) as f64).collect()
}

/// Magnitudes of the discrete Fourier transform of a real signal.
/// Index 0 is the DC term; only the first half is meaningful for real
/// input, but the full spectrum is returned.
pub fn dft_magnitude(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }
    let mut magnitudes = Vec::with_capacity(n);
    let step = -2.0 * std::f64::consts::PI / n as f64;
    for k in 0..n {
        let mut re = 0.0;
        let mut im = 0.0;
        for (t, &x) in signal.iter().enumerate() {
            let angle = step * (k as f64) * (t as f64);
            re += x * angle.cos();
            im += x * angle.sin();
        }
        magnitudes.push((re * re + im * im).sqrt());
    }
    magnitudes
}

/// Directional stripe energy read off the central lines of the spectrum.
///
/// Horizontal stripes concentrate energy on the vertical center line of
/// the 2-D spectrum, which equals the 1-D spectrum of the row profile;
/// likewise for vertical stripes and the column profile. Energies are
/// normalized by the spectrum maximum (the DC term), the DC neighborhood
/// is excluded, and the outermost band is trimmed the same way on both
/// axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripeEnergies {
    pub horizontal: f64,
    pub vertical: f64,
}

pub fn stripe_energies(gray: &Gray) -> StripeEnergies {
    let (w, h) = (gray.width(), gray.height());
    if w < 8 || h < 8 {
        return StripeEnergies {
            horizontal: 0.0,
            vertical: 0.0,
        };
    }
    let margin = w.min(h) / 10;
    let center_margin = (w.min(h) / 20).max(1);

    let horizontal = band_energy(&dft_magnitude(&row_profile(gray)), center_margin, margin);
    let vertical = band_energy(&dft_magnitude(&col_profile(gray)), center_margin, margin);
    StripeEnergies {
        horizontal,
        vertical,
    }
}

/// Peak normalized magnitude over frequencies in
/// `[center_margin, n/2 - edge_margin]`. A periodic pattern concentrates
/// its energy in one bin, so the band peak separates stripes from broad
/// noise far better than the band mean.
fn band_energy(magnitudes: &[f64], center_margin: usize, edge_margin: usize) -> f64 {
    let n = magnitudes.len();
    if n < 4 {
        return 0.0;
    }
    let max = magnitudes.iter().cloned().fold(f64::MIN, f64::max);
    if max <= 0.0 {
        return 0.0;
    }
    let lo = center_margin.max(1);
    let hi = (n / 2).saturating_sub(edge_margin);
    if hi <= lo {
        return 0.0;
    }
    magnitudes[lo..hi]
        .iter()
        .fold(0.0f64, |acc, &m| acc.max(m / max))
}

/// Lag of the first autocorrelation peak of a mean-removed signal, or 0
/// when no peak exists. Used to estimate stripe period in pixels.
pub fn autocorr_first_peak(signal: &[f64]) -> f64 {
    let n = signal.len();
    if n < 3 {
        return 0.0;
    }
    let mean = signal.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = signal.iter().map(|v| v - mean).collect();

    let mut autocorr = Vec::with_capacity(n);
    for lag in 0..n {
        let mut sum = 0.0;
        for t in 0..n - lag {
            sum += centered[t] * centered[t + lag];
        }
        autocorr.push(sum);
    }
    for lag in 1..n - 1 {
        if autocorr[lag] > autocorr[lag - 1] && autocorr[lag] > autocorr[lag + 1] {
            return lag as f64;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped(w: usize, h: usize, period: usize, horizontal: bool) -> Gray {
        let mut data = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                let band = if horizontal { y } else { x };
                if (band / period) % 2 == 0 {
                    data[y * w + x] = 220;
                } else {
                    data[y * w + x] = 30;
                }
            }
        }
        Gray::new(w, h, data)
    }

    #[test]
    fn flat_plane_has_no_stripe_energy() {
        let flat = Gray::new(64, 64, vec![128; 64 * 64]);
        let energies = stripe_energies(&flat);
        assert!(energies.horizontal < 1e-9);
        assert!(energies.vertical < 1e-9);
    }

    #[test]
    fn horizontal_stripes_dominate_the_row_spectrum() {
        let bars = striped(64, 64, 4, true);
        let energies = stripe_energies(&bars);
        assert!(energies.horizontal > energies.vertical * 2.0);
        assert!(energies.horizontal > 0.05);
    }

    #[test]
    fn vertical_stripes_dominate_the_column_spectrum() {
        let bars = striped(64, 64, 4, false);
        let energies = stripe_energies(&bars);
        assert!(energies.vertical > energies.horizontal * 2.0);
    }

    #[test]
    fn autocorr_recovers_the_period() {
        let signal: Vec<f64> = (0..128)
            .map(|t| ((t % 8) < 4) as u8 as f64 * 100.0)
            .collect();
        let peak = autocorr_first_peak(&signal);
        assert!((peak - 8.0).abs() <= 1.0, "peak = {peak}");
    }
}
