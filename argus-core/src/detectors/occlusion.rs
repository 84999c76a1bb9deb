//! Occlusion detection: is the lens covered, smeared, or partly blocked?
//!
//! Nine weighted indicators vote on the verdict, from global edge
//! sparsity down to long narrow uniform bands (pillars, window frames).
//! A natural-element factor tempers the vote when low-texture regions
//! still carry micro-texture, which is typical of foliage rather than an
//! occluder. All numeric constants here are heuristics and live on
//! [`OcclusionOptions`] as tunables.

use std::time::Instant;

use argus_config::Thresholds;
use argus_model::{DetectionLevel, Evidence, EvidenceValue, Finding, Frame, Severity, issues};

use crate::imageops::Gray;
use crate::imageops::color::{HsvPlanes, hsv_planes};
use crate::imageops::filter::local_mean_std;
use crate::imageops::gradients::{EDGE_THRESHOLD, edge_map};
use crate::imageops::stats::{mean, mean_std, min_max};

use super::{Detector, DetectorMetadata, elapsed_ms};

pub static METADATA: DetectorMetadata = DetectorMetadata {
    name: "occlusion",
    display_name: "Lens occlusion",
    description: "Detects covered, smeared, or partially blocked lenses",
    version: "1.1.0",
    priority: 25,
    supported_levels: &[
        DetectionLevel::Fast,
        DetectionLevel::Standard,
        DetectionLevel::Deep,
    ],
    suppresses: &[issues::PARTIAL_BLUR, issues::BLUR],
};

/// Heuristic knobs of the occlusion score. Defaults reflect the shipped
/// calibration; none of them is a contract.
#[derive(Debug, Clone)]
pub struct OcclusionOptions {
    pub edge_weight: f64,
    pub contrast_weight: f64,
    pub color_weight: f64,
    pub brightness_weight: f64,
    pub uniform_weight: f64,
    pub mosaic_weight: f64,
    pub solid_color_weight: f64,
    pub dominant_hue_weight: f64,
    pub band_weight: f64,

    /// Block edge for the uniform-block scan.
    pub block_size: usize,
    /// Cell edge for the low-texture mosaic scan.
    pub mosaic_cell: usize,
    /// Local std bound under which a region counts as stable.
    pub stability_std: f64,
    /// Saturation floor for a stable region to count as pure color.
    pub pure_saturation_min: u8,
}

impl Default for OcclusionOptions {
    fn default() -> Self {
        OcclusionOptions {
            edge_weight: 0.15,
            contrast_weight: 0.15,
            color_weight: 0.10,
            brightness_weight: 0.10,
            uniform_weight: 0.15,
            mosaic_weight: 0.12,
            solid_color_weight: 0.10,
            dominant_hue_weight: 0.08,
            band_weight: 0.05,
            block_size: 32,
            mosaic_cell: 16,
            stability_std: 10.0,
            pure_saturation_min: 120,
        }
    }
}

pub struct OcclusionDetector {
    threshold: f64,
    options: OcclusionOptions,
}

impl OcclusionDetector {
    pub fn new(thresholds: &Thresholds) -> Self {
        OcclusionDetector {
            threshold: thresholds.occlusion_threshold,
            options: OcclusionOptions::default(),
        }
    }

    pub fn with_options(thresholds: &Thresholds, options: OcclusionOptions) -> Self {
        OcclusionDetector {
            threshold: thresholds.occlusion_threshold,
            options,
        }
    }

    /// Fraction of blocks that are essentially flat.
    fn uniform_block_ratio(&self, gray: &Gray) -> f64 {
        let size = self.options.block_size;
        let blocks_x = gray.width() / size;
        let blocks_y = gray.height() / size;
        if blocks_x == 0 || blocks_y == 0 {
            return 0.0;
        }
        let mut uniform = 0usize;
        let mut block = Vec::with_capacity(size * size);
        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                block.clear();
                for y in by * size..(by + 1) * size {
                    block.extend_from_slice(&gray.row(y)[bx * size..(bx + 1) * size]);
                }
                let (_, std) = mean_std(&block);
                let (lo, hi) = min_max(&block);
                if std < 2.0 && (hi - lo) < 10 {
                    uniform += 1;
                }
            }
        }
        uniform as f64 / (blocks_x * blocks_y) as f64
    }

    /// Mosaic of cells that are low-texture AND edge-free AND
    /// hue-stable, plus the mean micro-texture inside those cells for
    /// the natural-element factor.
    fn mosaic_scan(
        &self,
        gray: &Gray,
        hsv: &HsvPlanes,
        edges: &[bool],
        micro_stds: &[f64],
    ) -> (f64, f64) {
        let cell = self.options.mosaic_cell;
        let cells_x = gray.width() / cell;
        let cells_y = gray.height() / cell;
        if cells_x == 0 || cells_y == 0 {
            return (0.0, 0.0);
        }
        let w = gray.width();
        let mut flagged = 0usize;
        let mut micro_sum = 0.0;
        let mut micro_cells = 0usize;
        let mut values = Vec::with_capacity(cell * cell);
        let mut hues = Vec::with_capacity(cell * cell);
        for cy in 0..cells_y {
            for cx in 0..cells_x {
                values.clear();
                hues.clear();
                let mut edge_count = 0usize;
                let mut micro = 0.0;
                for y in cy * cell..(cy + 1) * cell {
                    for x in cx * cell..(cx + 1) * cell {
                        let i = y * w + x;
                        values.push(gray.data()[i]);
                        hues.push(hsv.h[i]);
                        if edges[i] {
                            edge_count += 1;
                        }
                        micro += micro_stds[i];
                    }
                }
                let (_, std) = mean_std(&values);
                let (_, hue_std) = mean_std(&hues);
                let low_texture = std < 4.0;
                if low_texture {
                    micro_sum += micro / values.len() as f64;
                    micro_cells += 1;
                }
                if low_texture && edge_count == 0 && hue_std < 5.0 {
                    flagged += 1;
                }
            }
        }
        let micro_mean = if micro_cells > 0 {
            micro_sum / micro_cells as f64
        } else {
            0.0
        };
        (flagged as f64 / (cells_x * cells_y) as f64, micro_mean)
    }

    /// Stable saturated region share (a likely physical occluder).
    fn solid_color_ratio(&self, hsv: &HsvPlanes, local_stds: &[f64]) -> f64 {
        let total = hsv.s.len();
        if total == 0 {
            return 0.0;
        }
        let mut count = 0usize;
        for i in 0..total {
            if local_stds[i] < self.options.stability_std
                && hsv.s[i] >= self.options.pure_saturation_min
            {
                count += 1;
            }
        }
        count as f64 / total as f64
    }

    /// Share of the frame held by the modal hue among saturated pixels.
    fn dominant_hue_ratio(&self, hsv: &HsvPlanes) -> f64 {
        let total = hsv.h.len();
        if total == 0 {
            return 0.0;
        }
        let mut hist = [0u64; 180];
        for i in 0..total {
            if hsv.s[i] > 60 {
                hist[hsv.h[i] as usize] += 1;
            }
        }
        let peak = hist
            .iter()
            .enumerate()
            .max_by_key(|&(_, &c)| c)
            .map(|(h, _)| h)
            .unwrap_or(0);
        let mut window = 0u64;
        for (h, &c) in hist.iter().enumerate() {
            let dist = (h as isize - peak as isize).unsigned_abs();
            if dist <= 10 || 180 - dist <= 10 {
                window += c;
            }
        }
        window as f64 / total as f64
    }

    /// Long narrow uniform bands: runs of at least three adjacent
    /// near-flat columns or rows (pillars, posts, window frames).
    fn band_ratio(&self, gray: &Gray) -> f64 {
        let columns = Self::flat_run_ratio((0..gray.width()).map(|x| {
            let column: Vec<u8> = (0..gray.height()).map(|y| gray.get(x, y)).collect();
            mean_std(&column).1 < 5.0
        }));
        let rows =
            Self::flat_run_ratio((0..gray.height()).map(|y| mean_std(gray.row(y)).1 < 5.0));
        columns.max(rows)
    }

    fn flat_run_ratio(flags: impl Iterator<Item = bool>) -> f64 {
        let flags: Vec<bool> = flags.collect();
        if flags.is_empty() {
            return 0.0;
        }
        let mut in_band = 0usize;
        let mut run = 0usize;
        for &flat in &flags {
            if flat {
                run += 1;
            } else {
                if run >= 3 {
                    in_band += run;
                }
                run = 0;
            }
        }
        if run >= 3 {
            in_band += run;
        }
        in_band as f64 / flags.len() as f64
    }

    fn severity(&self, score: f64) -> Severity {
        if score <= self.threshold {
            Severity::Normal
        } else if score <= self.threshold + 0.2 {
            Severity::Info
        } else if score <= self.threshold + 0.45 {
            Severity::Warning
        } else {
            Severity::Critical
        }
    }
}

impl Detector for OcclusionDetector {
    fn metadata(&self) -> &DetectorMetadata {
        &METADATA
    }

    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding {
        let start = Instant::now();
        let opts = &self.options;
        let gray = Gray::from_frame(frame);
        let hsv = hsv_planes(frame);

        let edges = edge_map(&gray, EDGE_THRESHOLD);
        let edge_density =
            edges.iter().filter(|&&e| e).count() as f64 / edges.len().max(1) as f64;
        let (_, global_contrast) = mean_std(gray.data());
        let (_, hue_std) = mean_std(&hsv.h);
        let saturation_mean = mean(&hsv.s);
        let (min_v, max_v) = min_max(gray.data());
        let brightness_range = max_v as f64 - min_v as f64;

        let (_, local_stds) = local_mean_std(&gray, 15);
        let (_, micro_stds) = local_mean_std(&gray, 3);

        let uniform_ratio = self.uniform_block_ratio(&gray);
        let (mosaic_ratio, micro_mean) =
            self.mosaic_scan(&gray, &hsv, &edges, &micro_stds);
        let solid_ratio = self.solid_color_ratio(&hsv, &local_stds);
        let dominant_ratio = self.dominant_hue_ratio(&hsv);
        let band_ratio = self.band_ratio(&gray);

        let edge_score = (1.0 - edge_density * 50.0).max(0.0);
        let contrast_score = (1.0 - global_contrast / 40.0).max(0.0);
        let color_score = (1.0 - hue_std / 30.0).max(0.0);
        let brightness_score = (1.0 - brightness_range / 100.0).max(0.0);

        let mut score = edge_score * opts.edge_weight
            + contrast_score * opts.contrast_weight
            + color_score * opts.color_weight
            + brightness_score * opts.brightness_weight
            + uniform_ratio * opts.uniform_weight
            + mosaic_ratio * opts.mosaic_weight
            + solid_ratio * opts.solid_color_weight
            + dominant_ratio * opts.dominant_hue_weight
            + band_ratio * opts.band_weight;

        // Foliage and similar natural cover keeps micro-texture alive
        // inside its low-texture regions; an occluder does not.
        let natural_factor = 1.0 - ((micro_mean - 2.0) / 10.0).clamp(0.0, 0.5);
        score *= natural_factor;

        // A frame with clear structure and no large uniform region is a
        // scene, whatever the region statistics hint at.
        if edge_density > 0.03 && global_contrast > 35.0 && uniform_ratio < 0.3 {
            score *= 0.3;
        }
        if hue_std > 25.0 && saturation_mean > 20.0 && uniform_ratio < 0.3 {
            score *= 0.5;
        }
        let score = score.clamp(0.0, 1.0);

        let is_abnormal = score > self.threshold;
        let severity = self.severity(score);
        let confidence = if is_abnormal {
            ((score - self.threshold) / (1.0 - self.threshold)).min(1.0)
        } else {
            ((self.threshold - score) / self.threshold).min(1.0)
        };

        let mut evidence = Evidence::new();
        evidence.insert("occlusion_score".into(), score.into());
        evidence.insert("edge_density".into(), edge_density.into());
        evidence.insert("global_contrast".into(), global_contrast.into());
        evidence.insert("hue_std".into(), hue_std.into());
        evidence.insert("saturation_mean".into(), saturation_mean.into());
        evidence.insert("brightness_range".into(), brightness_range.into());
        evidence.insert("very_uniform_ratio".into(), uniform_ratio.into());
        evidence.insert("mosaic_ratio".into(), mosaic_ratio.into());
        evidence.insert("solid_color_ratio".into(), solid_ratio.into());
        evidence.insert("dominant_hue_ratio".into(), dominant_ratio.into());
        evidence.insert("band_ratio".into(), band_ratio.into());
        evidence.insert("natural_factor".into(), natural_factor.into());
        evidence.insert("occlusion_threshold".into(), self.threshold.into());

        let mut sub_scores = Evidence::new();
        sub_scores.insert("edge_score".into(), edge_score.into());
        sub_scores.insert("contrast_score".into(), contrast_score.into());
        sub_scores.insert("color_score".into(), color_score.into());
        sub_scores.insert("brightness_score".into(), brightness_score.into());
        sub_scores.insert("uniform_score".into(), uniform_ratio.into());
        evidence.insert("sub_scores".into(), EvidenceValue::Map(sub_scores));

        if level == DetectionLevel::Deep {
            // Count connected low-texture regions coarsely: flagged
            // mosaic cells scaled back to a region estimate.
            let cells = (gray.width() / opts.mosaic_cell) * (gray.height() / opts.mosaic_cell);
            evidence.insert(
                "occlusion_regions".into(),
                ((mosaic_ratio * cells as f64).round()).into(),
            );
        }

        let explanation = if is_abnormal {
            if score > 0.7 {
                format!("Severe occlusion; {:.0}% of the view is affected", score * 100.0)
            } else if score > 0.5 {
                format!("Partial occlusion; {:.0}% of the view is affected", score * 100.0)
            } else {
                format!("Slight occlusion; {:.0}% of the view is affected", score * 100.0)
            }
        } else {
            "No significant occlusion".to_string()
        };

        let possible_causes = if is_abnormal {
            let mut causes = vec![
                "Object blocking the lens".to_string(),
                "Heavy dirt on the lens".to_string(),
                "Camera has been repositioned".to_string(),
            ];
            if severity == Severity::Critical {
                causes.push("Lens cap still on".to_string());
                causes.push("Camera fully covered".to_string());
            }
            causes
        } else {
            Vec::new()
        };

        Finding {
            detector_name: METADATA.name.to_string(),
            issue_type: if is_abnormal {
                issues::OCCLUSION.to_string()
            } else {
                issues::normal_for(METADATA.name)
            },
            is_abnormal,
            score,
            threshold: self.threshold,
            confidence: confidence.max(0.0),
            severity,
            explanation,
            possible_causes,
            suggestions: if is_abnormal {
                vec![
                    "Check for objects in front of the camera".to_string(),
                    "Clean the lens".to_string(),
                    "Verify the mounting position".to_string(),
                    "Confirm the lens cap is removed".to_string(),
                ]
            } else {
                Vec::new()
            },
            evidence,
            process_time_ms: elapsed_ms(start),
            detection_level: level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn natural_scene(w: u32, h: u32) -> Frame {
        // Busy texture with varied hues, edges, and full dynamic range.
        let mut frame = Frame::filled(w, h, 0, 0, 0);
        for y in 0..h {
            for x in 0..w {
                let b = ((x * 7 + y * 3) % 256) as u8;
                let g = ((x * 5 + y * 11 + 60) % 256) as u8;
                let r = ((x * 13 + y * 17 + 120) % 256) as u8;
                frame.set_pixel(x, y, [b, g, r]);
            }
        }
        frame
    }

    #[test]
    fn covered_lens_scores_high() {
        let detector = OcclusionDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(96, 96, 40, 40, 40), DetectionLevel::Standard);
        assert!(finding.is_abnormal, "score = {}", finding.score);
        assert_eq!(finding.issue_type, issues::OCCLUSION);
        assert!(finding.score > 0.5);
        assert!(finding.is_well_formed());
    }

    #[test]
    fn busy_scene_is_clear() {
        let detector = OcclusionDetector::new(&Thresholds::default());
        let finding = detector.detect(&natural_scene(96, 96), DetectionLevel::Standard);
        assert!(!finding.is_abnormal, "score = {}", finding.score);
    }

    #[test]
    fn large_solid_block_over_a_scene_is_flagged() {
        let detector = OcclusionDetector::new(&Thresholds::default());
        // 60% bright red rectangle over a natural remainder.
        let mut frame = natural_scene(160, 96);
        for y in 0..96 {
            for x in 0..96 {
                frame.set_pixel(x, y, [0, 0, 230]);
            }
        }
        let finding = detector.detect(&frame, DetectionLevel::Standard);
        let solid = finding.evidence["solid_color_ratio"].as_number().unwrap();
        assert!(solid > 0.2, "solid_color_ratio = {solid}");
        assert!(finding.is_abnormal, "score = {}", finding.score);
    }
}
