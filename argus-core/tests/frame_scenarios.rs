//! End-to-end still-frame scenarios through the full pipeline.

use std::sync::Arc;

use argus_config::Thresholds;
use argus_core::detectors::registry::DetectorRegistry;
use argus_core::pipeline::frame::FramePipeline;
use argus_model::{DetectionLevel, Frame, Severity, issues};

fn pipeline() -> FramePipeline {
    FramePipeline::new(
        Arc::new(DetectorRegistry::builtin()),
        Thresholds::default(),
        "normal",
    )
}

fn natural_region(frame: &mut Frame, x0: u32, y0: u32, x1: u32, y1: u32) {
    for y in y0..y1 {
        for x in x0..x1 {
            let b = ((x * 7 + y * 3) % 256) as u8;
            let g = ((x * 5 + y * 11 + 60) % 256) as u8;
            let r = ((x * 13 + y * 17 + 120) % 256) as u8;
            frame.set_pixel(x, y, [b, g, r]);
        }
    }
}

#[test]
fn all_black_frame_reports_signal_loss_with_suppressed_darkness() {
    let diagnosis = pipeline().diagnose(
        &Frame::filled(640, 480, 0, 0, 0),
        DetectionLevel::Standard,
        "black",
        "",
    );

    assert!(diagnosis.is_abnormal);
    let primary = diagnosis.primary_issue.as_deref().unwrap();
    assert!(
        primary == issues::BLACK_SCREEN || primary == issues::SIGNAL_LOSS,
        "primary = {primary}"
    );
    assert_eq!(diagnosis.severity, Severity::Critical);
    assert!(
        diagnosis
            .suppressed_issues
            .contains(&issues::TOO_DARK.to_string())
    );
    assert!(
        !diagnosis
            .independent_issues
            .contains(&issues::TOO_DARK.to_string())
    );
}

#[test]
fn uniform_mid_gray_frame_reports_solid_color_at_warning() {
    let diagnosis = pipeline().diagnose(
        &Frame::filled(640, 480, 128, 128, 128),
        DetectionLevel::Standard,
        "gray",
        "",
    );

    assert!(diagnosis.is_abnormal);
    let primary = diagnosis.primary_issue.as_deref().unwrap();
    assert!(
        primary == issues::SOLID_COLOR || primary == issues::LOW_CONTRAST,
        "primary = {primary}"
    );
    assert_eq!(diagnosis.severity, Severity::Warning);
    // Whichever of the pair is not primary must not be independent.
    let other = if primary == issues::SOLID_COLOR {
        issues::LOW_CONTRAST
    } else {
        issues::SOLID_COLOR
    };
    assert!(!diagnosis.independent_issues.contains(&other.to_string()));
}

#[test]
fn large_pure_color_rectangle_reads_as_occlusion_not_color_cast() {
    // 60% bright red rectangle, natural scene in the remainder.
    let mut frame = Frame::filled(320, 200, 0, 0, 230);
    natural_region(&mut frame, 192, 0, 320, 200);

    let diagnosis =
        pipeline().diagnose(&frame, DetectionLevel::Standard, "red-block", "");

    let occlusion = diagnosis
        .findings
        .iter()
        .find(|f| f.detector_name == "occlusion")
        .expect("occlusion finding present");
    let solid_ratio = occlusion.evidence["solid_color_ratio"].as_number().unwrap();
    assert!(solid_ratio > 0.2, "solid_color_ratio = {solid_ratio}");
    assert!(occlusion.is_abnormal, "occlusion score = {}", occlusion.score);

    let color = diagnosis
        .findings
        .iter()
        .find(|f| f.detector_name == "color")
        .expect("color finding present");
    assert_ne!(color.issue_type, issues::COLOR_CAST);
}

#[test]
fn suppressed_issues_are_justified_by_the_table() {
    let pipeline = pipeline();
    let table = FramePipeline::default_suppression_table();
    for fill in [(0u8, 0u8, 0u8), (128, 128, 128), (255, 255, 255)] {
        let frame = Frame::filled(320, 240, fill.0, fill.1, fill.2);
        let diagnosis = pipeline.diagnose(&frame, DetectionLevel::Standard, "law", "");
        for suppressed in &diagnosis.suppressed_issues {
            let justified = diagnosis.independent_issues.iter().any(|active| {
                table
                    .get(active)
                    .is_some_and(|hidden| hidden.contains(suppressed))
            });
            assert!(justified, "{suppressed} suppressed without a visible cause");
        }
    }
}

#[test]
fn deep_level_runs_every_detector() {
    let mut frame = Frame::filled(320, 240, 0, 0, 0);
    natural_region(&mut frame, 0, 0, 320, 240);
    let diagnosis = pipeline().diagnose(&frame, DetectionLevel::Deep, "deep", "");
    assert_eq!(diagnosis.findings.len(), 8);
    for finding in &diagnosis.findings {
        assert!(finding.is_well_formed(), "{} malformed", finding.detector_name);
        assert_eq!(finding.detection_level, DetectionLevel::Deep);
    }
    // Scores map carries one entry per detector.
    assert_eq!(diagnosis.scores.len(), 8);
}

#[test]
fn custom_suppression_rules_take_effect() {
    let pipeline = pipeline();
    // Make grayscale hide low contrast, then diagnose a gray gradient
    // that triggers both.
    pipeline.add_suppression_rule(
        issues::GRAYSCALE,
        vec![issues::LOW_CONTRAST.to_string()],
    );

    let mut frame = Frame::filled(320, 240, 0, 0, 0);
    for y in 0..240 {
        for x in 0..320 {
            let v = 110 + ((x + y) % 17) as u8;
            frame.set_pixel(x, y, [v, v, v]);
        }
    }
    let diagnosis = pipeline.diagnose(&frame, DetectionLevel::Standard, "rule", "");
    if diagnosis
        .independent_issues
        .contains(&issues::GRAYSCALE.to_string())
    {
        assert!(
            !diagnosis
                .independent_issues
                .contains(&issues::LOW_CONTRAST.to_string())
        );
    }
}
