use std::io::{self, Write};

use anyhow::Result;
use presence_core::{ModeKind, VerificationReport};

/// Human-readable summary of a run, one line per stage plus the verdict.
pub fn summary_lines(report: &VerificationReport) -> Vec<String> {
    let result = &report.result;
    let mut lines = Vec::new();

    let liveness_label = match report.mode {
        ModeKind::LiveCapture => "Blink liveness",
        ModeKind::StaticPair => "Thumbs-up gesture",
    };
    lines.push(format!("Mode: {}", report.mode));
    lines.push(format!("Frames processed: {}", report.frames_processed));
    lines.push(format!("{liveness_label}: {}", pass_fail(result.liveness())));
    match report.distance {
        Some(distance) => lines.push(format!(
            "Identity match: {} (distance {distance:.4})",
            pass_fail(result.identity())
        )),
        None => lines.push(format!("Identity match: {}", pass_fail(result.identity()))),
    }
    if let Some(path) = &report.artifact {
        lines.push(format!("Confirming frame saved to {}", path.display()));
    }

    lines.push(String::new());
    lines.push("FINAL RESULT".to_string());
    if result.accepted() {
        lines.push("SUCCESS: Identity and liveness both confirmed. Attendance can be marked.".into());
    } else {
        let why = report
            .rejection
            .as_ref()
            .map(|r| format!("{} stage: {r}", r.stage()))
            .unwrap_or_else(|| "verification incomplete".to_string());
        lines.push(format!("FAILED: Attendance rejected ({why})."));
    }
    lines
}

fn pass_fail(ok: bool) -> &'static str {
    if ok {
        "passed"
    } else {
        "failed"
    }
}

pub fn render_report(report: &VerificationReport, json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if json {
        let payload = serde_json::to_string_pretty(report)?;
        writeln!(handle, "{payload}")?;
    } else {
        for line in summary_lines(report) {
            writeln!(handle, "{line}")?;
        }
    }
    Ok(())
}

pub fn render_error(err: &anyhow::Error, json: bool) {
    if json {
        let payload = serde_json::json!({
            "accepted": false,
            "error": format!("{err:#}"),
        });
        println!("{payload}");
    } else {
        eprintln!("error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("cause: {cause}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use presence_core::{
        CollaboratorError, FaceLandmarks, FaceMatch, FaceMatcher, Frame, HandLandmarks,
        LandmarkExtractor, MatchError, Mode, PipelineConfig, VerificationPipeline,
    };

    struct NoHand;

    impl LandmarkExtractor for NoHand {
        fn face_landmarks(&mut self, _: &Frame) -> Result<Option<FaceLandmarks>, CollaboratorError> {
            Ok(None)
        }

        fn hand_landmarks(&mut self, _: &Frame) -> Result<Option<HandLandmarks>, CollaboratorError> {
            Ok(None)
        }
    }

    struct Fixed(bool);

    impl FaceMatcher for Fixed {
        fn match_faces(&mut self, _: &Frame, _: &Frame) -> Result<FaceMatch, MatchError> {
            Ok(FaceMatch {
                matched: self.0,
                distance: if self.0 { 0.12 } else { 0.8 },
            })
        }
    }

    fn pair_report(same_person: bool) -> VerificationReport {
        let still = Frame::new(0, RgbImage::new(1, 1));
        VerificationPipeline::new(NoHand, Fixed(same_person), PipelineConfig::default())
            .unwrap()
            .run(Mode::StaticPair { probe: still.clone() }, &still)
    }

    #[test]
    fn test_mismatch_summary_names_identity_stage() {
        let lines = summary_lines(&pair_report(false));
        assert!(lines.contains(&"Mode: static-pair".to_string()));
        assert!(lines.contains(&"Identity match: failed (distance 0.8000)".to_string()));
        assert!(lines.contains(&"Thumbs-up gesture: failed".to_string()));
        let verdict = lines.last().unwrap();
        assert!(verdict.starts_with("FAILED: Attendance rejected (identity stage"));
    }

    #[test]
    fn test_missing_hand_summary_names_liveness_stage() {
        let report = pair_report(true);
        assert!(report.result.identity());
        let lines = summary_lines(&report);
        assert!(lines.contains(&"Identity match: passed (distance 0.1200)".to_string()));
        assert!(lines.last().unwrap().contains("liveness stage"));
    }

    #[test]
    fn test_report_json_shape() {
        let value = serde_json::to_value(pair_report(false)).unwrap();
        assert_eq!(value["mode"], "static_pair");
        assert_eq!(value["result"]["liveness"], false);
        assert_eq!(value["result"]["identity"], false);
        assert_eq!(value["rejection"]["kind"], "identity_mismatch");
    }
}
