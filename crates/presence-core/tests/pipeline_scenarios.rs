use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};
use presence_core::types::{face_indices, hand_indices};
use presence_core::{
    ArtifactError, ArtifactSink, BlinkConfig, CollaboratorError, FaceLandmarks, FaceMatch,
    FaceMatcher, Frame, FrameSource, HandLandmarks, Landmark, LandmarkExtractor, MatchError,
    MissPolicy, Mode, ModeKind, PipelineConfig, QuitFlag, RejectionReason, SourceError,
    VerificationPipeline,
};

const ALICE: u8 = 1;
const BOB: u8 = 2;
const OPEN: f32 = 0.32;
const CLOSED: f32 = 0.05;

/// A 1×1 frame whose red channel encodes who is in it.
fn frame(index: u64, person: u8) -> Frame {
    Frame::new(index, RgbImage::from_pixel(1, 1, Rgb([person, 0, 0])))
}

fn reference(person: u8) -> Frame {
    frame(0, person)
}

/// Face mesh whose eyes both measure `ear`.
fn face_with_ear(ear: f32) -> FaceLandmarks {
    let gap = ear * 0.3;
    let eye = |cx: f32| {
        [
            Landmark::new(cx - 0.15, 0.4),
            Landmark::new(cx - 0.05, 0.4 - gap / 2.0),
            Landmark::new(cx + 0.05, 0.4 - gap / 2.0),
            Landmark::new(cx + 0.15, 0.4),
            Landmark::new(cx + 0.05, 0.4 + gap / 2.0),
            Landmark::new(cx - 0.05, 0.4 + gap / 2.0),
        ]
    };
    let mut points = vec![Landmark::new(0.5, 0.5); 468];
    for (i, p) in face_indices::LEFT_EYE.iter().zip(eye(0.7)) {
        points[*i] = p;
    }
    for (i, p) in face_indices::RIGHT_EYE.iter().zip(eye(0.3)) {
        points[*i] = p;
    }
    FaceLandmarks::new(points)
}

fn thumbs_up(up: bool) -> HandLandmarks {
    let mut points = vec![Landmark::new(0.5, 0.5); 21];
    points[hand_indices::THUMB_TIP].y = if up { 0.1 } else { 0.5 };
    points[hand_indices::THUMB_IP].y = 0.3;
    points[hand_indices::INDEX_FINGER_TIP].y = 0.6;
    points[hand_indices::INDEX_FINGER_PIP].y = 0.4;
    HandLandmarks::new(points)
}

#[derive(Clone, Copy)]
enum Face {
    Ear(f32),
    Absent,
    Fail,
}

#[derive(Clone)]
enum Hand {
    Present(HandLandmarks),
    Absent,
    Fail,
}

struct ScriptedLandmarks {
    faces: HashMap<u64, Face>,
    hand: Hand,
    hand_calls: Rc<Cell<u32>>,
}

impl ScriptedLandmarks {
    fn faces(script: &[Face]) -> Self {
        Self {
            faces: script
                .iter()
                .enumerate()
                .map(|(i, f)| (i as u64 + 1, *f))
                .collect(),
            hand: Hand::Absent,
            hand_calls: Rc::new(Cell::new(0)),
        }
    }

    fn hand(hand: Hand) -> Self {
        Self {
            hand,
            ..Self::faces(&[])
        }
    }
}

impl LandmarkExtractor for ScriptedLandmarks {
    fn face_landmarks(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>, CollaboratorError> {
        match self.faces.get(&frame.index).copied().unwrap_or(Face::Absent) {
            Face::Ear(ear) => Ok(Some(face_with_ear(ear))),
            Face::Absent => Ok(None),
            Face::Fail => Err(CollaboratorError::Model("mesh crashed".into())),
        }
    }

    fn hand_landmarks(&mut self, _frame: &Frame) -> Result<Option<HandLandmarks>, CollaboratorError> {
        self.hand_calls.set(self.hand_calls.get() + 1);
        match &self.hand {
            Hand::Present(h) => Ok(Some(h.clone())),
            Hand::Absent => Ok(None),
            Hand::Fail => Err(CollaboratorError::Model("hand model crashed".into())),
        }
    }
}

/// Matches when both frames carry the same person marker. Marker 0 means
/// "no face in this image".
struct MarkerMatcher {
    calls: Rc<Cell<u32>>,
    fail: bool,
}

impl MarkerMatcher {
    fn new() -> Self {
        Self {
            calls: Rc::new(Cell::new(0)),
            fail: false,
        }
    }
}

impl FaceMatcher for MarkerMatcher {
    fn match_faces(&mut self, reference: &Frame, probe: &Frame) -> Result<FaceMatch, MatchError> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(MatchError::Model("embedding backend offline".into()));
        }
        let a = reference.image.get_pixel(0, 0)[0];
        let b = probe.image.get_pixel(0, 0)[0];
        if a == 0 || b == 0 {
            return Err(MatchError::DetectionFailure("face could not be detected".into()));
        }
        Ok(if a == b {
            FaceMatch {
                matched: true,
                distance: 0.12,
            }
        } else {
            FaceMatch {
                matched: false,
                distance: 0.81,
            }
        })
    }
}

struct ScriptedSource {
    reads: VecDeque<Result<Frame, SourceError>>,
}

impl ScriptedSource {
    /// Frames 1..=n of `person`.
    fn frames(count: u64, person: u8) -> Self {
        Self {
            reads: (1..=count).map(|i| Ok(frame(i, person))).collect(),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        match self.reads.pop_front() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    saved: Arc<Mutex<Vec<u64>>>,
}

impl ArtifactSink for RecordingSink {
    fn persist(&mut self, frame: &Frame) -> Result<PathBuf, ArtifactError> {
        self.saved.lock().unwrap().push(frame.index);
        Ok(PathBuf::from(format!("capture-{}.jpg", frame.index)))
    }
}

struct FailingSink;

impl ArtifactSink for FailingSink {
    fn persist(&mut self, frame: &Frame) -> Result<PathBuf, ArtifactError> {
        Err(ArtifactError::Write {
            path: PathBuf::from("/read-only/live_capture.jpg"),
            reason: format!("frame {} rejected: read-only file system", frame.index),
        })
    }
}

fn blink() -> Vec<Face> {
    vec![Face::Ear(OPEN), Face::Ear(CLOSED), Face::Ear(CLOSED), Face::Ear(OPEN)]
}

fn pipeline(
    landmarks: ScriptedLandmarks,
    matcher: MarkerMatcher,
) -> VerificationPipeline<ScriptedLandmarks, MarkerMatcher> {
    VerificationPipeline::new(landmarks, matcher, PipelineConfig::default()).unwrap()
}

#[test]
fn live_same_identity_with_blink_is_accepted() {
    let matcher = MarkerMatcher::new();
    let calls = matcher.calls.clone();
    let sink = RecordingSink::default();
    let saved = sink.saved.clone();
    let mut p = pipeline(ScriptedLandmarks::faces(&blink()), matcher)
        .with_artifact_sink(Box::new(sink));

    let mut source = ScriptedSource::frames(6, ALICE);
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(report.accepted());
    assert!(report.result.liveness());
    assert!(report.result.identity());
    assert_eq!(report.mode, ModeKind::LiveCapture);
    assert_eq!(report.confirming_frame, Some(4));
    assert_eq!(report.frames_processed, 4);
    assert_eq!(report.rejection, None);
    assert_eq!(report.artifact, Some(PathBuf::from("capture-4.jpg")));
    assert_eq!(calls.get(), 1);
    assert_eq!(*saved.lock().unwrap(), vec![4]);
    // frames 5 and 6 were never pulled
    assert_eq!(source.reads.len(), 2);
}

#[test]
fn live_different_identity_with_blink_is_rejected() {
    let mut p = pipeline(ScriptedLandmarks::faces(&blink()), MarkerMatcher::new());
    let mut source = ScriptedSource::frames(4, BOB);
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(report.result.liveness());
    assert!(!report.result.identity());
    assert!(!report.accepted());
    assert_eq!(report.distance, Some(0.81));
    assert_eq!(
        report.rejection,
        Some(RejectionReason::IdentityMismatch { distance: 0.81 })
    );
}

#[test]
fn live_without_blink_never_calls_matcher() {
    let matcher = MarkerMatcher::new();
    let calls = matcher.calls.clone();
    let sink = RecordingSink::default();
    let saved = sink.saved.clone();
    let script = [Face::Ear(OPEN), Face::Ear(CLOSED), Face::Ear(OPEN), Face::Ear(OPEN)];
    let mut p = pipeline(ScriptedLandmarks::faces(&script), matcher)
        .with_artifact_sink(Box::new(sink));

    let mut source = ScriptedSource::frames(4, ALICE);
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(!report.result.liveness());
    assert!(!report.result.identity());
    assert!(!report.accepted());
    assert_eq!(
        report.rejection,
        Some(RejectionReason::NoBlink { frames_processed: 4 })
    );
    assert_eq!(calls.get(), 0);
    assert!(saved.lock().unwrap().is_empty());
}

#[test]
fn live_skips_unreadable_frames() {
    let mut source = ScriptedSource::frames(4, ALICE);
    source.reads.push_front(Err(SourceError::EmptyFrame));
    source.reads.insert(
        2,
        Err(SourceError::Decode {
            index: 99,
            reason: "truncated jpeg".into(),
        }),
    );

    let mut p = pipeline(ScriptedLandmarks::faces(&blink()), MarkerMatcher::new());
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(report.accepted());
    assert_eq!(report.frames_processed, 4);
    assert_eq!(report.confirming_frame, Some(4));
}

#[test]
fn live_absorbs_landmark_failures_as_misses() {
    let script = [
        Face::Ear(CLOSED),
        Face::Fail,
        Face::Absent,
        Face::Ear(CLOSED),
        Face::Ear(OPEN),
    ];
    let mut p = pipeline(ScriptedLandmarks::faces(&script), MarkerMatcher::new());
    let mut source = ScriptedSource::frames(5, ALICE);
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(report.accepted());
    assert_eq!(report.confirming_frame, Some(5));
}

#[test]
fn live_miss_policy_reset_breaks_closure() {
    let script = [Face::Ear(CLOSED), Face::Absent, Face::Ear(CLOSED), Face::Ear(OPEN)];
    let config = PipelineConfig {
        blink: BlinkConfig {
            miss_policy: MissPolicy::Reset,
            ..BlinkConfig::default()
        },
        max_wait: None,
    };
    let mut p =
        VerificationPipeline::new(ScriptedLandmarks::faces(&script), MarkerMatcher::new(), config)
            .unwrap();
    let mut source = ScriptedSource::frames(4, ALICE);
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(!report.result.liveness());
    assert!(matches!(report.rejection, Some(RejectionReason::NoBlink { .. })));
}

#[test]
fn live_operator_abort_stops_before_first_frame() {
    let matcher = MarkerMatcher::new();
    let calls = matcher.calls.clone();
    let quit = QuitFlag::new();
    let mut p = pipeline(ScriptedLandmarks::faces(&blink()), matcher).with_quit_flag(quit.clone());
    quit.raise();

    let mut source = ScriptedSource::frames(4, ALICE);
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(!report.accepted());
    assert_eq!(report.rejection, Some(RejectionReason::OperatorAbort));
    assert_eq!(report.frames_processed, 0);
    assert_eq!(source.reads.len(), 4);
    assert_eq!(calls.get(), 0);
}

#[test]
fn live_wait_limit_rejects_as_timeout() {
    let config = PipelineConfig {
        max_wait: Some(Duration::ZERO),
        ..PipelineConfig::default()
    };
    let mut p =
        VerificationPipeline::new(ScriptedLandmarks::faces(&blink()), MarkerMatcher::new(), config)
            .unwrap();
    let mut source = ScriptedSource::frames(4, ALICE);
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(!report.result.liveness());
    assert!(matches!(report.rejection, Some(RejectionReason::TimedOut { .. })));
}

#[test]
fn live_detection_failure_is_identity_false() {
    let mut p = pipeline(ScriptedLandmarks::faces(&blink()), MarkerMatcher::new());
    let mut source = ScriptedSource::frames(4, ALICE);
    // marker 0: the matcher finds no face in the reference
    let report = p.run(Mode::LiveCapture(&mut source), &reference(0));

    assert!(report.result.liveness());
    assert!(!report.result.identity());
    assert!(!report.accepted());
    assert_eq!(report.distance, None);
    assert!(matches!(
        report.rejection,
        Some(RejectionReason::NoFaceDetected { .. })
    ));
}

#[test]
fn live_matcher_failure_is_identity_false() {
    let mut matcher = MarkerMatcher::new();
    matcher.fail = true;
    let mut p = pipeline(ScriptedLandmarks::faces(&blink()), matcher);
    let mut source = ScriptedSource::frames(4, ALICE);
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(!report.accepted());
    assert!(matches!(
        report.rejection,
        Some(RejectionReason::MatcherFailure { .. })
    ));
}

#[test]
fn live_artifact_failure_does_not_change_decision() {
    let mut p = pipeline(ScriptedLandmarks::faces(&blink()), MarkerMatcher::new())
        .with_artifact_sink(Box::new(FailingSink));
    let mut source = ScriptedSource::frames(4, ALICE);
    let report = p.run(Mode::LiveCapture(&mut source), &reference(ALICE));

    assert!(report.accepted());
    assert_eq!(report.artifact, None);
}

#[test]
fn static_pair_match_and_thumbs_up_is_accepted() {
    let mut p = pipeline(
        ScriptedLandmarks::hand(Hand::Present(thumbs_up(true))),
        MarkerMatcher::new(),
    );
    let report = p.run(
        Mode::StaticPair {
            probe: frame(0, ALICE),
        },
        &reference(ALICE),
    );

    assert!(report.accepted());
    assert_eq!(report.mode, ModeKind::StaticPair);
    assert_eq!(report.confirming_frame, Some(0));
    assert_eq!(report.distance, Some(0.12));
}

#[test]
fn static_pair_mismatch_skips_gesture_check() {
    let landmarks = ScriptedLandmarks::hand(Hand::Present(thumbs_up(true)));
    let hand_calls = landmarks.hand_calls.clone();
    let mut p = pipeline(landmarks, MarkerMatcher::new());
    let report = p.run(
        Mode::StaticPair {
            probe: frame(0, BOB),
        },
        &reference(ALICE),
    );

    assert!(!report.result.identity());
    assert!(!report.result.liveness());
    assert_eq!(hand_calls.get(), 0);
    assert_eq!(report.rejection.as_ref().map(|r| r.stage()), Some("identity"));
}

#[test]
fn static_pair_without_gesture_is_rejected() {
    let mut p = pipeline(
        ScriptedLandmarks::hand(Hand::Present(thumbs_up(false))),
        MarkerMatcher::new(),
    );
    let report = p.run(
        Mode::StaticPair {
            probe: frame(0, ALICE),
        },
        &reference(ALICE),
    );

    assert!(report.result.identity());
    assert!(!report.result.liveness());
    assert!(!report.accepted());
    assert_eq!(report.rejection, Some(RejectionReason::NoGesture));
}

#[test]
fn static_pair_without_hand_is_rejected() {
    let mut p = pipeline(ScriptedLandmarks::hand(Hand::Absent), MarkerMatcher::new());
    let report = p.run(
        Mode::StaticPair {
            probe: frame(0, ALICE),
        },
        &reference(ALICE),
    );

    assert!(!report.accepted());
    assert_eq!(report.rejection, Some(RejectionReason::NoHand));
}

#[test]
fn static_pair_hand_model_failure_is_liveness_false() {
    let mut p = pipeline(ScriptedLandmarks::hand(Hand::Fail), MarkerMatcher::new());
    let report = p.run(
        Mode::StaticPair {
            probe: frame(0, ALICE),
        },
        &reference(ALICE),
    );

    assert!(report.result.identity());
    assert!(!report.result.liveness());
    assert!(matches!(
        report.rejection,
        Some(RejectionReason::LandmarkFailure { .. })
    ));
}

#[test]
fn invalid_blink_config_is_refused() {
    let config = PipelineConfig {
        blink: BlinkConfig {
            min_consecutive_closed_frames: 0,
            ..BlinkConfig::default()
        },
        max_wait: None,
    };
    assert!(
        VerificationPipeline::new(ScriptedLandmarks::faces(&[]), MarkerMatcher::new(), config)
            .is_err()
    );
}
