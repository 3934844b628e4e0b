use image::GrayImage;
use motion_sentry_common::config::SessionConfig;
use motion_sentry_common::frame::{FrameError, VideoFrame};
use tracing::{debug, info};

/// The artifact triple for one frame: the (possibly annotated) feed image,
/// the raw frame difference, and the thresholded motion mask. All three are
/// recorded as parallel streams of a clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipFrame {
    pub frame: VideoFrame,
    pub delta: GrayImage,
    pub mask: GrayImage,
}

/// What the pipeline should do with the current frame. Callers match
/// exhaustively; `Start` is always followed by the buffered confirmation
/// frames as `Append`s in capture order.
#[derive(Debug, PartialEq)]
pub enum RecordingAction {
    NoOp,
    Start { started_at_ms: i64 },
    Append(Box<ClipFrame>),
    Stop,
}

enum SessionState {
    /// No clip open. Motion must be seen on `confirmation_frames` consecutive
    /// frames before recording starts; the frames seen during that run are
    /// buffered so they make it into the clip.
    Idle {
        motion_run: u32,
        pending: Vec<ClipFrame>,
    },
    /// A clip is open. It stays open until the patience window elapses with
    /// no further motion.
    Recording {
        started_at_ms: i64,
        last_motion_at_ms: i64,
    },
}

impl SessionState {
    fn idle() -> Self {
        SessionState::Idle {
            motion_run: 0,
            pending: Vec::new(),
        }
    }
}

/// Recording-session state machine, driven once per frame by the change
/// detector's verdict and the frame's capture timestamp. Deliberately free of
/// clock reads and I/O: identical inputs always produce identical actions.
pub struct SessionController {
    patience_ms: i64,
    confirmation_frames: u32,
    state: SessionState,
}

impl SessionController {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            patience_ms: config.patience_secs as i64 * 1000,
            // 1 starts recording on the very first motion frame.
            confirmation_frames: config.confirmation_frames.max(1),
            state: SessionState::idle(),
        }
    }

    /// Advance the state machine by one frame.
    pub fn tick(
        &mut self,
        now_ms: i64,
        detected: bool,
        clip: ClipFrame,
    ) -> Result<Vec<RecordingAction>, FrameError> {
        if clip.frame.width() == 0 || clip.frame.height() == 0 {
            return Err(FrameError::InvalidFrame {
                width: clip.frame.width(),
                height: clip.frame.height(),
            });
        }

        let actions = match std::mem::replace(&mut self.state, SessionState::idle()) {
            SessionState::Idle {
                motion_run,
                mut pending,
            } => {
                if !detected {
                    // Run broken before confirmation: drop the buffer.
                    vec![RecordingAction::NoOp]
                } else {
                    let motion_run = motion_run + 1;
                    pending.push(clip);
                    if motion_run >= self.confirmation_frames {
                        info!(
                            started_at_ms = now_ms,
                            confirmed_over = motion_run,
                            buffered = pending.len(),
                            "motion confirmed, starting clip"
                        );
                        self.state = SessionState::Recording {
                            started_at_ms: now_ms,
                            last_motion_at_ms: now_ms,
                        };
                        let mut actions = vec![RecordingAction::Start {
                            started_at_ms: now_ms,
                        }];
                        actions.extend(
                            pending
                                .drain(..)
                                .map(|buffered| RecordingAction::Append(Box::new(buffered))),
                        );
                        actions
                    } else {
                        debug!(
                            motion_run,
                            needed = self.confirmation_frames,
                            "motion seen, awaiting confirmation"
                        );
                        self.state = SessionState::Idle {
                            motion_run,
                            pending,
                        };
                        vec![RecordingAction::NoOp]
                    }
                }
            }
            SessionState::Recording {
                started_at_ms,
                last_motion_at_ms,
            } => {
                if detected {
                    self.state = SessionState::Recording {
                        started_at_ms,
                        last_motion_at_ms: now_ms,
                    };
                    vec![RecordingAction::Append(Box::new(clip))]
                } else if now_ms <= last_motion_at_ms + self.patience_ms {
                    // Quiet, but within patience: keep recording through the lull.
                    self.state = SessionState::Recording {
                        started_at_ms,
                        last_motion_at_ms,
                    };
                    vec![RecordingAction::Append(Box::new(clip))]
                } else {
                    info!(
                        started_at_ms,
                        quiet_for_ms = now_ms - last_motion_at_ms,
                        "patience elapsed, stopping clip"
                    );
                    vec![RecordingAction::Stop]
                }
            }
        };

        Ok(actions)
    }

    /// Close any open session for shutdown or end of stream, so the clip is
    /// finalized rather than truncated.
    pub fn close(&mut self) -> Vec<RecordingAction> {
        match std::mem::replace(&mut self.state, SessionState::idle()) {
            SessionState::Recording { started_at_ms, .. } => {
                info!(started_at_ms, "closing clip on shutdown");
                vec![RecordingAction::Stop]
            }
            SessionState::Idle { .. } => Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording { .. })
    }
}
