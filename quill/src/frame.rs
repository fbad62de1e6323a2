//! Frame-boundary detection and the frame-scoped profiling session.

use std::mem;

use tracing::debug;

use crate::device::{ClockMode, Device, ProfilingSession, SampleId, TargetCmdBuffer};
use crate::error::Result;
use crate::log::{LogItem, LogItemKind, SampleTokens};

/// The profiling state carried across one open frame: the session capturing
/// it and the sample spanning present to present.
pub(crate) struct FrameSession {
    session: Box<dyn ProfilingSession>,
    frame_id: u64,
    sample: SampleId,
}

impl FrameSession {
    /// Records sample-end and session-end into `cmd`, yielding the session
    /// (to be committed busy) and the frame's log item.
    pub fn finish(mut self, cmd: &mut dyn TargetCmdBuffer) -> Result<(Box<dyn ProfilingSession>, LogItem)> {
        self.session.end_sample(cmd, self.sample)?;
        self.session.end(cmd)?;
        let item = LogItem {
            frame_id: self.frame_id,
            kind: LogItemKind::Frame(SampleTokens {
                sample: Some(self.sample),
                timing_sample: None,
            }),
        };
        Ok((self.session, item))
    }
}

enum FrameState {
    Idle,
    Open(FrameSession),
}

/// Recognizes present operations and toggles the frame-scoped profiling
/// session and the device-wide stable-clock mode. At most one frame is open
/// at a time.
pub(crate) struct FrameTracker {
    state: FrameState,
    frame_id: u64,
    clock_mode_on: bool,
}

impl FrameTracker {
    pub fn new() -> FrameTracker {
        FrameTracker {
            state: FrameState::Idle,
            frame_id: 1,
            clock_mode_on: false,
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, FrameState::Open(_))
    }

    /// A present has retired the current frame.
    pub fn advance_frame(&mut self) {
        self.frame_id += 1;
    }

    /// Enters or leaves stable-clock profiling mode. Edge-triggered: the
    /// device only sees transitions, never a repeated request.
    pub fn update_clock_mode(&mut self, device: &dyn Device, sampling: bool) -> Result<()> {
        if sampling && !self.clock_mode_on {
            device.set_clock_mode(ClockMode::Profiling)?;
            self.clock_mode_on = true;
        } else if !sampling && self.clock_mode_on {
            device.set_clock_mode(ClockMode::Default)?;
            self.clock_mode_on = false;
        }
        Ok(())
    }

    /// Opens the frame session, recording session-begin and the frame-begin
    /// sample into `cmd`.
    pub fn open(&mut self, mut session: Box<dyn ProfilingSession>, cmd: &mut dyn TargetCmdBuffer) -> Result<()> {
        debug_assert!(!self.is_open(), "a frame session is already open");
        session.begin(cmd)?;
        let sample = session.begin_sample(cmd)?;
        debug!(frame = self.frame_id, "opened frame profiling session");
        self.state = FrameState::Open(FrameSession {
            session,
            frame_id: self.frame_id,
            sample,
        });
        Ok(())
    }

    /// Takes the open frame session, leaving the tracker idle.
    pub fn take_open(&mut self) -> Option<FrameSession> {
        match mem::replace(&mut self.state, FrameState::Idle) {
            FrameState::Open(open) => Some(open),
            FrameState::Idle => None,
        }
    }
}
