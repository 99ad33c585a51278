//! Per-session half-close state machine.
//!
//! Pure bookkeeping with no I/O: the [`StreamManager`](crate::streams::StreamManager)
//! owns one [`SessionState`] per live session and consults it before every
//! transition. A session is the cross product of an input half and an output
//! half; it is terminal exactly when both are closed.

use tether_core::StreamShape;

/// Observable phase of a session, derived from its two halves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Created; the front end has not signalled readiness.
    Open,
    /// Ready, with the output half (and input half, if any) open.
    Streaming,
    /// Input closed; awaiting the remaining output.
    InputClosed,
    /// Output closed; input still accepted (bidi only).
    OutputClosed,
    /// Both halves closed.
    Closed,
}

/// Input/output half-close flags plus readiness for one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    shape: StreamShape,
    input_open: bool,
    output_open: bool,
    ready: bool,
}

impl SessionState {
    /// A fresh session. Server-streaming sessions start with input closed:
    /// their only request arrives with the start call.
    pub fn new(shape: StreamShape) -> Self {
        Self {
            shape,
            input_open: shape.accepts_input(),
            output_open: true,
            ready: false,
        }
    }

    /// The session's shape.
    pub fn shape(&self) -> StreamShape {
        self.shape
    }

    /// Whether the input half is open.
    pub fn input_open(&self) -> bool {
        self.input_open
    }

    /// Whether the output half is open.
    pub fn output_open(&self) -> bool {
        self.output_open
    }

    /// Whether the front end has signalled readiness.
    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Record readiness. Returns `true` on the first call only.
    pub fn mark_ready(&mut self) -> bool {
        !std::mem::replace(&mut self.ready, true)
    }

    /// Close the input half. Returns `true` if it was open.
    pub fn close_input(&mut self) -> bool {
        std::mem::replace(&mut self.input_open, false)
    }

    /// Close the output half. Returns `true` if it was open.
    pub fn close_output(&mut self) -> bool {
        std::mem::replace(&mut self.output_open, false)
    }

    /// Close both halves. Returns `true` if either was open.
    pub fn close_both(&mut self) -> bool {
        let i = self.close_input();
        let o = self.close_output();
        i || o
    }

    /// Both halves closed.
    pub fn is_terminal(&self) -> bool {
        !self.input_open && !self.output_open
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        match (self.input_open, self.output_open) {
            (false, false) => Phase::Closed,
            (true, false) => Phase::OutputClosed,
            (false, true) if self.shape.accepts_input() => Phase::InputClosed,
            _ if !self.ready => Phase::Open,
            _ => Phase::Streaming,
        }
    }
}
