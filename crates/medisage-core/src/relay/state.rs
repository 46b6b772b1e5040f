//! Finish/error state machine for one relay session

use crate::sse::{RawEvent, UpstreamEvent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a session. `Finished` and `Errored` are terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Streaming,
    Finished { reason: FinishReason },
    Errored { message: String },
}

/// Why a session finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Upstream reported the completion status
    Completed,
    /// Upstream sent the `[DONE]` sentinel before any completion status
    Sentinel,
    /// Upstream closed the connection without either signal
    Disconnected,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Sentinel => write!(f, "sentinel"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// What the session must do with an event after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Keep streaming; apply the event's text and identifiers
    Continue,
    /// Apply the event's text, then finish
    Finish(FinishReason),
    /// Stop immediately with an error message for the client
    Fail(String),
    /// Already terminal; the event must be ignored
    Ignore,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Streaming)
    }

    /// Classify an upstream event and advance the phase.
    ///
    /// Error signals win over a completion status carried by the same record.
    pub fn on_event(&mut self, event: &UpstreamEvent) -> Transition {
        if self.is_terminal() {
            return Transition::Ignore;
        }
        match event {
            UpstreamEvent::Terminal => self.finish(FinishReason::Sentinel),
            UpstreamEvent::Record(raw) => self.on_record(raw),
        }
    }

    fn on_record(&mut self, raw: &RawEvent) -> Transition {
        if raw.is_error() {
            return self.fail(raw.error_text());
        }
        if raw.is_finish() {
            return self.finish(FinishReason::Completed);
        }
        Transition::Continue
    }

    /// Upstream closed without a terminal signal
    pub fn on_disconnect(&mut self) -> Transition {
        if self.is_terminal() {
            return Transition::Ignore;
        }
        self.finish(FinishReason::Disconnected)
    }

    /// Session-fatal failure outside the event stream (auth, HTTP, transport)
    pub fn fail(&mut self, message: impl Into<String>) -> Transition {
        if self.is_terminal() {
            return Transition::Ignore;
        }
        let message = message.into();
        *self = Self::Errored {
            message: message.clone(),
        };
        Transition::Fail(message)
    }

    fn finish(&mut self, reason: FinishReason) -> Transition {
        *self = Self::Finished { reason };
        Transition::Finish(reason)
    }
}
