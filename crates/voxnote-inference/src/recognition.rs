//! Accumulation of streaming speech-recognition results.
//!
//! Platform recognizers stop on their own after silence and must be
//! restarted to keep a long dictation going. [`SegmentAccumulator`] keeps
//! the text across those restarts: finalized segments are appended, the
//! single trailing interim result is replaced on every update, and the
//! final transcript joins everything with single spaces.

use voxnote_core::{Error, Result};

/// Recognizer session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    Idle,
    Listening,
    /// The user stopped; waiting for the recognizer's last result.
    Finalizing,
    /// The recognizer ended by itself; a restart is due.
    Restarting,
}

/// Collects recognizer output across restarts.
#[derive(Debug, Clone)]
pub struct SegmentAccumulator {
    state: RecognitionState,
    finalized: Vec<String>,
    interim: Option<String>,
    restarts: u32,
}

impl Default for SegmentAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentAccumulator {
    pub fn new() -> Self {
        Self {
            state: RecognitionState::Idle,
            finalized: Vec::new(),
            interim: None,
            restarts: 0,
        }
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    /// Number of automatic restarts in the current session.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Begin a new session, discarding any previous text.
    pub fn start(&mut self) -> Result<()> {
        if self.state != RecognitionState::Idle {
            return Err(Error::InvalidInput(format!(
                "Cannot start recognition while {:?}",
                self.state
            )));
        }
        self.finalized.clear();
        self.interim = None;
        self.restarts = 0;
        self.state = RecognitionState::Listening;
        Ok(())
    }

    /// Replace the trailing interim result.
    pub fn on_interim(&mut self, text: &str) {
        if !self.accepts_results() {
            return;
        }
        let text = text.trim();
        self.interim = (!text.is_empty()).then(|| text.to_string());
    }

    /// Append a finalized segment; it replaces the interim it settles.
    pub fn on_final(&mut self, text: &str) {
        if !self.accepts_results() {
            return;
        }
        self.interim = None;
        let text = text.trim();
        if !text.is_empty() {
            self.finalized.push(text.to_string());
        }
    }

    /// The recognizer ended.
    ///
    /// While listening this schedules a restart; while finalizing it closes
    /// the session. Either way a dangling interim is kept as final text.
    pub fn on_end(&mut self) {
        if let Some(interim) = self.interim.take() {
            self.finalized.push(interim);
        }
        self.state = match self.state {
            RecognitionState::Listening => RecognitionState::Restarting,
            RecognitionState::Finalizing => RecognitionState::Idle,
            other => other,
        };
    }

    /// Resume listening after an automatic end.
    pub fn restart(&mut self) -> Result<()> {
        if self.state != RecognitionState::Restarting {
            return Err(Error::InvalidInput(format!(
                "Cannot restart recognition while {:?}",
                self.state
            )));
        }
        self.restarts += 1;
        self.state = RecognitionState::Listening;
        Ok(())
    }

    /// User-initiated stop.
    pub fn stop(&mut self) {
        self.state = match self.state {
            RecognitionState::Listening => RecognitionState::Finalizing,
            RecognitionState::Restarting => RecognitionState::Idle,
            other => other,
        };
    }

    /// Text to display right now, including the interim tail.
    pub fn current_text(&self) -> String {
        self.finalized
            .iter()
            .map(String::as_str)
            .chain(self.interim.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Close the session and return the assembled transcript.
    pub fn finish(&mut self) -> String {
        if let Some(interim) = self.interim.take() {
            self.finalized.push(interim);
        }
        self.state = RecognitionState::Idle;
        let text = self.finalized.join(" ");
        self.finalized.clear();
        text
    }

    fn accepts_results(&self) -> bool {
        matches!(
            self.state,
            RecognitionState::Listening | RecognitionState::Finalizing
        )
    }
}
