use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

/// Stub backend for testing. Replays a scripted sequence of per-frame
/// detection lists; once the script is exhausted every frame is empty.
pub struct StubBackend {
    script: VecDeque<Vec<RawDetection>>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            calls: 0,
        }
    }

    /// Build a stub that returns the given detection lists, one per frame,
    /// in order.
    pub fn with_script<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Vec<RawDetection>>,
    {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    /// Number of frames this backend has been asked to detect on.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        self.calls += 1;
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
