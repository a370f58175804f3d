//! Frame-level progress from the compositor.

use serde::{Deserialize, Serialize};

/// Snapshot emitted after each composed frame is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameProgress {
    /// Frames written so far
    pub frames_written: u64,
    /// Frames the source promised
    pub total_frames: u64,
}

impl FrameProgress {
    pub fn new(frames_written: u64, total_frames: u64) -> Self {
        Self {
            frames_written,
            total_frames,
        }
    }

    /// Completion percentage, rounded down.
    pub fn percent(&self) -> u8 {
        if self.total_frames == 0 {
            return 100;
        }
        (self.frames_written.min(self.total_frames) * 100 / self.total_frames) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.frames_written >= self.total_frames
    }
}

/// Callback type for progress updates.
pub type ProgressCallback = Box<dyn FnMut(FrameProgress) + Send + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_floors() {
        assert_eq!(FrameProgress::new(1, 3).percent(), 33);
        assert_eq!(FrameProgress::new(99, 100).percent(), 99);
        assert_eq!(FrameProgress::new(100, 100).percent(), 100);
    }

    #[test]
    fn test_complete_only_at_total() {
        assert!(!FrameProgress::new(39, 40).is_complete());
        assert!(FrameProgress::new(40, 40).is_complete());
    }
}
