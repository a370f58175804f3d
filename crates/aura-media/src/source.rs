//! Frame Source: background decoding into a bounded buffer.
//!
//! One `frame-decoder` thread per job reads frames from a [`FrameDecoder`],
//! resizes them to the model geometry and pushes them into a
//! `sync_channel` of fixed capacity. The consumer pulls with [`FrameSource::next`]
//! in arrival order. The decoder blocks while the buffer is full and the
//! consumer blocks while it is empty; closing the channel is the only
//! end-of-stream signal.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::{resize_lanczos, target_dimensions, Frame, DEFAULT_FRAME_LIMIT};
use crate::probe::VideoInfo;
use crate::video_io::{FrameDecoder, VideoBackend};

/// Default capacity of the decode buffer, in frames.
pub const DEFAULT_BUFFER_CAPACITY: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSourceConfig {
    /// Longest edge before frames are scaled down for inference
    pub frame_limit: u32,
    /// Frames held between the decoder and the consumer
    pub buffer_capacity: usize,
}

impl Default for FrameSourceConfig {
    fn default() -> Self {
        Self {
            frame_limit: DEFAULT_FRAME_LIMIT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

pub struct FrameSource {
    receiver: Option<Receiver<MediaResult<Frame>>>,
    decoder_thread: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
    consumed: u64,
    total_frames: u64,
    fps: f64,
    original: (u32, u32),
    target: (u32, u32),
}

impl FrameSource {
    /// Open `path` through `backend` and start decoding at the model size for `model_name`.
    pub fn open(
        backend: &dyn VideoBackend,
        path: &Path,
        info: &VideoInfo,
        model_name: &str,
        config: FrameSourceConfig,
    ) -> MediaResult<Self> {
        info.validate()?;
        let target = target_dimensions(info.width, info.height, config.frame_limit, model_name);
        let decoder = backend.open_decoder(path, info)?;
        Self::start(decoder, info, target, config.buffer_capacity)
    }

    /// Start the decode thread over an already opened decoder.
    pub fn start(
        decoder: Box<dyn FrameDecoder>,
        info: &VideoInfo,
        target: (u32, u32),
        buffer_capacity: usize,
    ) -> MediaResult<Self> {
        info.validate()?;

        let (tx, rx) = sync_channel(buffer_capacity.max(1));
        let active = Arc::new(AtomicBool::new(true));

        let thread = {
            let active = Arc::clone(&active);
            std::thread::Builder::new()
                .name("frame-decoder".to_string())
                .spawn(move || decode_loop(decoder, tx, target, &active))?
        };

        debug!(
            total_frames = info.frame_count,
            width = target.0,
            height = target.1,
            "Frame decoder started"
        );

        Ok(Self {
            receiver: Some(rx),
            decoder_thread: Some(thread),
            active,
            consumed: 0,
            total_frames: info.frame_count,
            fps: info.fps,
            original: info.dimensions(),
            target,
        })
    }

    /// Next frame in decode order, or `None` once every promised frame was handed out.
    ///
    /// Blocks while the buffer is empty and the decoder is still running. A
    /// stream that closes before `total_frame_count` frames is a broken video.
    pub fn next(&mut self) -> MediaResult<Option<Frame>> {
        if self.consumed >= self.total_frames {
            return Ok(None);
        }
        let rx = self
            .receiver
            .as_ref()
            .ok_or_else(|| MediaError::internal("frame source already closed"))?;

        match rx.recv() {
            Ok(Ok(frame)) => {
                self.consumed += 1;
                Ok(Some(frame))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MediaError::BrokenVideo {
                decoded: self.consumed,
                expected: self.total_frames,
            }),
        }
    }

    pub fn total_frame_count(&self) -> u64 {
        self.total_frames
    }

    pub fn frames_per_second(&self) -> f64 {
        self.fps
    }

    /// Source `(width, height)`.
    pub fn original_dimensions(&self) -> (u32, u32) {
        self.original
    }

    /// Model input `(width, height)` every frame is resized to.
    pub fn target_dimensions(&self) -> (u32, u32) {
        self.target
    }

    /// Whether the decode thread is still producing.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        // Unblocks a decoder waiting on a full buffer.
        drop(self.receiver.take());
        if let Some(thread) = self.decoder_thread.take() {
            if thread.join().is_err() {
                warn!("Frame decoder thread panicked");
            }
        }
    }
}

fn decode_loop(
    mut decoder: Box<dyn FrameDecoder>,
    tx: SyncSender<MediaResult<Frame>>,
    (width, height): (u32, u32),
    active: &AtomicBool,
) {
    let mut index = 0u64;
    loop {
        let pixels = match decoder.read_frame() {
            Ok(Some(pixels)) => pixels,
            Ok(None) => break,
            Err(e) => {
                // The consumer sees the short stream and reports it.
                warn!(error = %e, decoded = index, "Frame decoding stopped");
                break;
            }
        };

        let frame = resize_lanczos(pixels, width, height).map(|p| Frame::new(index, p));
        let failed = frame.is_err();
        if tx.send(frame).is_err() || failed {
            break;
        }
        index += 1;
    }
    // Cleared while `tx` is still alive, so a consumer that saw the channel close sees it too.
    active.store(false, Ordering::Release);
    debug!(decoded = index, "Frame decoder finished");
}
