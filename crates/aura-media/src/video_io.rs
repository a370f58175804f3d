//! Raw-frame video decoding and encoding over FFmpeg pipes.
//!
//! The decoder runs `ffmpeg ... -f rawvideo -pix_fmt rgb24 -` and reads exactly
//! `W x H x 3` bytes per frame from its stdout; the encoder feeds frames of the
//! same layout into an `ffmpeg` child's stdin. Both are blocking and meant to be
//! driven from a dedicated thread.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use async_trait::async_trait;
use ndarray::Array3;
use tracing::{debug, warn};

use crate::command::{check_ffmpeg, FfmpegCommand, PIPE};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// Sequential frame reader.
pub trait FrameDecoder: Send {
    /// Next frame at the source's native size, or `None` at end of stream.
    fn read_frame(&mut self) -> MediaResult<Option<Array3<u8>>>;
}

/// Sequential frame writer for one output stream.
pub trait FrameWriter: Send {
    fn write_frame(&mut self, pixels: &Array3<u8>) -> MediaResult<()>;

    /// Flush and close the stream. Must be called for the output to be valid.
    fn finish(self: Box<Self>) -> MediaResult<()>;
}

/// Probing, decoding and encoding of video containers.
#[async_trait]
pub trait VideoBackend: Send + Sync {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo>;

    fn open_decoder(&self, path: &Path, info: &VideoInfo) -> MediaResult<Box<dyn FrameDecoder>>;

    fn create_writer(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> MediaResult<Box<dyn FrameWriter>>;
}

/// [`VideoBackend`] backed by the `ffmpeg`/`ffprobe` binaries on `PATH`.
#[derive(Debug, Default, Clone)]
pub struct FfmpegVideoBackend;

impl FfmpegVideoBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VideoBackend for FfmpegVideoBackend {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        probe_video(path).await
    }

    fn open_decoder(&self, path: &Path, info: &VideoInfo) -> MediaResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(FfmpegDecoder::spawn(path, info.width, info.height)?))
    }

    fn create_writer(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> MediaResult<Box<dyn FrameWriter>> {
        Ok(Box::new(FfmpegEncoder::spawn(path, width, height, fps)?))
    }
}

fn decode_command(input: &Path) -> FfmpegCommand {
    FfmpegCommand::new(input, PIPE).output_args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-vsync", "0"])
}

fn encode_command(output: &Path, width: u32, height: u32, fps: f64) -> FfmpegCommand {
    FfmpegCommand::new(PIPE, output)
        .input_args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
        .input_args(["-s".to_string(), format!("{width}x{height}")])
        .input_args(["-r".to_string(), format!("{fps}")])
        // mpeg4/yuv420p need even dimensions
        .video_filter("pad=ceil(iw/2)*2:ceil(ih/2)*2")
        .video_codec("mpeg4")
        .output_args(["-q:v", "3", "-pix_fmt", "yuv420p"])
}

fn spawn(cmd: &FfmpegCommand, stdin: Stdio, stdout: Stdio) -> MediaResult<(Child, JoinHandle<String>)> {
    check_ffmpeg()?;
    let args = cmd.build_args();
    debug!("Spawning FFmpeg: ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::piped())
        .spawn()?;

    // Drained on its own thread so a chatty ffmpeg never blocks on a full pipe.
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::internal("ffmpeg stderr not captured"))?;
    let drain = std::thread::spawn(move || {
        let mut text = String::new();
        let _ = stderr.read_to_string(&mut text);
        text
    });

    Ok((child, drain))
}

fn wait_for_exit(mut child: Child, drain: JoinHandle<String>, what: &str) -> MediaResult<()> {
    let status = child.wait()?;
    let stderr = drain.join().unwrap_or_default().trim().to_string();
    if status.success() {
        Ok(())
    } else {
        Err(MediaError::ffmpeg_failed(
            format!("{what} exited with {status}"),
            (!stderr.is_empty()).then_some(stderr),
            status.code(),
        ))
    }
}

/// Decoder child process. Killed on drop if still running.
pub struct FfmpegDecoder {
    child: Option<(Child, JoinHandle<String>)>,
    stdout: ChildStdout,
    frame_len: usize,
    width: usize,
    height: usize,
}

impl FfmpegDecoder {
    pub fn spawn(path: &Path, width: u32, height: u32) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let (mut child, drain) = spawn(&decode_command(path), Stdio::null(), Stdio::piped())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stdout not captured"))?;

        Ok(Self {
            child: Some((child, drain)),
            stdout,
            frame_len: width as usize * height as usize * 3,
            width: width as usize,
            height: height as usize,
        })
    }

    /// Fill `buf` as far as the stream allows; returns the bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> MediaResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn close(&mut self) -> MediaResult<()> {
        match self.child.take() {
            Some((child, drain)) => wait_for_exit(child, drain, "ffmpeg decoder"),
            None => Ok(()),
        }
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn read_frame(&mut self) -> MediaResult<Option<Array3<u8>>> {
        if self.child.is_none() {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len];
        let filled = self.fill(&mut buf)?;
        if filled < self.frame_len {
            if filled > 0 {
                warn!(bytes = filled, expected = self.frame_len, "Discarding partial trailing frame");
            }
            self.close()?;
            return Ok(None);
        }

        Array3::from_shape_vec((self.height, self.width, 3), buf)
            .map(Some)
            .map_err(|e| MediaError::internal(format!("decoded frame shape: {e}")))
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        if let Some((mut child, _)) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Encoder child process. Killed on drop unless finished.
pub struct FfmpegEncoder {
    child: Option<(Child, JoinHandle<String>)>,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl FfmpegEncoder {
    pub fn spawn(path: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Self> {
        let (mut child, drain) = spawn(
            &encode_command(path, width, height, fps),
            Stdio::piped(),
            Stdio::null(),
        )?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stdin not captured"))?;

        Ok(Self {
            child: Some((child, drain)),
            stdin: Some(stdin),
            width,
            height,
        })
    }
}

impl FrameWriter for FfmpegEncoder {
    fn write_frame(&mut self, pixels: &Array3<u8>) -> MediaResult<()> {
        let (h, w, _) = pixels.dim();
        if (w as u32, h as u32) != (self.width, self.height) {
            return Err(MediaError::dimension_mismatch(
                (self.width, self.height),
                (w as u32, h as u32),
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("encoder already closed"))?;

        match pixels.as_slice() {
            Some(raw) => stdin.write_all(raw)?,
            None => stdin.write_all(&pixels.iter().copied().collect::<Vec<u8>>())?,
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> MediaResult<()> {
        // Closing stdin signals end of input.
        drop(self.stdin.take());
        match self.child.take() {
            Some((child, drain)) => wait_for_exit(child, drain, "ffmpeg encoder"),
            None => Ok(()),
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some((mut child, _)) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
