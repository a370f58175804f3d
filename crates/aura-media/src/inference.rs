//! Style-transfer inference over ONNX Runtime.
//!
//! Generators take an NHWC `float32` tensor `[1, H, W, 3]` with pixels in
//! `[-1, 1]` and return the same layout.

use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::Array3;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::{Tensor, Value};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use aura_models::DevicePreference;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Execution provider a model session ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackend {
    Cpu,
    Cuda,
}

impl ExecutionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionBackend::Cpu => "cpu",
            ExecutionBackend::Cuda => "cuda",
        }
    }
}

/// A loaded generator: frame in, stylized frame of the same size out.
pub trait StyleModel: Send + Sync {
    /// Model variant name (the model file stem).
    fn name(&self) -> &str;

    fn backend(&self) -> ExecutionBackend;

    fn infer(&self, frame: &Frame) -> MediaResult<Frame>;
}

/// Builds a [`StyleModel`] once per job.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path, device: DevicePreference) -> MediaResult<Arc<dyn StyleModel>>;
}

/// Loads `.onnx` generators into ONNX Runtime sessions.
#[derive(Debug, Default, Clone)]
pub struct OrtModelLoader;

impl OrtModelLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModelLoader for OrtModelLoader {
    fn load(&self, path: &Path, device: DevicePreference) -> MediaResult<Arc<dyn StyleModel>> {
        Ok(Arc::new(OrtStyleModel::load(path, device)?))
    }
}

pub struct OrtStyleModel {
    name: String,
    backend: ExecutionBackend,
    output_name: String,
    session: Mutex<Session>,
}

impl OrtStyleModel {
    pub fn load(path: &Path, device: DevicePreference) -> MediaResult<Self> {
        if !path.is_file() {
            return Err(MediaError::model_not_found(path.display().to_string()));
        }
        let name = model_name(path);
        let model_bytes = std::fs::read(path)
            .map_err(|e| MediaError::model_load(format!("read {}: {e}", path.display())))?;

        let builder = Session::builder()
            .map_err(|e| MediaError::model_load(format!("session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| MediaError::model_load(format!("optimization level: {e}")))?;

        let (session, backend) = commit_session(builder, &model_bytes, device)?;

        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| MediaError::model_load("model declares no outputs"))?;

        info!(model = %name, backend = backend.as_str(), "Style model loaded");

        Ok(Self {
            name,
            backend,
            output_name,
            session: Mutex::new(session),
        })
    }
}

fn commit_session(
    builder: SessionBuilder,
    model_bytes: &[u8],
    device: DevicePreference,
) -> MediaResult<(Session, ExecutionBackend)> {
    if device == DevicePreference::Accelerated {
        #[cfg(feature = "cuda")]
        {
            use ort::execution_providers::CUDAExecutionProvider;
            match builder
                .clone()
                .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])
                .and_then(|b| b.commit_from_memory(model_bytes))
            {
                Ok(session) => return Ok((session, ExecutionBackend::Cuda)),
                Err(e) => warn!(error = %e, "CUDA execution provider unavailable, using CPU"),
            }
        }
        #[cfg(not(feature = "cuda"))]
        warn!("Accelerated inference requested but this build has no CUDA support, using CPU");
    }

    let session = builder
        .commit_from_memory(model_bytes)
        .map_err(|e| MediaError::model_load(format!("load ONNX model: {e}")))?;
    Ok((session, ExecutionBackend::Cpu))
}

impl StyleModel for OrtStyleModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> ExecutionBackend {
        self.backend
    }

    fn infer(&self, frame: &Frame) -> MediaResult<Frame> {
        let (h, w, _) = frame.pixels.dim();
        let input: Value = Tensor::from_array(([1usize, h, w, 3], to_model_input(&frame.pixels).into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::inference(format!("input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::inference(format!("session run: {e}")))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| MediaError::inference(format!("missing output {}", self.output_name)))?;

        let (shape, values) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::inference(format!("extract output: {e}")))?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        let (out_h, out_w) = output_spatial_dims(&dims)?;
        if (out_w, out_h) != (w, h) {
            return Err(MediaError::dimension_mismatch(
                (w as u32, h as u32),
                (out_w as u32, out_h as u32),
            ));
        }

        Ok(Frame::new(frame.index, from_model_output(values, out_h, out_w)?))
    }
}

/// Variant name used for geometry decisions: the file stem.
pub fn model_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Map `[0, 255]` pixels to `[-1, 1]`, keeping HWC order.
pub fn to_model_input(pixels: &Array3<u8>) -> Vec<f32> {
    pixels
        .as_standard_layout()
        .iter()
        .map(|&p| f32::from(p) / 127.5 - 1.0)
        .collect()
}

/// Map `[-1, 1]` model output back to pixels, clipping out-of-range values.
pub fn from_model_output(values: &[f32], height: usize, width: usize) -> MediaResult<Array3<u8>> {
    let pixels = values
        .iter()
        .map(|&v| ((v + 1.0) / 2.0 * 255.0).clamp(0.0, 255.0) as u8)
        .collect::<Vec<u8>>();
    Array3::from_shape_vec((height, width, 3), pixels)
        .map_err(|e| MediaError::inference(format!("output buffer: {e}")))
}

/// `(height, width)` of a `[1, H, W, 3]` or `[H, W, 3]` output.
fn output_spatial_dims(dims: &[i64]) -> MediaResult<(usize, usize)> {
    let unsupported = || MediaError::UnsupportedShape(dims.iter().map(|&d| d.max(0) as usize).collect());
    let hwc = match dims {
        [1, h, w, c] | [h, w, c] => (*h, *w, *c),
        _ => return Err(unsupported()),
    };
    match hwc {
        (h, w, 3) if h > 0 && w > 0 => Ok((h as usize, w as usize)),
        _ => Err(unsupported()),
    }
}
