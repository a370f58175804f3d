//! Cartoon post-filter.
//!
//! Luminance → median blur → adaptive mean threshold gives an edge mask;
//! a bilateral filter smooths the color frame; the result is the bitwise AND
//! of the two. Stateless and deterministic: rows are processed in parallel
//! but every output pixel depends only on the input.

use ndarray::{Array3, ArrayD, ArrayViewD, IxDyn};
use rayon::prelude::*;

use crate::error::{MediaError, MediaResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostFilterConfig {
    /// Median blur aperture (odd)
    pub median_kernel: usize,
    /// Adaptive threshold neighbourhood (odd)
    pub threshold_block: usize,
    /// Subtracted from the neighbourhood mean
    pub threshold_offset: i64,
    /// Bilateral neighbourhood diameter
    pub bilateral_diameter: usize,
    pub sigma_color: f64,
    pub sigma_space: f64,
}

impl Default for PostFilterConfig {
    fn default() -> Self {
        Self {
            median_kernel: 5,
            threshold_block: 9,
            threshold_offset: 9,
            bilateral_diameter: 9,
            sigma_color: 75.0,
            sigma_space: 75.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostFilter {
    config: PostFilterConfig,
    /// `(dy, dx, weight)` for every offset inside the bilateral disc
    space_kernel: Vec<(isize, isize, f32)>,
    /// Color weight by summed absolute channel difference
    color_lut: Vec<f32>,
}

impl Default for PostFilter {
    fn default() -> Self {
        Self::new(PostFilterConfig::default())
    }
}

impl PostFilter {
    pub fn new(config: PostFilterConfig) -> Self {
        let radius = (config.bilateral_diameter / 2) as isize;
        let space_coeff = -0.5 / (config.sigma_space * config.sigma_space);
        let mut space_kernel = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let dist2 = (dy * dy + dx * dx) as f64;
                if dist2 <= (radius * radius) as f64 {
                    space_kernel.push((dy, dx, (dist2 * space_coeff).exp() as f32));
                }
            }
        }

        let color_coeff = -0.5 / (config.sigma_color * config.sigma_color);
        let color_lut = (0..=255 * 3)
            .map(|d: usize| ((d * d) as f64 * color_coeff).exp() as f32)
            .collect();

        Self {
            config,
            space_kernel,
            color_lut,
        }
    }

    pub fn config(&self) -> &PostFilterConfig {
        &self.config
    }

    /// Filter an `H x W x C` frame with one or three channels.
    pub fn apply(&self, pixels: &Array3<u8>) -> MediaResult<Array3<u8>> {
        let (h, w, c) = pixels.dim();
        if c != 1 && c != 3 {
            return Err(MediaError::UnsupportedChannels(c));
        }
        let data: Vec<u8> = pixels.as_standard_layout().iter().copied().collect();
        Array3::from_shape_vec((h, w, c), self.run(&data, w, h, c))
            .map_err(|e| MediaError::internal(format!("filtered frame shape: {e}")))
    }

    /// Filter an array of any accepted layout: `[H, W]`, `[H, W, C]`,
    /// `[1, H, W]` or `[1, H, W, C]` with `C` of 1 or 3.
    ///
    /// A leading batch dimension is stripped from the result; the channel
    /// layout is otherwise preserved.
    pub fn apply_dyn(&self, input: ArrayViewD<'_, u8>) -> MediaResult<ArrayD<u8>> {
        let shape = input.shape().to_vec();
        let (h, w, c, out_shape) = match shape.as_slice() {
            &[h, w] => (h, w, 1, vec![h, w]),
            &[h, w, c] if c == 1 || c == 3 => (h, w, c, vec![h, w, c]),
            &[1, h, w] => (h, w, 1, vec![h, w]),
            &[_, _, c] => return Err(MediaError::UnsupportedChannels(c)),
            &[1, h, w, c] => (h, w, c, vec![h, w, c]),
            _ => return Err(MediaError::UnsupportedShape(shape.clone())),
        };
        if c != 1 && c != 3 {
            return Err(MediaError::UnsupportedChannels(c));
        }

        let data: Vec<u8> = input.as_standard_layout().iter().copied().collect();
        ArrayD::from_shape_vec(IxDyn(&out_shape), self.run(&data, w, h, c))
            .map_err(|e| MediaError::internal(format!("filtered frame shape: {e}")))
    }

    fn run(&self, data: &[u8], width: usize, height: usize, channels: usize) -> Vec<u8> {
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let gray = luminance(data, channels);
        let blurred = median_blur(&gray, width, height, self.config.median_kernel);
        let mask = adaptive_threshold(
            &blurred,
            width,
            height,
            self.config.threshold_block,
            self.config.threshold_offset,
        );
        let mut smooth = self.bilateral(data, width, height, channels);

        smooth
            .par_chunks_mut(channels)
            .zip(mask.par_iter())
            .for_each(|(px, &m)| px.iter_mut().for_each(|v| *v &= m));
        smooth
    }

    fn bilateral(&self, data: &[u8], width: usize, height: usize, channels: usize) -> Vec<u8> {
        let mut out = vec![0u8; data.len()];
        let row_len = width * channels;

        out.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
            let mut acc = [0f32; 3];
            for x in 0..width {
                let center = &data[(y * width + x) * channels..][..channels];
                acc[..channels].fill(0.0);
                let mut weight_sum = 0f32;

                for &(dy, dx, space_w) in &self.space_kernel {
                    let ny = clamp_index(y as isize + dy, height);
                    let nx = clamp_index(x as isize + dx, width);
                    let neighbor = &data[(ny * width + nx) * channels..][..channels];

                    let diff: usize = center
                        .iter()
                        .zip(neighbor)
                        .map(|(&a, &b)| a.abs_diff(b) as usize)
                        .sum();
                    let wgt = space_w * self.color_lut[diff];

                    for (a, &n) in acc.iter_mut().zip(neighbor) {
                        *a += wgt * f32::from(n);
                    }
                    weight_sum += wgt;
                }

                let px = &mut row[x * channels..][..channels];
                for (dst, a) in px.iter_mut().zip(acc) {
                    *dst = (a / weight_sum).round().clamp(0.0, 255.0) as u8;
                }
            }
        });
        out
    }
}

fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// ITU-R BT.601 luma, or the channel itself for single-channel input.
fn luminance(data: &[u8], channels: usize) -> Vec<u8> {
    if channels == 1 {
        return data.to_vec();
    }
    data.par_chunks(channels)
        .map(|px| {
            let (r, g, b) = (u32::from(px[0]), u32::from(px[1]), u32::from(px[2]));
            ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8
        })
        .collect()
}

/// Median over a `kernel x kernel` window with replicated borders.
fn median_blur(src: &[u8], width: usize, height: usize, kernel: usize) -> Vec<u8> {
    let radius = (kernel / 2) as isize;
    let mut out = vec![0u8; src.len()];

    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let mut window = Vec::with_capacity(kernel * kernel);
        for (x, dst) in row.iter_mut().enumerate() {
            window.clear();
            for dy in -radius..=radius {
                let yy = clamp_index(y as isize + dy, height);
                for dx in -radius..=radius {
                    window.push(src[yy * width + clamp_index(x as isize + dx, width)]);
                }
            }
            let mid = window.len() / 2;
            *dst = *window.select_nth_unstable(mid).1;
        }
    });
    out
}

/// 255 where a pixel exceeds its `block x block` neighbourhood mean minus
/// `offset`, 0 elsewhere. The neighbourhood is clipped at the image border.
fn adaptive_threshold(src: &[u8], width: usize, height: usize, block: usize, offset: i64) -> Vec<u8> {
    let stride = width + 1;
    let mut integral = vec![0u64; stride * (height + 1)];
    for y in 0..height {
        let mut row_sum = 0u64;
        for x in 0..width {
            row_sum += u64::from(src[y * width + x]);
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let radius = block / 2;
    let mut out = vec![0u8; src.len()];
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let (y0, y1) = (y.saturating_sub(radius), (y + radius + 1).min(height));
        for (x, dst) in row.iter_mut().enumerate() {
            let (x0, x1) = (x.saturating_sub(radius), (x + radius + 1).min(width));
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let area = ((y1 - y0) * (x1 - x0)) as i64;
            // src > sum / area - offset, without the division
            let keep = (i64::from(src[y * width + x]) + offset) * area > sum as i64;
            *dst = if keep { 255 } else { 0 };
        }
    });
    out
}
