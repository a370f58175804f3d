//! Layout mode and execution device options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How original and generated frames are arranged in the output video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LayoutMode {
    /// Generated frame only
    #[default]
    None,
    /// Original on the left, generated on the right
    Horizontal,
    /// Original on top, generated below
    Vertical,
}

impl LayoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutMode::None => "None",
            LayoutMode::Horizontal => "Horizontal",
            LayoutMode::Vertical => "Vertical",
        }
    }

    /// Output dimensions for source frames of `width` x `height`.
    pub fn output_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        match self {
            LayoutMode::None => (width, height),
            LayoutMode::Horizontal => (width * 2, height),
            LayoutMode::Vertical => (width, height * 2),
        }
    }
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayoutMode {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(LayoutMode::None),
            "horizontal" => Ok(LayoutMode::Horizontal),
            "vertical" => Ok(LayoutMode::Vertical),
            _ => Err(ParseOptionError::Layout(s.to_string())),
        }
    }
}

/// Requested inference backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    #[default]
    Cpu,
    Accelerated,
}

impl DevicePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePreference::Cpu => "cpu",
            DevicePreference::Accelerated => "accelerated",
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DevicePreference {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "cpu" => Ok(DevicePreference::Cpu),
            "gpu" | "cuda" | "accelerated" => Ok(DevicePreference::Accelerated),
            _ => Err(ParseOptionError::Device(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseOptionError {
    #[error("Unknown layout mode: {0}")]
    Layout(String),

    #[error("Unknown device: {0}")]
    Device(String),
}
