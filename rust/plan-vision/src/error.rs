// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the detection library.
//!
//! Only [`PlanError::ImageLoad`] and [`PlanError::InvalidRegion`] abort a
//! detection. The remaining kinds are isolated per stage and surface as
//! [`DetectionWarning`](crate::types::DetectionWarning) entries on the result.

use crate::detectors::DetectorKind;
use thiserror::Error;

/// Errors raised while detecting a floor plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Failed to load image {path}: {reason}")]
    ImageLoad { path: String, reason: String },

    #[error("Region of interest {x},{y} {width}x{height} lies outside the {image_width}x{image_height} image")]
    InvalidRegion {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Detector {detector} exceeded its time budget after {elapsed_ms} ms")]
    DetectorTimeout { detector: DetectorKind, elapsed_ms: u64 },

    #[error("Detector {detector} was cancelled")]
    Cancelled { detector: DetectorKind },

    #[error("Secondary detection input rejected: {0}")]
    FusionInputMismatch(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PlanError {
    /// Build an image load error from any displayable cause.
    pub fn image_load(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        PlanError::ImageLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error ends the whole detection rather than one stage.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PlanError::ImageLoad { .. } | PlanError::InvalidRegion { .. } | PlanError::Config(_)
        )
    }
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        PlanError::Config(format!("JSON error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
