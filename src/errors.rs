// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the compositing passes and calibration
//!
//! Every failure here is recoverable at call-site granularity: a pass that
//! returns an error leaves its input untouched and the caller may pass it
//! through to the next stage.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main error type
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Invalid or degenerate parameters for a pass
    Configuration(ConfigurationError),
    /// A required image, camera or intrinsics snapshot is unavailable
    MissingInput(MissingInputError),
    /// A calibration sample was rejected
    Calibration(CalibrationError),
    /// GPU device or dispatch failure
    Gpu(String),
    /// Settings file could not be read or written
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Image decoding/encoding failure
    Image(String),
    /// Generic error with message
    Other(String),
}

/// Synchronously detected parameter problems
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// The pass only works for a specific camera type
    WrongCameraType {
        expected: &'static str,
        actual: String,
    },
    /// Projection matrix is singular or produces an invalid field of view
    InvalidIntrinsics(String),
    /// Ruler minimum is not strictly less than maximum, or lies outside [0, 1]
    DegenerateRulers,
    /// Hole filling bias outside the supported range
    HoleFillingBiasOutOfRange(u32),
    /// Any other out-of-range setting
    InvalidParameter(String),
}

/// Inputs that a pass expected but did not receive
#[derive(Debug, Clone, PartialEq)]
pub enum MissingInputError {
    /// Image is absent or has zero size
    Texture(String),
    /// No camera registered under this key
    Camera(String),
    /// Camera exists but could not produce intrinsics this frame
    Intrinsics(String),
}

/// Reasons a calibration sample is rejected
///
/// None of these mutate the accumulated calibration.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Checkerboard dimensions or square size are not positive
    InvalidParams,
    /// Source or destination image/intrinsics missing
    MissingSourceOrDestination,
    /// Corner detection found nothing
    IdentifyCheckerboardFailure,
    /// Corner detection found the wrong number of corners
    PointCountMismatch { expected: usize, found: usize },
    /// Pose solve did not converge
    SolvePoseFailure,
    /// No corner detection backend is available in this build
    NoVisionBackend,
}

impl CalibrationError {
    /// Stable result code reported to callers and logs
    pub fn code(&self) -> &'static str {
        match self {
            CalibrationError::InvalidParams => "Error_InvalidParams",
            CalibrationError::MissingSourceOrDestination => "Error_MissingSourceOrDestination",
            CalibrationError::IdentifyCheckerboardFailure => "Error_IdentifyCheckerboardFailure",
            CalibrationError::PointCountMismatch { .. } => "Error_PointCountMismatch",
            CalibrationError::SolvePoseFailure => "Error_SolvePoseFailure",
            CalibrationError::NoVisionBackend => "Error_NoVisionBackend",
        }
    }

    /// Whether retrying with another capture can succeed
    pub fn is_permanent(&self) -> bool {
        matches!(self, CalibrationError::NoVisionBackend)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Configuration(e) => write!(f, "Configuration error: {}", e),
            AppError::MissingInput(e) => write!(f, "Missing input: {}", e),
            AppError::Calibration(e) => write!(f, "Calibration error: {}", e),
            AppError::Gpu(msg) => write!(f, "GPU error: {}", msg),
            AppError::Config(msg) => write!(f, "Settings error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Image(msg) => write!(f, "Image error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::WrongCameraType { expected, actual } => {
                write!(f, "expected a {} camera, got {}", expected, actual)
            }
            ConfigurationError::InvalidIntrinsics(msg) => write!(f, "invalid intrinsics: {}", msg),
            ConfigurationError::DegenerateRulers => {
                write!(f, "ruler minimum must be strictly less than maximum within [0, 1]")
            }
            ConfigurationError::HoleFillingBiasOutOfRange(bias) => {
                write!(f, "hole filling bias {} outside [0, 8]", bias)
            }
            ConfigurationError::InvalidParameter(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for MissingInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingInputError::Texture(name) => write!(f, "no {} image", name),
            MissingInputError::Camera(key) => write!(f, "no camera source '{}'", key),
            MissingInputError::Intrinsics(key) => {
                write!(f, "camera '{}' has no intrinsics available", key)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::InvalidParams => {
                write!(f, "checkerboard dimensions and size must be positive")
            }
            CalibrationError::MissingSourceOrDestination => {
                write!(f, "source or destination target is missing")
            }
            CalibrationError::IdentifyCheckerboardFailure => {
                write!(f, "checkerboard could not be identified")
            }
            CalibrationError::PointCountMismatch { expected, found } => {
                write!(f, "expected {} checkerboard corners, found {}", expected, found)
            }
            CalibrationError::SolvePoseFailure => write!(f, "pose solve failed"),
            CalibrationError::NoVisionBackend => {
                write!(f, "no corner detection backend available")
            }
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for ConfigurationError {}
impl std::error::Error for MissingInputError {}
impl std::error::Error for CalibrationError {}

// Conversions from sub-errors to AppError
impl From<ConfigurationError> for AppError {
    fn from(err: ConfigurationError) -> Self {
        AppError::Configuration(err)
    }
}

impl From<MissingInputError> for AppError {
    fn from(err: MissingInputError) -> Self {
        AppError::MissingInput(err)
    }
}

impl From<CalibrationError> for AppError {
    fn from(err: CalibrationError) -> Self {
        AppError::Calibration(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_codes() {
        assert_eq!(CalibrationError::InvalidParams.code(), "Error_InvalidParams");
        assert_eq!(
            CalibrationError::PointCountMismatch {
                expected: 48,
                found: 12
            }
            .code(),
            "Error_PointCountMismatch"
        );
        assert!(CalibrationError::NoVisionBackend.is_permanent());
        assert!(!CalibrationError::SolvePoseFailure.is_permanent());
    }

    #[test]
    fn test_display_wraps_sub_errors() {
        let err: AppError = ConfigurationError::HoleFillingBiasOutOfRange(9).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: hole filling bias 9 outside [0, 8]"
        );

        let err: AppError = MissingInputError::Texture("depth".into()).into();
        assert_eq!(err.to_string(), "Missing input: no depth image");
    }
}
