//! Renderer error types

use thiserror::Error;

use crate::driver::DriverError;

/// Errors returned by [`Gpu`](crate::Gpu) construction and frames
#[derive(Error, Debug)]
pub enum GpuError {
    /// The device was lost; recreate the device and the renderer
    #[error("GPU device lost")]
    DeviceLost,

    /// The contents of the target were lost; draw the frame again
    #[error("buffer content lost")]
    ContentLost,

    /// The device lacks float render targets or sRGB support, or the
    /// compute renderer was requested
    #[error("device requires the compute renderer")]
    ComputeRequired,

    /// Any other driver failure
    #[error("driver error: {0}")]
    Driver(DriverError),
}

impl From<DriverError> for GpuError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::DeviceLost => GpuError::DeviceLost,
            DriverError::ContentLost => GpuError::ContentLost,
            other => GpuError::Driver(other),
        }
    }
}

/// Result type for renderer operations
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors_keep_their_kind() {
        assert!(matches!(
            GpuError::from(DriverError::DeviceLost),
            GpuError::DeviceLost
        ));
        assert!(matches!(
            GpuError::from(DriverError::ContentLost),
            GpuError::ContentLost
        ));
        let err = GpuError::from(DriverError::PipelineCreation("blend".into()));
        assert_eq!(
            err.to_string(),
            "driver error: pipeline creation failed: blend"
        );
    }
}
