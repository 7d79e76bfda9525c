use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorWrapper {
    #[error("zenoh error {0:?}")]
    ZenohError(zenoh::Error),
}

/// Recoverable failures of the guidance core.
///
/// None of these are fatal to the control loop. Callers map them to a
/// "no marker" classification or a zero velocity command.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceError {
    #[error("marker geometry is degenerate")]
    InvalidMarkerGeometry,
    #[error("localisation has not produced a pose yet")]
    MissingPoseEstimate,
    #[error("camera frame dimensions are not known yet")]
    MissingFrameDimensions,
}
