use thiserror::Error;

use super::device::DeviceError;
use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Could not read activity file: {0}")]
    Read(#[source] std::io::Error),

    #[error("Could not stage payload: {0}")]
    Stage(#[source] std::io::Error),

    #[error("Device rewrite failed: {0}")]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Api(#[from] ApiError),
}
