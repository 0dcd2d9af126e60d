// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{image::FourCC, session::CameraEvent};
use thiserror::Error;

/// Result type alias using the crate [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the scanning pipeline.
///
/// Every variant except [`Error::MalformedFrame`] and [`Error::StaleImage`]
/// is fatal: the session releases all of its resources and settles in
/// `Unavailable` before the error is returned.
#[derive(Debug, Error)]
pub enum Error {
    /// No camera, camera in use by another process, or stream start failed.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Hooking up a driver notification failed after the stream started.
    #[error("failed to register {0:?} notification: {1}")]
    RegistrationFailure(CameraEvent, String),

    /// The driver delivered a frame in an encoding other than RGB565.
    #[error("unsupported pixel encoding {0}")]
    UnsupportedPixelEncoding(FourCC),

    /// Display or luma buffer could not be allocated.
    #[error("out of memory allocating {bytes} bytes of frame buffers")]
    OutOfMemory { bytes: usize },

    /// The recognition engine could not be constructed.
    #[error("failed to initialize scan engine: {0}")]
    EngineInitFailure(String),

    /// Frame data does not agree with its reported geometry. The frame is
    /// dropped and the session keeps running.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A recognition image was presented that is not bound to the current
    /// luma buffer.
    #[error("recognition image is not bound to the current luma buffer")]
    StaleImage,
}

impl Error {
    /// Returns true when the error tears the session down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedFrame(_) | Error::StaleImage)
    }
}
