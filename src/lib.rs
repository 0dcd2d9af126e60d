// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Camera QR Scanner Library
//!
//! This library turns a stream of RGB565 camera frames into decoded QR code
//! payloads. Each frame is cropped to its centered square, rotated upright
//! into a display buffer, and periodically converted to 8-bit luma for a
//! scan pass.
//!
//! ## Features
//!
//! - **Pixel Transforms**: Crop and rotate RGB565 frames in 90 degree steps
//!   and convert them to luma, bounds checked against the frame size.
//! - **Buffer Management**: Display and luma buffers sized to the crop
//!   window, rebuilt whenever the frame geometry changes.
//! - **Scanning**: QR recognition backed by `rqrr` behind a pluggable
//!   decoder trait.
//! - **Session State Machine**: Start, stop and stream-loss handling with
//!   a single owner for every camera resource.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_qrscan::{
//!     image::{FrameGeometry, Rotation, RGBP},
//!     session::{CameraSession, Frame, NullObserver, SessionConfig},
//! };
//! # use edgefirst_qrscan::session::{CameraDevice, CameraEvent, DriverError, ScanTimer, SizeHint};
//! # use edgefirst_qrscan::image::FourCC;
//! # struct Camera;
//! # impl CameraDevice for Camera {
//! #     fn is_available(&self) -> bool { true }
//! #     fn start(&mut self, _: SizeHint, _: FourCC) -> Result<(), DriverError> { Ok(()) }
//! #     fn register(&mut self, _: CameraEvent) -> Result<(), DriverError> { Ok(()) }
//! #     fn unregister(&mut self, _: CameraEvent) {}
//! #     fn stop(&mut self) {}
//! # }
//! # struct Timer;
//! # impl ScanTimer for Timer {
//! #     fn arm(&mut self, _: std::time::Duration) {}
//! #     fn cancel(&mut self) {}
//! # }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = CameraSession::new(SessionConfig::default(), Camera, Timer, NullObserver);
//! session.start()?;
//!
//! // Deliver a frame from the driver, then let the scan timer fire
//! let pixels = vec![0xffffu16; 640 * 480];
//! let frame = Frame {
//!     geometry: FrameGeometry::packed(640, 480, Rotation::Rotation90),
//!     encoding: RGBP,
//!     data: &pixels,
//! };
//! session.on_frame(&frame)?;
//! session.on_scan_tick()?;
//! println!("decoded: {:?}", session.decoded());
//! # Ok(())
//! # }
//! ```

pub mod buffers;
pub mod camera;
pub mod error;
pub mod image;
pub mod pump;
pub mod scan;
pub mod session;

pub use error::{Error, Result};
