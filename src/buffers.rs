// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::{Error, Result},
    image::{self, CropWindow, FourCC, FrameGeometry, DISPLAY_BYTES_PER_PIXEL, RGBP, Y800},
};
use core::fmt;
use std::mem::size_of;
use tracing::{debug, info};

/// Cropped, rotation-corrected RGB565 preview of the latest frame.
///
/// Holds `square_dim²` pixels. Contents are undefined (zeroed) until the
/// first successful copy.
#[derive(Debug)]
pub struct DisplayBuffer {
    pixels: Vec<u16>,
    square_dim: u32,
    generation: u64,
}

impl DisplayBuffer {
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn square_dim(&self) -> u32 {
        self.square_dim
    }

    /// Allocation identity. Every (re)allocation produces a new generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn format(&self) -> FourCC {
        RGBP
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.pixels.len() * DISPLAY_BYTES_PER_PIXEL
    }
}

/// 8-bit luma derived from the [`DisplayBuffer`], scanned for codes.
#[derive(Debug)]
pub struct LumaBuffer {
    pixels: Vec<u8>,
    square_dim: u32,
    generation: u64,
}

impl LumaBuffer {
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn square_dim(&self) -> u32 {
        self.square_dim
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.pixels.len()
    }
}

/// Recognition engine image descriptor bound 1:1 to a [`LumaBuffer`]
/// allocation.
///
/// The binding is by generation: once the luma buffer is reallocated the
/// descriptor no longer matches and the scan engine refuses it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecognitionImage {
    width: u32,
    height: u32,
    generation: u64,
}

impl RecognitionImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> FourCC {
        Y800
    }

    /// Generation of the luma buffer this image is bound to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when this image describes `luma` exactly.
    pub fn is_bound_to(&self, luma: &LumaBuffer) -> bool {
        self.generation == luma.generation
            && self.width == luma.square_dim
            && self.height == luma.square_dim
            && luma.pixels.len() == self.width as usize * self.height as usize
    }
}

impl fmt::Display for RecognitionImage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} {} gen:{}",
            self.width,
            self.height,
            self.format(),
            self.generation
        )
    }
}

/// Owner of the display buffer, the luma buffer and the recognition image
/// bound to it.
///
/// The three are created lazily from the first frame, rebuilt together on
/// every geometry change and released together when the session stops.
#[derive(Debug, Default)]
pub struct FrameBufferManager {
    geometry: Option<FrameGeometry>,
    crop: Option<CropWindow>,
    display: Option<DisplayBuffer>,
    luma: Option<LumaBuffer>,
    image: Option<RecognitionImage>,
    limit: Option<usize>,
    next_generation: u64,
}

/// Combined bytes of display and luma buffers for a square of `square_dim`.
pub fn buffer_bytes(square_dim: u32) -> usize {
    let area = square_dim as usize * square_dim as usize;
    area * DISPLAY_BYTES_PER_PIXEL + area
}

fn alloc<T: Copy + Default>(len: usize) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::OutOfMemory {
        bytes: len * size_of::<T>(),
    })?;
    buf.resize(len, T::default());
    Ok(buf)
}

impl FrameBufferManager {
    /// Creates an empty manager. `limit` caps the combined bytes of the
    /// display and luma buffers.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Geometry the current buffers were built for.
    pub fn geometry(&self) -> Option<&FrameGeometry> {
        self.geometry.as_ref()
    }

    pub fn crop(&self) -> Option<&CropWindow> {
        self.crop.as_ref()
    }

    pub fn display(&self) -> Option<&DisplayBuffer> {
        self.display.as_ref()
    }

    pub fn luma(&self) -> Option<&LumaBuffer> {
        self.luma.as_ref()
    }

    pub fn image(&self) -> Option<&RecognitionImage> {
        self.image.as_ref()
    }

    /// Makes the buffers match `geometry`.
    ///
    /// Nothing happens when the buffers were already built for an identical
    /// geometry. Otherwise the crop window is recomputed, the previous
    /// buffers and image are released, fresh buffers are allocated and the
    /// recognition image is rebound, all before this returns. Returns true
    /// when a rebuild happened.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] leaves the manager fully released.
    pub fn reconfigure(&mut self, geometry: &FrameGeometry) -> Result<bool> {
        if self.geometry.as_ref() == Some(geometry) && self.image.is_some() {
            return Ok(false);
        }

        let crop = CropWindow::from(geometry);
        info!(
            "frame geometry {} -> crop {}x{} at ({}, {})",
            geometry, crop.square_dim, crop.square_dim, crop.crop_x, crop.crop_y
        );

        self.release();
        self.ensure_capacity(crop.square_dim)?;
        self.bind_recognition_image()?;
        self.geometry = Some(*geometry);
        self.crop = Some(crop);
        Ok(true)
    }

    /// Allocates `square_dim²×2` bytes of display buffer and `square_dim²`
    /// bytes of luma buffer unless buffers of that size are already held.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfMemory`] when the allocation fails or exceeds the
    /// configured limit; no buffer is installed in that case.
    pub fn ensure_capacity(&mut self, square_dim: u32) -> Result<(&DisplayBuffer, &LumaBuffer)> {
        let current = self.display.as_ref().map(DisplayBuffer::square_dim);
        if current != Some(square_dim) || self.luma.is_none() {
            self.reallocate(square_dim)?;
        }
        match (&self.display, &self.luma) {
            (Some(display), Some(luma)) => Ok((display, luma)),
            _ => Err(Error::OutOfMemory {
                bytes: buffer_bytes(square_dim),
            }),
        }
    }

    fn reallocate(&mut self, square_dim: u32) -> Result<()> {
        // previous buffers go first, and the image bound to them with it
        self.release_buffers();

        let bytes = buffer_bytes(square_dim);
        if let Some(limit) = self.limit {
            if bytes > limit {
                return Err(Error::OutOfMemory { bytes });
            }
        }

        let area = square_dim as usize * square_dim as usize;
        let display_pixels = alloc::<u16>(area)?;
        let luma_pixels = alloc::<u8>(area)?;

        let generation = self.next_generation;
        self.next_generation += 1;
        let buf = self.display.insert(DisplayBuffer {
            pixels: display_pixels,
            square_dim,
            generation,
        });
        debug!(
            "frame buffers alloc'd {square_dim}x{square_dim} {} ({bytes} bytes) gen:{generation}",
            buf.format()
        );
        self.luma = Some(LumaBuffer {
            pixels: luma_pixels,
            square_dim,
            generation,
        });
        Ok(())
    }

    /// Destroys any previous recognition image and binds a new one to the
    /// current luma buffer memory and dimensions.
    pub fn bind_recognition_image(&mut self) -> Result<&RecognitionImage> {
        if let Some(old) = self.image.take() {
            debug!("recognition image {old} destroyed");
        }
        let luma = self.luma.as_ref().ok_or(Error::StaleImage)?;
        let image = RecognitionImage {
            width: luma.square_dim,
            height: luma.square_dim,
            generation: luma.generation,
        };
        debug!("recognition image {image} bound");
        Ok(self.image.insert(image))
    }

    /// Copies the crop window of `frame` into the display buffer.
    pub fn copy_frame(&mut self, frame: &[u16]) -> Result<&DisplayBuffer> {
        match (&self.geometry, &self.crop, &mut self.display) {
            (Some(geometry), Some(crop), Some(display)) => {
                image::crop_rotate(frame, geometry, crop, &mut display.pixels)?;
                Ok(display)
            }
            _ => Err(Error::MalformedFrame(
                "no frame buffers configured".to_string(),
            )),
        }
    }

    /// Recomputes the luma buffer from the display buffer and returns the
    /// bound image with its pixels. `None` when nothing is bound.
    pub fn refresh_luma(&mut self) -> Option<(&RecognitionImage, &LumaBuffer)> {
        match (&self.display, &mut self.luma, &self.image) {
            (Some(display), Some(luma), Some(bound)) => {
                image::to_luma(&display.pixels, &mut luma.pixels);
                Some((bound, &*luma))
            }
            _ => None,
        }
    }

    fn release_buffers(&mut self) {
        if let Some(image) = self.image.take() {
            debug!("recognition image {image} destroyed");
        }
        if let Some(buf) = self.display.take() {
            debug!(
                "display buffer freed ({} bytes) gen:{}",
                buf.size(),
                buf.generation
            );
        }
        if let Some(buf) = self.luma.take() {
            debug!(
                "luma buffer freed ({} bytes) gen:{}",
                buf.size(),
                buf.generation
            );
        }
    }

    /// Releases buffers, image and geometry.
    pub fn release(&mut self) {
        self.release_buffers();
        self.geometry = None;
        self.crop = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Rotation;

    #[test]
    fn test_ensure_capacity() -> Result<()> {
        let mut mgr = FrameBufferManager::new(None);
        let (display, luma) = mgr.ensure_capacity(4)?;
        assert_eq!(display.size(), 32);
        assert_eq!(luma.size(), 16);
        let first = display.generation();

        // same dimension keeps the allocation
        let (display, _) = mgr.ensure_capacity(4)?;
        assert_eq!(display.generation(), first);

        let (display, luma) = mgr.ensure_capacity(6)?;
        assert_ne!(display.generation(), first);
        assert_eq!(display.generation(), luma.generation());
        assert_eq!(luma.size(), 36);
        Ok(())
    }

    #[test]
    fn test_reconfigure() -> Result<()> {
        let mut mgr = FrameBufferManager::new(None);
        let geometry = FrameGeometry::packed(640, 480, Rotation::Rotation0);
        assert!(mgr.reconfigure(&geometry)?);
        assert!(!mgr.reconfigure(&geometry)?);

        let crop = *mgr.crop().unwrap();
        assert_eq!(crop.square_dim, 480);
        assert_eq!(crop.crop_x, 80);
        let first = mgr.image().unwrap().clone();
        assert_eq!(first.width(), 480);

        // rotation alone rebuilds even though the square is unchanged
        let rotated = FrameGeometry::packed(640, 480, Rotation::Rotation90);
        assert!(mgr.reconfigure(&rotated)?);
        let second = mgr.image().unwrap();
        assert_ne!(second.generation(), first.generation());
        assert!(second.is_bound_to(mgr.luma().unwrap()));
        assert!(!first.is_bound_to(mgr.luma().unwrap()));

        let smaller = FrameGeometry::packed(320, 240, Rotation::Rotation90);
        assert!(mgr.reconfigure(&smaller)?);
        assert_eq!(mgr.image().unwrap().width(), 240);
        assert_eq!(mgr.display().unwrap().pixels().len(), 240 * 240);
        Ok(())
    }

    #[test]
    fn test_limit() {
        let mut mgr = FrameBufferManager::new(Some(buffer_bytes(100)));
        let geometry = FrameGeometry::packed(120, 100, Rotation::Rotation0);
        mgr.reconfigure(&geometry).unwrap();

        let bigger = FrameGeometry::packed(200, 150, Rotation::Rotation0);
        let err = mgr.reconfigure(&bigger).unwrap_err();
        assert!(matches!(err, Error::OutOfMemory { bytes } if bytes == buffer_bytes(150)));
        // nothing half-installed
        assert!(mgr.display().is_none());
        assert!(mgr.luma().is_none());
        assert!(mgr.image().is_none());
        assert!(mgr.geometry().is_none());
    }

    #[test]
    fn test_copy_and_luma() -> Result<()> {
        let mut mgr = FrameBufferManager::new(None);
        assert!(mgr.refresh_luma().is_none());
        assert!(mgr.copy_frame(&[0; 4]).is_err());

        let geometry = FrameGeometry::packed(3, 2, Rotation::Rotation0);
        mgr.reconfigure(&geometry)?;
        let frame = [0x0000, 0xffff, 0x0000, 0x0000, 0x0000, 0xffff];
        let display = mgr.copy_frame(&frame)?;
        assert_eq!(display.pixels(), &[0x0000, 0xffff, 0x0000, 0x0000]);
        assert_eq!(display.format(), RGBP);

        let (image, luma) = mgr.refresh_luma().unwrap();
        assert_eq!(image.format(), Y800);
        assert_eq!(luma.pixels(), &[0, 255, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_release() -> Result<()> {
        let mut mgr = FrameBufferManager::new(None);
        mgr.reconfigure(&FrameGeometry::packed(8, 8, Rotation::Rotation0))?;
        mgr.copy_frame(&[0xffff; 64])?;
        mgr.release();
        assert!(mgr.luma().is_none());
        assert!(mgr.display().is_none());
        assert!(mgr.image().is_none());
        assert!(mgr.geometry().is_none());
        assert!(matches!(
            mgr.bind_recognition_image(),
            Err(Error::StaleImage)
        ));
        Ok(())
    }
}
