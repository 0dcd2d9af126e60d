// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::error::{Error, Result};
use core::fmt;
use tracing::info_span;

/// Four character code identifying a pixel encoding, as reported by the
/// camera driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

/// RGB565 16-bit packed format (5 bits red, 6 bits green, 5 bits blue).
/// This is the only encoding the scanning pipeline accepts.
pub const RGBP: FourCC = FourCC(*b"RGBP");

/// BGRA 32-bit pixel format (8 bits per channel, with alpha)
pub const AR24: FourCC = FourCC(*b"AR24");

/// NV12 4:2:0 YUV semi-planar format
pub const NV12: FourCC = FourCC(*b"NV12");

/// NV21 4:2:0 YVU semi-planar format (common Android preview format)
pub const NV21: FourCC = FourCC(*b"NV21");

/// 8-bit greyscale format consumed by the recognition engine
pub const Y800: FourCC = FourCC(*b"Y800");

/// Bytes per pixel of the display buffer.
pub const DISPLAY_BYTES_PER_PIXEL: usize = 2;

/// Rotation the driver reports for a frame.
///
/// The value describes how the sensor image is rotated relative to the
/// upright scene; [`crop_rotate`] undoes it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    /// No rotation (0 degrees)
    #[default]
    Rotation0,
    /// Frame is rotated 90 degrees, corrected by a counter-clockwise turn
    Rotation90,
    /// Frame is rotated 180 degrees
    Rotation180,
    /// Frame is rotated 270 degrees, corrected by a clockwise turn
    Rotation270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Rotation0 => 0,
            Rotation::Rotation90 => 90,
            Rotation::Rotation180 => 180,
            Rotation::Rotation270 => 270,
        }
    }

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Rotation0),
            90 => Some(Rotation::Rotation90),
            180 => Some(Rotation::Rotation180),
            270 => Some(Rotation::Rotation270),
            _ => None,
        }
    }

    /// Source walk for this rotation over `crop` in a frame whose rows are
    /// `stride` pixels apart.
    ///
    /// Destination pixel `(row, col)` reads source offset
    /// `start + row * outer + col * inner`, so the destination is always
    /// written sequentially while the source is walked in a
    /// rotation-dependent order:
    ///
    /// - 0: top-left corner, rightwards, rows downwards
    /// - 90: top-right corner, downwards, columns leftwards
    /// - 180: bottom-right corner, leftwards, rows upwards
    /// - 270: bottom-left corner, upwards, columns rightwards
    pub fn walk(self, crop: &CropWindow, stride: usize) -> Walk {
        let n = crop.square_dim as isize;
        let s = stride as isize;
        let base = crop.crop_x as isize + crop.crop_y as isize * s;
        let (start, inner, outer) = match self {
            Rotation::Rotation0 => (base, 1, s),
            Rotation::Rotation90 => (base + n - 1, s, -1),
            Rotation::Rotation180 => (base + (n - 1) * s + n - 1, -1, -s),
            Rotation::Rotation270 => (base + (n - 1) * s, -s, 1),
        };
        Walk {
            start,
            inner,
            outer,
            dim: crop.square_dim as usize,
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Raw, unprocessed shape of a camera frame as reported with each
/// notification. Compared by value to detect geometry changes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes.
    pub pitch: u32,
    pub rotation: Rotation,
}

impl FrameGeometry {
    /// Geometry of a tightly packed RGB565 frame.
    pub fn packed(width: u32, height: u32, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            pitch: width * DISPLAY_BYTES_PER_PIXEL as u32,
            rotation,
        }
    }

    /// Distance between rows in pixels.
    pub fn stride(&self) -> usize {
        self.pitch as usize / DISPLAY_BYTES_PER_PIXEL
    }

    /// Minimum number of pixels a frame with this geometry must carry.
    pub fn min_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.stride() * (self.height as usize - 1) + self.width as usize
    }

    /// Checks that `len` pixels of frame data are consistent with this
    /// geometry.
    pub fn validate(&self, len: usize) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::MalformedFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        if self.pitch as usize % DISPLAY_BYTES_PER_PIXEL != 0
            || (self.pitch as usize) < self.width as usize * DISPLAY_BYTES_PER_PIXEL
        {
            return Err(Error::MalformedFrame(format!(
                "pitch {} does not fit width {}",
                self.pitch, self.width
            )));
        }
        if len < self.min_len() {
            return Err(Error::MalformedFrame(format!(
                "{} pixels supplied for {}, need {}",
                len,
                self,
                self.min_len()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} pitch:{} rotation:{}",
            self.width, self.height, self.pitch, self.rotation
        )
    }
}

/// Square region cropped out of a non-square frame, centered on the longer
/// axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CropWindow {
    /// Side length of the square in pixels
    pub square_dim: u32,
    /// X coordinate of the top-left corner inside the frame
    pub crop_x: u32,
    /// Y coordinate of the top-left corner inside the frame
    pub crop_y: u32,
}

impl CropWindow {
    /// Number of pixels inside the window.
    pub fn area(&self) -> usize {
        self.square_dim as usize * self.square_dim as usize
    }
}

impl From<&FrameGeometry> for CropWindow {
    fn from(geometry: &FrameGeometry) -> Self {
        let (width, height) = (geometry.width, geometry.height);
        if width > height {
            CropWindow {
                square_dim: height,
                crop_x: (width - height) / 2,
                crop_y: 0,
            }
        } else {
            CropWindow {
                square_dim: width,
                crop_x: 0,
                crop_y: (height - width) / 2,
            }
        }
    }
}

/// Parametrized source traversal produced by [`Rotation::walk`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Walk {
    pub start: isize,
    pub inner: isize,
    pub outer: isize,
    pub dim: usize,
}

impl Walk {
    /// Source offset read for destination pixel `(row, col)`.
    pub fn offset(&self, row: usize, col: usize) -> isize {
        self.start + row as isize * self.outer + col as isize * self.inner
    }

    /// True when every offset of the walk lies in `[0, len)`.
    ///
    /// Offsets are affine in `(row, col)`, so the extremes are reached at
    /// the four corners of the destination.
    pub fn fits(&self, len: usize) -> bool {
        if self.dim == 0 {
            return true;
        }
        let last = self.dim - 1;
        [(0, 0), (0, last), (last, 0), (last, last)]
            .iter()
            .map(|&(row, col)| self.offset(row, col))
            .all(|at| at >= 0 && (at as usize) < len)
    }
}

/// Copies the crop window of `src` into `dest`, undoing the frame rotation.
///
/// Exactly `square_dim²` source pixels are read and `dest` is written
/// strictly sequentially, one pixel per slot. `crop` must be derived from
/// `geometry`; the walk is checked against the bounds of `src` before any
/// pixel is copied.
///
/// # Errors
///
/// Returns [`Error::MalformedFrame`] when `dest` is not `square_dim²`
/// pixels or the walk would leave `src`.
pub fn crop_rotate(
    src: &[u16],
    geometry: &FrameGeometry,
    crop: &CropWindow,
    dest: &mut [u16],
) -> Result<()> {
    let _span = info_span!("crop_rotate").entered();
    debug_assert_eq!(*crop, CropWindow::from(geometry));

    let walk = geometry.rotation.walk(crop, geometry.stride());
    check_walk(&walk, crop, src.len(), dest.len())?;
    if walk.dim == 0 {
        return Ok(());
    }

    for (row, line) in dest.chunks_exact_mut(walk.dim).enumerate() {
        let mut at = walk.offset(row, 0);
        for px in line.iter_mut() {
            *px = src[at as usize];
            at += walk.inner;
        }
    }
    Ok(())
}

/// Inverse of [`crop_rotate`]: writes the upright square `upright` into the
/// crop window of `frame` so that correcting `geometry.rotation` restores
/// it. Used by synthetic frame sources.
pub fn place_rotated(
    upright: &[u16],
    geometry: &FrameGeometry,
    crop: &CropWindow,
    frame: &mut [u16],
) -> Result<()> {
    let walk = geometry.rotation.walk(crop, geometry.stride());
    check_walk(&walk, crop, frame.len(), upright.len())?;
    if walk.dim == 0 {
        return Ok(());
    }

    for (row, line) in upright.chunks_exact(walk.dim).enumerate() {
        let mut at = walk.offset(row, 0);
        for px in line {
            frame[at as usize] = *px;
            at += walk.inner;
        }
    }
    Ok(())
}

fn check_walk(walk: &Walk, crop: &CropWindow, frame_len: usize, square_len: usize) -> Result<()> {
    if square_len != crop.area() {
        return Err(Error::MalformedFrame(format!(
            "square buffer holds {} pixels, window needs {}",
            square_len,
            crop.area()
        )));
    }
    if !walk.fits(frame_len) {
        return Err(Error::MalformedFrame(format!(
            "{}x{} window at ({}, {}) exceeds {} pixel frame",
            crop.square_dim, crop.square_dim, crop.crop_x, crop.crop_y, frame_len
        )));
    }
    Ok(())
}

/// Luma of one RGB565 pixel using BT.601 integer weights.
///
/// Channels are widened to 8 bits by bit replication so that full scale
/// maps to 255.
pub const fn rgb565_to_luma(px: u16) -> u8 {
    let r5 = (px >> 11) & 0x1f;
    let g6 = (px >> 5) & 0x3f;
    let b5 = px & 0x1f;
    let r = ((r5 << 3) | (r5 >> 2)) as u32;
    let g = ((g6 << 2) | (g6 >> 4)) as u32;
    let b = ((b5 << 3) | (b5 >> 2)) as u32;
    let y = (77 * r + 150 * g + 29 * b) >> 8;
    if y > 255 {
        255
    } else {
        y as u8
    }
}

/// Converts RGB565 pixels to 8-bit luma, one output byte per input pixel.
///
/// Converts `min(src.len(), dest.len())` pixels.
pub fn to_luma(src: &[u16], dest: &mut [u8]) {
    let _span = info_span!("to_luma").entered();
    for (y, px) in dest.iter_mut().zip(src) {
        *y = rgb565_to_luma(*px);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frame whose pixel value is its own offset, so every destination
    /// pixel identifies the source pixel it was read from.
    fn indexed_frame(geometry: &FrameGeometry) -> Vec<u16> {
        (0..geometry.min_len()).map(|i| i as u16).collect()
    }

    fn at(geometry: &FrameGeometry, x: u32, y: u32) -> u16 {
        (y as usize * geometry.stride() + x as usize) as u16
    }

    #[test]
    fn test_crop_window() {
        let landscape = FrameGeometry::packed(640, 480, Rotation::Rotation0);
        assert_eq!(
            CropWindow::from(&landscape),
            CropWindow {
                square_dim: 480,
                crop_x: 80,
                crop_y: 0
            }
        );

        let portrait = FrameGeometry::packed(480, 640, Rotation::Rotation90);
        assert_eq!(
            CropWindow::from(&portrait),
            CropWindow {
                square_dim: 480,
                crop_x: 0,
                crop_y: 80
            }
        );

        let square = FrameGeometry::packed(320, 320, Rotation::Rotation0);
        assert_eq!(
            CropWindow::from(&square),
            CropWindow {
                square_dim: 320,
                crop_x: 0,
                crop_y: 0
            }
        );

        // odd difference rounds the offset down
        let odd = FrameGeometry::packed(7, 4, Rotation::Rotation0);
        assert_eq!(CropWindow::from(&odd).crop_x, 1);
    }

    #[test]
    fn test_rotation_corners() {
        // 6x4 frame, window is the 4x4 square at x=1..5
        for rotation in [
            Rotation::Rotation0,
            Rotation::Rotation90,
            Rotation::Rotation180,
            Rotation::Rotation270,
        ] {
            let geometry = FrameGeometry::packed(6, 4, rotation);
            let crop = CropWindow::from(&geometry);
            let src = indexed_frame(&geometry);
            let mut dest = vec![0u16; crop.area()];
            crop_rotate(&src, &geometry, &crop, &mut dest).unwrap();

            let (tl, tr, bl, br) = (
                at(&geometry, 1, 0),
                at(&geometry, 4, 0),
                at(&geometry, 1, 3),
                at(&geometry, 4, 3),
            );
            // destination corners: top-left, top-right, bottom-left, bottom-right
            let expected = match rotation {
                Rotation::Rotation0 => [tl, tr, bl, br],
                Rotation::Rotation90 => [tr, br, tl, bl],
                Rotation::Rotation180 => [br, bl, tr, tl],
                Rotation::Rotation270 => [bl, tl, br, tr],
            };
            assert_eq!(
                [dest[0], dest[3], dest[12], dest[15]],
                expected,
                "{rotation}"
            );
        }
    }

    #[test]
    fn test_rotation_mapping() {
        // every destination pixel against the closed form of each rotation,
        // on landscape and portrait frames, packed and with padded rows
        let frames = [
            FrameGeometry::packed(9, 5, Rotation::Rotation0),
            FrameGeometry::packed(5, 9, Rotation::Rotation0),
            FrameGeometry {
                pitch: 24,
                ..FrameGeometry::packed(9, 5, Rotation::Rotation0)
            },
            FrameGeometry {
                pitch: 16,
                ..FrameGeometry::packed(5, 9, Rotation::Rotation0)
            },
        ];
        for frame in frames {
            let crop = CropWindow::from(&frame);
            let n = crop.square_dim;
            for rotation in [
                Rotation::Rotation0,
                Rotation::Rotation90,
                Rotation::Rotation180,
                Rotation::Rotation270,
            ] {
                let geometry = FrameGeometry { rotation, ..frame };
                let src = indexed_frame(&geometry);
                let mut dest = vec![0u16; crop.area()];
                crop_rotate(&src, &geometry, &crop, &mut dest).unwrap();

                for row in 0..n {
                    for col in 0..n {
                        let (x, y) = match rotation {
                            Rotation::Rotation0 => (col, row),
                            Rotation::Rotation90 => (n - 1 - row, col),
                            Rotation::Rotation180 => (n - 1 - col, n - 1 - row),
                            Rotation::Rotation270 => (row, n - 1 - col),
                        };
                        assert_eq!(
                            dest[(row * n + col) as usize],
                            at(&geometry, crop.crop_x + x, crop.crop_y + y),
                            "{geometry} ({row}, {col})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_each_pixel_once() {
        let geometry = FrameGeometry::packed(12, 20, Rotation::Rotation0);
        let crop = CropWindow::from(&geometry);
        let mut window: Vec<u16> = (0..crop.square_dim)
            .flat_map(|y| (0..crop.square_dim).map(move |x| (x, y)))
            .map(|(x, y)| at(&geometry, crop.crop_x + x, crop.crop_y + y))
            .collect();
        window.sort_unstable();

        for rotation in [
            Rotation::Rotation0,
            Rotation::Rotation90,
            Rotation::Rotation180,
            Rotation::Rotation270,
        ] {
            let geometry = FrameGeometry {
                rotation,
                ..geometry
            };
            let src = indexed_frame(&geometry);
            let mut dest = vec![u16::MAX; crop.area()];
            crop_rotate(&src, &geometry, &crop, &mut dest).unwrap();
            dest.sort_unstable();
            assert_eq!(dest, window, "{rotation}");
        }
    }

    #[test]
    fn test_upright_marker() {
        // an L-shaped marker drawn upright must come back upright for every
        // sensor rotation
        let n = 8usize;
        let mut upright = vec![0u16; n * n];
        for i in 0..n {
            upright[i] = 0xffff; // top edge
            upright[i * n] = 0xffff; // left edge
        }
        upright[n * n - 1] = 0xf800; // red dot bottom-right

        for rotation in [
            Rotation::Rotation0,
            Rotation::Rotation90,
            Rotation::Rotation180,
            Rotation::Rotation270,
        ] {
            let geometry = FrameGeometry::packed(12, 8, rotation);
            let crop = CropWindow::from(&geometry);
            let mut frame = vec![0u16; geometry.min_len()];
            place_rotated(&upright, &geometry, &crop, &mut frame).unwrap();
            let mut dest = vec![0u16; crop.area()];
            crop_rotate(&frame, &geometry, &crop, &mut dest).unwrap();
            assert_eq!(dest, upright, "{rotation}");
        }

        // the 90 degree frame holds the top edge on its right column
        let geometry = FrameGeometry::packed(8, 8, Rotation::Rotation90);
        let crop = CropWindow::from(&geometry);
        let mut frame = vec![0u16; geometry.min_len()];
        place_rotated(&upright, &geometry, &crop, &mut frame).unwrap();
        assert!((0..n).all(|y| frame[y * n + n - 1] == 0xffff));
    }

    #[test]
    fn test_pitch() {
        // 4x2 frame padded to 6 pixels per row
        let geometry = FrameGeometry {
            width: 4,
            height: 2,
            pitch: 12,
            rotation: Rotation::Rotation0,
        };
        let crop = CropWindow::from(&geometry);
        let src = [0, 1, 2, 3, 90, 91, 4, 5, 6, 7];
        let mut dest = [0u16; 4];
        crop_rotate(&src, &geometry, &crop, &mut dest).unwrap();
        assert_eq!(dest, [1, 2, 5, 6]);
        assert_eq!(geometry.min_len(), 10);
        geometry.validate(src.len()).unwrap();
        assert!(geometry.validate(9).is_err());
    }

    #[test]
    fn test_bounds() {
        // square frame, so the window reaches the last pixel
        let geometry = FrameGeometry::packed(6, 6, Rotation::Rotation180);
        let crop = CropWindow::from(&geometry);
        let short = vec![0u16; geometry.min_len() - 1];
        let mut dest = vec![0u16; crop.area()];
        assert!(matches!(
            crop_rotate(&short, &geometry, &crop, &mut dest),
            Err(Error::MalformedFrame(_))
        ));

        let src = vec![0u16; geometry.min_len()];
        let mut small = vec![0u16; crop.area() - 1];
        assert!(crop_rotate(&src, &geometry, &crop, &mut small).is_err());

        let bad_pitch = FrameGeometry {
            pitch: 7,
            ..geometry
        };
        assert!(bad_pitch.validate(1024).is_err());
        assert!(FrameGeometry::packed(0, 6, Rotation::Rotation0)
            .validate(0)
            .is_err());
    }

    #[test]
    fn test_luma() {
        assert_eq!(rgb565_to_luma(0xffff), 255);
        assert_eq!(rgb565_to_luma(0x0000), 0);
        // pure channels carry their weight
        assert_eq!(rgb565_to_luma(0xf800), 76);
        assert_eq!(rgb565_to_luma(0x07e0), 149);
        assert_eq!(rgb565_to_luma(0x001f), 28);

        let src = [0xffff, 0x0000, 0x8410, 0xf800];
        let mut first = [0u8; 4];
        let mut second = [0u8; 4];
        to_luma(&src, &mut first);
        to_luma(&src, &mut second);
        assert_eq!(first, second);
        assert_eq!(first[0], 255);
        assert_eq!(first[1], 0);
        // mid grey lands mid scale
        assert!((120..=135).contains(&first[2]));
    }

    #[test]
    fn test_fourcc() {
        assert_eq!(RGBP.to_string(), "RGBP");
        assert_ne!(RGBP, NV21);
    }
}
