// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    buffers::{LumaBuffer, RecognitionImage},
    error::{Error, Result},
};
use core::fmt;
use std::{error::Error as StdError, time::Instant};
use tracing::{debug, info_span, trace};

/// Encoding family of a decoded symbol.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Symbology {
    QrCode,
    Ean13,
    Code128,
    Other,
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Symbology::QrCode => write!(f, "QR-Code"),
            Symbology::Ean13 => write!(f, "EAN-13"),
            Symbology::Code128 => write!(f, "CODE-128"),
            Symbology::Other => write!(f, "other"),
        }
    }
}

/// One symbol produced by a scan pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedResult {
    pub symbology: Symbology,
    pub data: Vec<u8>,
}

impl DecodedResult {
    pub fn new(symbology: Symbology, data: impl Into<Vec<u8>>) -> Self {
        Self {
            symbology,
            data: data.into(),
        }
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Barcode recognition oracle.
///
/// Implementations receive a tightly packed 8-bit greyscale image and
/// report every symbol they find. They must not retain the pixel slice
/// past the call.
pub trait SymbolDecoder {
    /// Decoder identifier.
    fn name(&self) -> &'static str;

    /// Decode all symbols in `luma`, which holds `width * height` pixels.
    fn decode(&mut self, luma: &[u8], width: usize, height: usize) -> Vec<DecodedResult>;
}

/// Outcome of constructing a decoder.
pub type DecoderResult = Result<Box<dyn SymbolDecoder>, Box<dyn StdError + Send + Sync>>;

/// Builds a fresh decoder each time the session starts.
pub type DecoderFactory = Box<dyn FnMut() -> DecoderResult>;

/// QR decoder backed by the `rqrr` crate.
#[derive(Debug, Default)]
pub struct RqrrDecoder;

impl SymbolDecoder for RqrrDecoder {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn decode(&mut self, luma: &[u8], width: usize, height: usize) -> Vec<DecodedResult> {
        if width.checked_mul(height).map_or(true, |area| area > luma.len()) {
            debug!(
                "rqrr skipped {}x{} image over {} pixels",
                width,
                height,
                luma.len()
            );
            return Vec::new();
        }
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| luma[y * width + x]);
        let grids = prepared.detect_grids();

        let mut results = Vec::with_capacity(grids.len());
        for grid in grids {
            match grid.decode() {
                Ok((meta, content)) => {
                    trace!("rqrr decoded version {:?} ecc {}", meta.version, meta.ecc_level);
                    results.push(DecodedResult::new(Symbology::QrCode, content));
                }
                Err(e) => debug!("rqrr grid failed to decode: {e:?}"),
            }
        }
        results
    }
}

/// Factory for the default [`RqrrDecoder`].
pub fn rqrr_factory() -> DecoderFactory {
    Box::new(|| -> DecoderResult { Ok(Box::new(RqrrDecoder)) })
}

/// Recognition engine owned by a running session.
///
/// Wraps the oracle, enables QR decoding and filters every other symbology
/// out of the results. Destroyed on drop.
pub struct ScanEngine {
    decoder: Box<dyn SymbolDecoder>,
    passes: u64,
}

impl ScanEngine {
    /// Creates the engine through `factory`.
    ///
    /// # Errors
    ///
    /// [`Error::EngineInitFailure`] when the factory fails.
    pub fn create(factory: &mut DecoderFactory) -> Result<Self> {
        let decoder = factory().map_err(|e| Error::EngineInitFailure(e.to_string()))?;
        debug!("scan engine created with {} decoder", decoder.name());
        Ok(Self { decoder, passes: 0 })
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    /// Number of scan passes run so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Runs one synchronous scan pass over `luma` through `image` and
    /// returns the QR results in scan order.
    ///
    /// # Errors
    ///
    /// [`Error::StaleImage`] when `image` is not bound to `luma`; the
    /// oracle is never invoked in that case.
    pub fn scan(
        &mut self,
        image: &RecognitionImage,
        luma: &LumaBuffer,
    ) -> Result<Vec<DecodedResult>> {
        if !image.is_bound_to(luma) {
            return Err(Error::StaleImage);
        }
        let _span = info_span!("scan").entered();
        let now = Instant::now();
        let results = self.decoder.decode(
            luma.pixels(),
            image.width() as usize,
            image.height() as usize,
        );
        self.passes += 1;

        let total = results.len();
        let qr: Vec<DecodedResult> = results
            .into_iter()
            .filter(|r| r.symbology == Symbology::QrCode)
            .collect();
        trace!(
            "scan pass {} on {}: {} symbols, {} QR, {:?}",
            self.passes,
            image,
            total,
            qr.len(),
            now.elapsed()
        );
        Ok(qr)
    }
}

impl fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ScanEngine")
            .field("decoder", &self.decoder.name())
            .field("passes", &self.passes)
            .finish()
    }
}

impl Drop for ScanEngine {
    fn drop(&mut self) {
        debug!("scan engine destroyed after {} passes", self.passes);
    }
}
