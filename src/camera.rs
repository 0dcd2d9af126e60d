// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    image::{place_rotated, CropWindow, FourCC, FrameGeometry, Rotation, AR24, NV21, RGBP},
    session::{CameraDevice, CameraEvent, DriverError, Event, OwnedFrame, SizeHint},
};
use kanal::AsyncSender;
use qrcode::{Color, QrCode};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{runtime::Handle, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Background fill outside the code, mid grey.
const GREY: u16 = 0x8410;
const WHITE: u16 = 0xffff;
const BLACK: u16 = 0x0000;

/// Modules of quiet zone around a rendered code.
const QUIET_ZONE: usize = 4;

/// What the synthetic camera films.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scene {
    /// Grey frames with nothing to decode
    Blank,
    /// A QR code carrying this payload, upright after rotation correction
    Payload(String),
    /// Raw RGB565 little-endian frames replayed in a loop
    Raw(PathBuf),
}

#[derive(Clone, Debug)]
pub struct SyntheticCameraConfig {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub fps: u32,
    pub scene: Scene,
    /// Report a driver-side stream stop after this many frames
    pub stop_after: Option<u64>,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            rotation: Rotation::Rotation0,
            fps: 30,
            scene: Scene::Blank,
            stop_after: None,
        }
    }
}

/// In-process camera driver delivering rendered or replayed RGB565 frames
/// as [`Event::Frame`] messages.
///
/// Frames are only sent while [`CameraEvent::FrameReady`] is registered.
/// Must be started from within a tokio runtime.
pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    tx: AsyncSender<Event>,
    frame_ready: Arc<AtomicBool>,
    stream_stopped: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig, tx: AsyncSender<Event>) -> Self {
        Self {
            config,
            tx,
            frame_ready: Arc::new(AtomicBool::new(false)),
            stream_stopped: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::packed(self.config.width, self.config.height, self.config.rotation)
    }

    /// True while the frame task is running.
    pub fn is_streaming(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn frames(&self) -> Result<Vec<Vec<u16>>, DriverError> {
        let geometry = self.geometry();
        match &self.config.scene {
            Scene::Blank => Ok(vec![vec![GREY; geometry.min_len()]]),
            Scene::Payload(payload) => Ok(vec![render_payload(&geometry, payload)?]),
            Scene::Raw(path) => load_raw(path, &geometry),
        }
    }
}

impl CameraDevice for SyntheticCamera {
    fn is_available(&self) -> bool {
        self.config.width > 0 && self.config.height > 0 && self.config.fps > 0
    }

    fn supported_encodings(&self) -> Vec<FourCC> {
        vec![RGBP, NV21, AR24]
    }

    fn start(&mut self, size_hint: SizeHint, encoding: FourCC) -> Result<(), DriverError> {
        if encoding != RGBP {
            return Err(format!("synthetic camera cannot stream {encoding}").into());
        }
        let handle = Handle::try_current()?;
        let frames = self.frames()?;
        let geometry = self.geometry();
        debug!(
            "synthetic camera {} ({:?} hint), {} frame(s) at {} fps",
            geometry,
            size_hint,
            frames.len(),
            self.config.fps
        );

        if let Some(task) = self.task.take() {
            task.abort();
        }
        let tx = self.tx.clone();
        let frame_ready = self.frame_ready.clone();
        let stream_stopped = self.stream_stopped.clone();
        let period = Duration::from_secs(1) / self.config.fps;
        let stop_after = self.config.stop_after;

        self.task = Some(handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sent = 0u64;
            for data in frames.iter().cycle() {
                interval.tick().await;
                if stop_after.is_some_and(|limit| sent >= limit) {
                    info!("synthetic camera stream ended after {sent} frames");
                    if stream_stopped.load(Ordering::Acquire) {
                        let _ = tx.send(Event::StreamStopped).await;
                    }
                    return;
                }
                if !frame_ready.load(Ordering::Acquire) {
                    continue;
                }
                let frame = OwnedFrame {
                    geometry,
                    encoding: RGBP,
                    data: data.clone(),
                };
                if tx.send(Event::Frame(frame)).await.is_err() {
                    // event pump is gone
                    return;
                }
                sent += 1;
            }
        }));
        Ok(())
    }

    fn register(&mut self, event: CameraEvent) -> Result<(), DriverError> {
        match event {
            CameraEvent::FrameReady => self.frame_ready.store(true, Ordering::Release),
            CameraEvent::StreamStopped => self.stream_stopped.store(true, Ordering::Release),
        }
        Ok(())
    }

    fn unregister(&mut self, event: CameraEvent) {
        match event {
            CameraEvent::FrameReady => self.frame_ready.store(false, Ordering::Release),
            CameraEvent::StreamStopped => self.stream_stopped.store(false, Ordering::Release),
        }
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("synthetic camera stopped");
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Renders `payload` as a QR code filling the crop window of a frame with
/// `geometry`, rotated so that correcting `geometry.rotation` shows it
/// upright. Outside the window the frame is grey.
pub fn render_payload(geometry: &FrameGeometry, payload: &str) -> Result<Vec<u16>, DriverError> {
    let crop = CropWindow::from(geometry);
    let dim = crop.square_dim as usize;
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| format!("cannot encode {payload:?}: {e}"))?;
    let modules = code.width();
    let module_px = dim / (modules + 2 * QUIET_ZONE);
    if module_px == 0 {
        return Err(format!("{dim}x{dim} window too small for a {modules} module code").into());
    }

    let colors = code.to_colors();
    let offset = (dim - modules * module_px) / 2;
    let mut upright = vec![WHITE; crop.area()];
    for y in 0..modules * module_px {
        for x in 0..modules * module_px {
            if colors[(y / module_px) * modules + x / module_px] == Color::Dark {
                upright[(y + offset) * dim + x + offset] = BLACK;
            }
        }
    }

    let mut frame = vec![GREY; geometry.min_len()];
    place_rotated(&upright, geometry, &crop, &mut frame)?;
    Ok(frame)
}

/// Loads RGB565 little-endian frames for `geometry` from `path`.
pub fn load_raw(path: &Path, geometry: &FrameGeometry) -> Result<Vec<Vec<u16>>, DriverError> {
    let bytes = fs::read(path)?;
    let frame_bytes = geometry.min_len() * 2;
    if bytes.is_empty() || bytes.len() % frame_bytes != 0 {
        return Err(format!(
            "{} holds {} bytes, not a multiple of {} byte frames",
            path.display(),
            bytes.len(),
            frame_bytes
        )
        .into());
    }
    let frames: Vec<Vec<u16>> = bytes
        .chunks_exact(frame_bytes)
        .map(|frame| {
            frame
                .chunks_exact(2)
                .map(|px| u16::from_le_bytes([px[0], px[1]]))
                .collect()
        })
        .collect();
    if frames.len() > 1 {
        debug!("loaded {} raw frames from {}", frames.len(), path.display());
    } else {
        warn!("{} holds a single frame, replaying it", path.display());
    }
    Ok(frames)
}
