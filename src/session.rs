// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Camera session state machine.
//!
//! [`CameraSession`] is the single owner of every mutable resource of the
//! scanning pipeline: camera registrations, frame buffers, the recognition
//! image and the scan engine. Frame notifications, scan timer ticks and
//! caller requests all arrive as calls (or [`Event`] messages) on the one
//! session object, serialized by the caller's event pump, so no locking is
//! involved.

use crate::{
    buffers::FrameBufferManager,
    error::{Error, Result},
    image::{FourCC, FrameGeometry, RGBP},
    scan::{rqrr_factory, DecoderFactory, ScanEngine},
};
use core::fmt;
use std::{error::Error as StdError, time::Duration};
use tracing::{debug, error, info, trace, warn};

/// Error type reported by camera driver implementations.
pub type DriverError = Box<dyn StdError + Send + Sync>;

/// Lifecycle state of a [`CameraSession`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Camera stopped or not yet started
    #[default]
    Idle,
    /// Stream started, waiting for the first frame
    Loading,
    /// Frames are being received
    Streaming,
    /// No camera, camera in use, unsupported format or camera error
    Unavailable,
}

impl SessionState {
    /// True while the camera stream is up.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Loading | SessionState::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Streaming => "streaming",
            SessionState::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// Driver notification sources the session registers for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CameraEvent {
    FrameReady,
    StreamStopped,
}

/// Streaming resolution hint passed to the driver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SizeHint {
    Small,
    #[default]
    Medium,
    Large,
}

/// Camera frame borrowed from the driver for the duration of one
/// notification.
#[derive(Copy, Clone, Debug)]
pub struct Frame<'a> {
    pub geometry: FrameGeometry,
    pub encoding: FourCC,
    pub data: &'a [u16],
}

/// Owned copy of a frame, used where frames cross the event channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedFrame {
    pub geometry: FrameGeometry,
    pub encoding: FourCC,
    pub data: Vec<u16>,
}

impl OwnedFrame {
    pub fn as_frame(&self) -> Frame<'_> {
        Frame {
            geometry: self.geometry,
            encoding: self.encoding,
            data: &self.data,
        }
    }
}

/// Messages dispatched into a session by the event pump.
#[derive(Clone, Debug)]
pub enum Event {
    Frame(OwnedFrame),
    StreamStopped,
    ScanTick,
    Start,
    Stop,
    Rescan,
    /// Stop the session and leave the event pump.
    Quit,
}

/// Camera driver consumed by the session.
pub trait CameraDevice {
    fn is_available(&self) -> bool;

    /// Encodings the device can deliver, for diagnostics.
    fn supported_encodings(&self) -> Vec<FourCC> {
        Vec::new()
    }

    fn start(&mut self, size_hint: SizeHint, encoding: FourCC) -> Result<(), DriverError>;

    fn register(&mut self, event: CameraEvent) -> Result<(), DriverError>;

    fn unregister(&mut self, event: CameraEvent);

    fn stop(&mut self);
}

/// One-shot timer that delivers [`Event::ScanTick`].
pub trait ScanTimer {
    /// Fire once after `after`, replacing any pending arming.
    fn arm(&mut self, after: Duration);

    /// Drop any pending arming.
    fn cancel(&mut self);
}

/// Presentation adapter notified inline from the session.
pub trait SessionObserver {
    fn on_display_buffer_changed(&mut self, _buffer: &[u16], _square_dim: u32) {}

    fn on_state_changed(&mut self, _state: SessionState) {}

    fn on_qr_decoded(&mut self, _text: &str) {}

    fn on_error(&mut self, _error: &Error) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// Session settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between scan passes
    pub scan_interval: Duration,
    pub size_hint: SizeHint,
    /// Encoding requested from and required of the driver
    pub encoding: FourCC,
    /// Cap on combined display and luma buffer bytes
    pub buffer_limit: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(1000),
            size_hint: SizeHint::Medium,
            encoding: RGBP,
            buffer_limit: None,
        }
    }
}

#[derive(Debug, Default)]
struct Registrations {
    frame: bool,
    stopped: bool,
}

/// Frame-processing and scan state machine.
pub struct CameraSession<C, T, O>
where
    C: CameraDevice,
    T: ScanTimer,
    O: SessionObserver,
{
    config: SessionConfig,
    state: SessionState,
    camera: C,
    timer: T,
    observer: O,
    factory: DecoderFactory,
    engine: Option<ScanEngine>,
    buffers: FrameBufferManager,
    registered: Registrations,
    streaming: bool,
    detected: bool,
    decoded: Option<String>,
}

impl<C, T, O> CameraSession<C, T, O>
where
    C: CameraDevice,
    T: ScanTimer,
    O: SessionObserver,
{
    /// Creates an idle session using the `rqrr` decoder.
    pub fn new(config: SessionConfig, camera: C, timer: T, observer: O) -> Self {
        Self::with_decoder(config, camera, timer, observer, rqrr_factory())
    }

    /// Creates an idle session whose scan engine is built by `factory`.
    pub fn with_decoder(
        config: SessionConfig,
        camera: C,
        timer: T,
        observer: O,
        factory: DecoderFactory,
    ) -> Self {
        let buffers = FrameBufferManager::new(config.buffer_limit);
        Self {
            config,
            state: SessionState::Idle,
            camera,
            timer,
            observer,
            factory,
            engine: None,
            buffers,
            registered: Registrations::default(),
            streaming: false,
            detected: false,
            decoded: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// True once a code was decoded and until [`Self::request_rescan`].
    pub fn is_detected(&self) -> bool {
        self.detected
    }

    /// Text of the code that set the detection flag.
    pub fn decoded(&self) -> Option<&str> {
        self.decoded.as_deref()
    }

    pub fn buffers(&self) -> &FrameBufferManager {
        &self.buffers
    }

    pub fn engine(&self) -> Option<&ScanEngine> {
        self.engine.as_ref()
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Routes one pump message to its handler.
    pub fn dispatch(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Frame(frame) => self.on_frame(&frame.as_frame()),
            Event::StreamStopped => {
                self.on_stream_stopped();
                Ok(())
            }
            Event::ScanTick => self.on_scan_tick(),
            Event::Start => self.start(),
            Event::Stop | Event::Quit => {
                self.stop();
                Ok(())
            }
            Event::Rescan => {
                self.request_rescan();
                Ok(())
            }
        }
    }

    /// Starts the camera stream and the recognition engine.
    ///
    /// A no-op while the stream is already up. Any failure rolls back what
    /// was set up so far and leaves the session `Unavailable`.
    pub fn start(&mut self) -> Result<()> {
        if self.state.is_active() {
            debug!("start ignored, session is {}", self.state);
            return Ok(());
        }

        if !self.camera.is_available() {
            return self.fail(Error::DeviceUnavailable(
                "camera not available".to_string(),
            ));
        }
        info!("camera available");
        for encoding in self.camera.supported_encodings() {
            debug!("camera supports pixel encoding {encoding}");
        }

        if let Err(e) = self
            .camera
            .start(self.config.size_hint, self.config.encoding)
        {
            return self.fail(Error::DeviceUnavailable(e.to_string()));
        }
        self.streaming = true;
        info!(
            "camera stream started ({:?}, {})",
            self.config.size_hint, self.config.encoding
        );

        match self.camera.register(CameraEvent::FrameReady) {
            Ok(()) => self.registered.frame = true,
            Err(e) => {
                return self.fail(Error::RegistrationFailure(
                    CameraEvent::FrameReady,
                    e.to_string(),
                ))
            }
        }
        match self.camera.register(CameraEvent::StreamStopped) {
            Ok(()) => self.registered.stopped = true,
            Err(e) => {
                return self.fail(Error::RegistrationFailure(
                    CameraEvent::StreamStopped,
                    e.to_string(),
                ))
            }
        }

        match ScanEngine::create(&mut self.factory) {
            Ok(engine) => {
                info!("scan engine ready ({} decoder)", engine.decoder_name());
                self.engine = Some(engine);
            }
            Err(e) => return self.fail(e),
        }

        self.set_state(SessionState::Loading);
        Ok(())
    }

    /// Stops the session. Idempotent.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.teardown();
        self.set_state(SessionState::Idle);
    }

    /// Handles the driver's stream-stopped notification.
    pub fn on_stream_stopped(&mut self) {
        if !self.state.is_active() {
            trace!("late stream-stopped notification ignored");
            return;
        }
        warn!("camera stream stopped by the driver");
        self.teardown();
        self.set_state(SessionState::Idle);
    }

    /// Clears the detection flag, resuming preview updates and scanning.
    pub fn request_rescan(&mut self) {
        if self.detected {
            info!("rescan requested");
        }
        self.detected = false;
        self.decoded = None;
    }

    /// Handles one frame-ready notification.
    ///
    /// The first frame after start moves the session to `Streaming` and arms
    /// the scan timer. A geometry change rebuilds the buffers and rebinds
    /// the recognition image before anything is written to them. The frame
    /// is copied into the display buffer unless a code was detected.
    pub fn on_frame(&mut self, frame: &Frame<'_>) -> Result<()> {
        if !self.state.is_active() {
            trace!("frame ignored, session is {}", self.state);
            return Ok(());
        }

        if frame.encoding != self.config.encoding {
            return self.fail(Error::UnsupportedPixelEncoding(frame.encoding));
        }

        if self.state == SessionState::Loading {
            self.set_state(SessionState::Streaming);
            self.timer.arm(self.config.scan_interval);
        }

        if let Err(e) = frame.geometry.validate(frame.data.len()) {
            warn!("frame dropped: {e}");
            return Err(e);
        }

        if let Err(e) = self.buffers.reconfigure(&frame.geometry) {
            return self.fail(e);
        }

        if self.detected {
            return Ok(());
        }

        let display = self.buffers.copy_frame(frame.data)?;
        self.observer
            .on_display_buffer_changed(display.pixels(), display.square_dim());
        Ok(())
    }

    /// Handles one scan timer tick.
    ///
    /// Scans the current display buffer unless a code was already detected,
    /// reports the first QR code of the pass and re-arms the timer while the
    /// session is active.
    pub fn on_scan_tick(&mut self) -> Result<()> {
        if !self.state.is_active() {
            trace!("scan tick ignored, session is {}", self.state);
            return Ok(());
        }

        let outcome = self.scan_pass();
        if self.state.is_active() {
            self.timer.arm(self.config.scan_interval);
        }
        match outcome {
            Err(e) if !e.is_fatal() => {
                warn!("scan pass skipped: {e}");
                Ok(())
            }
            other => other,
        }
    }

    fn scan_pass(&mut self) -> Result<()> {
        if self.detected || self.state != SessionState::Streaming {
            return Ok(());
        }
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        let Some((image, luma)) = self.buffers.refresh_luma() else {
            return Ok(());
        };

        let results = engine.scan(image, luma)?;
        if let Some(first) = results.first() {
            let text = first.text();
            info!("QR code found: {text}");
            self.detected = true;
            self.observer.on_qr_decoded(&text);
            self.decoded = Some(text);
        }
        Ok(())
    }

    /// Tears down and lands in `Unavailable`, reporting `err`.
    fn fail(&mut self, err: Error) -> Result<()> {
        error!("{err}");
        self.teardown();
        self.set_state(SessionState::Unavailable);
        self.observer.on_error(&err);
        Err(err)
    }

    /// Releases registrations, the stream, the timer, buffers and engine.
    fn teardown(&mut self) {
        if self.registered.frame {
            self.camera.unregister(CameraEvent::FrameReady);
            self.registered.frame = false;
        }
        if self.registered.stopped {
            self.camera.unregister(CameraEvent::StreamStopped);
            self.registered.stopped = false;
        }
        if self.streaming {
            self.camera.stop();
            self.streaming = false;
            info!("camera stream stopped");
        }
        self.timer.cancel();
        self.buffers.release();
        self.engine = None;
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        info!("camera session {} -> {}", self.state, state);
        self.state = state;
        self.observer.on_state_changed(state);
    }
}

impl<C, T, O> Drop for CameraSession<C, T, O>
where
    C: CameraDevice,
    T: ScanTimer,
    O: SessionObserver,
{
    fn drop(&mut self) {
        // registrations must not outlive the session
        if self.state.is_active() {
            debug!("camera session dropped while {}", self.state);
            self.teardown();
        }
    }
}
