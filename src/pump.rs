// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Event pump driving a [`CameraSession`] on a tokio runtime.
//!
//! Camera frames, scan timer ticks and control requests are all sent as
//! [`Event`]s into one `kanal` channel and dispatched serially by [`run`],
//! so the session only ever runs on the pump task.

use crate::{
    error::Error,
    scan::Symbology,
    session::{CameraDevice, CameraSession, Event, ScanTimer, SessionObserver, SessionState},
};
use kanal::{AsyncReceiver, AsyncSender};
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, trace, warn};

/// [`ScanTimer`] delivering [`Event::ScanTick`] through the pump channel.
pub struct TokioTimer {
    tx: AsyncSender<Event>,
    pending: Option<JoinHandle<()>>,
}

impl TokioTimer {
    pub fn new(tx: AsyncSender<Event>) -> Self {
        Self { tx, pending: None }
    }

    /// True while an arming has not fired or been cancelled.
    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl ScanTimer for TokioTimer {
    fn arm(&mut self, after: Duration) {
        self.cancel();
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("scan timer not armed: {e}");
                return;
            }
        };
        let tx = self.tx.clone();
        self.pending = Some(handle.spawn(async move {
            tokio::time::sleep(after).await;
            if tx.send(Event::ScanTick).await.is_err() {
                trace!("scan tick dropped, pump is gone");
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// What the reporting observer does after a decode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DecodeAction {
    /// Keep the frozen preview until someone requests a rescan
    #[default]
    Hold,
    /// Request a rescan right away
    Rescan,
    /// Stop the session and leave the pump
    Quit,
}

/// Observer for the command line scanner.
///
/// Prints each decoded payload, as a JSON line when `json` is set, and
/// leaves the pump once the session goes idle or unavailable.
pub struct ReportObserver {
    tx: AsyncSender<Event>,
    action: DecodeAction,
    json: bool,
    frames: u64,
    decodes: Vec<String>,
    error: Option<String>,
}

impl ReportObserver {
    pub fn new(tx: AsyncSender<Event>, action: DecodeAction, json: bool) -> Self {
        Self {
            tx,
            action,
            json,
            frames: 0,
            decodes: Vec::new(),
            error: None,
        }
    }

    /// Display buffer updates seen so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Every payload decoded so far, in order.
    pub fn decodes(&self) -> &[String] {
        &self.decodes
    }

    /// Last fatal session error.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn send(&self, event: Event) {
        match self.tx.try_send(event) {
            Ok(true) => {}
            Ok(false) => warn!("event pump is full"),
            Err(e) => debug!("event pump closed: {e}"),
        }
    }
}

impl SessionObserver for ReportObserver {
    fn on_display_buffer_changed(&mut self, _buffer: &[u16], square_dim: u32) {
        self.frames += 1;
        trace!("display buffer {square_dim}x{square_dim} #{}", self.frames);
    }

    fn on_state_changed(&mut self, state: SessionState) {
        match state {
            SessionState::Idle | SessionState::Unavailable => self.send(Event::Quit),
            SessionState::Loading | SessionState::Streaming => {}
        }
    }

    fn on_qr_decoded(&mut self, text: &str) {
        if self.json {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            let line = json!({
                "symbology": Symbology::QrCode.to_string(),
                "text": text,
                "sequence": self.decodes.len() + 1,
                "timestamp": timestamp,
            });
            println!("{line}");
        } else {
            println!("{text}");
        }
        self.decodes.push(text.to_string());

        match self.action {
            DecodeAction::Hold => {}
            DecodeAction::Rescan => self.send(Event::Rescan),
            DecodeAction::Quit => self.send(Event::Quit),
        }
    }

    fn on_error(&mut self, error: &Error) {
        self.error = Some(error.to_string());
    }
}

/// Dispatches events from `rx` into `session` until [`Event::Quit`] or the
/// channel closes, then stops the session.
///
/// Handler errors are logged and do not end the pump; fatal ones have
/// already moved the session to `Unavailable` and reached its observer.
pub async fn run<C, T, O>(session: &mut CameraSession<C, T, O>, rx: AsyncReceiver<Event>)
where
    C: CameraDevice,
    T: ScanTimer,
    O: SessionObserver,
{
    let mut dispatched = 0u64;
    while let Ok(event) = rx.recv().await {
        let quit = matches!(event, Event::Quit);
        if let Err(e) = session.dispatch(event) {
            if e.is_fatal() {
                debug!("session failed: {e}");
            } else {
                trace!("event skipped: {e}");
            }
        }
        dispatched += 1;
        if quit {
            break;
        }
    }
    session.stop();
    info!("event pump finished after {dispatched} events");
}
