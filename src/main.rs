// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use edgefirst_qrscan::{
    camera::{SyntheticCamera, SyntheticCameraConfig},
    pump::{self, ReportObserver, TokioTimer},
    session::{CameraSession, Event, SessionConfig},
};
use std::error::Error;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::try_parse_checked(std::env::args_os()).unwrap_or_else(|e| e.exit());

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let console = if args.tokio_console {
        Some(console_subscriber::spawn())
    } else {
        None
    };

    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(level);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(level)),
        Err(_) => None,
    };

    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(level))
    } else {
        None
    };

    let subscriber = Registry::default()
        .with(console)
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    let camera_config = SyntheticCameraConfig::from(&args);
    info!(
        "EdgeFirst QR scanner {}x{} {} at {} fps, scene {:?}",
        camera_config.width,
        camera_config.height,
        camera_config.rotation,
        camera_config.fps,
        camera_config.scene
    );

    let (tx, rx) = kanal::unbounded_async();
    let camera = SyntheticCamera::new(camera_config, tx.clone());
    let timer = TokioTimer::new(tx.clone());
    let observer = ReportObserver::new(tx.clone(), args.decode_action(), args.json);
    let mut session = CameraSession::new(SessionConfig::from(&args), camera, timer, observer);
    info!(
        "scanning every {:?}, {:?} size hint",
        session.config().scan_interval,
        session.config().size_hint
    );

    let interrupt = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {e}");
            return;
        }
        info!("interrupted");
        let _ = interrupt.send(Event::Quit).await;
    });

    tx.send(Event::Start).await?;
    pump::run(&mut session, rx).await;

    let observer = session.observer();
    info!(
        "{} frames shown, {} codes decoded",
        observer.frames(),
        observer.decodes().len()
    );
    match observer.error() {
        Some(e) => Err(e.to_string().into()),
        None => Ok(()),
    }
}
