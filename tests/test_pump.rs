// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_qrscan::{
    camera::{Scene, SyntheticCamera, SyntheticCameraConfig},
    image::Rotation,
    pump::{self, DecodeAction, ReportObserver, TokioTimer},
    session::{CameraSession, Event, SessionConfig, SessionState},
};
use std::{error::Error, time::Duration};

type Session = CameraSession<SyntheticCamera, TokioTimer, ReportObserver>;

type Channel = (kanal::AsyncSender<Event>, kanal::AsyncReceiver<Event>);

fn session(camera: SyntheticCameraConfig, action: DecodeAction) -> (Session, Channel) {
    let (tx, rx) = kanal::unbounded_async();
    let config = SessionConfig {
        scan_interval: Duration::from_millis(20),
        ..SessionConfig::default()
    };
    let session = CameraSession::new(
        config,
        SyntheticCamera::new(camera, tx.clone()),
        TokioTimer::new(tx.clone()),
        ReportObserver::new(tx.clone(), action, false),
    );
    (session, (tx, rx))
}

#[tokio::test(flavor = "current_thread")]
async fn test_pump_decodes_payload() -> Result<(), Box<dyn Error>> {
    let camera = SyntheticCameraConfig {
        width: 320,
        height: 240,
        rotation: Rotation::Rotation90,
        fps: 50,
        scene: Scene::Payload("PUMP".to_string()),
        stop_after: None,
    };
    let (mut session, (tx, rx)) = session(camera, DecodeAction::Quit);

    tx.send(Event::Start).await?;
    tokio::time::timeout(Duration::from_secs(10), pump::run(&mut session, rx)).await?;

    assert_eq!(session.observer().decodes(), ["PUMP"]);
    assert!(session.observer().frames() >= 1);
    assert!(session.observer().error().is_none());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.camera().is_streaming());
    assert!(!session.timer().is_armed());
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn test_pump_stream_stopped() -> Result<(), Box<dyn Error>> {
    let camera = SyntheticCameraConfig {
        width: 64,
        height: 48,
        fps: 100,
        scene: Scene::Blank,
        stop_after: Some(3),
        ..SyntheticCameraConfig::default()
    };
    let (mut session, (tx, rx)) = session(camera, DecodeAction::Hold);

    tx.send(Event::Start).await?;
    tokio::time::timeout(Duration::from_secs(10), pump::run(&mut session, rx)).await?;

    assert_eq!(session.observer().frames(), 3);
    assert!(session.observer().decodes().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn test_pump_unavailable() -> Result<(), Box<dyn Error>> {
    let camera = SyntheticCameraConfig {
        width: 0,
        ..SyntheticCameraConfig::default()
    };
    let (mut session, (tx, rx)) = session(camera, DecodeAction::Hold);

    tx.send(Event::Start).await?;
    tokio::time::timeout(Duration::from_secs(10), pump::run(&mut session, rx)).await?;

    assert!(session.observer().error().is_some());
    assert_eq!(session.observer().frames(), 0);
    // leaving the pump stops the session
    assert_eq!(session.state(), SessionState::Idle);
    Ok(())
}
