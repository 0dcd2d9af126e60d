// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{error::ErrorKind, CommandFactory, Parser};
use edgefirst_qrscan::{
    camera::{Scene, SyntheticCameraConfig},
    image::{Rotation, RGBP},
    pump::DecodeAction,
    session::{SessionConfig, SizeHint},
};
use std::{ffi::OsString, path::PathBuf, time::Duration};

/// Streaming resolution hint passed to the camera driver.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum SizeHintSetting {
    Small,
    Medium,
    Large,
}

impl From<SizeHintSetting> for SizeHint {
    fn from(setting: SizeHintSetting) -> Self {
        match setting {
            SizeHintSetting::Small => SizeHint::Small,
            SizeHintSetting::Medium => SizeHint::Medium,
            SizeHintSetting::Large => SizeHint::Large,
        }
    }
}

/// Command-line arguments for the EdgeFirst QR scanner.
///
/// Frames come from a synthetic camera that either renders a QR code for
/// `--payload` or replays raw RGB565 frames from `--raw`. Arguments can be
/// given on the command line or through environment variables.
///
/// # Example
///
/// ```bash
/// edgefirst-qrscan --payload "HELLO" --rotation 90 --once
///
/// export CAMERA_SIZE="1280 720"
/// export SCAN_INTERVAL=250
/// edgefirst-qrscan --raw capture.rgb565 --continuous --json
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera frame size in pixels (width height)
    #[arg(
        long,
        env = "CAMERA_SIZE",
        default_value = "640 480",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub camera_size: Vec<u32>,

    /// Sensor rotation in degrees (0, 90, 180 or 270)
    #[arg(long, env = "ROTATION", default_value = "0", value_parser = parse_rotation)]
    pub rotation: Rotation,

    /// Camera frame rate
    #[arg(long, env = "FPS", default_value = "30", value_parser = clap::value_parser!(u32).range(1..))]
    pub fps: u32,

    /// Text rendered as a QR code in front of the camera
    #[arg(long, env = "PAYLOAD", conflicts_with = "raw")]
    pub payload: Option<String>,

    /// Raw RGB565 little-endian frames to replay in a loop
    #[arg(long, env = "RAW")]
    pub raw: Option<PathBuf>,

    /// End the camera stream after this many frames
    #[arg(long, env = "STOP_AFTER")]
    pub stop_after: Option<u64>,

    /// Milliseconds between scan passes
    #[arg(long, env = "SCAN_INTERVAL", default_value = "1000")]
    pub scan_interval: u64,

    /// Streaming resolution hint
    #[arg(long, env = "SIZE_HINT", default_value = "medium", value_enum)]
    pub size_hint: SizeHintSetting,

    /// Limit on combined display and luma buffer bytes
    #[arg(long, env = "BUFFER_LIMIT")]
    pub buffer_limit: Option<usize>,

    /// Resume scanning after every decode
    #[arg(long, env = "CONTINUOUS", conflicts_with = "once")]
    pub continuous: bool,

    /// Exit after the first decode
    #[arg(long, env = "ONCE")]
    pub once: bool,

    /// Print decodes as JSON lines
    #[arg(long, env = "JSON")]
    pub json: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

fn parse_rotation(value: &str) -> Result<Rotation, String> {
    let degrees: u32 = value
        .trim_end_matches('°')
        .parse()
        .map_err(|e| format!("{value}: {e}"))?;
    Rotation::from_degrees(degrees).ok_or_else(|| format!("{degrees} is not 0, 90, 180 or 270"))
}

impl Args {
    /// Parses `args` like [`Parser::try_parse_from`], then checks what clap
    /// cannot enforce for environment values, such as a `CAMERA_SIZE`
    /// holding both dimensions.
    pub fn try_parse_checked<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = Self::try_parse_from(args)?;
        if args.camera_size.len() != 2 {
            return Err(Self::command().error(
                ErrorKind::WrongNumberOfValues,
                format!(
                    "camera size needs width and height, got {:?}",
                    args.camera_size
                ),
            ));
        }
        Ok(args)
    }

    /// Camera frame size as width and height, zero when incomplete.
    pub fn frame_size(&self) -> (u32, u32) {
        match self.camera_size[..] {
            [width, height] => (width, height),
            _ => (0, 0),
        }
    }

    pub fn decode_action(&self) -> DecodeAction {
        if self.once {
            DecodeAction::Quit
        } else if self.continuous {
            DecodeAction::Rescan
        } else {
            DecodeAction::Hold
        }
    }
}

impl From<&Args> for SessionConfig {
    fn from(args: &Args) -> Self {
        SessionConfig {
            scan_interval: Duration::from_millis(args.scan_interval),
            size_hint: args.size_hint.into(),
            encoding: RGBP,
            buffer_limit: args.buffer_limit,
        }
    }
}

impl From<&Args> for SyntheticCameraConfig {
    fn from(args: &Args) -> Self {
        let scene = match (&args.payload, &args.raw) {
            (Some(payload), _) => Scene::Payload(payload.clone()),
            (None, Some(path)) => Scene::Raw(path.clone()),
            (None, None) => Scene::Blank,
        };
        let (width, height) = args.frame_size();
        SyntheticCameraConfig {
            width,
            height,
            rotation: args.rotation,
            fps: args.fps,
            scene,
            stop_after: args.stop_after,
        }
    }
}
