//! Capture device discovery
//!
//! Resolves which AVFoundation device indices the encoders should grab,
//! by parsing ffmpeg's device listing. Runs once at startup; recording
//! never begins without a resolved pair.

use super::CaptureError;
use tokio::process::Command;

/// Resolved capture devices, as ffmpeg input indices
#[derive(Debug, Clone)]
pub struct DevicePair {
    /// Webcam video device
    pub webcam: String,
    /// Screen capture device
    pub screen: String,
}

/// One entry from the video-device section of the listing
#[derive(Debug, Clone, PartialEq, Eq)]
struct VideoDevice {
    index: u32,
    name: String,
}

/// Probe ffmpeg for capture devices and resolve the webcam/screen pair
///
/// The listing is printed to stderr and ffmpeg exits non-zero because no
/// input was given; the exit status carries no signal here.
pub async fn discover() -> Result<DevicePair, CaptureError> {
    let output = Command::new("ffmpeg")
        .args(["-f", "avfoundation", "-list_devices", "true", "-i", ""])
        .output()
        .await
        .map_err(|e| CaptureError::Discovery(format!("failed to run ffmpeg: {e}")))?;

    let listing = String::from_utf8_lossy(&output.stderr);
    let devices = parse_device_listing(&listing);
    for device in &devices {
        tracing::debug!("video device [{}] {}", device.index, device.name);
    }

    let pair = resolve_pair(&devices).ok_or_else(|| {
        CaptureError::Discovery("no AVFoundation video devices found".to_string())
    })?;
    tracing::info!(
        "resolved capture devices: webcam={}, screen={}",
        pair.webcam,
        pair.screen
    );
    Ok(pair)
}

/// Extract the video devices from a captured ffmpeg device listing
fn parse_device_listing(listing: &str) -> Vec<VideoDevice> {
    let mut devices = Vec::new();
    let mut in_video_section = false;

    for line in listing.lines() {
        if line.contains("AVFoundation video devices") {
            in_video_section = true;
            continue;
        }
        if line.contains("AVFoundation audio devices") {
            in_video_section = false;
            continue;
        }
        if !in_video_section {
            continue;
        }

        // Device lines look like:
        // [AVFoundation indev @ 0x...] [0] FaceTime HD Camera
        let Some(rest) = line.find(']').map(|at| line[at + 1..].trim_start()) else {
            continue;
        };
        let Some(bracketed) = rest.strip_prefix('[') else {
            continue;
        };
        let Some(close) = bracketed.find(']') else {
            continue;
        };
        let Ok(index) = bracketed[..close].parse::<u32>() else {
            continue;
        };
        let name = bracketed[close + 1..].trim().to_string();
        if name.is_empty() {
            continue;
        }
        devices.push(VideoDevice { index, name });
    }

    devices
}

/// Pick webcam and screen devices by name, with positional fallbacks
fn resolve_pair(devices: &[VideoDevice]) -> Option<DevicePair> {
    if devices.is_empty() {
        return None;
    }

    let mut webcam = None;
    let mut screen = None;
    for device in devices {
        let name = device.name.to_lowercase();
        if webcam.is_none() && (name.contains("facetime") || name.contains("camera")) {
            webcam = Some(device.index);
        } else if screen.is_none() && (name.contains("screen") || name.contains("display")) {
            screen = Some(device.index);
        }
    }

    Some(DevicePair {
        webcam: webcam.unwrap_or(0).to_string(),
        screen: screen.unwrap_or(1).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
ffmpeg version 6.0 Copyright (c) 2000-2023 the FFmpeg developers
[AVFoundation indev @ 0x7f8e4b904840] AVFoundation video devices:
[AVFoundation indev @ 0x7f8e4b904840] [0] FaceTime HD Camera
[AVFoundation indev @ 0x7f8e4b904840] [1] Capture screen 0
[AVFoundation indev @ 0x7f8e4b904840] AVFoundation audio devices:
[AVFoundation indev @ 0x7f8e4b904840] [0] MacBook Pro Microphone
: Input/output error";

    #[test]
    fn test_parses_only_the_video_section() {
        let devices = parse_device_listing(LISTING);
        assert_eq!(
            devices,
            vec![
                VideoDevice {
                    index: 0,
                    name: "FaceTime HD Camera".to_string()
                },
                VideoDevice {
                    index: 1,
                    name: "Capture screen 0".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_resolves_devices_by_name() {
        let devices = parse_device_listing(LISTING);
        let pair = resolve_pair(&devices).unwrap();
        assert_eq!(pair.webcam, "0");
        assert_eq!(pair.screen, "1");
    }

    #[test]
    fn test_name_match_beats_listing_order() {
        let devices = vec![
            VideoDevice {
                index: 0,
                name: "Capture screen 0".to_string(),
            },
            VideoDevice {
                index: 3,
                name: "External USB Camera".to_string(),
            },
        ];
        let pair = resolve_pair(&devices).unwrap();
        assert_eq!(pair.webcam, "3");
        assert_eq!(pair.screen, "0");
    }

    #[test]
    fn test_unrecognized_names_fall_back_to_defaults() {
        let devices = vec![
            VideoDevice {
                index: 0,
                name: "Mystery Input A".to_string(),
            },
            VideoDevice {
                index: 1,
                name: "Mystery Input B".to_string(),
            },
        ];
        let pair = resolve_pair(&devices).unwrap();
        assert_eq!(pair.webcam, "0");
        assert_eq!(pair.screen, "1");
    }

    #[test]
    fn test_no_video_devices_is_unresolvable() {
        assert!(resolve_pair(&[]).is_none());
        assert!(parse_device_listing("garbage with no sections").is_empty());
    }
}
