//! Grab one stereo pair, undistort both images and write them as PGM files.
//!
//! Usage: cargo run --example undistort [output_dir]

use leapsense::{
    rectify_stereo, LeapError, Notification, PolicyFlags, RectifyParams, Session, SessionConfig,
    SimulatedSensor,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| ".".into()));

    let config = SessionConfig {
        policy: PolicyFlags::IMAGES | PolicyFlags::MAP_POINTS,
        ..SessionConfig::from_env()
    };
    let session = match Session::open(SimulatedSensor::default(), config.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open session: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = session.wait_connected(config.connect_timeout) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let projection = match session.projection() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let params = RectifyParams::default();
    let deadline = Instant::now() + Duration::from_secs(5);

    while Instant::now() < deadline {
        match session.recv_timeout(Duration::from_millis(500)) {
            Ok(Notification::Images(event)) => {
                println!(
                    "Image {} => Left: {} x {} (bpp={}), Right: {} x {} (bpp={})",
                    event.frame_id,
                    event.left.properties.width,
                    event.left.properties.height,
                    event.left.properties.bpp * 8,
                    event.right.properties.width,
                    event.right.properties.height,
                    event.right.properties.bpp * 8,
                );
                let (left, right) = match rectify_stereo(&event, projection.as_ref(), &params) {
                    Ok(pair) => pair,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        continue;
                    }
                };
                for (name, image) in [("left", &left), ("right", &right)] {
                    let path = out_dir.join(format!("{}_undistorted.pgm", name));
                    match std::fs::write(&path, image.to_pgm()) {
                        Ok(()) => println!("Wrote {}", path.display()),
                        Err(e) => eprintln!("Failed to write {}: {}", path.display(), e),
                    }
                }
                return;
            }
            Ok(Notification::PointMappingChanged(_)) => match session.point_mapping() {
                Ok(Some(mapping)) => println!(
                    "Managing {} points as of frame {} at {}",
                    mapping.len(),
                    mapping.frame_id,
                    mapping.timestamp_us
                ),
                Ok(None) => {}
                Err(e) => eprintln!("Point mapping unavailable: {}", e),
            },
            Ok(Notification::Log(msg)) => {
                println!("[{}][{}] {}", msg.severity.as_str(), msg.timestamp_us, msg.message)
            }
            Ok(Notification::HeadPose(_)) | Err(LeapError::Timeout) => {}
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    eprintln!("No image arrived within 5s");
    std::process::exit(1);
}
