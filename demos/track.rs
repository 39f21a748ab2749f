//! Follow the right hand and print where a dragged marker would be drawn.
//!
//! Usage: cargo run --example track [seconds]
//! Close the right hand to grab, move it to drag, open it to let go.

use leapsense::{GrabTracker, Session, SessionConfig, SimulatedSensor, Viewport};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    let config = SessionConfig::from_env();
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
    if let Some(info) = session.device_info() {
        println!("Using device {}.", info.serial);
    }

    let viewport = Viewport::default();
    let mut tracker = GrabTracker::default();
    let start = Instant::now();
    let mut updates: u64 = 0;

    // ~30 redraws per second
    while start.elapsed() < Duration::from_secs(seconds) {
        if let Some(update) = session.latest_frame().and_then(|f| tracker.update(&f)) {
            updates += 1;
            if update.just_grabbed || updates % 30 == 0 {
                let placement = viewport.place(update.drag_position);
                println!(
                    "frame={:<8} {:<8} marker=({:+7.1}, {:+7.1})  slider_y={:+7.1}",
                    update.frame_id,
                    format!("{:?}", update.state),
                    placement.marker.0,
                    placement.marker.1,
                    placement.slider.1,
                );
            }
        }
        std::thread::sleep(Duration::from_millis(33));
    }

    session.close();
    println!("\n{} frames processed in {:.1}s", updates, start.elapsed().as_secs_f64());
}
