//! Connect to the sensor and print what it reports about itself.

use leapsense::{Session, SessionConfig, SimulatedSensor};
use std::time::Instant;

fn main() {
    env_logger::init();

    let config = SessionConfig::from_env();
    let session = match Session::open(SimulatedSensor::default(), config.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open session: {}", e);
            std::process::exit(1);
        }
    };

    // Poll instead of blocking, giving up after the configured timeout.
    let start = Instant::now();
    while !session.is_connected() {
        if start.elapsed() >= config.connect_timeout {
            eprintln!("Device did not connect within {:?}", config.connect_timeout);
            std::process::exit(1);
        }
        std::thread::sleep(config.poll_interval);
    }
    println!("Connected.");

    // Device discovery can trail the handshake slightly.
    while session.device_info().is_none() && start.elapsed() < config.connect_timeout {
        std::thread::sleep(config.poll_interval);
    }

    match session.device_info() {
        Some(info) => {
            println!("Serial:       {}", info.serial);
            println!("Capabilities: {:?}", info.capabilities);
            println!("FOV:          {:.2} x {:.2} rad", info.h_fov, info.v_fov);
            println!("Range:        {} um", info.range);
        }
        None => println!("No device reported yet"),
    }
}
