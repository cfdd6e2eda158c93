//! Example: Open a sensor and poll its data.
//!
//! Run with: `cargo run --example get_sensor_data -- <bitfile>`
//!
//! Without a bitfile, a CeleX5 is driven over an in-memory transport and the
//! register traffic is printed instead.

use celex_sdk::{
    Celex4Controller, Celex4Mode, Celex5Controller, Celex5Mode, ControllerError, FrontPanel,
    MockTransport, SensorController, SequenceManager,
};
use std::env;

const POLL_COUNT: usize = 100;

fn main() -> Result<(), ControllerError> {
    // Initialize logging (optional)
    env_logger::init();

    match env::args().nth(1) {
        Some(bitfile) => celex4(&bitfile),
        None => celex5_dry_run(),
    }
}

fn celex4(bitfile: &str) -> Result<(), ControllerError> {
    let manager = match env::args().nth(2) {
        Some(path) => SequenceManager::from_file(path)?,
        None => SequenceManager::celex4_builtin()?,
    };
    let mut sensor = Celex4Controller::new(FrontPanel::new(bitfile)?, manager);

    println!("Opening sensor...");
    sensor.open_sensor()?;
    sensor.set_sensor_mode(Celex4Mode::Event)?;

    let mut buf = vec![0u8; 128 * 1024];
    let mut total = 0;
    for _ in 0..POLL_COUNT {
        if sensor.is_sdram_full() {
            eprintln!("FPGA buffer overflowed, data was lost");
        }
        match sensor.read_data_from_fpga(&mut buf) {
            Ok(n) => total += n,
            Err(e) => eprintln!("Read failed: {}", e),
        }
    }
    println!("Read {} bytes in {} polls", total, POLL_COUNT);

    sensor.close_sensor();
    Ok(())
}

fn celex5_dry_run() -> Result<(), ControllerError> {
    let mut sensor = Celex5Controller::new(MockTransport::new(), SequenceManager::celex5_builtin()?);

    sensor.open_sensor()?;
    println!("Configured with {} register writes", sensor.transport().writes().len());

    sensor.transport_mut().clear_history();
    sensor.set_sensor_fixed_mode(Celex5Mode::FullPicture)?;
    sensor.set_clock_rate(70)?;
    sensor.set_threshold(171)?;

    for write in sensor.transport().writes() {
        println!("  [{:3}] <- {:#04x}", write.address, write.value);
    }

    let state = sensor.get_state();
    println!(
        "State: mode={}, clock={} MHz, threshold={}",
        state.fixed_mode, state.clock_rate, state.threshold
    );
    Ok(())
}
