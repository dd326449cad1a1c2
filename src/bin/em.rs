use anyhow::{Context, Result};
use log::{error, info};
use std::time::Duration;
use x7_runtime::hardware::Hardware;
use x7_runtime::motor::DynamixelHardware;
use x7_runtime::sequencer::HomeMotion;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let motion = HomeMotion::default();
    let mut hardware = DynamixelHardware::new();

    hardware
        .connect(&motion.port, motion.baudrate)
        .context("Failed to connect to robot")?;

    if let Err(e) = hardware.load_config_file(&motion.config_file) {
        hardware.disconnect();
        return Err(e).context("Failed to load config file");
    }

    for group in [&motion.arm_group, &motion.hand_group] {
        match hardware.torque_off(group) {
            Ok(()) => info!("✓ Torque disabled on {}", group),
            Err(e) => error!("Failed to disable torque on {}: {}", group, e),
        }
    }

    std::thread::sleep(Duration::from_millis(100));
    hardware.disconnect();

    Ok(())
}
