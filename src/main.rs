use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use x7_runtime::motor::DynamixelHardware;
use x7_runtime::sequencer::{HomeMotion, RunReport, Sequencer, ThreadSleeper};

/// Exit code for failures before the arm starts moving
const FATAL_EXIT_CODE: i32 = -1;

/// Move the CRANE-X7 to its home pose, open and close the hand, then relax
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port for servo communication
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Servo communication baudrate
    #[arg(short, long, default_value_t = 3_000_000)]
    baudrate: u32,

    /// Joint/group topology file
    #[arg(short, long, default_value = "config/crane-x7.toml")]
    config: PathBuf,
}

fn run(args: &Args) -> Result<RunReport> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, skipping to torque off...");
        stop_clone.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let motion = HomeMotion {
        port: args.port.clone(),
        baudrate: args.baudrate,
        config_file: args.config.clone(),
        ..HomeMotion::default()
    };

    let mut sequencer = Sequencer::new(DynamixelHardware::new(), ThreadSleeper::new(stop), motion);
    sequencer.run()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_target(false)
        .init();

    println!("=== CRANE-X7 Home Pose ===\n");

    let args = Args::parse();

    match run(&args) {
        Ok(report) if report.is_clean() => println!("✓ Home pose sequence complete"),
        Ok(report) => {
            if report.interrupted {
                println!("⚠ Motion was interrupted before completion");
            }
            for failure in &report.failures {
                eprintln!("  ✗ {}: {}", failure.step, failure.error);
            }
            println!("⚠ Sequence finished with {} failed step(s)", report.failures.len());
        }
        Err(e) => {
            eprintln!("✗ Sequence aborted: {:#}", e);
            std::process::exit(FATAL_EXIT_CODE);
        }
    }
}
