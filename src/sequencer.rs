use crate::hardware::{Hardware, HardwareError, JointRef, PidGain};
use anyhow::{Context, Result};
use log::{error, info, warn};
use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Blocking wait used to give the servos time to finish a move.
pub trait Sleeper {
    /// Wait for `duration`. Returns `false` if the wait was cut short.
    fn sleep(&mut self, duration: Duration) -> bool;

    /// Wait the full `duration`, regardless of any stop request.
    fn settle(&mut self, duration: Duration);
}

/// Thread sleeper that wakes early once `stop` is raised.
pub struct ThreadSleeper {
    stop: Arc<AtomicBool>,
    slice: Duration,
}

impl ThreadSleeper {
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            stop,
            slice: Duration::from_millis(50),
        }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(self.slice.min(deadline - now));
        }
    }

    fn settle(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Connection settings and every constant of the home-pose choreography.
#[derive(Debug, Clone)]
pub struct HomeMotion {
    pub port: String,
    pub baudrate: u32,
    pub config_file: PathBuf,
    pub arm_group: String,
    pub hand_group: String,
    pub hand_joint: String,
    /// Servo id that gets its gain written individually
    pub gain_joint_id: u8,
    /// Max acceleration (rad/s^2) and velocity (rad/s) for both groups
    pub max_acceleration: f64,
    pub max_velocity: f64,
    pub home_pose: Vec<f64>,
    pub hand_target: f64,
    pub safety_delay: Duration,
    pub motion_wait: Duration,
    pub hand_wait: Duration,
    pub relax_wait: Duration,
    pub restore_wait: Duration,
}

impl Default for HomeMotion {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baudrate: 3_000_000,
            config_file: PathBuf::from("config/crane-x7.toml"),
            arm_group: "arm".to_string(),
            hand_group: "hand".to_string(),
            hand_joint: "joint_hand".to_string(),
            gain_joint_id: 9,
            max_acceleration: 0.5 * PI,
            max_velocity: 0.5 * PI,
            home_pose: home_pose(),
            hand_target: 30.0_f64.to_radians(),
            safety_delay: Duration::from_secs(5),
            motion_wait: Duration::from_secs(5),
            hand_wait: Duration::from_secs(1),
            relax_wait: Duration::from_secs(5),
            restore_wait: Duration::from_secs(1),
        }
    }
}

/// CRANE-X7 home pose: joints 2 and 4 folded, everything else straight.
pub fn home_pose() -> Vec<f64> {
    let mut pose = vec![0.0; 7];
    pose[1] = -20.0_f64.to_radians();
    pose[3] = -120.0_f64.to_radians();
    pose
}

/// A failure that was logged and skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFailure {
    pub step: String,
    pub error: String,
}

/// Outcome of a run that reached the end of the choreography.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub failures: Vec<StepFailure>,
    /// The motion phase was cut short by a stop request
    pub interrupted: bool,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.interrupted
    }
}

/// Runs the home-pose choreography against a hardware handle.
///
/// Failures up to and including torque-on abort the run. From the motion
/// phase on, failures are logged and the run carries on so that torque-off
/// and disconnect are always attempted.
pub struct Sequencer<H: Hardware, S: Sleeper> {
    hardware: H,
    sleeper: S,
    motion: HomeMotion,
    report: RunReport,
}

impl<H: Hardware, S: Sleeper> Sequencer<H, S> {
    pub fn new(hardware: H, sleeper: S, motion: HomeMotion) -> Self {
        Self {
            hardware,
            sleeper,
            motion,
            report: RunReport::default(),
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn into_parts(self) -> (H, S) {
        (self.hardware, self.sleeper)
    }

    /// Execute the full choreography once.
    pub fn run(&mut self) -> Result<RunReport> {
        self.report = RunReport::default();

        let m = &self.motion;
        self.hardware
            .connect(&m.port, m.baudrate)
            .with_context(|| {
                format!("Failed to connect to robot on {} at {} baud", m.port, m.baudrate)
            })?;
        info!("✓ Connected on {} at {} baud", m.port, m.baudrate);

        if let Err(e) = self.configure() {
            self.hardware.disconnect();
            info!("Disconnected after failed setup");
            return Err(e);
        }

        self.move_home();
        self.teardown();

        Ok(std::mem::take(&mut self.report))
    }

    /// Steps that must all succeed before anything is allowed to move.
    fn configure(&mut self) -> Result<()> {
        let m = &self.motion;
        let hw = &mut self.hardware;

        hw.load_config_file(&m.config_file)
            .with_context(|| format!("Failed to load config file {}", m.config_file.display()))?;
        info!("✓ Loaded config file {}", m.config_file.display());

        for group in [&m.arm_group, &m.hand_group] {
            info!(
                "Setting {} max acceleration to {:.3} rad/s^2 and max velocity to {:.3} rad/s",
                group, m.max_acceleration, m.max_velocity
            );
            hw.write_max_acceleration_to_group(group, m.max_acceleration)
                .with_context(|| format!("Failed to set max acceleration for group {}", group))?;
            hw.write_max_velocity_to_group(group, m.max_velocity)
                .with_context(|| format!("Failed to set max velocity for group {}", group))?;
        }

        info!(
            "Writing position PID gain {} to {} and {}",
            PidGain::HOLD,
            m.arm_group,
            m.hand_group
        );
        for group in [&m.arm_group, &m.hand_group] {
            hw.write_position_pid_gain_to_group(group, PidGain::HOLD)
                .with_context(|| format!("Failed to write PID gain to group {}", group))?;
        }
        // Single joints can be addressed by servo id or by name
        for joint in [JointRef::Id(m.gain_joint_id), JointRef::Name(m.hand_joint.as_str())] {
            hw.write_position_pid_gain(joint, PidGain::HOLD)
                .with_context(|| format!("Failed to write PID gain to joint {}", joint))?;
        }

        for group in [&m.arm_group, &m.hand_group] {
            hw.torque_on(group)
                .with_context(|| format!("Failed to enable torque on group {}", group))?;
        }
        info!("✓ Torque enabled");

        Ok(())
    }

    /// Home pose and hand exercise. Stops early if a wait is interrupted.
    fn move_home(&mut self) {
        warn!(
            "Moving to home pose in {}s, keep people and objects clear of the arm",
            self.motion.safety_delay.as_secs()
        );
        if !self.wait(self.motion.safety_delay) {
            return;
        }

        let arm = self.motion.arm_group.clone();
        let pose = self.motion.home_pose.clone();
        let staged = self.hardware.set_positions(&arm, &pose);
        if self.soft("set arm home pose", staged) {
            let sent = self.hardware.sync_write(&arm);
            self.soft("sync write arm", sent);
        }
        if !self.wait(self.motion.motion_wait) {
            return;
        }

        let hand = self.motion.hand_group.clone();
        let joint = self.motion.hand_joint.clone();
        for target in [self.motion.hand_target, 0.0] {
            info!("Setting {} target to {:.3} rad", joint, target);
            let staged = self.hardware.set_position(&joint, target);
            if self.soft("set hand position", staged) {
                let sent = self.hardware.sync_write(&hand);
                self.soft("sync write hand", sent);
            }
            if !self.wait(self.motion.hand_wait) {
                return;
            }
        }
    }

    /// Relax, cut torque, restore gains, disconnect. Every step is attempted
    /// and the settle waits run in full even after a stop request.
    fn teardown(&mut self) {
        let groups = [self.motion.arm_group.clone(), self.motion.hand_group.clone()];

        info!("Writing position PID gain {} to relax the arm", PidGain::RELAX);
        for group in &groups {
            let r = self.hardware.write_position_pid_gain_to_group(group, PidGain::RELAX);
            self.soft(&format!("relax gain {}", group), r);
        }
        self.sleeper.settle(self.motion.relax_wait);

        for group in &groups {
            let r = self.hardware.torque_off(group);
            self.soft(&format!("torque off {}", group), r);
        }

        for group in &groups {
            let r = self.hardware.write_position_pid_gain_to_group(group, PidGain::HOLD);
            self.soft(&format!("restore gain {}", group), r);
        }
        self.sleeper.settle(self.motion.restore_wait);

        info!("Disconnecting from robot");
        self.hardware.disconnect();
    }

    fn wait(&mut self, duration: Duration) -> bool {
        info!("Waiting {}s", duration.as_secs_f64());
        if self.sleeper.sleep(duration) {
            return true;
        }
        warn!("Motion interrupted, skipping to teardown");
        self.report.interrupted = true;
        false
    }

    /// Log and record a failure without stopping the run.
    fn soft(&mut self, step: &str, result: Result<(), HardwareError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to {}: {}", step, e);
                self.report.failures.push(StepFailure {
                    step: step.to_string(),
                    error: e.to_string(),
                });
                false
            }
        }
    }
}
