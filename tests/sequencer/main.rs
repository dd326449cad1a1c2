
use mock_hw::{Call, Joint, MockHardware, RecordingSleeper};
use pretty_assertions::assert_eq;
use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use x7_runtime::hardware::PidGain;
use x7_runtime::sequencer::{home_pose, HomeMotion, RunReport, Sequencer, ThreadSleeper};

type Outcome = (anyhow::Result<RunReport>, MockHardware, RecordingSleeper);

fn run_with(hardware: MockHardware, sleeper: RecordingSleeper) -> Outcome {
    let mut sequencer = Sequencer::new(hardware, sleeper, HomeMotion::default());
    let result = sequencer.run();
    let (hardware, sleeper) = sequencer.into_parts();
    (result, hardware, sleeper)
}

fn s(text: &str) -> String {
    text.to_string()
}

fn full_sequence() -> Vec<Call> {
    let half_pi = 0.5 * PI;
    let hand_target = 30.0_f64.to_radians();
    vec![
        Call::Connect {
            port: s("/dev/ttyUSB0"),
            baudrate: 3_000_000,
        },
        Call::LoadConfig(PathBuf::from("config/crane-x7.toml")),
        Call::MaxAcceleration(s("arm"), half_pi),
        Call::MaxVelocity(s("arm"), half_pi),
        Call::MaxAcceleration(s("hand"), half_pi),
        Call::MaxVelocity(s("hand"), half_pi),
        Call::GroupGain(s("arm"), PidGain::new(800, 0, 0)),
        Call::GroupGain(s("hand"), PidGain::new(800, 0, 0)),
        Call::JointGain(Joint::Id(9), PidGain::new(800, 0, 0)),
        Call::JointGain(Joint::Name(s("joint_hand")), PidGain::new(800, 0, 0)),
        Call::TorqueOn(s("arm")),
        Call::TorqueOn(s("hand")),
        Call::SetPositions(s("arm"), home_pose()),
        Call::SyncWrite(s("arm")),
        Call::SetPosition(s("joint_hand"), hand_target),
        Call::SyncWrite(s("hand")),
        Call::SetPosition(s("joint_hand"), 0.0),
        Call::SyncWrite(s("hand")),
        Call::GroupGain(s("arm"), PidGain::new(5, 0, 0)),
        Call::GroupGain(s("hand"), PidGain::new(5, 0, 0)),
        Call::TorqueOff(s("arm")),
        Call::TorqueOff(s("hand")),
        Call::GroupGain(s("arm"), PidGain::new(800, 0, 0)),
        Call::GroupGain(s("hand"), PidGain::new(800, 0, 0)),
        Call::Disconnect,
    ]
}

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|&v| Duration::from_secs(v)).collect()
}

#[test]
fn test_full_run_in_order() {
    let (result, hardware, sleeper) = run_with(MockHardware::new(), RecordingSleeper::default());

    let report = result.unwrap();
    assert!(report.is_clean());
    assert_eq!(hardware.calls, full_sequence());
    assert_eq!(sleeper.waits, secs(&[5, 5, 1, 1, 5, 1]));
}

#[test]
fn test_connect_failure_touches_nothing_else() {
    let hardware = MockHardware::failing(|c| matches!(c, Call::Connect { .. }));
    let (result, hardware, sleeper) = run_with(hardware, RecordingSleeper::default());

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to connect"));
    assert_eq!(hardware.calls.len(), 1);
    assert!(sleeper.waits.is_empty());
}

#[test]
fn test_config_failure_disconnects() {
    let hardware = MockHardware::failing(|c| matches!(c, Call::LoadConfig(_)));
    let (result, hardware, _) = run_with(hardware, RecordingSleeper::default());

    assert!(result.is_err());
    assert_eq!(hardware.calls.len(), 3);
    assert_eq!(hardware.calls.last(), Some(&Call::Disconnect));
}

#[test]
fn test_arm_acceleration_failure_is_fatal() {
    let hardware =
        MockHardware::failing(|c| matches!(c, Call::MaxAcceleration(g, _) if g == "arm"));
    let (result, hardware, sleeper) = run_with(hardware, RecordingSleeper::default());

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("max acceleration for group arm"));

    assert_eq!(hardware.count(|c| matches!(c, Call::GroupGain(..) | Call::JointGain(..))), 0);
    assert_eq!(hardware.count(|c| matches!(c, Call::TorqueOn(_))), 0);
    assert_eq!(hardware.count(|c| matches!(c, Call::MaxVelocity(..))), 0);
    assert_eq!(hardware.count(|c| *c == Call::Disconnect), 1);
    assert!(sleeper.waits.is_empty());
}

#[test]
fn test_joint_gain_failure_is_fatal() {
    let hardware = MockHardware::failing(|c| matches!(c, Call::JointGain(Joint::Id(9), _)));
    let (result, hardware, _) = run_with(hardware, RecordingSleeper::default());

    assert!(result.is_err());
    assert_eq!(hardware.count(|c| matches!(c, Call::JointGain(Joint::Name(_), _))), 0);
    assert_eq!(hardware.count(|c| matches!(c, Call::TorqueOn(_))), 0);
}

#[test]
fn test_hand_torque_on_failure_is_fatal() {
    let hardware = MockHardware::failing(|c| matches!(c, Call::TorqueOn(g) if g == "hand"));
    let (result, hardware, _) = run_with(hardware, RecordingSleeper::default());

    assert!(result.is_err());
    assert_eq!(hardware.count(|c| matches!(c, Call::SetPositions(..) | Call::SyncWrite(_))), 0);
    assert_eq!(hardware.calls.last(), Some(&Call::Disconnect));
}

#[test]
fn test_arm_sync_write_failure_continues_to_teardown() {
    let hardware = MockHardware::failing(|c| matches!(c, Call::SyncWrite(g) if g == "arm"));
    let (result, hardware, _) = run_with(hardware, RecordingSleeper::default());

    let report = result.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, "sync write arm");
    assert!(!report.interrupted);

    // Same calls as a clean run, failure only recorded
    assert_eq!(hardware.calls, full_sequence());
    assert_eq!(hardware.count(|c| *c == Call::Disconnect), 1);
}

#[test]
fn test_teardown_failures_do_not_stop_teardown() {
    let hardware = MockHardware::failing(|c| {
        matches!(c, Call::TorqueOff(_)) || *c == Call::GroupGain(s("arm"), PidGain::RELAX)
    });
    let (result, hardware, _) = run_with(hardware, RecordingSleeper::default());

    let report = result.unwrap();
    let steps: Vec<_> = report.failures.iter().map(|f| f.step.as_str()).collect();
    assert_eq!(steps, vec!["relax gain arm", "torque off arm", "torque off hand"]);
    assert_eq!(hardware.calls, full_sequence());
}

#[test]
fn test_interrupted_safety_wait_skips_motion() {
    let sleeper = RecordingSleeper::interrupting_at(0);
    let (result, hardware, sleeper) = run_with(MockHardware::new(), sleeper);

    let report = result.unwrap();
    assert!(report.interrupted);
    assert!(!report.is_clean());
    let motion_calls = hardware.count(|c| {
        matches!(c, Call::SetPositions(..) | Call::SetPosition(..) | Call::SyncWrite(_))
    });
    assert_eq!(motion_calls, 0);

    let relax = hardware.position_of(&Call::GroupGain(s("arm"), PidGain::RELAX)).unwrap();
    let torque_off = hardware.position_of(&Call::TorqueOff(s("hand"))).unwrap();
    assert!(relax < torque_off);
    assert_eq!(hardware.calls.last(), Some(&Call::Disconnect));

    // Safety wait, then relax and restore waits still run in full
    assert_eq!(sleeper.waits, secs(&[5, 5, 1]));
}

#[test]
fn test_stop_request_keeps_teardown_waits() {
    let motion = HomeMotion {
        safety_delay: Duration::from_secs(30),
        relax_wait: Duration::from_millis(500),
        restore_wait: Duration::from_millis(300),
        ..HomeMotion::default()
    };
    let stopped = ThreadSleeper::new(Arc::new(AtomicBool::new(true)));
    let mut sequencer = Sequencer::new(MockHardware::new(), stopped, motion);

    let start = Instant::now();
    let report = sequencer.run().unwrap();
    let elapsed = start.elapsed();

    assert!(report.interrupted);
    // Safety delay skipped, relax and restore honored
    assert!(elapsed >= Duration::from_millis(800), "teardown took {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(30));

    let (hardware, _) = sequencer.into_parts();
    assert_eq!(hardware.calls.last(), Some(&Call::Disconnect));
}

#[test]
fn test_interrupted_hand_wait_skips_rest_of_hand() {
    let sleeper = RecordingSleeper::interrupting_at(2);
    let (result, hardware, sleeper) = run_with(MockHardware::new(), sleeper);

    assert!(result.unwrap().interrupted);
    assert_eq!(hardware.count(|c| matches!(c, Call::SetPosition(..))), 1);
    assert_eq!(hardware.count(|c| matches!(c, Call::TorqueOff(_))), 2);
    // Safety, motion and first hand wait, then relax and restore
    assert_eq!(sleeper.waits, secs(&[5, 5, 1, 5, 1]));
}

#[test]
fn test_arm_pose_and_gain_literals() {
    let (_, hardware, _) = run_with(MockHardware::new(), RecordingSleeper::default());

    let pose = hardware
        .calls
        .iter()
        .find_map(|c| match c {
            Call::SetPositions(g, p) if g == "arm" => Some(p.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(pose.len(), 7);
    approx::assert_relative_eq!(pose[1], -20.0 * PI / 180.0);
    approx::assert_relative_eq!(pose[3], -120.0 * PI / 180.0);
    assert!([0, 2, 4, 5, 6].iter().all(|&i| pose[i] == 0.0));

    let gains: Vec<PidGain> = hardware
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::GroupGain(_, g) | Call::JointGain(_, g) => Some(*g),
            _ => None,
        })
        .collect();
    let hold = PidGain::new(800, 0, 0);
    let relax = PidGain::new(5, 0, 0);
    assert_eq!(gains, vec![hold, hold, hold, hold, relax, relax, hold, hold]);
}
