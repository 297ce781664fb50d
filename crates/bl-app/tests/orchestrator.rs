use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bl_app::{
    AppError, AppResult, ConditionsCapture, Decision, ExperimentState, FixedAnswer, Notifier,
    NotifyError, Orchestrator, PostProcessor, RunPhase, RunSettings, TemperatureHold,
};
use bl_controls::{
    ControlError, GatedActuator, PidConfig, PidGains, RampConfig, RetryingSensor, SamplePeriod,
    TemperatureRegulator, TemperatureRegulatorConfig,
};
use bl_core::{ChannelId, Limit};
use bl_results::{LoopState, MemoryStore, StateStore, load_state, save_state};
use bl_sim::{
    FaultInjector, PlantConfig, SimClock, SimSupply, SimThermometer, ThermalPlant,
};

const PROBE: ChannelId = ChannelId::new(1);
const FAST: Duration = Duration::from_millis(5);

struct Rig {
    plant: ThermalPlant,
    thermometer_faults: FaultInjector,
    regulator: TemperatureRegulator,
}

fn rig() -> Rig {
    let plant = ThermalPlant::new(PlantConfig::default(), SimClock::PerRead { per_read_s: 0.5 })
        .unwrap();
    let thermometer = SimThermometer::new(plant.clone(), PROBE);
    let thermometer_faults = thermometer.faults();
    let sensor = RetryingSensor::new(Box::new(thermometer), PROBE, 3).unwrap();
    let actuator = GatedActuator::new(Box::new(SimSupply::new(plant.clone(), 10.0)), true);
    let regulator = TemperatureRegulator::new(
        TemperatureRegulatorConfig {
            pid: PidConfig {
                limit: Limit::new(0.0, 10.0).unwrap(),
                gains: PidGains::new(2.0, 0.05, 0.5),
                period: SamplePeriod::new(0.01).unwrap(),
                invert: false,
            },
            ramp: RampConfig {
                threshold: 200.0,
                speed: 1.0,
                interval_s: 0.01,
                ..RampConfig::default()
            },
        },
        sensor,
        actuator,
    )
    .unwrap();
    Rig {
        plant,
        thermometer_faults,
        regulator,
    }
}

/// Counts iterations and fails on the given call.
struct Counter {
    calls: Arc<AtomicU32>,
    fail_on: Option<u32>,
}

impl PostProcessor for Counter {
    fn name(&self) -> &'static str {
        "Counter"
    }

    fn process(&mut self, state: ExperimentState) -> AppResult<ExperimentState> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if Some(call) == self.fail_on {
            return Err(AppError::PostProcess {
                name: "Counter",
                reason: "simulated crash".to_string(),
            });
        }
        Ok(state)
    }
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Notifier for Recorder {
    fn notify(&self, _message: &str, title: &str) -> Result<(), NotifyError> {
        self.0.lock().unwrap().push(title.to_string());
        Ok(())
    }
}

fn orchestrator(
    rig: Rig,
    store: &MemoryStore,
    max_loops: Option<u64>,
    calls: &Arc<AtomicU32>,
    fail_on: Option<u32>,
    stabilize: Duration,
) -> (Orchestrator, ThermalPlant, FaultInjector) {
    let orch = Orchestrator::new(
        rig.regulator,
        Box::new(TemperatureHold::new(25.0, stabilize)),
        Box::new(ConditionsCapture),
        Box::new(store.clone()),
        RunSettings {
            max_loops,
            config_hash: Some("cfg".to_string()),
            ..RunSettings::default()
        },
    )
    .with_post_processors(vec![Box::new(Counter {
        calls: Arc::clone(calls),
        fail_on,
    })]);
    (orch, rig.plant, rig.thermometer_faults)
}

#[test]
fn fresh_run_uses_configured_budget() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let (mut orch, plant, _) = orchestrator(rig(), &store, Some(3), &calls, None, FAST);

    let summary = orch.run().unwrap();
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.remaining, Some(0));
    assert!(!summary.resumed);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(orch.phase(), RunPhase::Stopped);
    assert_eq!(orch.outcome(), Some(RunPhase::Completed));
    assert!(load_state::<LoopState>(&store).unwrap().is_none());
    assert!(!plant.enabled());
}

#[test]
fn crash_mid_loop_resumes_exact_remaining() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let (mut first, _, _) = orchestrator(rig(), &store, Some(5), &calls, Some(3), FAST);

    let err = first.run().unwrap_err();
    assert!(matches!(err, AppError::PostProcess { .. }));
    assert_eq!(first.outcome(), Some(RunPhase::Faulted));
    let saved: LoopState = load_state(&store).unwrap().unwrap();
    assert_eq!(saved.remaining_loops, Some(3));
    assert_eq!(saved.config_hash.as_deref(), Some("cfg"));

    let resumed_calls = Arc::new(AtomicU32::new(0));
    let (mut second, _, _) = orchestrator(rig(), &store, Some(5), &resumed_calls, None, FAST);
    let summary = second.run().unwrap();
    assert!(summary.resumed);
    assert_eq!(summary.iterations, 3);
    assert_eq!(resumed_calls.load(Ordering::SeqCst), 3);
    assert!(!store.contains("loop_state"));
}

#[test]
fn persisted_unbounded_budget_overrides_settings() {
    let store = MemoryStore::new();
    save_state(&store, &LoopState::new(Some(1), None)).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let (mut orch, _, _) = orchestrator(rig(), &store, None, &calls, None, FAST);
    let summary = orch.run().unwrap();
    assert_eq!(summary.iterations, 1);
    assert!(summary.resumed);
}

#[test]
fn dead_controller_fault_is_reraised() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let rig = rig();
    rig.thermometer_faults.fail_next(100);
    let (mut orch, plant, _) =
        orchestrator(rig, &store, Some(2), &calls, None, Duration::from_millis(300));

    let err = orch.run().unwrap_err();
    assert!(
        matches!(
            err,
            AppError::ControllerFault(ControlError::SensorExhausted { attempts: 3, .. })
        ),
        "unexpected error {err:?}"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!plant.enabled());
}

#[test]
fn interrupt_abort_stops_before_capture() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let (orch, plant, _) = orchestrator(rig(), &store, Some(3), &calls, None, FAST);
    let mut orch = orch.with_prompt(Box::new(FixedAnswer(Decision::Abort)));
    orch.interrupt_flag().raise();

    let err = orch.run().unwrap_err();
    assert!(matches!(err, AppError::Interrupted));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!store.contains("loop_state"));
    assert!(!plant.enabled());
}

#[test]
fn interrupt_continue_finishes_run() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let (orch, _, _) = orchestrator(rig(), &store, Some(2), &calls, None, FAST);
    let mut orch = orch.with_prompt(Box::new(FixedAnswer(Decision::Continue)));
    orch.interrupt_flag().raise();

    assert_eq!(orch.run().unwrap().iterations, 2);
}

#[test]
fn notifications_and_single_run() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let recorder = Recorder::default();
    let (orch, _, _) = orchestrator(rig(), &store, Some(1), &calls, None, FAST);
    let mut orch = orch.with_notifier(Box::new(recorder.clone()));

    orch.run().unwrap();
    assert_eq!(
        *recorder.0.lock().unwrap(),
        vec!["Experiment started", "Experiment completed"]
    );
    assert!(matches!(orch.run(), Err(AppError::InvalidInput(_))));
    orch.stop().unwrap();
}

#[test]
fn failure_notification_names_cause() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let recorder = Recorder::default();
    let (orch, _, _) = orchestrator(rig(), &store, Some(4), &calls, Some(1), FAST);
    let mut orch = orch.with_notifier(Box::new(recorder.clone()));

    assert!(orch.run().is_err());
    assert_eq!(
        recorder.0.lock().unwrap().last().map(String::as_str),
        Some("Experiment failed")
    );
    let saved = store.load("loop_state").unwrap();
    assert!(saved.is_none(), "no iteration finished, nothing persisted");
}

#[test]
fn stop_request_ends_long_wait() {
    let store = MemoryStore::new();
    let calls = Arc::new(AtomicU32::new(0));
    let (mut orch, plant, _) =
        orchestrator(rig(), &store, Some(3), &calls, None, Duration::from_secs(30));
    let flag = orch.interrupt_flag();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        flag.request_stop();
    });

    let started = std::time::Instant::now();
    let err = orch.run().unwrap_err();
    stopper.join().unwrap();
    assert!(matches!(err, AppError::StopRequested));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!plant.enabled());
}
