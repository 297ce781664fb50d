//! Assembly of a runnable bench from a configuration.
//!
//! Only the simulated backend is wired: the thermometer, supply and scope
//! all act on one shared thermal plant.

use bl_acquire::WaveformInstrument;
use bl_config::{BenchConfig, CaptureDef, PostProcessorDef};
use bl_controls::{GatedActuator, RetryingSensor, TemperatureRegulator};
use bl_core::ChannelId;
use bl_results::{RecordStore, StateStore, config_fingerprint};
use bl_sim::{
    FaultInjector, PlantConfig, ScopeHandle, ScopeSimConfig, SignalSpec, SimClock, SimScope,
    SimSupply, SimThermometer, ThermalPlant,
};
use tracing::info;

use crate::compile::{
    build_capture, build_experiment, build_post_processors, regulator_config,
};
use crate::error::AppResult;
use crate::orchestrator::{Orchestrator, RunSettings};

/// Command line overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct BenchOptions {
    /// Force dry-run even when the file does not ask for it.
    pub dry_run: bool,
    pub max_loops: Option<u64>,
    pub extra_post_processors: Vec<PostProcessorDef>,
    /// Simulated clock; wall clock at the configured time scale when unset.
    pub clock: Option<SimClock>,
}

/// Handles into the simulated hardware, for inspection and fault injection.
#[derive(Clone)]
pub struct SimHandles {
    pub plant: ThermalPlant,
    pub thermometer_faults: FaultInjector,
    pub supply_faults: FaultInjector,
    pub scope: Option<ScopeHandle>,
}

pub struct Bench {
    pub orchestrator: Orchestrator,
    pub sim: SimHandles,
}

pub fn assemble(
    config: &BenchConfig,
    options: BenchOptions,
    state: Box<dyn StateStore>,
    records: Option<RecordStore>,
) -> AppResult<Bench> {
    let sim = config.simulation.clone().unwrap_or_default();
    let plant_config = PlantConfig {
        ambient: sim.plant.ambient,
        initial: sim.plant.initial,
        heater_resistance: sim.plant.heater_resistance,
        heater_capacity: sim.plant.heater_capacity,
        sample_capacity: sim.plant.sample_capacity,
        coupling: sim.plant.coupling,
        loss: sim.plant.loss,
        ..PlantConfig::default()
    };
    let clock = options.clock.unwrap_or(SimClock::Wall {
        time_scale: sim.time_scale,
    });
    let plant = ThermalPlant::new(plant_config, clock)?;

    let reg = &config.regulator;
    let sensor_channel = ChannelId::new(u32::from(reg.sensor_channel));
    let thermometer = SimThermometer::new(plant.clone(), sensor_channel);
    let thermometer_faults = thermometer.faults();
    let sensor = RetryingSensor::new(Box::new(thermometer), sensor_channel, reg.read_attempts)?;

    let supply = SimSupply::new(plant.clone(), sim.supply_max_voltage);
    let supply_faults = supply.faults();
    let dry_run = reg.dry_run || options.dry_run;
    let actuator = GatedActuator::new(Box::new(supply), !dry_run);

    let regulator = TemperatureRegulator::new(regulator_config(reg)?, sensor, actuator)?;

    let (instrument, scope) = if matches!(config.capture, CaptureDef::Scope { .. }) {
        let signals = sim.signals.iter().map(|s| SignalSpec {
            channel: ChannelId::new(u32::from(s.channel)),
            amplitude: s.amplitude,
            frequency_hz: s.frequency_hz,
            tempco: s.tempco,
            reference_temperature: sim.plant.ambient,
        });
        let scope = SimScope::new(ScopeSimConfig::default(), signals).with_plant(plant.clone());
        let handle = scope.handle();
        (
            Some(Box::new(scope) as Box<dyn WaveformInstrument>),
            Some(handle),
        )
    } else {
        (None, None)
    };

    let experiment = build_experiment(&config.experiment)?;
    let capture = build_capture(&config.capture, instrument)?;

    let mut post_defs = config.post_processors.clone();
    post_defs.extend(options.extra_post_processors.iter().cloned());

    let settings = RunSettings {
        max_loops: options.max_loops.or(config.run.max_loops),
        key_resolution: config.experiment.key_resolution,
        config_hash: Some(config_fingerprint(config)?),
        run_id: None,
    };

    info!(
        name = %config.name,
        experiment = experiment.name(),
        capture = capture.name(),
        dry_run,
        "bench assembled"
    );

    let mut orchestrator = Orchestrator::new(regulator, experiment, capture, state, settings)
        .with_post_processors(build_post_processors(&post_defs));
    if let Some(records) = records {
        orchestrator = orchestrator.with_records(records);
    }

    Ok(Bench {
        orchestrator,
        sim: SimHandles {
            plant,
            thermometer_faults,
            supply_faults,
            scope,
        },
    })
}
