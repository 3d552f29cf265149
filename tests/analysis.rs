//! End-to-end analyses on small reference circuits.

use std::ops::ControlFlow;

use approx::assert_relative_eq;
use nodal_core::analysis::{Ac, AcSweep, DcSweep, OperatingPoint, Transient};
use nodal_core::components::{
    Capacitor, Diode, DiodeParams, Inductor, MutualInductance, Resistor, Vccs, Vcvs,
    VoltageSource, Waveform,
};
use nodal_core::solver::{AnalysisMode, InitMode, IntegrationMethod};
use nodal_core::{
    Circuit, NodalError, Simulation, SimulationConfig, TransientConfig, BOLTZMANN, CHARGE,
    REFERENCE_TEMPERATURE,
};

fn divider(ac_magnitude: f64) -> Circuit {
    Circuit::new()
        .with(VoltageSource::new("V1", "in", "0", 10.0).with_ac(ac_magnitude, 0.0))
        .and_then(|c| c.with(Resistor::new("R1", "in", "out", 10e3)))
        .and_then(|c| c.with(Resistor::new("R2", "out", "0", 10e3)))
        .unwrap()
}

fn rc(source: VoltageSource) -> Circuit {
    let mut circuit = Circuit::new();
    circuit.add(source).unwrap();
    circuit.add(Resistor::new("R1", "in", "out", 1e3)).unwrap();
    circuit.add(Capacitor::new("C1", "out", "0", 1e-6)).unwrap();
    circuit
}

#[test]
fn test_divider_operating_point() {
    let circuit = divider(1.0);
    let mut out = None;
    let stats = OperatingPoint::default()
        .run(&circuit, |point| {
            out = Some(point.voltage("out").unwrap());
            ControlFlow::Continue(())
        })
        .unwrap();

    assert_eq!(stats.points, 1);
    assert_relative_eq!(out.unwrap(), 5.0, epsilon = 1e-9);
}

#[test]
fn test_repeated_loads_give_identical_system() {
    let circuit = divider(1.0);
    let mut sim = Simulation::setup(&circuit, SimulationConfig::default()).unwrap();
    sim.temperature().unwrap();
    sim.set_mode(AnalysisMode::Dc);
    sim.set_init(InitMode::Float);

    sim.load().unwrap();
    let first: Vec<_> = sim.system().entries().collect();
    let first_rhs = sim.system().rhs().to_vec();
    sim.load().unwrap();
    let second: Vec<_> = sim.system().entries().collect();

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(first_rhs, sim.system().rhs());
}

#[test]
fn test_diode_sweep_follows_shockley() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", "a", "0", 0.0)).unwrap();
    circuit
        .add(Diode::new("D1", "a", "0", DiodeParams::default()))
        .unwrap();

    let config = SimulationConfig::default();
    let (is, gmin) = (DiodeParams::default().is, config.gmin);
    let vt = BOLTZMANN * REFERENCE_TEMPERATURE / CHARGE;

    let mut points = 0;
    let stats = DcSweep::new("V1", -1.0, 1.0, 0.01)
        .with_config(config)
        .run(&circuit, |point| {
            let v = point.sweep_value().unwrap();
            let expected = is * ((v / vt).exp() - 1.0) + gmin * v;
            let current = -point.property("V1", "i").unwrap();
            assert_relative_eq!(current, expected, max_relative = 1e-3, epsilon = 1e-14);
            points += 1;
            ControlFlow::Continue(())
        })
        .unwrap();

    assert_eq!(points, 201);
    assert_eq!(stats.skipped, 0);
}

/// Largest deviation of an RC step response from 5(1 - e^(-t/RC)).
fn rc_step_deviation(params: TransientConfig) -> f64 {
    let source = VoltageSource::new("V1", "in", "0", 0.0)
        .with_waveform(Waveform::pulse(0.0, 5.0, 0.0, 1e-9, 1e-9, 1.0, 0.0));
    let circuit = rc(source);
    let tau = 1e3 * 1e-6;
    let final_time = params.final_time;

    let mut last_time = -1.0;
    let mut worst: f64 = 0.0;
    Transient::new(params)
        .run(&circuit, |point| {
            let t = point.time().unwrap();
            assert!(t > last_time, "time went from {} to {}", last_time, t);
            last_time = t;
            let expected = 5.0 * (1.0 - (-t / tau).exp());
            worst = worst.max((point.voltage("out").unwrap() - expected).abs());
            ControlFlow::Continue(())
        })
        .unwrap();

    assert_relative_eq!(last_time, final_time, max_relative = 1e-12);
    worst
}

#[test]
fn test_rc_charging_tracks_exponential() {
    let worst = rc_step_deviation(TransientConfig::new(1e-5, 5e-3));
    assert!(worst < 0.01, "largest deviation {} V", worst);
}

#[test]
fn test_rc_charging_with_gear() {
    let params = TransientConfig::new(1e-5, 5e-3).with_method(IntegrationMethod::Gear);
    let worst = rc_step_deviation(params);
    assert!(worst < 0.01, "largest deviation {} V", worst);
}

#[test]
fn test_rc_charging_with_backward_euler() {
    let worst = rc_step_deviation(TransientConfig::new(1e-5, 5e-3).with_max_order(1));
    assert!(worst < 0.025, "largest deviation {} V", worst);

    let params = TransientConfig::new(1e-5, 5e-3)
        .with_method(IntegrationMethod::Gear)
        .with_max_order(1);
    let worst = rc_step_deviation(params);
    assert!(worst < 0.025, "largest deviation {} V", worst);
}

#[test]
fn test_rl_current_rise() {
    let mut circuit = Circuit::new();
    circuit
        .add(
            VoltageSource::new("V1", "in", "0", 0.0)
                .with_waveform(Waveform::pulse(0.0, 1.0, 0.0, 1e-9, 1e-9, 1.0, 0.0)),
        )
        .unwrap();
    circuit.add(Resistor::new("R1", "in", "a", 10.0)).unwrap();
    circuit.add(Inductor::new("L1", "a", "0", 10e-3)).unwrap();
    let tau = 10e-3 / 10.0;

    let mut worst: f64 = 0.0;
    let mut last = (0.0, 0.0);
    Transient::new(TransientConfig::new(1e-5, 5e-3))
        .run(&circuit, |point| {
            let t = point.time().unwrap();
            if t > 1e-9 {
                let expected = (-(t - 1e-9) / tau).exp();
                worst = worst.max((point.voltage("a").unwrap() - expected).abs());
            }
            last = (t, point.property("L1", "i").unwrap());
            ControlFlow::Continue(())
        })
        .unwrap();

    assert!(worst < 5e-3, "largest deviation {} V", worst);
    assert_relative_eq!(last.1, 0.1 * (1.0 - (-last.0 / tau).exp()), max_relative = 1e-2);
}

#[test]
fn test_controlled_sources() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", "c", "0", 2.0)).unwrap();
    circuit.add(Vcvs::new("E1", "e", "0", "c", "0", 3.0)).unwrap();
    circuit.add(Resistor::new("R1", "e", "0", 1e3)).unwrap();
    // Current is pushed from ground into g
    circuit.add(Vccs::new("G1", "0", "g", "c", "0", 1e-3)).unwrap();
    circuit.add(Resistor::new("R2", "g", "0", 1e3)).unwrap();

    let mut voltages = None;
    OperatingPoint::default()
        .run(&circuit, |point| {
            voltages = Some((point.voltage("e").unwrap(), point.voltage("g").unwrap()));
            ControlFlow::Continue(())
        })
        .unwrap();

    let (e, g) = voltages.unwrap();
    assert_relative_eq!(e, 6.0, epsilon = 1e-9);
    assert_relative_eq!(g, 2.0, epsilon = 1e-9);
}

/// Primary driven through 10 ohms, secondary nearly open.
fn coupled(source: VoltageSource) -> Circuit {
    let mut circuit = Circuit::new();
    circuit.add(source).unwrap();
    circuit.add(Resistor::new("R1", "in", "a", 10.0)).unwrap();
    circuit.add(Inductor::new("L1", "a", "0", 1e-3)).unwrap();
    circuit.add(Inductor::new("L2", "out", "0", 1e-3)).unwrap();
    circuit.add(Resistor::new("R2", "out", "0", 1e6)).unwrap();
    circuit
        .add(MutualInductance::new("K1", "L1", "L2", 0.5))
        .unwrap();
    circuit
}

#[test]
fn test_coupled_inductors_ac_ratio() {
    let circuit = coupled(VoltageSource::new("V1", "in", "0", 0.0).with_ac(1.0, 0.0));
    let sweep = AcSweep::Decade {
        points_per_decade: 5,
        start: 10.0,
        stop: 1e4,
    };

    let mut points = 0;
    Ac::new(sweep)
        .run(&circuit, |point| {
            let ratio = point.voltage("out").unwrap() / point.voltage("a").unwrap();
            assert_relative_eq!(ratio.norm(), 0.5, max_relative = 1e-4);
            points += 1;
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(points, 16);
}

#[test]
fn test_coupled_inductors_transient() {
    let source =
        VoltageSource::new("V1", "in", "0", 0.0).with_waveform(Waveform::sine(0.0, 1.0, 1e3));
    let circuit = coupled(source);

    let mut worst: f64 = 0.0;
    let mut peak: f64 = 0.0;
    Transient::new(TransientConfig::new(1e-5, 2e-3))
        .run(&circuit, |point| {
            assert_relative_eq!(point.property("K1", "m").unwrap(), 5e-4, max_relative = 1e-12);
            let (a, out) = (point.voltage("a").unwrap(), point.voltage("out").unwrap());
            worst = worst.max((out - 0.5 * a).abs());
            peak = peak.max(a.abs());
            ControlFlow::Continue(())
        })
        .unwrap();

    assert!(peak > 0.1, "primary never swung: {}", peak);
    assert!(worst < 1e-4, "largest deviation {} V", worst);
}

#[test]
fn test_transient_lands_on_pwl_corners() {
    let source = VoltageSource::new("V1", "in", "0", 0.0).with_waveform(Waveform::pwl(vec![
        (0.0, 0.0),
        (3.3e-7, 1.0),
        (7.7e-7, 1.0),
        (1.2e-6, 0.0),
    ]));
    let circuit = rc(source);

    let mut times = Vec::new();
    Transient::new(TransientConfig::new(1e-7, 2e-6))
        .run(&circuit, |point| {
            times.push(point.time().unwrap());
            ControlFlow::Continue(())
        })
        .unwrap();

    for corner in [3.3e-7, 7.7e-7, 1.2e-6] {
        assert!(times.contains(&corner), "no point at {}", corner);
    }
}

#[test]
fn test_transient_lands_on_pulse_delay() {
    let source = VoltageSource::new("V1", "in", "0", 0.0)
        .with_waveform(Waveform::pulse(0.0, 1.0, 1e-6, 1e-7, 1e-7, 1e-6, 0.0));
    let circuit = rc(source);

    let mut times = Vec::new();
    Transient::new(TransientConfig::new(1e-7, 5e-6))
        .run(&circuit, |point| {
            times.push(point.time().unwrap());
            ControlFlow::Continue(())
        })
        .unwrap();

    assert!(times.contains(&1e-6), "no point at the pulse delay");
    assert!(times.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_transient_stops_when_callback_breaks() {
    let source = VoltageSource::new("V1", "in", "0", 1.0);
    let circuit = rc(source);

    let mut calls = 0;
    let stats = Transient::new(TransientConfig::new(1e-5, 1e-3))
        .run(&circuit, |_| {
            calls += 1;
            if calls == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();

    assert_eq!(calls, 3);
    assert!(stats.cancelled);
}

#[test]
fn test_capacitor_only_node_is_singular() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", "in", "0", 1.0)).unwrap();
    circuit.add(Capacitor::new("C1", "in", "float", 1e-6)).unwrap();

    let result = OperatingPoint::default().run(&circuit, |_| ControlFlow::Continue(()));
    assert!(matches!(result, Err(NodalError::Singular { .. })));
}

#[test]
fn test_ac_response_scales_with_magnitude() {
    let sweep = AcSweep::Decade {
        points_per_decade: 5,
        start: 10.0,
        stop: 1e5,
    };
    let mut single = Vec::new();
    Ac::new(sweep)
        .run(&divider(1.0), |point| {
            single.push(point.voltage("out").unwrap());
            ControlFlow::Continue(())
        })
        .unwrap();
    let mut double = Vec::new();
    Ac::new(sweep)
        .run(&divider(2.0), |point| {
            double.push(point.voltage("out").unwrap());
            ControlFlow::Continue(())
        })
        .unwrap();

    assert_eq!(single.len(), double.len());
    for (a, b) in single.iter().zip(double.iter()) {
        assert_relative_eq!(b.norm(), 2.0 * a.norm(), max_relative = 1e-12);
        assert_relative_eq!(a.norm(), 0.5, max_relative = 1e-9);
    }
}

#[test]
fn test_rewired_component_reports_pin_mismatch() {
    let mut circuit = divider(1.0);
    circuit
        .find_mut("R2")
        .unwrap()
        .connect(&["out", "0", "in"]);

    let result = OperatingPoint::default().run(&circuit, |_| ControlFlow::Continue(()));
    match result {
        Err(NodalError::PinMismatch {
            name,
            expected,
            given,
        }) => {
            assert_eq!(name, "R2");
            assert_eq!(expected, 2);
            assert_eq!(given, 3);
        }
        other => panic!("expected a pin mismatch, got {:?}", other.map(|s| s.points)),
    }
}

#[test]
fn test_coupling_to_missing_inductor() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", "a", "0", 1.0)).unwrap();
    circuit.add(Resistor::new("R1", "a", "b", 1.0)).unwrap();
    circuit.add(Inductor::new("L1", "b", "0", 1e-3)).unwrap();
    circuit
        .add(MutualInductance::new("K1", "L1", "L2", 0.9))
        .unwrap();

    let result = OperatingPoint::default().run(&circuit, |_| ControlFlow::Continue(()));
    match result {
        Err(NodalError::MissingEntity { name, referenced }) => {
            assert_eq!(name, "K1");
            assert_eq!(referenced, "L2");
        }
        other => panic!("expected a missing entity, got {:?}", other.map(|s| s.points)),
    }
}

#[test]
fn test_exhausted_aids_report_no_convergence() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::new("V1", "in", "0", 5.0)).unwrap();
    circuit.add(Resistor::new("R1", "in", "a", 1e3)).unwrap();
    circuit
        .add(Diode::new("D1", "a", "0", DiodeParams::default()))
        .unwrap();
    let config = SimulationConfig::default()
        .with_dc_max_iterations(1)
        .with_gmin_steps(0)
        .with_source_steps(0);

    let result = OperatingPoint::new(config).run(&circuit, |_| ControlFlow::Continue(()));
    assert!(matches!(result, Err(NodalError::NoConvergence { .. })));
}

#[test]
fn test_step_floor_reports_timestep_too_small() {
    let source =
        VoltageSource::new("V1", "in", "0", 0.0).with_waveform(Waveform::sine(0.0, 1.0, 1e6));
    let circuit = rc(source);
    let config = SimulationConfig::default().with_tran_max_iterations(1);
    let params = TransientConfig::new(1e-7, 1e-5).with_min_step(1e-9);

    let result = Transient::new(params)
        .with_config(config)
        .run(&circuit, |_| ControlFlow::Continue(()));
    assert!(matches!(result, Err(NodalError::TimestepTooSmall { .. })));
}
