//! Nodal - SPICE-style circuit simulator
//!
//! Runs the analyses on built-in reference circuits and prints one CSV row
//! per export point.
//!
//! # Usage
//!
//! ```bash
//! nodal op divider
//! nodal dc diode --source V1 --start -1 --stop 1 --step 0.01
//! nodal tran rc --step 1e-5 --stop 5e-3 --method gear
//! nodal ac rlc --points 20 --start 10 --stop 1e6
//! ```

use std::ops::ControlFlow;

use clap::{Parser, Subcommand, ValueEnum};
use nodal_core::{
    analysis::{Ac, AcSweep, DcSweep, OperatingPoint, Transient},
    circuit::Circuit,
    components::{
        Capacitor, Diode, DiodeParams, Inductor, MutualInductance, Resistor, VoltageSource,
        Waveform,
    },
    error::Result,
    solver::IntegrationMethod,
    SimulationConfig, TransientConfig,
};

/// SPICE-style circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    analysis: Analysis,

    /// Relative tolerance
    #[arg(long, global = true, default_value_t = 1e-3)]
    reltol: f64,

    /// Absolute current tolerance (A)
    #[arg(long, global = true, default_value_t = 1e-12)]
    abstol: f64,

    /// Junction minimum conductance (S)
    #[arg(long, global = true, default_value_t = 1e-12)]
    gmin: f64,
}

#[derive(Subcommand, Debug)]
enum Analysis {
    /// DC operating point
    Op {
        #[arg(value_enum)]
        circuit: Reference,
    },
    /// DC sweep of an independent source
    Dc {
        #[arg(value_enum)]
        circuit: Reference,
        /// Source to sweep
        #[arg(long, default_value = "V1")]
        source: String,
        #[arg(long, allow_negative_numbers = true, default_value_t = 0.0)]
        start: f64,
        #[arg(long, allow_negative_numbers = true, default_value_t = 1.0)]
        stop: f64,
        #[arg(long, allow_negative_numbers = true, default_value_t = 0.1)]
        step: f64,
        /// Skip points that fail to converge
        #[arg(long)]
        skip_failed: bool,
    },
    /// Transient analysis
    Tran {
        #[arg(value_enum)]
        circuit: Reference,
        /// Output step (s)
        #[arg(long, default_value_t = 1e-5)]
        step: f64,
        /// Final time (s)
        #[arg(long, default_value_t = 5e-3)]
        stop: f64,
        /// Integration method (trap or gear)
        #[arg(long, default_value = "trap")]
        method: IntegrationMethod,
        /// Highest integration order
        #[arg(long, default_value_t = 2)]
        max_order: usize,
    },
    /// AC small-signal sweep, points per decade
    Ac {
        #[arg(value_enum)]
        circuit: Reference,
        #[arg(long, default_value_t = 10)]
        points: usize,
        #[arg(long, default_value_t = 10.0)]
        start: f64,
        #[arg(long, default_value_t = 1e6)]
        stop: f64,
    },
}

/// Built-in reference circuits
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Reference {
    /// 10 V across two 10 kΩ resistors
    Divider,
    /// 1 kΩ / 1 µF low-pass driven by a 5 V pulse
    Rc,
    /// Diode clamp driven through 1 kΩ
    Diode,
    /// Two magnetically coupled RLC tanks
    Rlc,
}

impl Reference {
    fn build(self) -> Result<Circuit> {
        let mut circuit = Circuit::new();
        match self {
            Reference::Divider => {
                circuit.add(VoltageSource::new("V1", "in", "0", 10.0).with_ac(1.0, 0.0))?;
                circuit.add(Resistor::new("R1", "in", "out", 10e3))?;
                circuit.add(Resistor::new("R2", "out", "0", 10e3))?;
            }
            Reference::Rc => {
                circuit.add(
                    VoltageSource::new("V1", "in", "0", 0.0)
                        .with_waveform(Waveform::pulse(0.0, 5.0, 0.0, 1e-9, 1e-9, 1.0, 0.0))
                        .with_ac(1.0, 0.0),
                )?;
                circuit.add(Resistor::new("R1", "in", "out", 1e3))?;
                circuit.add(Capacitor::new("C1", "out", "0", 1e-6))?;
            }
            Reference::Diode => {
                circuit.add(
                    VoltageSource::new("V1", "in", "0", 1.0)
                        .with_waveform(Waveform::sine(0.0, 2.0, 1e3))
                        .with_ac(1.0, 0.0),
                )?;
                circuit.add(Resistor::new("R1", "in", "out", 1e3))?;
                circuit.add(Diode::new("D1", "out", "0", DiodeParams::default()))?;
            }
            Reference::Rlc => {
                circuit.add(
                    VoltageSource::new("V1", "in", "0", 0.0)
                        .with_waveform(Waveform::pulse(0.0, 1.0, 0.0, 1e-6, 1e-6, 1.0, 0.0))
                        .with_ac(1.0, 0.0),
                )?;
                circuit.add(Resistor::new("R1", "in", "a", 50.0))?;
                circuit.add(Inductor::new("L1", "a", "0", 1e-3))?;
                circuit.add(Capacitor::new("C1", "a", "0", 1e-6))?;
                circuit.add(Inductor::new("L2", "out", "0", 1e-3))?;
                circuit.add(Capacitor::new("C2", "out", "0", 1e-6))?;
                circuit.add(Resistor::new("R2", "out", "0", 1e3))?;
                circuit.add(MutualInductance::new("K1", "L1", "L2", 0.5))?;
            }
        }
        Ok(circuit)
    }
}

/// Non-ground node names in circuit order.
fn node_names(circuit: &Circuit) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for component in circuit.components() {
        for pin in component.pins() {
            if !nodal_core::circuit::is_ground_name(pin) && !names.contains(pin) {
                names.push(pin.clone());
            }
        }
    }
    names
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = SimulationConfig::default()
        .with_reltol(args.reltol)
        .with_abstol(args.abstol)
        .with_gmin(args.gmin);

    match args.analysis {
        Analysis::Op { circuit } => {
            let circuit = circuit.build()?;
            let nodes = node_names(&circuit);
            println!("{}", nodes.join(","));
            OperatingPoint::new(config).run(&circuit, |point| {
                let row: Vec<String> = nodes
                    .iter()
                    .map(|n| format!("{:e}", point.voltage(n).unwrap_or(f64::NAN)))
                    .collect();
                println!("{}", row.join(","));
                ControlFlow::Continue(())
            })?;
        }
        Analysis::Dc {
            circuit,
            source,
            start,
            stop,
            step,
            skip_failed,
        } => {
            let circuit = circuit.build()?;
            let nodes = node_names(&circuit);
            println!("{},{}", source, nodes.join(","));
            let stats = DcSweep::new(source, start, stop, step)
                .with_skip_failed(skip_failed)
                .with_config(config)
                .run(&circuit, |point| {
                    let mut row = vec![format!("{:e}", point.sweep_value().unwrap_or(f64::NAN))];
                    row.extend(
                        nodes
                            .iter()
                            .map(|n| format!("{:e}", point.voltage(n).unwrap_or(f64::NAN))),
                    );
                    println!("{}", row.join(","));
                    ControlFlow::Continue(())
                })?;
            eprintln!("{} points, {} skipped", stats.points, stats.skipped);
        }
        Analysis::Tran {
            circuit,
            step,
            stop,
            method,
            max_order,
        } => {
            let circuit = circuit.build()?;
            let nodes = node_names(&circuit);
            println!("time,{}", nodes.join(","));
            let params = TransientConfig::new(step, stop)
                .with_method(method)
                .with_max_order(max_order);
            let stats = Transient::new(params)
                .with_config(config)
                .run(&circuit, |point| {
                    let mut row = vec![format!("{:e}", point.time().unwrap_or(f64::NAN))];
                    row.extend(
                        nodes
                            .iter()
                            .map(|n| format!("{:e}", point.voltage(n).unwrap_or(f64::NAN))),
                    );
                    println!("{}", row.join(","));
                    ControlFlow::Continue(())
                })?;
            eprintln!(
                "{} accepted, {} rejected, {} iterations",
                stats.accepted, stats.rejected, stats.iterations
            );
        }
        Analysis::Ac {
            circuit,
            points,
            start,
            stop,
        } => {
            let circuit = circuit.build()?;
            let nodes = node_names(&circuit);
            let header: Vec<String> = nodes
                .iter()
                .map(|n| format!("{0}_db,{0}_deg", n))
                .collect();
            println!("frequency,{}", header.join(","));
            let sweep = AcSweep::Decade {
                points_per_decade: points,
                start,
                stop,
            };
            Ac::new(sweep).with_config(config).run(&circuit, |point| {
                let mut row = vec![format!("{:e}", point.frequency())];
                for n in &nodes {
                    let v = point.voltage(n).unwrap_or_default();
                    row.push(format!("{:.4}", 20.0 * v.norm().log10()));
                    row.push(format!("{:.4}", v.arg().to_degrees()));
                }
                println!("{}", row.join(","));
                ControlFlow::Continue(())
            })?;
        }
    }

    Ok(())
}
