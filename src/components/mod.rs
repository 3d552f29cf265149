//! Component models for circuit simulation.
//!
//! This module provides models for all supported circuit components:
//! - Linear: Resistor, Capacitor, Inductor, Mutual inductance
//! - Sources: Voltage Source, Current Source (DC, waveform, AC)
//! - Controlled: VCVS, VCCS
//! - Nonlinear: Diode
//!
//! A component is a plain definition. Each analysis asks it for a fresh
//! behavior that binds to unknowns and stamps the MNA system.

mod controlled;
mod diode;
mod linear;
mod mutual;
mod params;
mod sources;
mod waveforms;

pub use controlled::{Vccs, Vcvs};
pub use diode::{limit_voltage_step, Diode, DiodeParams};
pub use linear::{Capacitor, Inductor, Resistor, MIN_RESISTANCE};
pub use mutual::MutualInductance;
pub use params::Parameter;
pub use sources::{CurrentSource, SourceValue, VoltageSource};
pub use waveforms::Waveform;

use crate::behavior::Behavior;

/// A circuit component.
#[derive(Debug, Clone)]
pub enum Component {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    MutualInductance(MutualInductance),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Vcvs(Vcvs),
    Vccs(Vccs),
    Diode(Diode),
}

impl Component {
    /// Get the component name.
    pub fn name(&self) -> &str {
        match self {
            Component::Resistor(r) => &r.name,
            Component::Capacitor(c) => &c.name,
            Component::Inductor(l) => &l.name,
            Component::MutualInductance(k) => &k.name,
            Component::VoltageSource(v) => &v.name,
            Component::CurrentSource(i) => &i.name,
            Component::Vcvs(e) => &e.name,
            Component::Vccs(g) => &g.name,
            Component::Diode(d) => &d.name,
        }
    }

    /// Node names in pin order. Coupling devices have none.
    pub fn pins(&self) -> &[String] {
        match self {
            Component::Resistor(r) => &r.pins,
            Component::Capacitor(c) => &c.pins,
            Component::Inductor(l) => &l.pins,
            Component::MutualInductance(_) => &[],
            Component::VoltageSource(v) => &v.pins,
            Component::CurrentSource(i) => &i.pins,
            Component::Vcvs(e) => &e.pins,
            Component::Vccs(g) => &g.pins,
            Component::Diode(d) => &d.pins,
        }
    }

    /// Entities this component must be set up after.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Component::MutualInductance(k) => vec![&k.inductor1, &k.inductor2],
            _ => Vec::new(),
        }
    }

    /// Replace the pin list. The count is checked when the behavior connects.
    pub fn connect(&mut self, pins: &[&str]) {
        let pins: Vec<String> = pins.iter().map(|p| p.to_string()).collect();
        match self {
            Component::Resistor(r) => r.pins = pins,
            Component::Capacitor(c) => c.pins = pins,
            Component::Inductor(l) => l.pins = pins,
            Component::MutualInductance(_) => {}
            Component::VoltageSource(v) => v.pins = pins,
            Component::CurrentSource(i) => i.pins = pins,
            Component::Vcvs(e) => e.pins = pins,
            Component::Vccs(g) => g.pins = pins,
            Component::Diode(d) => d.pins = pins,
        }
    }

    /// Check if this component is nonlinear (requires Newton-Raphson iteration).
    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Component::Diode(_))
    }

    /// Create a fresh, unbound behavior for one analysis.
    pub fn create_behavior(&self) -> Box<dyn Behavior> {
        match self {
            Component::Resistor(r) => Box::new(r.behavior()),
            Component::Capacitor(c) => Box::new(c.behavior()),
            Component::Inductor(l) => Box::new(l.behavior()),
            Component::MutualInductance(k) => Box::new(k.behavior()),
            Component::VoltageSource(v) => Box::new(v.behavior()),
            Component::CurrentSource(i) => Box::new(i.behavior()),
            Component::Vcvs(e) => Box::new(e.behavior()),
            Component::Vccs(g) => Box::new(g.behavior()),
            Component::Diode(d) => Box::new(d.behavior()),
        }
    }
}

macro_rules! impl_from_component {
    ($($kind:ident),*) => {
        $(
            impl From<$kind> for Component {
                fn from(value: $kind) -> Self {
                    Component::$kind(value)
                }
            }
        )*
    };
}

impl_from_component!(
    Resistor,
    Capacitor,
    Inductor,
    MutualInductance,
    VoltageSource,
    CurrentSource,
    Vcvs,
    Vccs,
    Diode
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_accessors() {
        let r: Component = Resistor::new("R1", "a", "b", 1e3).into();
        assert_eq!(r.name(), "R1");
        assert_eq!(r.pins(), ["a".to_string(), "b".to_string()]);
        assert!(r.dependencies().is_empty());
        assert!(!r.is_nonlinear());

        let k: Component = MutualInductance::new("K1", "L1", "L2", 0.5).into();
        assert!(k.pins().is_empty());
        assert_eq!(k.dependencies(), vec!["L1", "L2"]);
    }

    #[test]
    fn test_connect_replaces_pins() {
        let mut d: Component = Diode::new("D1", "a", "0", DiodeParams::default()).into();
        assert!(d.is_nonlinear());
        d.connect(&["x"]);
        assert_eq!(d.pins(), ["x".to_string()]);
        assert_eq!(d.create_behavior().name(), "D1");
    }
}
