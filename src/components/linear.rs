//! Linear passive components: Resistor, Capacitor, Inductor.

use num_complex::Complex64;

use super::params::Parameter;
use crate::behavior::{
    bound, check_pins, Behavior, Capabilities, ExportContext, FrequencyContext, InductorPort,
    LoadContext,
};
use crate::circuit::{Unknown, Unknowns};
use crate::error::{NodalError, Result};
use crate::solver::mna::{BranchStamp, ConductanceStamp, CurrentStamp};
use crate::solver::{
    AnalysisMode, ComplexState, RealState, SparseSystem, StateId, StatePool, TimeDomain,
};

/// Resistances below this are replaced by it.
pub const MIN_RESISTANCE: f64 = 1e-12;

/// A resistor with optional temperature coefficients.
///
/// R(T) = R * (1 + tc1 * dT + tc2 * dT^2), dT = T - Tnom
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    pub pins: Vec<String>, // [positive, negative]
    pub resistance: f64,
    pub tc1: f64,
    pub tc2: f64,
    /// Instance temperature; defaults to the circuit temperature.
    pub temperature: Parameter,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(name: impl Into<String>, pos: &str, neg: &str, resistance: f64) -> Self {
        Self {
            name: name.into(),
            pins: vec![pos.to_string(), neg.to_string()],
            resistance,
            tc1: 0.0,
            tc2: 0.0,
            temperature: Parameter::new(crate::REFERENCE_TEMPERATURE),
        }
    }

    /// Set the first and second order temperature coefficients.
    pub fn with_temperature_coefficients(mut self, tc1: f64, tc2: f64) -> Self {
        self.tc1 = tc1;
        self.tc2 = tc2;
        self
    }

    /// Set the instance temperature (kelvin).
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature.set(temperature);
        self
    }

    pub(crate) fn behavior(&self) -> ResistorBehavior {
        ResistorBehavior {
            conductance: conductance_of(self.resistance),
            def: self.clone(),
            pos: Unknown::GROUND,
            neg: Unknown::GROUND,
            stamp: None,
            ac_stamp: None,
        }
    }
}

fn conductance_of(resistance: f64) -> f64 {
    if resistance.abs() < MIN_RESISTANCE {
        1.0 / MIN_RESISTANCE
    } else {
        1.0 / resistance
    }
}

#[derive(Debug)]
pub struct ResistorBehavior {
    def: Resistor,
    pos: Unknown,
    neg: Unknown,
    conductance: f64,
    stamp: Option<ConductanceStamp>,
    ac_stamp: Option<ConductanceStamp>,
}

impl Behavior for ResistorBehavior {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            temperature: true,
            load: true,
            frequency: true,
            ..Capabilities::default()
        }
    }

    fn connect(&mut self, pins: &[Unknown], _unknowns: &mut Unknowns) -> Result<()> {
        check_pins(&self.def.name, 2, pins)?;
        self.pos = pins[0];
        self.neg = pins[1];
        Ok(())
    }

    fn allocate(&mut self, system: &mut SparseSystem<f64>) -> Result<()> {
        self.stamp = Some(ConductanceStamp::allocate(system, self.pos, self.neg)?);
        Ok(())
    }

    fn unsetup(&mut self) {
        self.stamp = None;
        self.ac_stamp = None;
    }

    fn temperature(&mut self, state: &RealState) -> Result<()> {
        if !self.def.resistance.is_finite() {
            return Err(NodalError::invalid_parameter(
                &self.def.name,
                "resistance",
                "must be finite",
            ));
        }
        let dt = self.def.temperature.or(state.temperature) - state.nominal_temperature;
        let factor = 1.0 + self.def.tc1 * dt + self.def.tc2 * dt * dt;
        let resistance = self.def.resistance * factor;
        if resistance.abs() < MIN_RESISTANCE {
            log::warn!(
                "{}: resistance {:e} is below {:e}, clamping",
                self.def.name,
                resistance,
                MIN_RESISTANCE
            );
        }
        self.conductance = conductance_of(resistance);
        Ok(())
    }

    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()> {
        let stamp = bound(&self.stamp, &self.def.name)?;
        stamp.load(context.system, self.conductance);
        Ok(())
    }

    fn allocate_frequency(&mut self, system: &mut SparseSystem<Complex64>) -> Result<()> {
        self.ac_stamp = Some(ConductanceStamp::allocate(system, self.pos, self.neg)?);
        Ok(())
    }

    fn load_frequency(&mut self, context: &mut FrequencyContext<'_>) -> Result<()> {
        let stamp = bound(&self.ac_stamp, &self.def.name)?;
        stamp.load(context.system, Complex64::new(self.conductance, 0.0));
        Ok(())
    }

    fn property(&self, name: &str, context: &ExportContext<'_>) -> Option<f64> {
        let v = context
            .state
            .voltage_between(self.pos.index(), self.neg.index());
        match name {
            "v" => Some(v),
            "i" => Some(v * self.conductance),
            "p" => Some(v * v * self.conductance),
            "r" => Some(1.0 / self.conductance),
            "g" => Some(self.conductance),
            _ => None,
        }
    }

    fn frequency_property(&self, name: &str, state: &ComplexState) -> Option<Complex64> {
        let v = state.voltage_between(self.pos.index(), self.neg.index());
        let i = v * self.conductance;
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(v * i.conj()),
            _ => None,
        }
    }
}

/// A capacitor component.
///
/// The charge q = C * v is integrated during transient runs, which yields a
/// companion model of conductance `ag0 * C` in parallel with a history
/// current. At DC the capacitor is open.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    pub pins: Vec<String>,
    pub capacitance: f64,
}

impl Capacitor {
    /// Create a new capacitor.
    pub fn new(name: impl Into<String>, pos: &str, neg: &str, capacitance: f64) -> Self {
        Self {
            name: name.into(),
            pins: vec![pos.to_string(), neg.to_string()],
            capacitance,
        }
    }

    pub(crate) fn behavior(&self) -> CapacitorBehavior {
        CapacitorBehavior {
            def: self.clone(),
            pos: Unknown::GROUND,
            neg: Unknown::GROUND,
            charge: None,
            handles: None,
            ac_stamp: None,
        }
    }
}

#[derive(Debug)]
pub struct CapacitorBehavior {
    def: Capacitor,
    pos: Unknown,
    neg: Unknown,
    charge: Option<StateId>,
    handles: Option<(ConductanceStamp, CurrentStamp)>,
    ac_stamp: Option<ConductanceStamp>,
}

impl Behavior for CapacitorBehavior {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            load: true,
            transient: true,
            frequency: true,
            ..Capabilities::default()
        }
    }

    fn setup(&mut self, _context: &crate::behavior::SetupContext<'_>) -> Result<()> {
        if !(self.def.capacitance.is_finite() && self.def.capacitance >= 0.0) {
            return Err(NodalError::invalid_parameter(
                &self.def.name,
                "capacitance",
                format!("must be non-negative, got {}", self.def.capacitance),
            ));
        }
        Ok(())
    }

    fn connect(&mut self, pins: &[Unknown], _unknowns: &mut Unknowns) -> Result<()> {
        check_pins(&self.def.name, 2, pins)?;
        self.pos = pins[0];
        self.neg = pins[1];
        Ok(())
    }

    fn allocate(&mut self, system: &mut SparseSystem<f64>) -> Result<()> {
        self.handles = Some((
            ConductanceStamp::allocate(system, self.pos, self.neg)?,
            CurrentStamp::allocate(system, self.pos, self.neg)?,
        ));
        Ok(())
    }

    fn unsetup(&mut self) {
        self.handles = None;
        self.ac_stamp = None;
        self.charge = None;
    }

    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()> {
        let (conductance, current) = bound(&self.handles, &self.def.name)?;
        if context.state.mode != AnalysisMode::Transient {
            return Ok(());
        }
        let (time, charge) = match (context.time.as_deref_mut(), self.charge) {
            (Some(time), Some(charge)) => (time, charge),
            _ => return Ok(()),
        };

        let v = context
            .state
            .voltage_between(self.pos.index(), self.neg.index());
        time.pool_mut().set_value(charge, self.def.capacitance * v);
        let companion = time.integrate(charge, self.def.capacitance);

        conductance.load(context.system, companion.geq);
        current.load(context.system, companion.current - companion.geq * v);
        Ok(())
    }

    fn create_states(&mut self, pool: &mut StatePool) {
        self.charge = Some(pool.allocate());
    }

    fn initialize_states(&self, state: &RealState, pool: &mut StatePool) {
        if let Some(charge) = self.charge {
            let v = state.voltage_between(self.pos.index(), self.neg.index());
            pool.set_value(charge, self.def.capacitance * v);
        }
    }

    fn truncate(&self, time: &TimeDomain) -> f64 {
        self.charge
            .map(|charge| time.truncate_state(charge))
            .unwrap_or(f64::INFINITY)
    }

    fn allocate_frequency(&mut self, system: &mut SparseSystem<Complex64>) -> Result<()> {
        self.ac_stamp = Some(ConductanceStamp::allocate(system, self.pos, self.neg)?);
        Ok(())
    }

    fn load_frequency(&mut self, context: &mut FrequencyContext<'_>) -> Result<()> {
        let stamp = bound(&self.ac_stamp, &self.def.name)?;
        stamp.load(context.system, context.state.laplace() * self.def.capacitance);
        Ok(())
    }

    fn property(&self, name: &str, context: &ExportContext<'_>) -> Option<f64> {
        let v = context
            .state
            .voltage_between(self.pos.index(), self.neg.index());
        let i = match (context.time, self.charge, context.state.mode) {
            (Some(time), Some(charge), AnalysisMode::Transient) => time.pool().derivative(charge),
            _ => 0.0,
        };
        match name {
            "v" => Some(v),
            "q" => Some(self.def.capacitance * v),
            "i" => Some(i),
            "p" => Some(v * i),
            _ => None,
        }
    }

    fn frequency_property(&self, name: &str, state: &ComplexState) -> Option<Complex64> {
        let v = state.voltage_between(self.pos.index(), self.neg.index());
        let i = v * state.laplace() * self.def.capacitance;
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(v * i.conj()),
            _ => None,
        }
    }
}

/// An inductor component.
///
/// The inductor adds a branch-current unknown. Its branch equation is
/// `v+ - v- = d(flux)/dt` with flux = L * i, which reduces to a short at DC.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    pub pins: Vec<String>,
    pub inductance: f64,
}

impl Inductor {
    /// Create a new inductor.
    pub fn new(name: impl Into<String>, pos: &str, neg: &str, inductance: f64) -> Self {
        Self {
            name: name.into(),
            pins: vec![pos.to_string(), neg.to_string()],
            inductance,
        }
    }

    pub(crate) fn behavior(&self) -> InductorBehavior {
        InductorBehavior {
            def: self.clone(),
            pos: Unknown::GROUND,
            neg: Unknown::GROUND,
            branch: Unknown::GROUND,
            flux: None,
            stamp: None,
            ac_stamp: None,
        }
    }
}

#[derive(Debug)]
pub struct InductorBehavior {
    def: Inductor,
    pos: Unknown,
    neg: Unknown,
    branch: Unknown,
    flux: Option<StateId>,
    stamp: Option<BranchStamp>,
    ac_stamp: Option<BranchStamp>,
}

impl Behavior for InductorBehavior {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            load: true,
            transient: true,
            frequency: true,
            ..Capabilities::default()
        }
    }

    fn setup(&mut self, _context: &crate::behavior::SetupContext<'_>) -> Result<()> {
        if !(self.def.inductance.is_finite() && self.def.inductance >= 0.0) {
            return Err(NodalError::invalid_parameter(
                &self.def.name,
                "inductance",
                format!("must be non-negative, got {}", self.def.inductance),
            ));
        }
        Ok(())
    }

    fn connect(&mut self, pins: &[Unknown], unknowns: &mut Unknowns) -> Result<()> {
        check_pins(&self.def.name, 2, pins)?;
        self.pos = pins[0];
        self.neg = pins[1];
        self.branch = unknowns.create_branch(&self.def.name)?;
        Ok(())
    }

    fn allocate(&mut self, system: &mut SparseSystem<f64>) -> Result<()> {
        self.stamp = Some(BranchStamp::allocate(
            system,
            self.pos,
            self.neg,
            self.branch,
        )?);
        Ok(())
    }

    fn unsetup(&mut self) {
        self.stamp = None;
        self.ac_stamp = None;
        self.flux = None;
    }

    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()> {
        let stamp = bound(&self.stamp, &self.def.name)?;
        stamp.load_incidence(context.system, 1.0);
        if context.state.mode != AnalysisMode::Transient {
            return Ok(());
        }
        let (time, flux) = match (context.time.as_deref_mut(), self.flux) {
            (Some(time), Some(flux)) => (time, flux),
            _ => return Ok(()),
        };

        let i = context.state.value(self.branch.index());
        time.pool_mut().set_value(flux, self.def.inductance * i);
        let companion = time.integrate(flux, self.def.inductance);

        context.system.sub(stamp.diagonal, companion.geq);
        context
            .system
            .add_rhs(stamp.rhs, companion.current - companion.geq * i);
        Ok(())
    }

    fn create_states(&mut self, pool: &mut StatePool) {
        self.flux = Some(pool.allocate());
    }

    fn initialize_states(&self, state: &RealState, pool: &mut StatePool) {
        if let Some(flux) = self.flux {
            pool.set_value(flux, self.def.inductance * state.value(self.branch.index()));
        }
    }

    fn truncate(&self, time: &TimeDomain) -> f64 {
        self.flux
            .map(|flux| time.truncate_state(flux))
            .unwrap_or(f64::INFINITY)
    }

    fn allocate_frequency(&mut self, system: &mut SparseSystem<Complex64>) -> Result<()> {
        self.ac_stamp = Some(BranchStamp::allocate(
            system,
            self.pos,
            self.neg,
            self.branch,
        )?);
        Ok(())
    }

    fn load_frequency(&mut self, context: &mut FrequencyContext<'_>) -> Result<()> {
        let stamp = bound(&self.ac_stamp, &self.def.name)?;
        stamp.load_incidence(context.system, Complex64::new(1.0, 0.0));
        context.system.sub(
            stamp.diagonal,
            context.state.laplace() * self.def.inductance,
        );
        Ok(())
    }

    fn property(&self, name: &str, context: &ExportContext<'_>) -> Option<f64> {
        let v = context
            .state
            .voltage_between(self.pos.index(), self.neg.index());
        let i = context.state.value(self.branch.index());
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "flux" => Some(self.def.inductance * i),
            "p" => Some(v * i),
            _ => None,
        }
    }

    fn frequency_property(&self, name: &str, state: &ComplexState) -> Option<Complex64> {
        let v = state.voltage_between(self.pos.index(), self.neg.index());
        let i = state.value(self.branch.index());
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(v * i.conj()),
            _ => None,
        }
    }

    fn inductor_port(&self) -> Option<InductorPort> {
        if self.branch.is_ground() {
            return None;
        }
        Some(InductorPort {
            branch: self.branch,
            inductance: self.def.inductance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::PivotConfig;
    use approx::assert_relative_eq;

    fn bind(behavior: &mut dyn Behavior, pins: &[&str]) -> (Unknowns, SparseSystem<f64>) {
        let mut unknowns = Unknowns::new();
        let pins: Vec<Unknown> = pins
            .iter()
            .map(|p| unknowns.map_node(p).unwrap())
            .collect();
        behavior.connect(&pins, &mut unknowns).unwrap();
        let mut system = SparseSystem::new(unknowns.len(), PivotConfig::default());
        behavior.allocate(&mut system).unwrap();
        (unknowns, system)
    }

    #[test]
    fn test_resistor_stamp() {
        let mut r = Resistor::new("R1", "a", "b", 1000.0).behavior();
        let (_, mut system) = bind(&mut r, &["a", "b"]);
        let state = RealState::new(2);
        r.load(&mut LoadContext {
            system: &mut system,
            state: &state,
            time: None,
        })
        .unwrap();

        let mut entries: Vec<_> = system.entries().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(entries.len(), 4);
        assert_relative_eq!(entries[0].1, 1e-3);
        assert_relative_eq!(entries[1].1, -1e-3);
    }

    #[test]
    fn test_resistor_temperature_coefficients() {
        let mut r = Resistor::new("R1", "a", "0", 1000.0)
            .with_temperature_coefficients(1e-3, 1e-6)
            .with_temperature(310.15)
            .behavior();
        let state = RealState::new(1);
        r.temperature(&state).unwrap();
        // dT = 10: factor = 1 + 0.01 + 0.0001
        assert_relative_eq!(1.0 / r.conductance, 1010.1, epsilon = 1e-9);
    }

    #[test]
    fn test_tiny_resistance_is_clamped() {
        let r = Resistor::new("R1", "a", "0", 0.0).behavior();
        assert_relative_eq!(r.conductance, 1e12);
    }

    #[test]
    fn test_resistor_rejects_three_pins() {
        let mut r = Resistor::new("R1", "a", "b", 1.0).behavior();
        let mut unknowns = Unknowns::new();
        let result = r.connect(&[Unknown(1), Unknown(2), Unknown(3)], &mut unknowns);
        assert!(matches!(result, Err(NodalError::PinMismatch { given: 3, .. })));
    }

    #[test]
    fn test_load_before_allocate_is_invalid_state() {
        let mut c = Capacitor::new("C1", "a", "0", 1e-6).behavior();
        let mut system = SparseSystem::new(1, PivotConfig::default());
        let state = RealState::new(1);
        let result = c.load(&mut LoadContext {
            system: &mut system,
            state: &state,
            time: None,
        });
        assert!(matches!(result, Err(NodalError::InvalidState { .. })));
    }

    #[test]
    fn test_inductor_is_a_short_at_dc() {
        let mut l = Inductor::new("L1", "a", "b", 1e-3).behavior();
        let (unknowns, mut system) = bind(&mut l, &["a", "b"]);
        assert_eq!(unknowns.len(), 3);
        let state = RealState::new(3);
        l.load(&mut LoadContext {
            system: &mut system,
            state: &state,
            time: None,
        })
        .unwrap();

        let branch = unknowns.find("L1#branch").unwrap().index();
        let diagonal = system.find_element(branch, branch).unwrap();
        assert_eq!(system.value(diagonal), 0.0);
        assert_eq!(l.inductor_port().unwrap().inductance, 1e-3);
    }
}
