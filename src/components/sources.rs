//! Independent voltage and current sources.
//!
//! A source carries a DC value, an optional transient waveform, and an AC
//! phasor (magnitude, phase in degrees). The DC value is what operating
//! points and DC sweeps use; the waveform takes over from the transient
//! operating point on. Source stepping scales the value by the state's
//! source factor.

use num_complex::Complex64;

use super::waveforms::Waveform;
use crate::behavior::{
    bound, check_pins, Behavior, Capabilities, ExportContext, FrequencyContext, LoadContext,
    SetupContext,
};
use crate::circuit::{Unknown, Unknowns};
use crate::error::Result;
use crate::solver::mna::{BranchStamp, CurrentStamp};
use crate::solver::{ComplexState, RealState, SparseSystem};

/// Value shared by both source kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceValue {
    pub dc: f64,
    pub waveform: Option<Waveform>,
    pub ac_magnitude: f64,
    /// AC phase in degrees.
    pub ac_phase: f64,
}

impl SourceValue {
    fn new(dc: f64) -> Self {
        Self {
            dc,
            waveform: None,
            ac_magnitude: 0.0,
            ac_phase: 0.0,
        }
    }

    /// Value at the state's time, scaled by its source factor.
    pub fn at(&self, state: &RealState) -> f64 {
        let base = match (&self.waveform, state.use_waveforms()) {
            (Some(waveform), true) => waveform.value_at(state.time),
            _ => self.dc,
        };
        base * state.source_factor
    }

    /// AC phasor.
    pub fn phasor(&self) -> Complex64 {
        Complex64::from_polar(self.ac_magnitude, self.ac_phase.to_radians())
    }

    fn validate(&self, entity: &str) -> Result<()> {
        match &self.waveform {
            Some(waveform) => waveform.validate(entity),
            None => Ok(()),
        }
    }

    fn breakpoints(&self, final_time: f64) -> Vec<f64> {
        self.waveform
            .as_ref()
            .map(|w| w.breakpoints(final_time))
            .unwrap_or_default()
    }
}

/// A voltage source component.
///
/// Voltage sources require an extra row/column in the MNA matrix for the
/// branch current. The source enforces: V+ - V- = V_source
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    pub pins: Vec<String>, // [positive, negative]
    pub value: SourceValue,
}

impl VoltageSource {
    /// Create a DC voltage source.
    pub fn new(name: impl Into<String>, pos: &str, neg: &str, dc: f64) -> Self {
        Self {
            name: name.into(),
            pins: vec![pos.to_string(), neg.to_string()],
            value: SourceValue::new(dc),
        }
    }

    /// Attach a transient waveform.
    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.value.waveform = Some(waveform);
        self
    }

    /// Set the AC magnitude and phase (degrees).
    pub fn with_ac(mut self, magnitude: f64, phase: f64) -> Self {
        self.value.ac_magnitude = magnitude;
        self.value.ac_phase = phase;
        self
    }

    pub(crate) fn behavior(&self) -> VoltageSourceBehavior {
        VoltageSourceBehavior {
            def: self.clone(),
            pos: Unknown::GROUND,
            neg: Unknown::GROUND,
            branch: Unknown::GROUND,
            stamp: None,
            ac_stamp: None,
        }
    }
}

#[derive(Debug)]
pub struct VoltageSourceBehavior {
    def: VoltageSource,
    pos: Unknown,
    neg: Unknown,
    branch: Unknown,
    stamp: Option<BranchStamp>,
    ac_stamp: Option<BranchStamp>,
}

impl Behavior for VoltageSourceBehavior {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            load: true,
            frequency: true,
            ..Capabilities::default()
        }
    }

    fn setup(&mut self, _context: &SetupContext<'_>) -> Result<()> {
        self.def.value.validate(&self.def.name)
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
    }

    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()> {
        let stamp = bound(&self.stamp, &self.def.name)?;
        stamp.load_incidence(context.system, 1.0);
        context
            .system
            .add_rhs(stamp.rhs, self.def.value.at(context.state));
        Ok(())
    }

    fn breakpoints(&self, final_time: f64) -> Vec<f64> {
        self.def.value.breakpoints(final_time)
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
        context.system.add_rhs(stamp.rhs, self.def.value.phasor());
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
            // Power delivered to the circuit
            "p" => Some(-v * i),
            _ => None,
        }
    }

    fn frequency_property(&self, name: &str, state: &ComplexState) -> Option<Complex64> {
        let v = state.voltage_between(self.pos.index(), self.neg.index());
        let i = state.value(self.branch.index());
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(-v * i.conj()),
            _ => None,
        }
    }

    fn set_dc_value(&mut self, value: f64) -> bool {
        self.def.value.dc = value;
        true
    }
}

/// A current source component.
///
/// The current flows from n+ through the source to n-, so it leaves the
/// circuit at n+ and re-enters at n-. Current sources add directly to the
/// RHS vector of the MNA equations.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub pins: Vec<String>, // [positive, negative]
    pub value: SourceValue,
}

impl CurrentSource {
    /// Create a DC current source.
    pub fn new(name: impl Into<String>, pos: &str, neg: &str, dc: f64) -> Self {
        Self {
            name: name.into(),
            pins: vec![pos.to_string(), neg.to_string()],
            value: SourceValue::new(dc),
        }
    }

    /// Attach a transient waveform.
    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.value.waveform = Some(waveform);
        self
    }

    /// Set the AC magnitude and phase (degrees).
    pub fn with_ac(mut self, magnitude: f64, phase: f64) -> Self {
        self.value.ac_magnitude = magnitude;
        self.value.ac_phase = phase;
        self
    }

    pub(crate) fn behavior(&self) -> CurrentSourceBehavior {
        CurrentSourceBehavior {
            def: self.clone(),
            pos: Unknown::GROUND,
            neg: Unknown::GROUND,
            stamp: None,
            ac_stamp: None,
        }
    }
}

#[derive(Debug)]
pub struct CurrentSourceBehavior {
    def: CurrentSource,
    pos: Unknown,
    neg: Unknown,
    stamp: Option<CurrentStamp>,
    ac_stamp: Option<CurrentStamp>,
}

impl Behavior for CurrentSourceBehavior {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            load: true,
            frequency: true,
            ..Capabilities::default()
        }
    }

    fn setup(&mut self, _context: &SetupContext<'_>) -> Result<()> {
        self.def.value.validate(&self.def.name)
    }

    fn connect(&mut self, pins: &[Unknown], _unknowns: &mut Unknowns) -> Result<()> {
        check_pins(&self.def.name, 2, pins)?;
        self.pos = pins[0];
        self.neg = pins[1];
        Ok(())
    }

    fn allocate(&mut self, system: &mut SparseSystem<f64>) -> Result<()> {
        self.stamp = Some(CurrentStamp::allocate(system, self.pos, self.neg)?);
        Ok(())
    }

    fn unsetup(&mut self) {
        self.stamp = None;
        self.ac_stamp = None;
    }

    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()> {
        let stamp = bound(&self.stamp, &self.def.name)?;
        stamp.load(context.system, self.def.value.at(context.state));
        Ok(())
    }

    fn breakpoints(&self, final_time: f64) -> Vec<f64> {
        self.def.value.breakpoints(final_time)
    }

    fn allocate_frequency(&mut self, system: &mut SparseSystem<Complex64>) -> Result<()> {
        self.ac_stamp = Some(CurrentStamp::allocate(system, self.pos, self.neg)?);
        Ok(())
    }

    fn load_frequency(&mut self, context: &mut FrequencyContext<'_>) -> Result<()> {
        let stamp = bound(&self.ac_stamp, &self.def.name)?;
        stamp.load(context.system, self.def.value.phasor());
        Ok(())
    }

    fn property(&self, name: &str, context: &ExportContext<'_>) -> Option<f64> {
        let v = context
            .state
            .voltage_between(self.pos.index(), self.neg.index());
        let i = self.def.value.at(context.state);
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(-v * i),
            _ => None,
        }
    }

    fn frequency_property(&self, name: &str, state: &ComplexState) -> Option<Complex64> {
        let v = state.voltage_between(self.pos.index(), self.neg.index());
        let i = self.def.value.phasor();
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(-v * i.conj()),
            _ => None,
        }
    }

    fn set_dc_value(&mut self, value: f64) -> bool {
        self.def.value.dc = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::AnalysisMode;
    use approx::assert_relative_eq;

    #[test]
    fn test_source_value_modes() {
        let source = VoltageSource::new("V1", "a", "0", 2.0)
            .with_waveform(Waveform::pulse(0.0, 5.0, 1e-6, 1e-9, 1e-9, 1e-6, 0.0));
        let mut state = RealState::new(2);

        // Plain DC uses the DC value
        assert_eq!(source.value.at(&state), 2.0);

        // Transient operating point follows the waveform at t = 0
        state.mode = AnalysisMode::TransientOp;
        assert_eq!(source.value.at(&state), 0.0);

        state.mode = AnalysisMode::Transient;
        state.time = 1.5e-6;
        assert_eq!(source.value.at(&state), 5.0);

        state.source_factor = 0.5;
        assert_eq!(source.value.at(&state), 2.5);
    }

    #[test]
    fn test_ac_phasor() {
        let source = CurrentSource::new("I1", "a", "0", 0.0).with_ac(2.0, 90.0);
        let phasor = source.value.phasor();
        assert_relative_eq!(phasor.re, 0.0, epsilon = 1e-12);
        assert_relative_eq!(phasor.im, 2.0);
    }

    #[test]
    fn test_sweep_override() {
        let mut behavior = VoltageSource::new("V1", "a", "0", 1.0).behavior();
        assert!(behavior.set_dc_value(3.0));
        assert_eq!(behavior.def.value.dc, 3.0);
    }
}
