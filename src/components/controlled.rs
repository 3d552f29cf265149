//! Linear controlled sources.

use num_complex::Complex64;

use crate::behavior::{
    bound, check_pins, Behavior, Capabilities, ExportContext, FrequencyContext, LoadContext,
};
use crate::circuit::{Unknown, Unknowns};
use crate::error::Result;
use crate::solver::mna::{BranchStamp, TransconductanceStamp};
use crate::solver::sparse::MatrixElement;
use crate::solver::{ComplexState, SparseSystem};

/// Voltage-controlled voltage source.
/// V[out+] - V[out-] = gain * (V[ctrl+] - V[ctrl-])
#[derive(Debug, Clone)]
pub struct Vcvs {
    pub name: String,
    pub pins: Vec<String>, // [out+, out-, ctrl+, ctrl-]
    pub gain: f64,
}

impl Vcvs {
    pub fn new(
        name: impl Into<String>,
        out_pos: &str,
        out_neg: &str,
        ctrl_pos: &str,
        ctrl_neg: &str,
        gain: f64,
    ) -> Self {
        Self {
            name: name.into(),
            pins: [out_pos, out_neg, ctrl_pos, ctrl_neg]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            gain,
        }
    }

    pub(crate) fn behavior(&self) -> VcvsBehavior {
        VcvsBehavior {
            def: self.clone(),
            pins: [Unknown::GROUND; 4],
            branch: Unknown::GROUND,
            handles: None,
            ac_handles: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct VcvsHandles {
    branch: BranchStamp,
    ctrl_pos: MatrixElement,
    ctrl_neg: MatrixElement,
}

impl VcvsHandles {
    fn allocate<T: crate::solver::Scalar>(
        system: &mut SparseSystem<T>,
        pins: &[Unknown; 4],
        branch: Unknown,
    ) -> Result<Self> {
        Ok(Self {
            branch: BranchStamp::allocate(system, pins[0], pins[1], branch)?,
            ctrl_pos: system.matrix_element(branch.index(), pins[2].index())?,
            ctrl_neg: system.matrix_element(branch.index(), pins[3].index())?,
        })
    }

    fn load<T: crate::solver::Scalar>(&self, system: &mut SparseSystem<T>, one: T, gain: T) {
        self.branch.load_incidence(system, one);
        system.sub(self.ctrl_pos, gain);
        system.add(self.ctrl_neg, gain);
    }
}

#[derive(Debug)]
pub struct VcvsBehavior {
    def: Vcvs,
    pins: [Unknown; 4],
    branch: Unknown,
    handles: Option<VcvsHandles>,
    ac_handles: Option<VcvsHandles>,
}

impl Behavior for VcvsBehavior {
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

    fn connect(&mut self, pins: &[Unknown], unknowns: &mut Unknowns) -> Result<()> {
        check_pins(&self.def.name, 4, pins)?;
        self.pins.copy_from_slice(pins);
        self.branch = unknowns.create_branch(&self.def.name)?;
        Ok(())
    }

    fn allocate(&mut self, system: &mut SparseSystem<f64>) -> Result<()> {
        self.handles = Some(VcvsHandles::allocate(system, &self.pins, self.branch)?);
        Ok(())
    }

    fn unsetup(&mut self) {
        self.handles = None;
        self.ac_handles = None;
    }

    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()> {
        bound(&self.handles, &self.def.name)?.load(context.system, 1.0, self.def.gain);
        Ok(())
    }

    fn allocate_frequency(&mut self, system: &mut SparseSystem<Complex64>) -> Result<()> {
        self.ac_handles = Some(VcvsHandles::allocate(system, &self.pins, self.branch)?);
        Ok(())
    }

    fn load_frequency(&mut self, context: &mut FrequencyContext<'_>) -> Result<()> {
        bound(&self.ac_handles, &self.def.name)?.load(
            context.system,
            Complex64::new(1.0, 0.0),
            Complex64::new(self.def.gain, 0.0),
        );
        Ok(())
    }

    fn property(&self, name: &str, context: &ExportContext<'_>) -> Option<f64> {
        let v = context
            .state
            .voltage_between(self.pins[0].index(), self.pins[1].index());
        let i = context.state.value(self.branch.index());
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(-v * i),
            _ => None,
        }
    }

    fn frequency_property(&self, name: &str, state: &ComplexState) -> Option<Complex64> {
        let v = state.voltage_between(self.pins[0].index(), self.pins[1].index());
        let i = state.value(self.branch.index());
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(-v * i.conj()),
            _ => None,
        }
    }
}

/// Voltage-controlled current source.
/// I = gm * (V[ctrl+] - V[ctrl-]), flowing from out+ through the source to out-.
#[derive(Debug, Clone)]
pub struct Vccs {
    pub name: String,
    pub pins: Vec<String>, // [out+, out-, ctrl+, ctrl-]
    pub transconductance: f64,
}

impl Vccs {
    pub fn new(
        name: impl Into<String>,
        out_pos: &str,
        out_neg: &str,
        ctrl_pos: &str,
        ctrl_neg: &str,
        transconductance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            pins: [out_pos, out_neg, ctrl_pos, ctrl_neg]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            transconductance,
        }
    }

    pub(crate) fn behavior(&self) -> VccsBehavior {
        VccsBehavior {
            def: self.clone(),
            pins: [Unknown::GROUND; 4],
            stamp: None,
            ac_stamp: None,
        }
    }
}

#[derive(Debug)]
pub struct VccsBehavior {
    def: Vccs,
    pins: [Unknown; 4],
    stamp: Option<TransconductanceStamp>,
    ac_stamp: Option<TransconductanceStamp>,
}

impl Behavior for VccsBehavior {
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

    fn connect(&mut self, pins: &[Unknown], _unknowns: &mut Unknowns) -> Result<()> {
        check_pins(&self.def.name, 4, pins)?;
        self.pins.copy_from_slice(pins);
        Ok(())
    }

    fn allocate(&mut self, system: &mut SparseSystem<f64>) -> Result<()> {
        let [op, on, cp, cn] = self.pins;
        self.stamp = Some(TransconductanceStamp::allocate(system, op, on, cp, cn)?);
        Ok(())
    }

    fn unsetup(&mut self) {
        self.stamp = None;
        self.ac_stamp = None;
    }

    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()> {
        bound(&self.stamp, &self.def.name)?.load(context.system, self.def.transconductance);
        Ok(())
    }

    fn allocate_frequency(&mut self, system: &mut SparseSystem<Complex64>) -> Result<()> {
        let [op, on, cp, cn] = self.pins;
        self.ac_stamp = Some(TransconductanceStamp::allocate(system, op, on, cp, cn)?);
        Ok(())
    }

    fn load_frequency(&mut self, context: &mut FrequencyContext<'_>) -> Result<()> {
        bound(&self.ac_stamp, &self.def.name)?.load(
            context.system,
            Complex64::new(self.def.transconductance, 0.0),
        );
        Ok(())
    }

    fn property(&self, name: &str, context: &ExportContext<'_>) -> Option<f64> {
        let state = context.state;
        let v = state.voltage_between(self.pins[0].index(), self.pins[1].index());
        let i = self.def.transconductance
            * state.voltage_between(self.pins[2].index(), self.pins[3].index());
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(-v * i),
            _ => None,
        }
    }

    fn frequency_property(&self, name: &str, state: &ComplexState) -> Option<Complex64> {
        let v = state.voltage_between(self.pins[0].index(), self.pins[1].index());
        let i = state.voltage_between(self.pins[2].index(), self.pins[3].index())
            * self.def.transconductance;
        match name {
            "v" => Some(v),
            "i" => Some(i),
            "p" => Some(-v * i.conj()),
            _ => None,
        }
    }
}
