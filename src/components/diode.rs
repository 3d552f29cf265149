//! Junction diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1) + gmin * V
//!
//! For Newton-Raphson iteration, we linearize around the current operating point:
//!   I ≈ I0 + G_d * (V - V0)
//!
//! where G_d = dI/dV = Is/(n*Vt) * exp(V0/(n*Vt)) + gmin
//!
//! Deep reverse bias (V < -3 n Vt) uses a cubic approximation that keeps the
//! current bounded. The junction charge combines depletion charge (Cj0, Vj,
//! M, linearized above Fc * Vj) and diffusion charge (Tt * I). A series
//! resistance Rs adds an internal node.

use num_complex::Complex64;

use super::params::Parameter;
use crate::behavior::{
    bound, check_pins, Behavior, Capabilities, ExportContext, FrequencyContext, LoadContext,
    SetupContext,
};
use crate::circuit::{Unknown, Unknowns};
use crate::error::{NodalError, Result};
use crate::solver::mna::{ConductanceStamp, CurrentStamp};
use crate::solver::{
    AnalysisMode, ComplexState, InitMode, RealState, SparseSystem, StateId, StatePool, TimeDomain,
};
use crate::{BOLTZMANN, CHARGE};

/// Parameters for a diode model.
#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub is: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub n: f64,
    /// Series resistance (Rs); zero means no internal node
    pub rs: f64,
    /// Zero-bias junction capacitance (Cj0)
    pub cj0: f64,
    /// Junction potential (Vj)
    pub vj: f64,
    /// Grading coefficient (M)
    pub m: f64,
    /// Forward-bias depletion capacitance coefficient (Fc)
    pub fc: f64,
    /// Transit time (Tt)
    pub tt: f64,
    /// Activation energy (Eg), eV
    pub eg: f64,
    /// Saturation current temperature exponent (Xti)
    pub xti: f64,
    /// Temperature at which the parameters were measured
    pub tnom: Parameter,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            n: 1.0,
            rs: 0.0,
            cj0: 0.0,
            vj: 1.0,
            m: 0.5,
            fc: 0.5,
            tt: 0.0,
            eg: 1.11,
            xti: 3.0,
            tnom: Parameter::new(crate::REFERENCE_TEMPERATURE),
        }
    }
}

impl DiodeParams {
    /// Create parameters for a germanium diode (lower forward voltage).
    pub fn germanium() -> Self {
        Self {
            is: 1e-9,
            n: 1.5,
            eg: 0.67,
            ..Self::default()
        }
    }

    fn validate(&self, entity: &str) -> Result<()> {
        let checks = [
            ("is", self.is > 0.0),
            ("n", self.n > 0.0),
            ("rs", self.rs >= 0.0),
            ("cj0", self.cj0 >= 0.0),
            ("vj", self.vj > 0.0),
            ("m", self.m >= 0.0 && self.m < 1.0),
            ("fc", self.fc >= 0.0 && self.fc < 1.0),
            ("tt", self.tt >= 0.0),
        ];
        for (name, ok) in checks {
            if !ok {
                return Err(NodalError::invalid_parameter(
                    entity,
                    name,
                    "value out of range",
                ));
            }
        }
        Ok(())
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    pub pins: Vec<String>, // [anode, cathode]
    pub params: DiodeParams,
    /// Area factor scaling Is, Cj0 and 1/Rs
    pub area: f64,
    /// Instance temperature; defaults to the circuit temperature
    pub temperature: Parameter,
}

impl Diode {
    /// Create a new diode.
    pub fn new(name: impl Into<String>, anode: &str, cathode: &str, params: DiodeParams) -> Self {
        Self {
            name: name.into(),
            pins: vec![anode.to_string(), cathode.to_string()],
            params,
            area: 1.0,
            temperature: Parameter::new(crate::REFERENCE_TEMPERATURE),
        }
    }

    /// Set the area factor.
    pub fn with_area(mut self, area: f64) -> Self {
        self.area = area;
        self
    }

    pub(crate) fn behavior(&self) -> DiodeBehavior {
        let vt = BOLTZMANN * crate::REFERENCE_TEMPERATURE / CHARGE;
        let mut behavior = DiodeBehavior {
            def: self.clone(),
            anode: Unknown::GROUND,
            cathode: Unknown::GROUND,
            internal: Unknown::GROUND,
            thermal: Thermal::default(),
            operating: Operating::default(),
            last_pass: None,
            previous_vd: 0.0,
            charge: None,
            handles: None,
            ac_handles: None,
            small_signal: (0.0, 0.0),
        };
        behavior.thermal = Thermal::compute(&self.params, self.area, vt);
        behavior
    }
}

/// Temperature-adjusted constants.
#[derive(Debug, Clone, Copy, Default)]
struct Thermal {
    /// n * Vt
    vte: f64,
    is: f64,
    vcrit: f64,
    cj0: f64,
    /// Depletion charge constants for the linearized region above Fc * Vj.
    depletion_corner: f64,
    f1: f64,
    f2: f64,
    f3: f64,
}

impl Thermal {
    fn compute(params: &DiodeParams, area: f64, vt: f64) -> Self {
        let vte = params.n * vt;
        let is = params.is * area;
        Self::with_saturation(params, area, vte, is)
    }

    fn with_saturation(params: &DiodeParams, area: f64, vte: f64, is: f64) -> Self {
        let m = params.m;
        Self {
            vte,
            is,
            vcrit: vte * (vte / (std::f64::consts::SQRT_2 * is)).ln(),
            cj0: params.cj0 * area,
            depletion_corner: params.fc * params.vj,
            f1: params.vj * (1.0 - (1.0 - params.fc).powf(1.0 - m)) / (1.0 - m),
            f2: (1.0 - params.fc).powf(1.0 + m),
            f3: 1.0 - params.fc * (1.0 + m),
        }
    }
}

/// Junction quantities from the last load.
#[derive(Debug, Clone, Copy, Default)]
struct Operating {
    vd: f64,
    id: f64,
    gd: f64,
}

#[derive(Debug, Clone, Copy)]
struct DiodeHandles {
    series: Option<ConductanceStamp>,
    junction: ConductanceStamp,
    current: CurrentStamp,
}

#[derive(Debug, Clone, Copy)]
struct DiodeAcHandles {
    series: Option<ConductanceStamp>,
    junction: ConductanceStamp,
}

#[derive(Debug)]
pub struct DiodeBehavior {
    def: Diode,
    anode: Unknown,
    cathode: Unknown,
    /// Junction anode side: the anode itself, or the internal node when Rs > 0
    internal: Unknown,
    thermal: Thermal,
    operating: Operating,
    /// Newton pass whose junction voltage `operating.vd` holds.
    last_pass: Option<u64>,
    /// Limited junction voltage of the previous pass.
    previous_vd: f64,
    charge: Option<StateId>,
    handles: Option<DiodeHandles>,
    ac_handles: Option<DiodeAcHandles>,
    /// Junction conductance and capacitance at the operating point.
    small_signal: (f64, f64),
}

/// Limit the junction voltage step between Newton iterations.
///
/// Above the critical voltage, a large step is replaced by a logarithmic
/// one so exp() stays in range. Returns the limited voltage and whether
/// limiting happened.
pub fn limit_voltage_step(v_new: f64, v_old: f64, vt: f64, vcrit: f64) -> (f64, bool) {
    if v_new > vcrit && (v_new - v_old).abs() > vt + vt {
        let limited = if v_old > 0.0 {
            let arg = 1.0 + (v_new - v_old) / vt;
            if arg > 0.0 {
                v_old + vt * arg.ln()
            } else {
                vcrit
            }
        } else {
            vt * (v_new / vt).ln()
        };
        (limited, true)
    } else {
        (v_new, false)
    }
}

impl DiodeBehavior {
    /// Junction current and conductance at `vd`, including gmin.
    fn junction(&self, vd: f64, gmin: f64) -> (f64, f64) {
        let Thermal { vte, is, .. } = self.thermal;
        if vd >= -3.0 * vte {
            let evd = (vd / vte).exp();
            (is * (evd - 1.0) + gmin * vd, is * evd / vte + gmin)
        } else {
            let arg = 3.0 * vte / (vd * std::f64::consts::E);
            let arg = arg * arg * arg;
            (-is * (1.0 + arg) + gmin * vd, is * 3.0 * arg / vd + gmin)
        }
    }

    /// Junction charge and incremental capacitance at `vd`.
    fn charge_at(&self, vd: f64, id: f64, gd: f64) -> (f64, f64) {
        let params = &self.def.params;
        let t = &self.thermal;
        let (vj, m) = (params.vj, params.m);
        let (mut q, mut cap) = (params.tt * id, params.tt * gd);
        if t.cj0 > 0.0 {
            if vd < t.depletion_corner {
                let arg = 1.0 - vd / vj;
                let sarg = (-m * arg.ln()).exp();
                q += vj * t.cj0 * (1.0 - arg * sarg) / (1.0 - m);
                cap += t.cj0 * sarg;
            } else {
                let czof2 = t.cj0 / t.f2;
                let corner = t.depletion_corner;
                q += t.cj0 * t.f1
                    + czof2 * (t.f3 * (vd - corner) + (m / (vj + vj)) * (vd * vd - corner * corner));
                cap += czof2 * (t.f3 + m * vd / vj);
            }
        }
        (q, cap)
    }

    fn has_charge(&self) -> bool {
        self.thermal.cj0 > 0.0 || self.def.params.tt > 0.0
    }

    fn series_conductance(&self) -> f64 {
        self.def.area / self.def.params.rs
    }
}

impl Behavior for DiodeBehavior {
    fn name(&self) -> &str {
        &self.def.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            temperature: true,
            load: true,
            convergence: true,
            transient: true,
            frequency: true,
        }
    }

    fn setup(&mut self, _context: &SetupContext<'_>) -> Result<()> {
        self.def.params.validate(&self.def.name)?;
        if !(self.def.area > 0.0) {
            return Err(NodalError::invalid_parameter(
                &self.def.name,
                "area",
                "must be positive",
            ));
        }
        Ok(())
    }

    fn connect(&mut self, pins: &[Unknown], unknowns: &mut Unknowns) -> Result<()> {
        check_pins(&self.def.name, 2, pins)?;
        self.anode = pins[0];
        self.cathode = pins[1];
        self.internal = if self.def.params.rs > 0.0 {
            unknowns.create_internal(&self.def.name, "internal")?
        } else {
            self.anode
        };
        Ok(())
    }

    fn allocate(&mut self, system: &mut SparseSystem<f64>) -> Result<()> {
        let series = if self.def.params.rs > 0.0 {
            Some(ConductanceStamp::allocate(system, self.anode, self.internal)?)
        } else {
            None
        };
        self.handles = Some(DiodeHandles {
            series,
            junction: ConductanceStamp::allocate(system, self.internal, self.cathode)?,
            current: CurrentStamp::allocate(system, self.internal, self.cathode)?,
        });
        Ok(())
    }

    fn unsetup(&mut self) {
        self.handles = None;
        self.ac_handles = None;
        self.charge = None;
        self.last_pass = None;
    }

    fn temperature(&mut self, state: &RealState) -> Result<()> {
        let params = &self.def.params;
        let temp = self.def.temperature.or(state.temperature);
        let tnom = params.tnom.or(state.nominal_temperature);
        let vt = BOLTZMANN * temp / CHARGE;
        let vte = params.n * vt;
        let ratio = temp / tnom;

        let factor = ((ratio - 1.0) * params.eg / vte).exp() * ratio.powf(params.xti / params.n);
        let is = params.is * self.def.area * factor;
        self.thermal = Thermal::with_saturation(params, self.def.area, vte, is);
        Ok(())
    }

    fn load(&mut self, context: &mut LoadContext<'_>) -> Result<()> {
        let handles = bound(&self.handles, &self.def.name)?;
        let state = context.state;

        // Start of a new Newton pass: the previous junction voltage moves back
        if self.last_pass != Some(state.iteration) {
            if self.last_pass.is_some() {
                self.previous_vd = self.operating.vd;
            }
            self.last_pass = Some(state.iteration);
        }

        let vd = match state.init {
            InitMode::Junction => self.thermal.vcrit,
            InitMode::Float => {
                let raw = state.voltage_between(self.internal.index(), self.cathode.index());
                let (limited, _) =
                    limit_voltage_step(raw, self.previous_vd, self.thermal.vte, self.thermal.vcrit);
                limited
            }
        };

        let (mut cd, mut gd) = self.junction(vd, state.gmin);
        self.operating = Operating { vd, id: cd, gd };

        if state.mode == AnalysisMode::Transient && self.has_charge() {
            if let (Some(time), Some(charge)) = (context.time.as_deref_mut(), self.charge) {
                let (q, cap) = self.charge_at(vd, cd, gd);
                time.pool_mut().set_value(charge, q);
                let companion = time.integrate(charge, cap);
                gd += companion.geq;
                cd += companion.current;
            }
        }

        if let Some(series) = handles.series {
            series.load(context.system, self.series_conductance());
        }
        handles.junction.load(context.system, gd);
        handles.current.load(context.system, cd - gd * vd);
        Ok(())
    }

    fn is_convergent(&self, state: &RealState) -> bool {
        let vd = state.voltage_between(self.internal.index(), self.cathode.index());
        let Operating { vd: vd_old, id, gd } = self.operating;

        // Linear prediction from the last load against the actual current
        let predicted = id + gd * (vd - vd_old);
        let (actual, _) = self.junction(vd, state.gmin);
        let tol = state.reltol * predicted.abs().max(actual.abs()) + state.abstol;
        (predicted - actual).abs() <= tol
    }

    fn create_states(&mut self, pool: &mut StatePool) {
        if self.has_charge() {
            self.charge = Some(pool.allocate());
        }
    }

    fn initialize_states(&self, state: &RealState, pool: &mut StatePool) {
        if let Some(charge) = self.charge {
            let vd = state.voltage_between(self.internal.index(), self.cathode.index());
            let (id, gd) = self.junction(vd, state.gmin);
            pool.set_value(charge, self.charge_at(vd, id, gd).0);
        }
    }

    fn truncate(&self, time: &TimeDomain) -> f64 {
        self.charge
            .map(|charge| time.truncate_state(charge))
            .unwrap_or(f64::INFINITY)
    }

    fn allocate_frequency(&mut self, system: &mut SparseSystem<Complex64>) -> Result<()> {
        let series = if self.def.params.rs > 0.0 {
            Some(ConductanceStamp::allocate(system, self.anode, self.internal)?)
        } else {
            None
        };
        self.ac_handles = Some(DiodeAcHandles {
            series,
            junction: ConductanceStamp::allocate(system, self.internal, self.cathode)?,
        });
        Ok(())
    }

    fn init_frequency(&mut self, state: &RealState) {
        let vd = state.voltage_between(self.internal.index(), self.cathode.index());
        let (id, gd) = self.junction(vd, state.gmin);
        let (_, cap) = self.charge_at(vd, id, gd);
        self.small_signal = (gd, cap);
    }

    fn load_frequency(&mut self, context: &mut FrequencyContext<'_>) -> Result<()> {
        let handles = bound(&self.ac_handles, &self.def.name)?;
        let (gd, cap) = self.small_signal;
        if let Some(series) = handles.series {
            series.load(
                context.system,
                Complex64::new(self.series_conductance(), 0.0),
            );
        }
        handles
            .junction
            .load(context.system, context.state.laplace() * cap + gd);
        Ok(())
    }

    fn property(&self, name: &str, context: &ExportContext<'_>) -> Option<f64> {
        let state = context.state;
        let vd = state.voltage_between(self.internal.index(), self.cathode.index());
        let (id, gd) = self.junction(vd, state.gmin);
        match name {
            "v" => Some(state.voltage_between(self.anode.index(), self.cathode.index())),
            "vd" => Some(vd),
            "i" | "id" => Some(id),
            "gd" => Some(gd),
            "p" => Some(id * state.voltage_between(self.anode.index(), self.cathode.index())),
            "cd" => Some(self.charge_at(vd, id, gd).1),
            "vcrit" => Some(self.thermal.vcrit),
            "is" => Some(self.thermal.is),
            _ => None,
        }
    }

    fn frequency_property(&self, name: &str, state: &ComplexState) -> Option<Complex64> {
        let (gd, cap) = self.small_signal;
        let vd = state.voltage_between(self.internal.index(), self.cathode.index());
        let i = vd * (state.laplace() * cap + gd);
        match name {
            "v" => Some(state.voltage_between(self.anode.index(), self.cathode.index())),
            "vd" => Some(vd),
            "i" => Some(i),
            "p" => Some(state.voltage_between(self.anode.index(), self.cathode.index()) * i.conj()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn diode() -> DiodeBehavior {
        Diode::new("D1", "a", "0", DiodeParams::default()).behavior()
    }

    #[test]
    fn test_diode_forward_bias() {
        let d = diode();
        let (i0, _) = d.junction(0.0, 0.0);
        assert!(i0.abs() < 1e-20);

        let (i_small, _) = d.junction(0.3, 0.0);
        let (i_large, _) = d.junction(0.6, 0.0);
        assert!(i_large > i_small * 100.0);
    }

    #[test]
    fn test_diode_reverse_bias() {
        let d = diode();
        let (i_rev, g_rev) = d.junction(-1.0, 0.0);
        assert!(i_rev < 0.0);
        assert!(i_rev > -2.0 * d.thermal.is);
        assert!(g_rev > 0.0);
    }

    #[test]
    fn test_reverse_model_is_continuous() {
        let d = diode();
        let corner = -3.0 * d.thermal.vte;
        let (above, _) = d.junction(corner + 1e-9, 0.0);
        let (below, _) = d.junction(corner - 1e-9, 0.0);
        assert_relative_eq!(above, below, max_relative = 1e-6);
    }

    #[test]
    fn test_limiting_only_above_vcrit() {
        let vt = 0.025;
        let (v, limited) = limit_voltage_step(0.3, 0.0, vt, 0.6);
        assert_eq!(v, 0.3);
        assert!(!limited);

        let (v, limited) = limit_voltage_step(5.0, 0.7, vt, 0.6);
        assert!(limited);
        assert!(v < 0.9);
        assert!(v > 0.7);
    }

    #[test]
    fn test_critical_voltage() {
        let d = diode();
        let vte = d.thermal.vte;
        assert_relative_eq!(
            d.thermal.vcrit,
            vte * (vte / (std::f64::consts::SQRT_2 * 1e-14)).ln()
        );
    }

    #[test]
    fn test_saturation_current_rises_with_temperature() {
        let mut d = diode();
        let mut state = RealState::new(1);
        d.temperature(&state).unwrap();
        let nominal = d.thermal.is;
        assert_relative_eq!(nominal, 1e-14, max_relative = 1e-12);

        state.temperature += 10.0;
        d.temperature(&state).unwrap();
        assert!(d.thermal.is > 2.0 * nominal);
    }

    #[test]
    fn test_depletion_charge_is_continuous_at_corner() {
        let params = DiodeParams {
            cj0: 1e-12,
            ..DiodeParams::default()
        };
        let d = Diode::new("D1", "a", "0", params).behavior();
        let corner = d.thermal.depletion_corner;
        let (q_below, c_below) = d.charge_at(corner - 1e-9, 0.0, 0.0);
        let (q_above, c_above) = d.charge_at(corner + 1e-9, 0.0, 0.0);
        assert_relative_eq!(q_below, q_above, max_relative = 1e-6);
        assert_relative_eq!(c_below, c_above, max_relative = 1e-6);
    }

    #[test]
    fn test_convergence_prediction() {
        let mut d = diode();
        let mut state = RealState::new(1);
        state.init = InitMode::Float;
        d.anode = Unknown(1);
        d.internal = Unknown(1);
        let vd = 0.6;
        let (id, gd) = d.junction(vd, 0.0);
        d.operating = Operating { vd, id, gd };

        state.solution[1] = vd;
        assert!(d.is_convergent(&state));

        state.solution[1] = vd + 0.05;
        assert!(!d.is_convergent(&state));
    }
}
