//! Solver state shared with behaviors during load passes.

use num_complex::Complex64;

/// How junctions are initialized on the current Newton iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMode {
    /// First iteration of a fresh operating point: junctions start from
    /// their critical voltage instead of the (meaningless) solution.
    Junction,
    /// Normal iteration: devices evaluate at the current solution.
    Float,
}

/// Which analysis is driving the load pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Standalone operating point or DC sweep. Sources use their DC value,
    /// reactive elements are open (C) or shorted (L).
    Dc,
    /// Operating point preceding a transient run. As `Dc`, except sources
    /// evaluate their waveforms at time zero.
    TransientOp,
    /// Timepoint of a transient run. Reactive elements are integrated.
    Transient,
}

/// Real-valued state read by every load pass.
#[derive(Debug, Clone)]
pub struct RealState {
    /// Current iterate, indexed by unknown (slot 0 is ground).
    pub solution: Vec<f64>,
    /// Previous iterate.
    pub old_solution: Vec<f64>,
    /// Junction initialization mode.
    pub init: InitMode,
    /// Active analysis.
    pub mode: AnalysisMode,
    /// Simulated time (zero outside transient).
    pub time: f64,
    /// Circuit temperature (kelvin).
    pub temperature: f64,
    /// Nominal temperature (kelvin).
    pub nominal_temperature: f64,
    /// Junction minimum conductance.
    pub gmin: f64,
    /// Scale applied to independent sources (source stepping).
    pub source_factor: f64,
    /// Relative tolerance for device convergence checks.
    pub reltol: f64,
    /// Absolute current tolerance for device convergence checks.
    pub abstol: f64,
    /// Newton pass counter, bumped by the driver before every load.
    pub iteration: u64,
}

impl RealState {
    /// Create a zeroed state for `size` unknowns.
    pub fn new(size: usize) -> Self {
        Self {
            solution: vec![0.0; size + 1],
            old_solution: vec![0.0; size + 1],
            init: InitMode::Junction,
            mode: AnalysisMode::Dc,
            time: 0.0,
            temperature: crate::REFERENCE_TEMPERATURE,
            nominal_temperature: crate::REFERENCE_TEMPERATURE,
            gmin: 0.0,
            source_factor: 1.0,
            reltol: 1e-3,
            abstol: 1e-12,
            iteration: 0,
        }
    }

    /// Value of an unknown in the current iterate.
    pub fn value(&self, index: usize) -> f64 {
        self.solution.get(index).copied().unwrap_or(0.0)
    }

    /// Voltage between two unknowns in the current iterate.
    pub fn voltage_between(&self, pos: usize, neg: usize) -> f64 {
        self.value(pos) - self.value(neg)
    }

    /// Voltage between two unknowns in the previous iterate.
    pub fn old_voltage_between(&self, pos: usize, neg: usize) -> f64 {
        let old = |i: usize| self.old_solution.get(i).copied().unwrap_or(0.0);
        old(pos) - old(neg)
    }

    /// Whether independent sources should follow their waveforms.
    pub fn use_waveforms(&self) -> bool {
        self.mode != AnalysisMode::Dc
    }
}

/// Complex-valued state for a frequency point.
#[derive(Debug, Clone)]
pub struct ComplexState {
    /// Small-signal solution, indexed by unknown (slot 0 is ground).
    pub solution: Vec<Complex64>,
    /// Frequency in hertz.
    pub frequency: f64,
}

impl ComplexState {
    /// Create a zeroed state for `size` unknowns.
    pub fn new(size: usize) -> Self {
        Self {
            solution: vec![Complex64::new(0.0, 0.0); size + 1],
            frequency: 0.0,
        }
    }

    /// Angular frequency.
    pub fn omega(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.frequency
    }

    /// Laplace variable `s = jω`.
    pub fn laplace(&self) -> Complex64 {
        Complex64::new(0.0, self.omega())
    }

    /// Phasor of an unknown.
    pub fn value(&self, index: usize) -> Complex64 {
        self.solution
            .get(index)
            .copied()
            .unwrap_or_else(|| Complex64::new(0.0, 0.0))
    }

    /// Phasor voltage between two unknowns.
    pub fn voltage_between(&self, pos: usize, neg: usize) -> Complex64 {
        self.value(pos) - self.value(neg)
    }
}
