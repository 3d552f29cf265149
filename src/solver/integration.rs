//! Implicit integration of device states.
//!
//! Reactive devices own state entries (capacitor charge, inductor flux) in a
//! [`StatePool`]. Each entry keeps a short history of values and time
//! derivatives. The active formula turns the derivative into an algebraic
//! relation in the current value:
//!
//! ```text
//! dq/dt ≈ ag0 * q0 + (history terms)
//! ```
//!
//! so a device with `q = C v` stamps a conductance `ag0 * C` plus a
//! history current. History only advances when a timestep is accepted.
//!
//! ## Truncation error
//!
//! The local truncation error of each state is estimated from divided
//! differences of its value history. The returned quantity is the largest
//! step that would keep the error within tolerance.

/// Number of history slots kept per state (current plus three past points).
pub const HISTORY: usize = 4;

/// Truncation error constants for orders 1 and 2.
const TRAPEZOIDAL_ERROR: [f64; 2] = [0.5, 1.0 / 12.0];
const GEAR_ERROR: [f64; 2] = [0.5, 2.0 / 9.0];

/// Integration formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationMethod {
    /// Backward Euler at order 1, trapezoidal rule at order 2.
    #[default]
    Trapezoidal,
    /// Backward differentiation (Gear) formulas with variable step.
    Gear,
}

impl std::str::FromStr for IntegrationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trap" | "trapezoidal" => Ok(Self::Trapezoidal),
            "gear" | "bdf" => Ok(Self::Gear),
            other => Err(format!("unknown integration method '{}'", other)),
        }
    }
}

/// Index of one state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(usize);

/// Value and derivative history of every state entry.
///
/// Slot 0 is the point being solved; slot `k` is `k` accepted steps back.
#[derive(Debug, Clone, Default)]
pub struct StatePool {
    values: Vec<[f64; HISTORY]>,
    derivatives: Vec<[f64; HISTORY]>,
}

impl StatePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new state entry.
    pub fn allocate(&mut self) -> StateId {
        self.values.push([0.0; HISTORY]);
        self.derivatives.push([0.0; HISTORY]);
        StateId(self.values.len() - 1)
    }

    /// Number of state entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no state has been allocated.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Current value.
    pub fn value(&self, id: StateId) -> f64 {
        self.values[id.0][0]
    }

    /// Value `k` accepted steps back.
    pub fn previous(&self, id: StateId, k: usize) -> f64 {
        self.values[id.0][k]
    }

    /// Set the current value.
    pub fn set_value(&mut self, id: StateId, value: f64) {
        self.values[id.0][0] = value;
    }

    /// Current time derivative.
    pub fn derivative(&self, id: StateId) -> f64 {
        self.derivatives[id.0][0]
    }

    /// Time derivative `k` accepted steps back.
    pub fn previous_derivative(&self, id: StateId, k: usize) -> f64 {
        self.derivatives[id.0][k]
    }

    /// Fill every history slot with the current value and a zero derivative.
    pub fn initialize(&mut self) {
        for history in &mut self.values {
            let current = history[0];
            history.fill(current);
        }
        for history in &mut self.derivatives {
            history.fill(0.0);
        }
    }

    /// Shift history by one accepted step.
    pub fn advance(&mut self) {
        for history in self.values.iter_mut().chain(self.derivatives.iter_mut()) {
            history.copy_within(0..HISTORY - 1, 1);
        }
    }
}

/// Tolerances used by truncation error estimation.
#[derive(Debug, Clone, Copy)]
pub struct TruncationTolerances {
    pub trtol: f64,
    pub reltol: f64,
    pub abstol: f64,
    pub chgtol: f64,
}

/// Companion model of one integrated state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrated {
    /// Equivalent conductance (`ag0 * C`).
    pub geq: f64,
    /// Time derivative of the state at the current point.
    pub current: f64,
}

/// Integration state of a transient run.
#[derive(Debug, Clone)]
pub struct TimeDomain {
    pool: StatePool,
    method: IntegrationMethod,
    max_order: usize,
    order: usize,
    /// `deltas[0]` is the step being attempted; `deltas[k]` the k-th
    /// accepted step before it.
    deltas: [f64; HISTORY],
    coefficients: [f64; 3],
    tolerances: TruncationTolerances,
}

impl TimeDomain {
    /// Create the integration state with an empty pool.
    pub fn new(
        method: IntegrationMethod,
        max_order: usize,
        tolerances: TruncationTolerances,
    ) -> Self {
        Self {
            pool: StatePool::new(),
            method,
            max_order: max_order.clamp(1, 2),
            order: 1,
            deltas: [0.0; HISTORY],
            coefficients: [0.0; 3],
            tolerances,
        }
    }

    /// State pool.
    pub fn pool(&self) -> &StatePool {
        &self.pool
    }

    /// Mutable state pool.
    pub fn pool_mut(&mut self) -> &mut StatePool {
        &mut self.pool
    }

    /// Integration formula.
    pub fn method(&self) -> IntegrationMethod {
        self.method
    }

    /// Current order.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Highest permitted order.
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Set the order, clamped to `1..=max_order`.
    pub fn set_order(&mut self, order: usize) {
        self.order = order.clamp(1, self.max_order);
        self.compute_coefficients();
    }

    /// Step being attempted.
    pub fn delta(&self) -> f64 {
        self.deltas[0]
    }

    /// Coefficient of the current value in the derivative formula.
    pub fn ag0(&self) -> f64 {
        self.coefficients[0]
    }

    /// Start history from the operating point with first step `delta`.
    pub fn initialize(&mut self, delta: f64) {
        self.pool.initialize();
        self.deltas.fill(delta);
        self.order = 1;
        self.compute_coefficients();
    }

    /// Prepare coefficients for an attempt with step `delta`.
    pub fn begin_step(&mut self, delta: f64) {
        self.deltas[0] = delta;
        self.compute_coefficients();
    }

    fn compute_coefficients(&mut self) {
        let h0 = self.deltas[0];
        if h0 <= 0.0 {
            self.coefficients = [0.0; 3];
            return;
        }
        self.coefficients = match (self.method, self.order) {
            (_, 1) => [1.0 / h0, -1.0 / h0, 0.0],
            (IntegrationMethod::Trapezoidal, _) => [2.0 / h0, -2.0 / h0, 0.0],
            (IntegrationMethod::Gear, _) => {
                let h1 = self.deltas[1];
                [
                    (2.0 * h0 + h1) / (h0 * (h0 + h1)),
                    -(h0 + h1) / (h0 * h1),
                    h0 / (h1 * (h0 + h1)),
                ]
            }
        };
    }

    /// Integrate a state whose current value is already set.
    ///
    /// Stores the derivative and returns the companion model for a device
    /// whose state has incremental capacitance `capacitance`.
    pub fn integrate(&mut self, id: StateId, capacitance: f64) -> Integrated {
        let [a0, a1, a2] = self.coefficients;
        let q0 = self.pool.value(id);
        let q1 = self.pool.previous(id, 1);

        let derivative = match (self.method, self.order) {
            (_, 1) => a0 * q0 + a1 * q1,
            (IntegrationMethod::Trapezoidal, _) => {
                a0 * q0 + a1 * q1 - self.pool.previous_derivative(id, 1)
            }
            (IntegrationMethod::Gear, _) => a0 * q0 + a1 * q1 + a2 * self.pool.previous(id, 2),
        };
        self.pool.derivatives[id.0][0] = derivative;

        Integrated {
            geq: a0 * capacitance,
            current: derivative,
        }
    }

    /// Largest step keeping the truncation error of `id` within tolerance.
    pub fn truncate_state(&self, id: StateId) -> f64 {
        self.truncate_state_at(id, self.order)
    }

    /// As [`truncate_state`](Self::truncate_state), for a given order.
    pub fn truncate_state_at(&self, id: StateId, order: usize) -> f64 {
        let order = order.clamp(1, 2);
        let tol = &self.tolerances;
        let delta = self.deltas[0];

        let values = &self.pool.values[id.0];
        let derivatives = &self.pool.derivatives[id.0];
        let current_tol =
            tol.abstol + tol.reltol * derivatives[0].abs().max(derivatives[1].abs());
        let charge_tol = tol.reltol * values[0].abs().max(values[1].abs()).max(tol.chgtol) / delta;
        let tolerance = current_tol.max(charge_tol);

        // Divided differences of the value history
        let mut diff = [0.0; HISTORY];
        diff[..=order + 1].copy_from_slice(&values[..=order + 1]);
        let mut span = [0.0; HISTORY];
        span[..=order].copy_from_slice(&self.deltas[..=order]);

        let mut j = order;
        loop {
            for i in 0..=j {
                diff[i] = (diff[i] - diff[i + 1]) / span[i];
            }
            if j == 0 {
                break;
            }
            j -= 1;
            for i in 0..=j {
                span[i] = span[i + 1] + self.deltas[i];
            }
        }

        let factor = match self.method {
            IntegrationMethod::Trapezoidal => TRAPEZOIDAL_ERROR[order - 1],
            IntegrationMethod::Gear => GEAR_ERROR[order - 1],
        };
        let step = tol.trtol * tolerance / tol.abstol.max(factor * diff[0].abs());
        if order == 2 {
            step.sqrt()
        } else {
            step
        }
    }

    /// Commit the attempted step: shift state and step history.
    pub fn accept(&mut self) {
        self.pool.advance();
        self.deltas.copy_within(0..HISTORY - 1, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tolerances() -> TruncationTolerances {
        TruncationTolerances {
            trtol: 7.0,
            reltol: 1e-3,
            abstol: 1e-12,
            chgtol: 1e-14,
        }
    }

    #[test]
    fn test_pool_history_shifts_on_advance() {
        let mut pool = StatePool::new();
        let id = pool.allocate();
        pool.set_value(id, 1.0);
        pool.initialize();
        assert_eq!(pool.previous(id, 3), 1.0);

        pool.set_value(id, 2.0);
        pool.advance();
        pool.set_value(id, 3.0);
        assert_eq!(pool.value(id), 3.0);
        assert_eq!(pool.previous(id, 1), 2.0);
        assert_eq!(pool.previous(id, 2), 1.0);
    }

    #[test]
    fn test_backward_euler_companion() {
        let mut time = TimeDomain::new(IntegrationMethod::Trapezoidal, 2, tolerances());
        let id = time.pool_mut().allocate();
        time.pool_mut().set_value(id, 1e-6);
        time.initialize(1e-3);

        time.pool_mut().set_value(id, 2e-6);
        let result = time.integrate(id, 1e-6);
        assert_relative_eq!(result.geq, 1e-3);
        assert_relative_eq!(result.current, 1e-3);
    }

    #[test]
    fn test_trapezoidal_uses_previous_derivative() {
        let mut time = TimeDomain::new(IntegrationMethod::Trapezoidal, 2, tolerances());
        let id = time.pool_mut().allocate();
        time.initialize(1.0);

        // q(t) = t on a uniform grid; the derivative is exactly 1
        time.pool_mut().set_value(id, 1.0);
        time.integrate(id, 1.0);
        time.accept();
        time.set_order(2);
        time.begin_step(1.0);
        time.pool_mut().set_value(id, 2.0);
        let result = time.integrate(id, 1.0);
        assert_relative_eq!(result.current, 1.0);
        assert_relative_eq!(result.geq, 2.0);
    }

    #[test]
    fn test_gear_variable_step_is_exact_for_quadratics() {
        let mut time = TimeDomain::new(IntegrationMethod::Gear, 2, tolerances());
        let id = time.pool_mut().allocate();
        time.initialize(0.5);

        // q(t) = t^2 sampled at t = 0, 0.5, 1.5
        time.pool_mut().set_value(id, 0.25);
        time.accept();
        time.set_order(2);
        time.begin_step(1.0);
        time.pool_mut().set_value(id, 2.25);
        let result = time.integrate(id, 1.0);
        assert_relative_eq!(result.current, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_truncation_is_unbounded_for_linear_history() {
        let mut time = TimeDomain::new(IntegrationMethod::Trapezoidal, 2, tolerances());
        let id = time.pool_mut().allocate();
        time.initialize(1.0);
        time.pool_mut().set_value(id, 1.0);
        time.accept();
        time.begin_step(1.0);
        time.pool_mut().set_value(id, 2.0);

        // Second difference vanishes, so the limit comes from abstol only
        let step = time.truncate_state_at(id, 1);
        assert!(step > 1e6);
    }

    #[test]
    fn test_truncation_shrinks_with_curvature() {
        let mut time = TimeDomain::new(IntegrationMethod::Trapezoidal, 2, tolerances());
        let id = time.pool_mut().allocate();
        time.initialize(1e-6);
        time.pool_mut().set_value(id, 1e-9);
        time.accept();
        time.begin_step(1e-6);
        time.pool_mut().set_value(id, 4e-9);

        let gentle = time.truncate_state_at(id, 1);
        time.pool_mut().set_value(id, 4e-8);
        let sharp = time.truncate_state_at(id, 1);
        assert!(sharp < gentle);
    }
}
