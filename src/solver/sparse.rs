//! Sparse linear system with arena-indexed element handles.
//!
//! Devices request matrix and RHS slots once, during equation allocation, and
//! receive small copyable handles. The system owns every value; handles are
//! plain indices into its arena, so they stay valid however the arena grows.
//!
//! Index 0 is the reference (ground) unknown. Requests that touch row or
//! column 0 return a void handle whose writes are discarded, which keeps the
//! stamping code free of ground special cases.
//!
//! ## Factorization
//!
//! `factor` performs Gaussian elimination with Markowitz ordering under a
//! threshold pivoting rule: a candidate pivot qualifies when its magnitude is
//! at least `abs_threshold` and at least `rel_threshold` times the largest
//! magnitude in its column. Among qualifying candidates the one with the
//! smallest Markowitz product `(r - 1)(c - 1)` wins; ties go to the larger
//! relative magnitude. The chosen pivot sequence is remembered and reused on
//! the next factorization while every pivot in it still qualifies.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use num_complex::Complex64;

use crate::error::{NodalError, Result};

/// Scalar type a [`SparseSystem`] can hold.
pub trait Scalar:
    Copy
    + Debug
    + PartialEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + 'static
{
    /// Additive identity.
    fn zero() -> Self;

    /// Magnitude used for pivot comparisons.
    fn magnitude(self) -> f64;

    /// Division; complex division is scaled to avoid overflow and underflow.
    fn divide(self, rhs: Self) -> Self;

    /// Whether every component is finite.
    fn is_finite_value(self) -> bool;
}

impl Scalar for f64 {
    fn zero() -> Self {
        0.0
    }

    fn magnitude(self) -> f64 {
        self.abs()
    }

    fn divide(self, rhs: Self) -> Self {
        self / rhs
    }

    fn is_finite_value(self) -> bool {
        self.is_finite()
    }
}

impl Scalar for Complex64 {
    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }

    // 1-norm: cheaper than the modulus and equivalent for pivot ranking
    fn magnitude(self) -> f64 {
        self.re.abs() + self.im.abs()
    }

    fn divide(self, rhs: Self) -> Self {
        // Smith's algorithm: scale by the larger component of the divisor first
        if rhs.re.abs() >= rhs.im.abs() {
            let ratio = rhs.im / rhs.re;
            let denom = rhs.re + rhs.im * ratio;
            Complex64::new(
                (self.re + self.im * ratio) / denom,
                (self.im - self.re * ratio) / denom,
            )
        } else {
            let ratio = rhs.re / rhs.im;
            let denom = rhs.im + rhs.re * ratio;
            Complex64::new(
                (self.re * ratio + self.im) / denom,
                (self.im * ratio - self.re) / denom,
            )
        }
    }

    fn is_finite_value(self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }
}

/// Handle to one matrix slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixElement(usize);

impl MatrixElement {
    /// Handle for any slot touching the reference unknown.
    pub const VOID: MatrixElement = MatrixElement(0);

    /// Whether writes through this handle are discarded.
    pub fn is_void(&self) -> bool {
        self.0 == 0
    }
}

/// Handle to one right-hand-side slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RhsElement(usize);

impl RhsElement {
    /// Handle for the reference unknown's row.
    pub const VOID: RhsElement = RhsElement(0);

    /// Whether writes through this handle are discarded.
    pub fn is_void(&self) -> bool {
        self.0 == 0
    }
}

/// Pivot acceptance thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotConfig {
    /// Smallest magnitude accepted as a pivot.
    pub abs_threshold: f64,
    /// Smallest fraction of the column maximum accepted as a pivot.
    pub rel_threshold: f64,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            abs_threshold: 1e-13,
            rel_threshold: 1e-3,
        }
    }
}

/// One elimination step of a factored system.
#[derive(Debug, Clone)]
struct Step<T> {
    row: usize,
    col: usize,
    pivot: T,
    /// Rows eliminated by this pivot, with their multipliers.
    lower: Vec<(usize, T)>,
    /// Remaining entries of the pivot row.
    upper: Vec<(usize, T)>,
}

/// A square sparse system `A x = b` over real or complex scalars.
#[derive(Debug, Clone)]
pub struct SparseSystem<T: Scalar> {
    size: usize,
    /// Coordinates of each arena entry; entry 0 is the void slot.
    coords: Vec<(usize, usize)>,
    values: Vec<T>,
    lookup: HashMap<(usize, usize), usize>,
    /// RHS indexed by unknown; slot 0 is the void slot.
    rhs: Vec<T>,
    frozen: bool,
    factored: bool,
    steps: Vec<Step<T>>,
    ordering: Option<Vec<(usize, usize)>>,
    pivot: PivotConfig,
}

impl<T: Scalar> SparseSystem<T> {
    /// Create an empty system for `size` unknowns (excluding ground).
    pub fn new(size: usize, pivot: PivotConfig) -> Self {
        Self {
            size,
            coords: vec![(0, 0)],
            values: vec![T::zero()],
            lookup: HashMap::new(),
            rhs: vec![T::zero(); size + 1],
            frozen: false,
            factored: false,
            steps: Vec::new(),
            ordering: None,
            pivot,
        }
    }

    /// Number of unknowns (excluding ground).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of structural matrix entries.
    pub fn element_count(&self) -> usize {
        self.coords.len() - 1
    }

    /// Whether the structure has been frozen by a factorization.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Whether a valid factorization is available.
    pub fn is_factored(&self) -> bool {
        self.factored
    }

    /// Get (or create) the handle for matrix slot `(row, col)`.
    ///
    /// Requesting the same coordinates twice returns the same handle.
    pub fn matrix_element(&mut self, row: usize, col: usize) -> Result<MatrixElement> {
        if row == 0 || col == 0 {
            return Ok(MatrixElement::VOID);
        }
        self.check_bounds(row)?;
        self.check_bounds(col)?;

        if let Some(&index) = self.lookup.get(&(row, col)) {
            return Ok(MatrixElement(index));
        }
        if self.frozen {
            return Err(NodalError::StructureFrozen { row, col });
        }

        let index = self.coords.len();
        self.coords.push((row, col));
        self.values.push(T::zero());
        self.lookup.insert((row, col), index);
        Ok(MatrixElement(index))
    }

    /// Look up an existing matrix slot without creating it.
    pub fn find_element(&self, row: usize, col: usize) -> Option<MatrixElement> {
        if row == 0 || col == 0 {
            return Some(MatrixElement::VOID);
        }
        self.lookup.get(&(row, col)).map(|&index| MatrixElement(index))
    }

    /// Get the handle for RHS slot `row`.
    pub fn rhs_element(&self, row: usize) -> Result<RhsElement> {
        if row == 0 {
            return Ok(RhsElement::VOID);
        }
        self.check_bounds(row)?;
        Ok(RhsElement(row))
    }

    fn check_bounds(&self, index: usize) -> Result<()> {
        if index > self.size {
            return Err(NodalError::invalid_state(format!(
                "unknown {} is outside a system of size {}",
                index, self.size
            )));
        }
        Ok(())
    }

    /// Add to a matrix slot.
    pub fn add(&mut self, element: MatrixElement, value: T) {
        self.values[element.0] += value;
        self.factored = false;
    }

    /// Subtract from a matrix slot.
    pub fn sub(&mut self, element: MatrixElement, value: T) {
        self.values[element.0] -= value;
        self.factored = false;
    }

    /// Overwrite a matrix slot.
    pub fn set(&mut self, element: MatrixElement, value: T) {
        if !element.is_void() {
            self.values[element.0] = value;
        }
        self.factored = false;
    }

    /// Current value of a matrix slot (zero for the void slot).
    pub fn value(&self, element: MatrixElement) -> T {
        if element.is_void() {
            T::zero()
        } else {
            self.values[element.0]
        }
    }

    /// Add to an RHS slot.
    pub fn add_rhs(&mut self, element: RhsElement, value: T) {
        self.rhs[element.0] += value;
        self.factored = false;
    }

    /// Subtract from an RHS slot.
    pub fn sub_rhs(&mut self, element: RhsElement, value: T) {
        self.rhs[element.0] -= value;
        self.factored = false;
    }

    /// Overwrite an RHS slot.
    pub fn set_rhs(&mut self, element: RhsElement, value: T) {
        if !element.is_void() {
            self.rhs[element.0] = value;
        }
        self.factored = false;
    }

    /// Current value of an RHS slot (zero for the void slot).
    pub fn rhs_value(&self, element: RhsElement) -> T {
        if element.is_void() {
            T::zero()
        } else {
            self.rhs[element.0]
        }
    }

    /// All structural entries with their current values.
    pub fn entries(&self) -> impl Iterator<Item = ((usize, usize), T)> + '_ {
        self.coords
            .iter()
            .zip(self.values.iter())
            .skip(1)
            .map(|(&coord, &value)| (coord, value))
    }

    /// RHS values for unknowns `1..=size`.
    pub fn rhs(&self) -> &[T] {
        &self.rhs[1..]
    }

    /// Zero every value; the structure is kept.
    pub fn clear(&mut self) {
        self.values.fill(T::zero());
        self.rhs.fill(T::zero());
        self.factored = false;
    }

    /// Drop the structure so it can be rebuilt. Every handle becomes invalid.
    pub fn reset_structure(&mut self) {
        self.coords.truncate(1);
        self.values.truncate(1);
        self.values[0] = T::zero();
        self.lookup.clear();
        self.rhs.fill(T::zero());
        self.frozen = false;
        self.factored = false;
        self.steps.clear();
        self.ordering = None;
    }

    /// Factor the matrix in place of the previous factorization.
    ///
    /// The first call freezes the structure.
    pub fn factor(&mut self) -> Result<()> {
        self.frozen = true;
        self.factored = false;

        if let Some(order) = self.ordering.take() {
            let mut elimination = Elimination::new(self.size, self.working_rows(), self.pivot);
            if elimination.run_ordered(&order) {
                self.steps = elimination.steps;
                self.ordering = Some(order);
                self.factored = true;
                return Ok(());
            }
            log::debug!("previous pivot order no longer acceptable; reordering");
        }

        let mut elimination = Elimination::new(self.size, self.working_rows(), self.pivot);
        elimination.run_markowitz()?;
        self.ordering = Some(elimination.steps.iter().map(|s| (s.row, s.col)).collect());
        self.steps = elimination.steps;
        self.factored = true;
        Ok(())
    }

    /// Solve with the current factorization, writing `solution[1..=size]`.
    ///
    /// `solution[0]` (ground) is set to zero.
    pub fn solve(&self, solution: &mut [T]) -> Result<()> {
        if !self.factored {
            return Err(NodalError::invalid_state(
                "solve called without a valid factorization",
            ));
        }
        if solution.len() != self.size + 1 {
            return Err(NodalError::invalid_state(format!(
                "solution vector has length {}, expected {}",
                solution.len(),
                self.size + 1
            )));
        }

        // Forward elimination on a copy of the RHS
        let mut b = self.rhs.clone();
        let mut y = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let yk = b[step.row];
            for &(row, multiplier) in &step.lower {
                b[row] -= multiplier * yk;
            }
            y.push(yk);
        }

        // Back substitution
        solution[0] = T::zero();
        for (step, &yk) in self.steps.iter().zip(y.iter()).rev() {
            let mut acc = yk;
            for &(col, u) in &step.upper {
                acc -= u * solution[col];
            }
            solution[step.col] = acc.divide(step.pivot);
        }
        Ok(())
    }

    fn working_rows(&self) -> Vec<BTreeMap<usize, T>> {
        let mut rows = vec![BTreeMap::new(); self.size + 1];
        for (&(row, col), &value) in self.coords.iter().zip(self.values.iter()).skip(1) {
            rows[row].insert(col, value);
        }
        rows
    }
}

/// Working state of one elimination.
struct Elimination<T: Scalar> {
    rows: Vec<BTreeMap<usize, T>>,
    /// Active rows holding an entry in each column.
    columns: Vec<BTreeSet<usize>>,
    active_rows: BTreeSet<usize>,
    active_cols: BTreeSet<usize>,
    pivot: PivotConfig,
    steps: Vec<Step<T>>,
}

impl<T: Scalar> Elimination<T> {
    fn new(size: usize, rows: Vec<BTreeMap<usize, T>>, pivot: PivotConfig) -> Self {
        let mut columns = vec![BTreeSet::new(); size + 1];
        for (r, row) in rows.iter().enumerate() {
            for &c in row.keys() {
                columns[c].insert(r);
            }
        }
        Self {
            rows,
            columns,
            active_rows: (1..=size).collect(),
            active_cols: (1..=size).collect(),
            pivot,
            steps: Vec::with_capacity(size),
        }
    }

    fn column_max(&self, col: usize) -> f64 {
        self.columns[col]
            .iter()
            .filter_map(|&r| self.rows[r].get(&col))
            .map(|v| v.magnitude())
            .fold(0.0, f64::max)
    }

    fn acceptable(&self, magnitude: f64, column_max: f64) -> bool {
        magnitude >= self.pivot.abs_threshold && magnitude >= self.pivot.rel_threshold * column_max
    }

    /// Eliminate along a fixed pivot sequence. Returns false when a pivot
    /// in the sequence no longer qualifies.
    fn run_ordered(&mut self, order: &[(usize, usize)]) -> bool {
        if order.len() != self.active_rows.len() {
            return false;
        }
        for &(row, col) in order {
            let magnitude = match self.rows[row].get(&col) {
                Some(v) => v.magnitude(),
                None => return false,
            };
            if !self.acceptable(magnitude, self.column_max(col)) {
                return false;
            }
            self.eliminate(row, col);
        }
        true
    }

    /// Eliminate choosing pivots by Markowitz cost under threshold pivoting.
    fn run_markowitz(&mut self) -> Result<()> {
        while !self.active_cols.is_empty() {
            let (row, col) = self.select_pivot().ok_or_else(|| self.singular())?;
            self.eliminate(row, col);
        }
        Ok(())
    }

    fn select_pivot(&self) -> Option<(usize, usize)> {
        // (cost, -relative magnitude, row, col); lowest wins
        let mut best: Option<(usize, f64, usize, usize)> = None;
        for &col in &self.active_cols {
            let column_max = self.column_max(col);
            if column_max < self.pivot.abs_threshold {
                continue;
            }
            let col_count = self.columns[col].len();
            for &row in &self.columns[col] {
                let magnitude = match self.rows[row].get(&col) {
                    Some(v) => v.magnitude(),
                    None => continue,
                };
                if !self.acceptable(magnitude, column_max) {
                    continue;
                }
                let cost = (self.rows[row].len() - 1) * (col_count - 1);
                let ratio = magnitude / column_max;
                let better = match best {
                    None => true,
                    Some((best_cost, best_ratio, _, _)) => {
                        cost < best_cost || (cost == best_cost && ratio > best_ratio)
                    }
                };
                if better {
                    best = Some((cost, ratio, row, col));
                }
            }
        }
        best.map(|(_, _, row, col)| (row, col))
    }

    /// Name the row and column where elimination broke down.
    fn singular(&self) -> NodalError {
        let negligible = |row: usize| {
            self.rows[row]
                .values()
                .all(|v| v.magnitude() < self.pivot.abs_threshold)
        };

        // An empty row is the usual culprit (floating node)
        if let Some(&row) = self.active_rows.iter().find(|&&r| negligible(r)) {
            let col = if self.active_cols.contains(&row) {
                row
            } else {
                self.active_cols.iter().next().copied().unwrap_or(row)
            };
            return NodalError::Singular { row, col };
        }
        // Otherwise an empty column (e.g. a loop of voltage sources)
        if let Some(&col) = self
            .active_cols
            .iter()
            .find(|&&c| self.column_max(c) < self.pivot.abs_threshold)
        {
            let row = if self.active_rows.contains(&col) {
                col
            } else {
                self.active_rows.iter().next().copied().unwrap_or(col)
            };
            return NodalError::Singular { row, col };
        }
        let row = self.active_rows.iter().next().copied().unwrap_or(0);
        let col = self.active_cols.iter().next().copied().unwrap_or(0);
        NodalError::Singular { row, col }
    }

    fn eliminate(&mut self, row: usize, col: usize) {
        let pivot_row = std::mem::take(&mut self.rows[row]);
        let pivot = pivot_row[&col];

        self.active_rows.remove(&row);
        self.active_cols.remove(&col);
        for &c in pivot_row.keys() {
            self.columns[c].remove(&row);
        }

        let targets: Vec<usize> = std::mem::take(&mut self.columns[col]).into_iter().collect();
        let mut lower = Vec::with_capacity(targets.len());
        for target in targets {
            let entry = match self.rows[target].remove(&col) {
                Some(v) => v,
                None => continue,
            };
            let multiplier = entry.divide(pivot);
            for (&c, &u) in pivot_row.iter() {
                if c == col {
                    continue;
                }
                let slot = self.rows[target].entry(c).or_insert_with(|| {
                    self.columns[c].insert(target);
                    T::zero()
                });
                *slot -= multiplier * u;
            }
            lower.push((target, multiplier));
        }

        let upper = pivot_row
            .into_iter()
            .filter(|&(c, _)| c != col)
            .collect();

        self.steps.push(Step {
            row,
            col,
            pivot,
            lower,
            upper,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn system(size: usize) -> SparseSystem<f64> {
        SparseSystem::new(size, PivotConfig::default())
    }

    #[test]
    fn test_handles_are_idempotent() {
        let mut sys = system(3);
        let a = sys.matrix_element(1, 2).unwrap();
        let b = sys.matrix_element(1, 2).unwrap();
        let c = sys.matrix_element(2, 1).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(sys.element_count(), 2);
        assert!(sys.matrix_element(0, 2).unwrap().is_void());
        assert!(sys.rhs_element(0).unwrap().is_void());
    }

    #[test]
    fn test_out_of_range_request_fails() {
        let mut sys = system(2);
        assert!(matches!(
            sys.matrix_element(3, 1),
            Err(NodalError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_void_writes_are_discarded() {
        let mut sys = system(1);
        let d = sys.matrix_element(1, 1).unwrap();
        let v = sys.matrix_element(1, 0).unwrap();
        let r = sys.rhs_element(1).unwrap();
        sys.add(d, 2.0);
        sys.add(v, 100.0);
        sys.add_rhs(RhsElement::VOID, 7.0);
        sys.add_rhs(r, 4.0);
        sys.factor().unwrap();
        let mut x = vec![0.0; 2];
        sys.solve(&mut x).unwrap();
        assert_relative_eq!(x[1], 2.0);
        assert_eq!(x[0], 0.0);
    }

    #[test]
    fn test_solve_three_by_three() {
        // [ 4 -1  0 ] [x1]   [ 2]
        // [-1  4 -1 ] [x2] = [ 4]
        // [ 0 -1  4 ] [x3]   [10]
        let mut sys = system(3);
        let entries = [
            (1, 1, 4.0),
            (1, 2, -1.0),
            (2, 1, -1.0),
            (2, 2, 4.0),
            (2, 3, -1.0),
            (3, 2, -1.0),
            (3, 3, 4.0),
        ];
        for &(r, c, v) in &entries {
            let e = sys.matrix_element(r, c).unwrap();
            sys.add(e, v);
        }
        for (row, v) in [(1, 2.0), (2, 4.0), (3, 10.0)] {
            let e = sys.rhs_element(row).unwrap();
            sys.add_rhs(e, v);
        }
        sys.factor().unwrap();
        let mut x = vec![0.0; 4];
        sys.solve(&mut x).unwrap();

        // Residual check
        for row in 1..=3 {
            let lhs: f64 = entries
                .iter()
                .filter(|e| e.0 == row)
                .map(|&(_, c, v)| v * x[c])
                .sum();
            assert_relative_eq!(lhs, sys.rhs()[row - 1], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_diagonal_needs_pivoting() {
        // Voltage-source shaped structure: [[0, 1], [1, 0]]
        let mut sys = system(2);
        let a12 = sys.matrix_element(1, 2).unwrap();
        let a21 = sys.matrix_element(2, 1).unwrap();
        let a11 = sys.matrix_element(1, 1).unwrap();
        sys.add(a12, 1.0);
        sys.add(a21, 1.0);
        sys.add(a11, 0.0);
        let r1 = sys.rhs_element(1).unwrap();
        let r2 = sys.rhs_element(2).unwrap();
        sys.add_rhs(r1, 3.0);
        sys.add_rhs(r2, 5.0);
        sys.factor().unwrap();
        let mut x = vec![0.0; 3];
        sys.solve(&mut x).unwrap();
        assert_relative_eq!(x[1], 5.0);
        assert_relative_eq!(x[2], 3.0);
    }

    #[test]
    fn test_singular_names_empty_row() {
        let mut sys = system(2);
        let a11 = sys.matrix_element(1, 1).unwrap();
        // Row and column 2 exist structurally but stay zero
        sys.matrix_element(2, 2).unwrap();
        sys.add(a11, 1.0);
        match sys.factor() {
            Err(NodalError::Singular { row, col }) => {
                assert_eq!(row, 2);
                assert_eq!(col, 2);
            }
            other => panic!("expected Singular, got {:?}", other),
        }
    }

    #[test]
    fn test_solve_before_factor_is_invalid_state() {
        let mut sys = system(1);
        let a = sys.matrix_element(1, 1).unwrap();
        sys.add(a, 1.0);
        let mut x = vec![0.0; 2];
        assert!(matches!(
            sys.solve(&mut x),
            Err(NodalError::InvalidState { .. })
        ));

        sys.factor().unwrap();
        sys.solve(&mut x).unwrap();

        // Any new value invalidates the factorization
        sys.add(a, 1.0);
        assert!(matches!(
            sys.solve(&mut x),
            Err(NodalError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_structure_frozen_after_factor() {
        let mut sys = system(2);
        let a = sys.matrix_element(1, 1).unwrap();
        let b = sys.matrix_element(2, 2).unwrap();
        sys.add(a, 1.0);
        sys.add(b, 1.0);
        sys.factor().unwrap();

        // Existing coordinates still resolve
        assert_eq!(sys.matrix_element(1, 1).unwrap(), a);
        assert!(matches!(
            sys.matrix_element(1, 2),
            Err(NodalError::StructureFrozen { row: 1, col: 2 })
        ));

        sys.reset_structure();
        assert!(!sys.is_frozen());
        assert_eq!(sys.element_count(), 0);
        sys.matrix_element(1, 2).unwrap();
    }

    #[test]
    fn test_structural_zero_persists_across_clear() {
        let mut sys = system(2);
        let a = sys.matrix_element(1, 2).unwrap();
        sys.add(a, 3.0);
        sys.clear();
        assert_eq!(sys.value(a), 0.0);
        assert_eq!(sys.element_count(), 1);
        assert_eq!(sys.find_element(1, 2), Some(a));
    }

    #[test]
    fn test_reorders_when_remembered_pivot_vanishes() {
        let mut sys = system(2);
        let a11 = sys.matrix_element(1, 1).unwrap();
        let a12 = sys.matrix_element(1, 2).unwrap();
        let a21 = sys.matrix_element(2, 1).unwrap();
        let a22 = sys.matrix_element(2, 2).unwrap();
        let r1 = sys.rhs_element(1).unwrap();
        let r2 = sys.rhs_element(2).unwrap();

        sys.add(a11, 2.0);
        sys.add(a12, 1.0);
        sys.add(a21, 1.0);
        sys.add(a22, 3.0);
        sys.factor().unwrap();

        // Same structure, but the first pivot is now zero
        sys.clear();
        sys.add(a12, 1.0);
        sys.add(a21, 1.0);
        sys.add(a22, 3.0);
        sys.add_rhs(r1, 1.0);
        sys.add_rhs(r2, 5.0);
        sys.factor().unwrap();
        let mut x = vec![0.0; 3];
        sys.solve(&mut x).unwrap();
        // x2 = 1, x1 + 3 x2 = 5 -> x1 = 2
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_complex_solve() {
        let mut sys: SparseSystem<Complex64> = SparseSystem::new(2, PivotConfig::default());
        let j = Complex64::new(0.0, 1.0);
        let one = Complex64::new(1.0, 0.0);
        let a11 = sys.matrix_element(1, 1).unwrap();
        let a12 = sys.matrix_element(1, 2).unwrap();
        let a21 = sys.matrix_element(2, 1).unwrap();
        let a22 = sys.matrix_element(2, 2).unwrap();
        sys.add(a11, one + j);
        sys.add(a12, -one);
        sys.add(a21, -one);
        sys.add(a22, one + j * 2.0);
        let r1 = sys.rhs_element(1).unwrap();
        sys.add_rhs(r1, one);
        sys.factor().unwrap();
        let mut x = vec![Complex64::new(0.0, 0.0); 3];
        sys.solve(&mut x).unwrap();

        let lhs1 = (one + j) * x[1] - x[2];
        let lhs2 = -x[1] + (one + j * 2.0) * x[2];
        assert_relative_eq!(lhs1.re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(lhs1.im, 0.0, epsilon = 1e-12);
        assert_relative_eq!(lhs2.re, 0.0, epsilon = 1e-12);
        assert_relative_eq!(lhs2.im, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scaled_complex_division() {
        let big = Complex64::new(1e300, 1e300);
        let q = big.divide(Complex64::new(1e300, 1e300));
        assert_relative_eq!(q.re, 1.0);
        assert_relative_eq!(q.im, 0.0);

        let q = Complex64::new(1.0, 2.0).divide(Complex64::new(0.0, 2.0));
        assert_relative_eq!(q.re, 1.0);
        assert_relative_eq!(q.im, -0.5);
    }
}
