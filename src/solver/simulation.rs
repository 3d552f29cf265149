//! Bound simulation: behaviors, unknowns, and the systems they stamp.

use num_complex::Complex64;

use super::integration::TimeDomain;
use super::sparse::{MatrixElement, PivotConfig, SparseSystem};
use super::state::{AnalysisMode, ComplexState, InitMode, RealState};
use crate::behavior::{
    Behavior, ExportContext, FrequencyContext, LoadContext, SetupContext,
};
use crate::circuit::{load_order, validate_circuit, Circuit, Unknown, UnknownKind, Unknowns};
use crate::config::SimulationConfig;
use crate::error::{NodalError, Result};

/// Complex system and state of an AC analysis.
#[derive(Debug)]
struct FrequencySolve {
    system: SparseSystem<Complex64>,
    state: ComplexState,
}

/// Behaviors taking part in each phase, as indices in load order.
#[derive(Debug, Default)]
struct Phases {
    temperature: Vec<usize>,
    load: Vec<usize>,
    convergence: Vec<usize>,
    transient: Vec<usize>,
    frequency: Vec<usize>,
}

/// A circuit bound for one analysis.
///
/// Created by [`Simulation::setup`], which runs every behavior through
/// setup, connect, and allocate. The analyses drive it afterwards and call
/// [`Simulation::unsetup`] when they finish.
#[derive(Debug)]
pub struct Simulation {
    pub(super) config: SimulationConfig,
    pub(super) behaviors: Vec<Box<dyn Behavior>>,
    phases: Phases,
    pub(super) unknowns: Unknowns,
    pub(super) system: SparseSystem<f64>,
    pub(super) state: RealState,
    pub(super) time: Option<TimeDomain>,
    /// Diagonal entries of every voltage unknown, for gmin stepping.
    gmin_diagonal: Vec<MatrixElement>,
    /// Conductance currently added on `gmin_diagonal`.
    pub(super) diagonal_gmin: f64,
    /// Absolute convergence tolerance per unknown (slot 0 unused).
    pub(super) tolerances: Vec<f64>,
    pub(super) scratch: Vec<f64>,
    initial_conditions: Vec<(Unknown, f64)>,
    frequency: Option<FrequencySolve>,
    pub(super) iterations: usize,
}

impl Simulation {
    /// Bind a circuit: create behaviors, unknowns, and the real system.
    pub fn setup(circuit: &Circuit, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        validate_circuit(circuit)?;
        let order = load_order(circuit)?;
        let components = circuit.components();

        // Node unknowns are numbered in circuit order
        let mut unknowns = Unknowns::new();
        for component in components {
            for pin in component.pins() {
                unknowns.map_node(pin)?;
            }
        }

        let mut behaviors: Vec<Box<dyn Behavior>> = order
            .iter()
            .map(|&i| components[i].create_behavior())
            .collect();

        for (position, &index) in order.iter().enumerate() {
            let (before, rest) = behaviors.split_at_mut(position);
            let Some((current, after)) = rest.split_first_mut() else {
                break;
            };
            let name = current.name().to_string();
            let context = SetupContext::new(&name, before, after, &config);
            current.setup(&context)?;

            let pins = components[index]
                .pins()
                .iter()
                .map(|pin| unknowns.map_node(pin))
                .collect::<Result<Vec<_>>>()?;
            current.connect(&pins, &mut unknowns)?;
        }
        unknowns.freeze();

        let size = unknowns.len();
        let pivot = PivotConfig {
            abs_threshold: config.pivot_abs_tol,
            rel_threshold: config.pivot_rel_tol,
        };
        let mut system = SparseSystem::new(size, pivot);
        for behavior in behaviors.iter_mut() {
            behavior.allocate(&mut system)?;
        }
        let gmin_diagonal = unknowns
            .voltage_unknowns()
            .map(|u| system.matrix_element(u.index(), u.index()))
            .collect::<Result<Vec<_>>>()?;

        let mut tolerances = vec![0.0; size + 1];
        for (unknown, _, kind) in unknowns.iter() {
            tolerances[unknown.index()] = match kind {
                UnknownKind::Voltage => config.vntol,
                UnknownKind::Current => config.abstol,
            };
        }

        let mut initial_conditions = Vec::with_capacity(config.initial_conditions.len());
        for (node, &voltage) in &config.initial_conditions {
            initial_conditions.push((unknowns.require(node)?, voltage));
        }
        initial_conditions.sort_by_key(|(unknown, _)| *unknown);

        let mut phases = Phases::default();
        for (i, behavior) in behaviors.iter().enumerate() {
            let capabilities = behavior.capabilities();
            let lists = [
                (capabilities.temperature, &mut phases.temperature),
                (capabilities.load, &mut phases.load),
                (capabilities.convergence, &mut phases.convergence),
                (capabilities.transient, &mut phases.transient),
                (capabilities.frequency, &mut phases.frequency),
            ];
            for (enabled, list) in lists {
                if enabled {
                    list.push(i);
                }
            }
        }

        let mut state = RealState::new(size);
        state.temperature = config.temperature;
        state.nominal_temperature = config.nominal_temperature;
        state.gmin = config.gmin;
        state.reltol = config.reltol;
        state.abstol = config.abstol;

        log::debug!(
            "bound {} behaviors: {} unknowns, {} matrix elements, {} nonlinear",
            behaviors.len(),
            size,
            system.element_count(),
            phases.convergence.len()
        );

        Ok(Self {
            config,
            behaviors,
            phases,
            unknowns,
            system,
            state,
            time: None,
            gmin_diagonal,
            diagonal_gmin: 0.0,
            tolerances,
            scratch: vec![0.0; size + 1],
            initial_conditions,
            frequency: None,
            iterations: 0,
        })
    }

    /// Simulation configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Unknown registry.
    pub fn unknowns(&self) -> &Unknowns {
        &self.unknowns
    }

    /// Real state.
    pub fn state(&self) -> &RealState {
        &self.state
    }

    /// Real system as stamped by the last load pass.
    pub fn system(&self) -> &SparseSystem<f64> {
        &self.system
    }

    /// Integration state, during transient runs.
    pub fn time_domain(&self) -> Option<&TimeDomain> {
        self.time.as_ref()
    }

    /// Newton iterations run so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Select the analysis mode seen by behaviors.
    pub fn set_mode(&mut self, mode: AnalysisMode) {
        self.state.mode = mode;
    }

    /// Set the simulated time seen by behaviors.
    pub fn set_time(&mut self, time: f64) {
        self.state.time = time;
    }

    /// Run the temperature pass.
    pub fn temperature(&mut self) -> Result<()> {
        for &i in &self.phases.temperature {
            self.behaviors[i].temperature(&self.state)?;
        }
        Ok(())
    }

    /// Clear the real system and stamp every loading behavior.
    pub fn load(&mut self) -> Result<()> {
        self.system.clear();
        let mut context = LoadContext {
            system: &mut self.system,
            state: &self.state,
            time: self.time.as_mut(),
        };
        for &i in &self.phases.load {
            self.behaviors[i].load(&mut context)?;
        }
        if self.diagonal_gmin > 0.0 {
            for &element in &self.gmin_diagonal {
                self.system.add(element, self.diagonal_gmin);
            }
        }
        Ok(())
    }

    /// Whether every behavior with its own convergence check accepts the
    /// current iterate.
    pub fn is_convergent(&self) -> bool {
        self.phases
            .convergence
            .iter()
            .all(|&i| self.behaviors[i].is_convergent(&self.state))
    }

    /// Zero the solution, then apply configured initial guesses.
    pub fn reset_solution(&mut self) {
        self.state.solution.fill(0.0);
        self.state.old_solution.fill(0.0);
        for &(unknown, voltage) in &self.initial_conditions {
            self.state.solution[unknown.index()] = voltage;
        }
    }

    /// Replace the current solution, e.g. after a rejected timestep.
    pub fn restore_solution(&mut self, solution: &[f64]) {
        self.state.solution.copy_from_slice(solution);
    }

    /// Attach integration state and let transient behaviors allocate
    /// their states in it.
    pub fn attach_time_domain(&mut self, mut time: TimeDomain) {
        for &i in &self.phases.transient {
            self.behaviors[i].create_states(time.pool_mut());
        }
        self.time = Some(time);
    }

    /// Seed integrated states from the operating point and start history
    /// with first step `delta`.
    pub fn initialize_states(&mut self, delta: f64) -> Result<()> {
        let time = self
            .time
            .as_mut()
            .ok_or_else(|| NodalError::invalid_state("no integration state attached"))?;
        // Slot 0 is seeded first; `initialize` copies it through the history
        for &i in &self.phases.transient {
            self.behaviors[i].initialize_states(&self.state, time.pool_mut());
        }
        time.initialize(delta);
        Ok(())
    }

    fn time_mut(&mut self) -> Result<&mut TimeDomain> {
        self.time
            .as_mut()
            .ok_or_else(|| NodalError::invalid_state("no integration state attached"))
    }

    /// Prepare integration coefficients for an attempt with step `delta`.
    pub fn begin_step(&mut self, delta: f64) -> Result<()> {
        self.time_mut()?.begin_step(delta);
        Ok(())
    }

    /// Commit the attempted step to the integration history.
    pub fn accept(&mut self) -> Result<()> {
        self.time_mut()?.accept();
        Ok(())
    }

    /// Set the integration order.
    pub fn set_order(&mut self, order: usize) -> Result<()> {
        self.time_mut()?.set_order(order);
        Ok(())
    }

    /// Current integration order (1 outside transient runs).
    pub fn order(&self) -> usize {
        self.time.as_ref().map_or(1, TimeDomain::order)
    }

    /// Highest integration order permitted.
    pub fn max_order(&self) -> usize {
        self.time.as_ref().map_or(1, TimeDomain::max_order)
    }

    /// Set how junctions initialize on the next Newton pass.
    pub fn set_init(&mut self, init: InitMode) {
        self.state.init = init;
    }

    /// Largest step allowed by every transient behavior.
    pub fn truncate(&self) -> f64 {
        match &self.time {
            Some(time) => self
                .phases
                .transient
                .iter()
                .map(|&i| self.behaviors[i].truncate(time))
                .fold(f64::INFINITY, f64::min),
            None => f64::INFINITY,
        }
    }

    /// Breakpoints of every behavior in `(0, final_time]`, unsorted.
    pub fn breakpoints(&self, final_time: f64) -> Vec<f64> {
        self.behaviors
            .iter()
            .flat_map(|b| b.breakpoints(final_time))
            .collect()
    }

    fn find_behavior(&self, entity: &str) -> Result<&dyn Behavior> {
        self.behaviors
            .iter()
            .find(|b| b.name() == entity)
            .map(|b| b.as_ref())
            .ok_or_else(|| NodalError::MissingEntity {
                name: "export".to_string(),
                referenced: entity.to_string(),
            })
    }

    /// Voltage of a node in the current solution.
    pub fn voltage(&self, node: &str) -> Result<f64> {
        let unknown = self.unknowns.require(node)?;
        Ok(self.state.value(unknown.index()))
    }

    /// Named real property of an entity.
    pub fn property(&self, entity: &str, property: &str) -> Result<f64> {
        let context = ExportContext {
            state: &self.state,
            time: self.time.as_ref(),
        };
        self.find_behavior(entity)?
            .property(property, &context)
            .ok_or_else(|| NodalError::UnknownProperty {
                entity: entity.to_string(),
                property: property.to_string(),
            })
    }

    /// Override the DC value of an independent source.
    pub fn set_dc_value(&mut self, source: &str, value: f64) -> Result<()> {
        let behavior = self
            .behaviors
            .iter_mut()
            .find(|b| b.name() == source)
            .ok_or_else(|| NodalError::MissingEntity {
                name: "sweep".to_string(),
                referenced: source.to_string(),
            })?;
        if behavior.set_dc_value(value) {
            Ok(())
        } else {
            Err(NodalError::invalid_parameter(
                source,
                "dc",
                "only independent sources can be swept",
            ))
        }
    }

    /// Build the complex system and capture small-signal parameters at the
    /// current operating point.
    pub fn prepare_frequency(&mut self) -> Result<()> {
        let size = self.unknowns.len();
        let pivot = PivotConfig {
            abs_threshold: self.config.pivot_abs_tol,
            rel_threshold: self.config.pivot_rel_tol,
        };
        let mut system = SparseSystem::new(size, pivot);
        for &i in &self.phases.frequency {
            let behavior = &mut self.behaviors[i];
            behavior.allocate_frequency(&mut system)?;
            behavior.init_frequency(&self.state);
        }
        log::debug!(
            "frequency system: {} unknowns, {} matrix elements",
            size,
            system.element_count()
        );
        self.frequency = Some(FrequencySolve {
            system,
            state: ComplexState::new(size),
        });
        Ok(())
    }

    /// Stamp and solve the complex system at `frequency` hertz.
    pub fn solve_frequency(&mut self, frequency: f64) -> Result<()> {
        let solve = self.frequency.as_mut().ok_or_else(|| {
            NodalError::invalid_state("frequency solve before the complex system was prepared")
        })?;
        solve.system.clear();
        solve.state.frequency = frequency;
        let mut context = FrequencyContext {
            system: &mut solve.system,
            state: &solve.state,
        };
        for &i in &self.phases.frequency {
            self.behaviors[i].load_frequency(&mut context)?;
        }
        solve.system.factor()?;
        solve.system.solve(&mut solve.state.solution)
    }

    fn complex_state(&self) -> Result<&ComplexState> {
        self.frequency
            .as_ref()
            .map(|solve| &solve.state)
            .ok_or_else(|| NodalError::invalid_state("no frequency solution available"))
    }

    /// Phasor voltage of a node in the last frequency solution.
    pub fn frequency_voltage(&self, node: &str) -> Result<Complex64> {
        let unknown = self.unknowns.require(node)?;
        Ok(self.complex_state()?.value(unknown.index()))
    }

    /// Named complex property of an entity.
    pub fn frequency_property(&self, entity: &str, property: &str) -> Result<Complex64> {
        let state = self.complex_state()?;
        self.find_behavior(entity)?
            .frequency_property(property, state)
            .ok_or_else(|| NodalError::UnknownProperty {
                entity: entity.to_string(),
                property: property.to_string(),
            })
    }

    /// Last frequency solution, indexed by unknown.
    pub fn frequency_solution(&self) -> Option<&[Complex64]> {
        self.frequency.as_ref().map(|s| s.state.solution.as_slice())
    }

    /// Release every behavior's handles.
    pub fn unsetup(&mut self) {
        for behavior in self.behaviors.iter_mut() {
            behavior.unsetup();
        }
        self.frequency = None;
        self.time = None;
        self.state.init = InitMode::Junction;
    }
}
