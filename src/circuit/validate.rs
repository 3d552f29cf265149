//! Circuit validation and load ordering.

use std::collections::HashMap;

use crate::error::{NodalError, Result};

use super::Circuit;

/// Validate a circuit for simulation.
///
/// Checks:
/// - The circuit has at least one component
/// - Every referenced entity exists
pub fn validate_circuit(circuit: &Circuit) -> Result<()> {
    if circuit.is_empty() {
        return Err(NodalError::InvalidTopology {
            message: "Circuit has no components".to_string(),
        });
    }

    for component in circuit.components() {
        for dependency in component.dependencies() {
            if circuit.find(dependency).is_none() {
                return Err(NodalError::MissingEntity {
                    name: component.name().to_string(),
                    referenced: dependency.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Order components so that every component follows its dependencies.
///
/// Components without a dependency relation keep their circuit order.
pub fn load_order(circuit: &Circuit) -> Result<Vec<usize>> {
    let components = circuit.components();
    let position: HashMap<&str, usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name(), i))
        .collect();

    let mut pending = vec![0usize; components.len()];
    let mut dependents = vec![Vec::new(); components.len()];
    for (i, component) in components.iter().enumerate() {
        for dependency in component.dependencies() {
            let &d = position
                .get(dependency)
                .ok_or_else(|| NodalError::MissingEntity {
                    name: component.name().to_string(),
                    referenced: dependency.to_string(),
                })?;
            pending[i] += 1;
            dependents[d].push(i);
        }
    }

    // Repeatedly take the earliest ready component
    let mut order = Vec::with_capacity(components.len());
    let mut done = vec![false; components.len()];
    while order.len() < components.len() {
        let next = (0..components.len()).find(|&i| !done[i] && pending[i] == 0);
        let Some(next) = next else {
            let stuck = (0..components.len()).find(|&i| !done[i]).unwrap_or(0);
            return Err(NodalError::DependencyCycle {
                name: components[stuck].name().to_string(),
            });
        };
        done[next] = true;
        order.push(next);
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
        }
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Inductor, MutualInductance, Resistor};

    #[test]
    fn test_empty_circuit_rejected() {
        assert!(matches!(
            validate_circuit(&Circuit::new()),
            Err(NodalError::InvalidTopology { .. })
        ));
    }

    #[test]
    fn test_missing_reference() {
        let mut circuit = Circuit::new();
        circuit.add(Inductor::new("L1", "a", "0", 1e-3)).unwrap();
        circuit
            .add(MutualInductance::new("K1", "L1", "L2", 0.9))
            .unwrap();
        match validate_circuit(&circuit) {
            Err(NodalError::MissingEntity { name, referenced }) => {
                assert_eq!(name, "K1");
                assert_eq!(referenced, "L2");
            }
            other => panic!("expected MissingEntity, got {:?}", other),
        }
    }

    #[test]
    fn test_coupling_loads_after_inductors() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", "a", "0", 1.0)).unwrap();
        circuit
            .add(MutualInductance::new("K1", "L1", "L2", 0.5))
            .unwrap();
        circuit.add(Inductor::new("L1", "a", "0", 1e-3)).unwrap();
        circuit.add(Inductor::new("L2", "b", "0", 1e-3)).unwrap();

        assert_eq!(load_order(&circuit).unwrap(), vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut circuit = Circuit::new();
        circuit
            .add(MutualInductance::new("K1", "K2", "K2", 0.5))
            .unwrap();
        circuit
            .add(MutualInductance::new("K2", "K1", "K1", 0.5))
            .unwrap();
        assert!(matches!(
            load_order(&circuit),
            Err(NodalError::DependencyCycle { .. })
        ));
    }
}
