//! Circuit entity container.

use std::collections::HashMap;

use crate::components::Component;
use crate::error::{NodalError, Result};

/// A circuit: components in insertion order, addressable by name.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    /// All components in the circuit
    components: Vec<Component>,

    /// Mapping from component names to positions in `components`
    index: HashMap<String, usize>,
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component. Names must be unique.
    pub fn add(&mut self, component: impl Into<Component>) -> Result<()> {
        let component = component.into();
        if self.index.contains_key(component.name()) {
            return Err(NodalError::DuplicateEntity {
                name: component.name().to_string(),
            });
        }
        self.index
            .insert(component.name().to_string(), self.components.len());
        self.components.push(component);
        Ok(())
    }

    /// Builder-style [`Circuit::add`].
    pub fn with(mut self, component: impl Into<Component>) -> Result<Self> {
        self.add(component)?;
        Ok(self)
    }

    /// Find a component by name.
    pub fn find(&self, name: &str) -> Option<&Component> {
        self.index.get(name).map(|&i| &self.components[i])
    }

    /// Find a component by name for modification.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Component> {
        match self.index.get(name) {
            Some(&i) => self.components.get_mut(i),
            None => None,
        }
    }

    /// Remove a component, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Component> {
        let position = self.index.remove(name)?;
        let removed = self.components.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Components in insertion order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the circuit has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
