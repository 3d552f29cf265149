//! Registry of simulation unknowns.
//!
//! Node names are mapped to unknowns as devices are bound. Devices that need
//! extra equations (branch currents, internal nodes) create them here before
//! the registry is frozen.

use std::collections::HashMap;

use super::types::{Unknown, UnknownKind};
use crate::error::{NodalError, Result};

/// Whether a node name refers to ground.
pub fn is_ground_name(name: &str) -> bool {
    name == "0" || name.eq_ignore_ascii_case("gnd")
}

/// Mapping between names and solution indices.
#[derive(Debug, Clone)]
pub struct Unknowns {
    map: HashMap<String, Unknown>,
    names: Vec<String>,
    kinds: Vec<UnknownKind>,
    frozen: bool,
}

impl Default for Unknowns {
    fn default() -> Self {
        Self::new()
    }
}

impl Unknowns {
    /// Create a registry holding only ground.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            names: vec!["0".to_string()],
            kinds: vec![UnknownKind::Voltage],
            frozen: false,
        }
    }

    fn push(&mut self, name: String, kind: UnknownKind) -> Result<Unknown> {
        if self.frozen {
            return Err(NodalError::invalid_state(format!(
                "cannot create unknown '{}' after setup",
                name
            )));
        }
        let unknown = Unknown(self.names.len());
        self.map.insert(name.clone(), unknown);
        self.names.push(name);
        self.kinds.push(kind);
        Ok(unknown)
    }

    /// Map a node name to its unknown, creating it on first use.
    pub fn map_node(&mut self, name: &str) -> Result<Unknown> {
        if is_ground_name(name) {
            return Ok(Unknown::GROUND);
        }
        if let Some(&unknown) = self.map.get(name) {
            return Ok(unknown);
        }
        self.push(name.to_string(), UnknownKind::Voltage)
    }

    /// Create the branch-current unknown owned by `owner`.
    pub fn create_branch(&mut self, owner: &str) -> Result<Unknown> {
        self.push(format!("{}#branch", owner), UnknownKind::Current)
    }

    /// Create an internal node owned by `owner`.
    pub fn create_internal(&mut self, owner: &str, suffix: &str) -> Result<Unknown> {
        self.push(format!("{}#{}", owner, suffix), UnknownKind::Voltage)
    }

    /// Forbid further unknowns.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether the registry is frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of unknowns, excluding ground.
    pub fn len(&self) -> usize {
        self.names.len() - 1
    }

    /// Whether only ground exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an unknown by name.
    pub fn find(&self, name: &str) -> Option<Unknown> {
        if is_ground_name(name) {
            return Some(Unknown::GROUND);
        }
        self.map.get(name).copied()
    }

    /// Look up an unknown by name, failing for unmapped names.
    pub fn require(&self, name: &str) -> Result<Unknown> {
        self.find(name).ok_or_else(|| NodalError::NodeNotFound {
            node: name.to_string(),
        })
    }

    /// Name of an unknown.
    pub fn name(&self, unknown: Unknown) -> &str {
        self.names
            .get(unknown.index())
            .map(String::as_str)
            .unwrap_or("?")
    }

    /// Kind of an unknown.
    pub fn kind(&self, unknown: Unknown) -> UnknownKind {
        self.kinds
            .get(unknown.index())
            .copied()
            .unwrap_or(UnknownKind::Voltage)
    }

    /// All non-ground unknowns in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Unknown, &str, UnknownKind)> + '_ {
        self.names
            .iter()
            .zip(self.kinds.iter())
            .enumerate()
            .skip(1)
            .map(|(i, (name, &kind))| (Unknown(i), name.as_str(), kind))
    }

    /// Non-ground voltage unknowns.
    pub fn voltage_unknowns(&self) -> impl Iterator<Item = Unknown> + '_ {
        self.iter()
            .filter(|(_, _, kind)| *kind == UnknownKind::Voltage)
            .map(|(unknown, _, _)| unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_aliases() {
        let mut unknowns = Unknowns::new();
        assert_eq!(unknowns.map_node("0").unwrap(), Unknown::GROUND);
        assert_eq!(unknowns.map_node("gnd").unwrap(), Unknown::GROUND);
        assert_eq!(unknowns.map_node("GND").unwrap(), Unknown::GROUND);
        assert!(unknowns.is_empty());
    }

    #[test]
    fn test_nodes_are_numbered_in_order() {
        let mut unknowns = Unknowns::new();
        let a = unknowns.map_node("in").unwrap();
        let b = unknowns.map_node("out").unwrap();
        assert_eq!(a, Unknown(1));
        assert_eq!(b, Unknown(2));
        assert_eq!(unknowns.map_node("in").unwrap(), a);

        let br = unknowns.create_branch("V1").unwrap();
        assert_eq!(br, Unknown(3));
        assert_eq!(unknowns.name(br), "V1#branch");
        assert_eq!(unknowns.kind(br), UnknownKind::Current);
        assert_eq!(unknowns.voltage_unknowns().count(), 2);
    }

    #[test]
    fn test_frozen_registry_rejects_new_unknowns() {
        let mut unknowns = Unknowns::new();
        unknowns.map_node("a").unwrap();
        unknowns.freeze();
        assert!(unknowns.map_node("a").is_ok());
        assert!(matches!(
            unknowns.map_node("b"),
            Err(NodalError::InvalidState { .. })
        ));
        assert!(unknowns.create_internal("D1", "int").is_err());
    }

    #[test]
    fn test_require_unknown_node() {
        let unknowns = Unknowns::new();
        assert!(matches!(
            unknowns.require("nowhere"),
            Err(NodalError::NodeNotFound { .. })
        ));
    }
}
