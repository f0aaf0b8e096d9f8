//! Variable sets and space-dimension mapping partial functions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::Variable;

/// An ordered set of variable indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSet {
    indices: BTreeSet<usize>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, v: Variable) {
        self.indices.insert(v.index());
    }

    pub fn contains(&self, v: Variable) -> bool {
        self.indices.contains(&v.index())
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// One past the highest index in the set (0 when empty).
    pub fn space_dimension(&self) -> usize {
        self.indices.iter().next_back().map_or(0, |&i| i + 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = Variable> + '_ {
        self.indices.iter().map(|&i| Variable::new(i))
    }
}

impl FromIterator<Variable> for VariableSet {
    fn from_iter<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        let mut s = VariableSet::new();
        for v in iter {
            s.insert(v);
        }
        s
    }
}

/// A partial, injective map from old space dimensions to new ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionMap {
    targets: Vec<Option<usize>>,
}

impl DimensionMap {
    /// The everywhere-undefined map over `dim` dimensions.
    pub fn undefined(dim: usize) -> Self {
        DimensionMap {
            targets: vec![None; dim],
        }
    }

    /// Record `from ↦ to`; rejects double images (a non-function) and
    /// duplicate targets (a non-injective map).
    pub fn map(&mut self, from: usize, to: usize) -> DomainResult<()> {
        if from >= self.targets.len() {
            self.targets.resize(from + 1, None);
        }
        if self.targets[from].is_some() {
            return Err(DomainError::NotAPartialFunction { op: "DimensionMap::map" });
        }
        if self.targets.iter().any(|t| *t == Some(to)) {
            return Err(DomainError::NotAPartialFunction { op: "DimensionMap::map" });
        }
        self.targets[from] = Some(to);
        Ok(())
    }

    pub fn has_empty_codomain(&self) -> bool {
        self.targets.iter().all(Option::is_none)
    }

    /// Highest dimension in the codomain; meaningless when empty.
    pub fn max_in_codomain(&self) -> usize {
        self.targets.iter().flatten().copied().max().unwrap_or(0)
    }

    /// The image of `from`, if any.
    pub fn maps(&self, from: usize) -> Option<usize> {
        self.targets.get(from).copied().flatten()
    }

    /// Number of old dimensions the map is aware of.
    pub fn domain_hint(&self) -> usize {
        self.targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_set_dimension() {
        let s: VariableSet = [Variable::new(0), Variable::new(4)].into_iter().collect();
        assert_eq!(s.space_dimension(), 5);
        assert_eq!(s.len(), 2);
        assert!(s.contains(Variable::new(4)));
        assert!(!s.contains(Variable::new(2)));
    }

    #[test]
    fn test_dimension_map_basics() {
        let mut m = DimensionMap::undefined(3);
        assert!(m.has_empty_codomain());
        m.map(0, 1).unwrap();
        m.map(2, 0).unwrap();
        assert!(!m.has_empty_codomain());
        assert_eq!(m.max_in_codomain(), 1);
        assert_eq!(m.maps(0), Some(1));
        assert_eq!(m.maps(1), None);
        assert_eq!(m.maps(2), Some(0));
    }

    #[test]
    fn test_dimension_map_rejects_non_functions() {
        let mut m = DimensionMap::undefined(2);
        m.map(0, 0).unwrap();
        assert!(m.map(0, 1).is_err()); // double image
        assert!(m.map(1, 0).is_err()); // duplicate target
    }
}
