//! Step registry: the ordered, immutable set of steps a run works from.

use super::types::{MigrationError, MigrationStep};
use std::collections::HashMap;

/// Registry of migration steps.
///
/// Steps keep the order they were supplied in; that order, not the lexical
/// order of their names, is the order they are applied in. The registry
/// cannot be changed after construction.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<MigrationStep>,
    positions: HashMap<String, usize>,
}

impl StepRegistry {
    /// Build a registry, validating every step.
    ///
    /// Fails with `DuplicateStepName` if two steps share a name and with
    /// `InvalidStep` if a descriptor is malformed.
    pub fn new(steps: Vec<MigrationStep>) -> Result<Self, MigrationError> {
        let mut positions = HashMap::with_capacity(steps.len());

        for (position, step) in steps.iter().enumerate() {
            step.validate()?;
            if positions.insert(step.name().to_string(), position).is_some() {
                return Err(MigrationError::DuplicateStepName(step.name().to_string()));
            }
        }

        Ok(Self { steps, positions })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(MigrationStep::name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&MigrationStep> {
        self.positions.get(name).map(|&position| &self.steps[position])
    }

    /// Registration index of a step.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str) -> MigrationStep {
        MigrationStep::sql(
            name,
            format!("CREATE TABLE t_{} (id INTEGER)", name.replace('-', "_")),
            format!("DROP TABLE IF EXISTS t_{}", name.replace('-', "_")),
        )
    }

    #[test]
    fn test_empty_registry() {
        let registry = StepRegistry::new(vec![]).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_keeps_registration_order() {
        let registry = StepRegistry::new(vec![step("zeta"), step("alpha"), step("mid")]).unwrap();

        assert_eq!(registry.names(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(registry.position("zeta"), Some(0));
        assert_eq!(registry.position("mid"), Some(2));
        assert_eq!(registry.get("alpha").map(|s| s.name()), Some("alpha"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_name_error() {
        let result = StepRegistry::new(vec![step("a"), step("b"), step("a")]);
        assert!(matches!(
            result,
            Err(MigrationError::DuplicateStepName(name)) if name == "a"
        ));
    }

    #[test]
    fn test_invalid_step_error() {
        let result = StepRegistry::new(vec![step("a"), MigrationStep::sql("b", "SELECT 1", "")]);
        assert!(matches!(result, Err(MigrationError::InvalidStep(_, _))));
    }
}
