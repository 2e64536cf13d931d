//! Per-driver catalog of properties and actions.

use crate::binding::Property;
use crate::error::{LinkError, Result};
use std::fmt;
use std::sync::Arc;

/// Fire-and-forget command with no response (reset, zero probe, auto gain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Action name
    pub name: String,
    /// Command sent verbatim
    pub command: String,
    /// One-line description for listings
    pub description: String,
}

impl Action {
    /// Build an action.
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Ordered, immutable-after-construction set of named properties and actions.
///
/// Lookups ignore ASCII case.
#[derive(Clone, Default)]
pub struct PropertyTable {
    properties: Vec<Arc<dyn Property>>,
    actions: Vec<Action>,
}

impl fmt::Debug for PropertyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyTable")
            .field("properties", &self.property_names())
            .field("actions", &self.actions)
            .finish()
    }
}

impl PropertyTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property. A property with the same name is replaced.
    pub fn with(mut self, property: Arc<dyn Property>) -> Self {
        self.properties
            .retain(|p| !p.name().eq_ignore_ascii_case(property.name()));
        self.properties.push(property);
        self
    }

    /// Add an action. An action with the same name is replaced.
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions
            .retain(|a| !a.name.eq_ignore_ascii_case(&action.name));
        self.actions.push(action);
        self
    }

    /// Find a property by name.
    pub fn property(&self, name: &str) -> Result<&Arc<dyn Property>> {
        self.properties
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| LinkError::UnknownProperty(name.to_string()))
    }

    /// Find an action by name.
    pub fn action(&self, name: &str) -> Result<&Action> {
        self.actions
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| LinkError::UnknownProperty(name.to_string()))
    }

    /// All properties in registration order.
    pub fn properties(&self) -> impl Iterator<Item = &Arc<dyn Property>> {
        self.properties.iter()
    }

    /// All actions in registration order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Property names in registration order.
    pub fn property_names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name()).collect()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the table has no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;

    fn table() -> PropertyTable {
        PropertyTable::new()
            .with(Arc::new(Binding::<f64>::read_only("field", "RDGFIELD?")))
            .with(Arc::new(Binding::<u8>::read_write("range", "RANGE?", "RANGE {value}")))
            .with_action(Action::new("zero_probe", "ZPROBE", "Zero the probe"))
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = table();
        assert_eq!(table.property("FIELD").unwrap().query_command(), "RDGFIELD?");
        assert_eq!(table.action("Zero_Probe").unwrap().command, "ZPROBE");
    }

    #[test]
    fn test_unknown_names() {
        let table = table();
        assert!(matches!(
            table.property("temperature"),
            Err(LinkError::UnknownProperty(_))
        ));
        assert!(table.action("explode").is_err());
    }

    #[test]
    fn test_duplicate_replaces_and_keeps_order() {
        let table = table().with(Arc::new(Binding::<f64>::read_only("Field", "RDGMX?")));
        assert_eq!(table.property_names(), vec!["range", "Field"]);
        assert_eq!(table.len(), 2);
        assert!(table.property("range").unwrap().set_template().is_some());
        assert!(table.property("field").unwrap().is_read_only());
    }
}
