use crate::catalog;
use crate::error::BlockError;
use crate::rules::{CallRule, EmitRule};
use crate::schema::BlockSchema;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BlockDefinition {
    pub schema: BlockSchema,
    pub rule: EmitRule,
}

impl BlockDefinition {
    pub fn call_rule(&self) -> Option<&CallRule> {
        match &self.rule {
            EmitRule::Call(call) => Some(call),
            _ => None,
        }
    }
}

/// Catalog of block types for one editing session. Types are only ever added.
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    definitions: HashMap<String, BlockDefinition>,
    order: Vec<String>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        catalog::register_builtins(&mut registry);
        registry
    }

    /// Inserts a new block type. Returns `false`, leaving the existing entry
    /// untouched, when the type id is already registered.
    pub fn register(&mut self, schema: BlockSchema, rule: EmitRule) -> bool {
        if self.definitions.contains_key(&schema.type_id) {
            debug!(type_id = %schema.type_id, "block type already registered");
            return false;
        }
        let type_id = schema.type_id.clone();
        self.definitions
            .insert(type_id.clone(), BlockDefinition { schema, rule });
        self.order.push(type_id);
        true
    }

    pub fn lookup(&self, type_id: &str) -> Result<&BlockDefinition, BlockError> {
        self.definitions
            .get(type_id)
            .ok_or_else(|| BlockError::UnknownBlockType(type_id.to_string()))
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.definitions.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn type_ids(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::EmitRule;
    use crate::schema::BlockSchema;

    #[test]
    fn second_registration_is_a_no_op() {
        let mut registry = BlockRegistry::new();
        let first = BlockSchema::expression("demo").with_tooltip("first");
        let second = BlockSchema::statement("demo").with_tooltip("second");
        assert!(registry.register(first, EmitRule::Constant("a".into())));
        assert!(!registry.register(second, EmitRule::Constant("b".into())));
        let def = registry.lookup("demo").unwrap();
        assert_eq!(def.schema.tooltip, "first");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_types_are_reported() {
        let registry = BlockRegistry::new();
        assert_eq!(
            registry.lookup("nope").unwrap_err(),
            BlockError::UnknownBlockType("nope".to_string())
        );
    }
}
