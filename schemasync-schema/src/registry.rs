//! Model registry.
//!
//! The registry is an explicit value handed to the reconciler rather than
//! process-wide state, so each caller (and each test) owns its own set of
//! models.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::error::{SchemaError, SchemaResult};
use crate::table::{TableDeclaration, TableDescriptor};

/// Maps model names to their descriptors, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: IndexMap<SmolStr, Arc<TableDescriptor>>,
    tables: HashMap<(SmolStr, SmolStr), SmolStr>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and register a declaration.
    pub fn register(&mut self, decl: TableDeclaration) -> SchemaResult<Arc<TableDescriptor>> {
        self.register_descriptor(decl.build()?)
    }

    /// Register an already normalized descriptor.
    ///
    /// Fails if the model name, or the schema-qualified table, is taken.
    pub fn register_descriptor(
        &mut self,
        descriptor: TableDescriptor,
    ) -> SchemaResult<Arc<TableDescriptor>> {
        if self.models.contains_key(&descriptor.model) {
            return Err(SchemaError::duplicate("model", descriptor.model.as_str()));
        }
        let key = (descriptor.schema.clone(), descriptor.table.clone());
        if let Some(owner) = self.tables.get(&key) {
            return Err(SchemaError::duplicate(
                "table",
                format!("{}.{} (already registered by `{}`)", key.0, key.1, owner),
            ));
        }

        debug!(model = %descriptor.model, table = %descriptor.table, "Registered model");

        let descriptor = Arc::new(descriptor);
        self.tables.insert(key, descriptor.model.clone());
        self.models
            .insert(descriptor.model.clone(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Look up a model by name.
    pub fn get(&self, model: &str) -> Option<&Arc<TableDescriptor>> {
        self.models.get(model)
    }

    /// Look up a model by its schema-qualified table.
    pub fn find_by_table(&self, schema: &str, table: &str) -> Option<&Arc<TableDescriptor>> {
        self.tables
            .get(&(SmolStr::new(schema), SmolStr::new(table)))
            .and_then(|model| self.models.get(model))
    }

    /// Check if a model is registered.
    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    /// Registered model names, in registration order.
    pub fn model_names(&self) -> impl Iterator<Item = &SmolStr> {
        self.models.keys()
    }

    /// Registered descriptors, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TableDescriptor>> {
        self.models.values()
    }

    /// Number of registered models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
