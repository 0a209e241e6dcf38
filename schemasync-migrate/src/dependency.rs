//! Foreign key target resolution and the per-run traversal guard.

use std::collections::HashSet;
use std::sync::Arc;

use schemasync_schema::{ForeignKeyRef, ModelRegistry, TableDescriptor};
use smol_str::SmolStr;
use tracing::warn;

use crate::sql::TableRef;

/// Column used when a guessed target names none.
pub const GUESSED_TARGET_COLUMN: &str = "id";

/// Where a foreign key points.
#[derive(Debug, Clone)]
pub enum ReferenceTarget {
    /// A registered model, reconciled before the constraint is created.
    Registered {
        /// Target descriptor.
        descriptor: Arc<TableDescriptor>,
        /// Referenced column.
        column: SmolStr,
    },
    /// A table name guessed from an unregistered model name.
    Guessed {
        /// Guessed table.
        table: TableRef,
        /// Referenced column.
        column: SmolStr,
    },
}

impl ReferenceTarget {
    /// The referenced column.
    pub fn column(&self) -> &SmolStr {
        match self {
            Self::Registered { column, .. } | Self::Guessed { column, .. } => column,
        }
    }
}

/// Resolve the target of a reference.
///
/// Registered models resolve to their primary key unless a column is named.
/// Unregistered models are an error unless `guess` is set, in which case the
/// lowercased model name is assumed to be a table in `schema`.
pub fn resolve_target(
    registry: &ModelRegistry,
    reference: &ForeignKeyRef,
    schema: &str,
    guess: bool,
) -> Result<ReferenceTarget, String> {
    if let Some(descriptor) = registry.get(&reference.model) {
        let column = match (&reference.column, descriptor.primary_key.as_slice()) {
            (Some(column), _) => column.clone(),
            (None, [key]) => key.clone(),
            (None, _) => {
                return Err(format!(
                    "model `{}` has a composite key; name the referenced column",
                    reference.model
                ));
            }
        };
        if !descriptor.column(&column).is_some_and(|c| c.is_active()) {
            return Err(format!(
                "model `{}` has no column `{}`",
                reference.model, column
            ));
        }
        return Ok(ReferenceTarget::Registered {
            descriptor: Arc::clone(descriptor),
            column,
        });
    }

    if !guess {
        return Err(format!("model `{}` is not registered", reference.model));
    }

    let table = TableRef::new(schema, reference.model.to_lowercase());
    let column = reference
        .column
        .clone()
        .unwrap_or_else(|| SmolStr::new(GUESSED_TARGET_COLUMN));
    warn!(
        model = %reference.model,
        table = %table,
        column = %column,
        "Guessing foreign key target for unregistered model"
    );
    Ok(ReferenceTarget::Guessed { table, column })
}

/// Models already reconciled during one top-level call.
///
/// A model is entered at most once per traversal, which both breaks cycles
/// between mutually referencing tables and avoids reconciling a shared
/// target once per referencing column.
#[derive(Debug, Default)]
pub struct Traversal {
    visited: HashSet<SmolStr>,
    order: Vec<SmolStr>,
}

impl Traversal {
    /// Start an empty traversal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a model as entered. Returns `false` if it already was.
    pub fn enter(&mut self, model: &SmolStr) -> bool {
        if self.visited.insert(model.clone()) {
            self.order.push(model.clone());
            true
        } else {
            false
        }
    }

    /// Check if a model was entered.
    pub fn is_visited(&self, model: &str) -> bool {
        self.visited.contains(model)
    }

    /// Models in the order they were entered.
    pub fn order(&self) -> &[SmolStr] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemasync_schema::{ColumnDeclaration, PrimaryKey, TableDeclaration};

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register(
                TableDeclaration::for_model("Team")
                    .primary_key("id")
                    .column("id", ColumnDeclaration::new("varchar(12)"))
                    .column("slug", ColumnDeclaration::new("text")),
            )
            .unwrap();
        registry
            .register(
                TableDeclaration::new("membership")
                    .primary_key(PrimaryKey::composite(["user_id", "team_id"]))
                    .column("user_id", ColumnDeclaration::new("varchar(12)"))
                    .column("team_id", ColumnDeclaration::new("varchar(12)")),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_registered_target_uses_primary_key() {
        let target = resolve_target(&registry(), &ForeignKeyRef::to("Team"), "public", false).unwrap();
        match &target {
            ReferenceTarget::Registered { descriptor, column } => {
                assert_eq!(descriptor.table, "team");
                assert_eq!(column, "id");
            }
            other => panic!("unexpected target {:?}", other),
        }
        assert_eq!(target.column(), "id");
    }

    #[test]
    fn test_registered_target_named_column() {
        let target = resolve_target(
            &registry(),
            &ForeignKeyRef::to("Team").column("slug"),
            "public",
            false,
        )
        .unwrap();
        assert_eq!(target.column(), "slug");

        let err = resolve_target(
            &registry(),
            &ForeignKeyRef::to("Team").column("nope"),
            "public",
            false,
        )
        .unwrap_err();
        assert!(err.contains("nope"));
    }

    #[test]
    fn test_composite_target_needs_column() {
        let err = resolve_target(&registry(), &ForeignKeyRef::to("membership"), "public", false)
            .unwrap_err();
        assert!(err.contains("composite"));
    }

    #[test]
    fn test_unregistered_target() {
        let err = resolve_target(&registry(), &ForeignKeyRef::to("Account"), "public", false)
            .unwrap_err();
        assert!(err.contains("not registered"));

        let target =
            resolve_target(&registry(), &ForeignKeyRef::to("Account"), "app", true).unwrap();
        match target {
            ReferenceTarget::Guessed { table, column } => {
                assert_eq!(table, TableRef::new("app", "account"));
                assert_eq!(column, GUESSED_TARGET_COLUMN);
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_traversal_enters_once() {
        let mut traversal = Traversal::new();
        let team = SmolStr::new("Team");
        assert!(traversal.enter(&team));
        assert!(!traversal.enter(&team));
        assert!(traversal.enter(&SmolStr::new("User")));
        assert!(traversal.is_visited("Team"));
        assert_eq!(traversal.order(), &[SmolStr::new("Team"), SmolStr::new("User")]);
    }
}
