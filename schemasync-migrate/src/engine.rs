//! Reconciliation engine.
//!
//! A [`Reconciler`] walks declared tables, compares each with the live
//! catalog and executes the statements that converge them, strictly one at a
//! time. Tables referenced by foreign keys are reconciled before the
//! constraint that points at them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use schemasync_schema::{ModelRegistry, SyncConfig, TableDescriptor};
use smol_str::SmolStr;
use tracing::{debug, error, info, trace};

use crate::dependency::{ReferenceTarget, Traversal, resolve_target};
use crate::diff::{SkippedChange, create_table, plan_columns, plan_indexes};
use crate::error::{MigrateResult, MigrationError};
use crate::introspect::LiveTable;
use crate::sql::{DdlStatement, Session, Statement, TableRef, foreign_key_name};

/// Options for a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Allow destructive rebuilds and drop unlisted columns.
    pub force: bool,
    /// Drop live columns that are not declared.
    pub drop_unlisted_columns: bool,
    /// Log every statement at info level before it runs.
    pub debug: bool,
    /// Override the schema of every table.
    pub schema: Option<SmolStr>,
    /// Restrict [`Reconciler::sync_all`] to one model.
    pub model: Option<SmolStr>,
    /// Guess the table of unregistered reference targets.
    pub guess_references: bool,
    /// Render statements without executing them.
    pub dry_run: bool,
}

impl SyncOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow destructive rebuilds; implies dropping unlisted columns.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Drop live columns that are not declared.
    pub fn drop_unlisted_columns(mut self, drop: bool) -> Self {
        self.drop_unlisted_columns = drop;
        self
    }

    /// Log every statement.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Override the schema of every table.
    pub fn schema(mut self, schema: impl Into<SmolStr>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Restrict a full run to one model.
    pub fn model(mut self, model: impl Into<SmolStr>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Guess the table of unregistered reference targets.
    pub fn guess_references(mut self, guess: bool) -> Self {
        self.guess_references = guess;
        self
    }

    /// Render statements without executing them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Whether unlisted live columns are dropped.
    pub fn drops_unlisted(&self) -> bool {
        self.force || self.drop_unlisted_columns
    }

    /// The schema a table is reconciled in.
    pub fn schema_for(&self, descriptor: &TableDescriptor) -> SmolStr {
        self.schema
            .clone()
            .unwrap_or_else(|| descriptor.schema.clone())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            force: config.force,
            drop_unlisted_columns: config.drop_unlisted_columns,
            debug: config.debug,
            schema: config.schema.as_deref().map(SmolStr::new),
            model: config.model.as_deref().map(SmolStr::new),
            guess_references: config.guess_references,
            dry_run: config.dry_run,
        }
    }
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Statements executed (or, in a dry run, planned), in order.
    pub statements: Vec<Statement>,
    /// Changes that were not made.
    pub skipped: Vec<SkippedChange>,
    /// Tables created, as `schema.table`.
    pub created_tables: Vec<String>,
    /// Existing tables that received at least one statement.
    pub altered_tables: Vec<String>,
    /// Run duration in milliseconds.
    pub duration_ms: u64,
    /// Whether statements were only rendered.
    pub dry_run: bool,
}

impl SyncReport {
    /// Check if the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }

    /// Rendered SQL of every statement.
    pub fn sql(&self) -> Vec<&str> {
        self.statements.iter().map(|s| s.sql.as_str()).collect()
    }

    fn collect_altered(&mut self) {
        for statement in &self.statements {
            let Some(table) = statement.ddl.table() else {
                continue;
            };
            let name = table.name();
            if !self.created_tables.contains(&name) && !self.altered_tables.contains(&name) {
                self.altered_tables.push(name);
            }
        }
    }
}

/// State of one top-level call.
#[derive(Debug, Default)]
struct Run {
    traversal: Traversal,
    namespaces: HashMap<SmolStr, Option<u32>>,
    report: SyncReport,
}

/// Reconciles declared tables with a live database.
pub struct Reconciler<'a, S: ?Sized> {
    session: &'a S,
    registry: &'a ModelRegistry,
    options: SyncOptions,
}

impl<'a, S: Session + ?Sized> Reconciler<'a, S> {
    /// Create a reconciler with default options.
    pub fn new(session: &'a S, registry: &'a ModelRegistry) -> Self {
        Self {
            session,
            registry,
            options: SyncOptions::default(),
        }
    }

    /// Set the options.
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the options.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Reconcile one registered model and everything it references.
    pub async fn sync_table(&self, model: &str) -> MigrateResult<SyncReport> {
        let descriptor = self
            .registry
            .get(model)
            .cloned()
            .ok_or_else(|| MigrationError::unknown_model(model))?;
        self.run(vec![descriptor]).await
    }

    /// Reconcile a descriptor that need not be registered.
    ///
    /// Its reference targets still resolve through the registry.
    pub async fn sync_descriptor(
        &self,
        descriptor: Arc<TableDescriptor>,
    ) -> MigrateResult<SyncReport> {
        self.run(vec![descriptor]).await
    }

    /// Reconcile every registered model, or only the configured one.
    ///
    /// All models share one traversal, so each table is reconciled at most
    /// once however many others reference it.
    pub async fn sync_all(&self) -> MigrateResult<SyncReport> {
        let descriptors: Vec<Arc<TableDescriptor>> = match &self.options.model {
            Some(model) => vec![
                self.registry
                    .get(model)
                    .cloned()
                    .ok_or_else(|| MigrationError::unknown_model(model.as_str()))?,
            ],
            None => self.registry.iter().cloned().collect(),
        };

        let database = self.session.database_name().await?;
        info!(
            database = %database,
            models = descriptors.len(),
            dry_run = self.options.dry_run,
            "Starting schema sync"
        );

        self.run(descriptors).await
    }

    async fn run(&self, descriptors: Vec<Arc<TableDescriptor>>) -> MigrateResult<SyncReport> {
        let start = Instant::now();
        let mut run = Run::default();
        run.report.dry_run = self.options.dry_run;

        for descriptor in descriptors {
            self.reconcile(&mut run, descriptor).await?;
        }

        let mut report = run.report;
        report.collect_altered();
        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            statements = report.statements.len(),
            created = report.created_tables.len(),
            altered = report.altered_tables.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration_ms,
            "Schema sync finished"
        );
        Ok(report)
    }

    fn reconcile<'b>(
        &'b self,
        run: &'b mut Run,
        descriptor: Arc<TableDescriptor>,
    ) -> BoxFuture<'b, MigrateResult<()>> {
        Box::pin(async move {
            if !run.traversal.enter(&descriptor.model) {
                trace!(model = %descriptor.model, "Already reconciled in this run");
                return Ok(());
            }

            let table = TableRef::new(self.options.schema_for(&descriptor), descriptor.table.clone());
            info!(model = %descriptor.model, table = %table.name(), "Reconciling table");

            let mut live = match self.ensure_schema(run, &table.schema).await? {
                Some(namespace) => LiveTable::fetch(self.session, namespace, &table).await?,
                None => None,
            };

            let mut retyped = HashSet::new();
            match live.as_mut() {
                None => {
                    self.execute(run, create_table(&descriptor, &table)).await?;
                    run.report.created_tables.push(table.name());
                }
                Some(live) => {
                    let plan = plan_columns(&descriptor, &table, live, &self.options);
                    run.report.skipped.extend(plan.skipped);
                    let executed = run.report.statements.len();
                    for change in plan.changes {
                        let best_effort = change.is_best_effort();
                        let applied = self
                            .execute_group(run, &table, &change.column, change.statements, best_effort)
                            .await?;
                        if applied && change.retypes {
                            retyped.insert(change.column);
                        }
                    }
                    // Dropped columns take their indexes and foreign keys with them.
                    for statement in &run.report.statements[executed..] {
                        if let DdlStatement::DropColumn { column, .. } = &statement.ddl {
                            live.forget_column(&table.table, column);
                        }
                    }
                }
            }

            let indexes = plan_indexes(&descriptor, &table, live.as_ref());
            run.report.skipped.extend(indexes.skipped);
            for group in indexes.create {
                let subject = group.last().map(index_subject).unwrap_or_default();
                self.execute_group(run, &table, &subject, group, false)
                    .await?;
            }
            for ddl in indexes.drop {
                let subject = index_subject(&ddl);
                self.execute_group(run, &table, &subject, vec![ddl], false)
                    .await?;
            }

            self.sync_foreign_keys(run, &descriptor, &table, live.as_ref(), &retyped)
                .await
        })
    }

    /// Converge foreign keys, reconciling each registered target first.
    async fn sync_foreign_keys(
        &self,
        run: &mut Run,
        descriptor: &TableDescriptor,
        table: &TableRef,
        live: Option<&LiveTable>,
        retyped: &HashSet<SmolStr>,
    ) -> MigrateResult<()> {
        for (column, reference) in descriptor.references() {
            let name = foreign_key_name(&descriptor.table, &column.name);

            let target = match resolve_target(
                self.registry,
                reference,
                &table.schema,
                self.options.guess_references,
            ) {
                Ok(target) => target,
                Err(reason) => {
                    error!(table = %table.name(), constraint = %name, reason = %reason, "Cannot resolve foreign key target");
                    run.report
                        .skipped
                        .push(SkippedChange::new(table, name, reason));
                    continue;
                }
            };

            let target_table = match &target {
                ReferenceTarget::Registered { descriptor: target, .. } => {
                    self.reconcile(run, Arc::clone(target)).await?;
                    TableRef::new(self.options.schema_for(target), target.table.clone())
                }
                ReferenceTarget::Guessed { table, .. } => table.clone(),
            };

            let mut statements = Vec::new();
            if live.is_some_and(|live| live.has_foreign_key(&name)) {
                if !retyped.contains(&column.name) {
                    continue;
                }
                debug!(table = %table.name(), constraint = %name, "Recreating foreign key on retyped column");
                statements.push(DdlStatement::DropForeignKey {
                    table: table.clone(),
                    name: name.clone(),
                });
            }
            statements.push(DdlStatement::AddForeignKey {
                table: table.clone(),
                name: name.clone(),
                column: column.name.clone(),
                target: target_table,
                target_column: target.column().clone(),
                on_update: reference.on_update,
                on_delete: reference.on_delete,
            });

            self.execute_group(run, table, &name, statements, false)
                .await?;
        }
        Ok(())
    }

    /// Resolve a schema, creating it when missing.
    ///
    /// Returns `None` only in a dry run, where the schema is never created.
    async fn ensure_schema(&self, run: &mut Run, schema: &SmolStr) -> MigrateResult<Option<u32>> {
        if let Some(namespace) = run.namespaces.get(schema) {
            return Ok(*namespace);
        }

        let mut namespace = self.session.namespace_oid(schema).await?;
        if namespace.is_none() {
            info!(schema = %schema, "Creating schema");
            self.execute(
                run,
                DdlStatement::CreateSchema {
                    schema: schema.clone(),
                },
            )
            .await?;
            if !self.options.dry_run {
                namespace = self.session.namespace_oid(schema).await?;
                if namespace.is_none() {
                    return Err(MigrationError::database(format!(
                        "schema `{}` is still missing after creation",
                        schema
                    )));
                }
            }
        }

        run.namespaces.insert(schema.clone(), namespace);
        Ok(namespace)
    }

    /// Execute one statement, propagating any failure.
    async fn execute(&self, run: &mut Run, ddl: DdlStatement) -> MigrateResult<()> {
        let statement = ddl.render();
        if self.options.debug {
            info!(sql = %statement.sql, "Executing statement");
        } else {
            debug!(sql = %statement.sql, "Executing statement");
        }

        if !self.options.dry_run {
            self.session.execute(&statement).await?;
        }
        run.report.statements.push(statement);
        Ok(())
    }

    /// Execute statements in order, stopping at the first failure.
    ///
    /// A failure is recorded as a skipped change (or ignored for best-effort
    /// drops) and the run continues. Connection failures propagate. Returns
    /// whether every statement ran.
    async fn execute_group(
        &self,
        run: &mut Run,
        table: &TableRef,
        subject: &str,
        statements: Vec<DdlStatement>,
        best_effort: bool,
    ) -> MigrateResult<bool> {
        for ddl in statements {
            match self.execute(run, ddl).await {
                Ok(()) => {}
                Err(err) if err.is_connection() => return Err(err),
                Err(err) if best_effort => {
                    debug!(table = %table.name(), subject = %subject, error = %err, "Ignoring failed drop");
                    return Ok(false);
                }
                Err(err) => {
                    error!(table = %table.name(), subject = %subject, error = %err, "Statement failed, skipping change");
                    run.report
                        .skipped
                        .push(SkippedChange::new(table, subject, err.to_string()));
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

fn index_subject(ddl: &DdlStatement) -> String {
    match ddl {
        DdlStatement::CreateIndex { name, .. } | DdlStatement::DropIndex { name, .. } => name.clone(),
        _ => String::new(),
    }
}
