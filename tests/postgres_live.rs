//! Tests against a running PostgreSQL server.
//!
//! Ignored by default. Run with:
//!
//! ```text
//! SCHEMASYNC_TEST_DATABASE_URL=postgresql://postgres@localhost/schemasync_test \
//!     cargo test --test postgres_live -- --ignored
//! ```
//!
//! Every test works in its own schema and drops it afterwards.

use schemasync::migrate::Introspector;
use schemasync::prelude::*;
use schemasync::schema::{DatabaseConfig, SyncConfig};

fn database_url() -> String {
    std::env::var("SCHEMASYNC_TEST_DATABASE_URL")
        .expect("SCHEMASYNC_TEST_DATABASE_URL must be set for live tests")
}

fn test_schema(name: &str) -> String {
    format!("schemasync_it_{}_{}", name, std::process::id())
}

async fn drop_schema(pool: &PgPool, schema: &str) {
    let conn = pool.get().await.unwrap();
    conn.inner()
        .batch_execute(&format!("drop schema if exists \"{}\" cascade", schema))
        .await
        .unwrap();
}

fn registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(
            TableDeclaration::for_model("Team")
                .primary_key("id")
                .column("id", ColumnDeclaration::new("varchar(12)"))
                .column("name", ColumnDeclaration::new("varchar(80)"))
                .unique("name"),
        )
        .unwrap();
    registry
        .register(
            TableDeclaration::for_model("Member")
                .primary_key("id")
                .column("id", ColumnDeclaration::new("serial"))
                .column(
                    "team_id",
                    ColumnDeclaration::new("varchar(12)").references(ForeignKeyRef::to("Team")),
                )
                .column("age", ColumnDeclaration::new("integer").default(18))
                .column("price", ColumnDeclaration::new("numeric(10,2)"))
                .column("tags", ColumnDeclaration::new("text[]"))
                .column("note", ColumnDeclaration::new("text").default("it's $free"))
                .index("age"),
        )
        .unwrap();
    registry
}

#[tokio::test]
#[ignore]
async fn test_live_create_and_idempotent() {
    let pool = PgPool::connect(&database_url()).unwrap();
    let schema = test_schema("idempotent");
    drop_schema(&pool, &schema).await;

    let conn = pool.get().await.unwrap();
    let registry = registry();
    let options = SyncOptions::new().schema(schema.as_str());

    let first = Reconciler::new(&conn, &registry)
        .with_options(options.clone())
        .sync_all()
        .await
        .unwrap();
    assert_eq!(first.created_tables.len(), 2);
    assert!(first.skipped.is_empty(), "{:?}", first.skipped);

    let second = Reconciler::new(&conn, &registry)
        .with_options(options)
        .sync_all()
        .await
        .unwrap();
    assert!(second.is_noop(), "unexpected statements: {:?}", second.sql());

    let namespace = conn.namespace_oid(&schema).await.unwrap().unwrap();
    let keys = conn.foreign_keys(namespace, "member").await.unwrap();
    assert_eq!(keys, vec!["member_team_id_fkey".to_string()]);

    drop_schema(&pool, &schema).await;
}

#[tokio::test]
#[ignore]
async fn test_live_rejected_statement_is_skipped() {
    let pool = PgPool::connect(&database_url()).unwrap();
    let schema = test_schema("rejected");
    drop_schema(&pool, &schema).await;
    let conn = pool.get().await.unwrap();
    let options = SyncOptions::new().schema(schema.as_str());

    let mut registry = ModelRegistry::new();
    registry
        .register(
            TableDeclaration::new("item")
                .primary_key("id")
                .column("id", ColumnDeclaration::new("serial"))
                .column("label", ColumnDeclaration::new("text").nullable()),
        )
        .unwrap();
    Reconciler::new(&conn, &registry)
        .with_options(options.clone())
        .sync_all()
        .await
        .unwrap();

    conn.inner()
        .batch_execute(&format!(
            "insert into \"{}\".\"item\" (label) values (null)",
            schema
        ))
        .await
        .unwrap();

    // Existing NULLs make `set not null` fail; the run carries on.
    let mut registry = ModelRegistry::new();
    registry
        .register(
            TableDeclaration::new("item")
                .primary_key("id")
                .column("id", ColumnDeclaration::new("serial"))
                .column("label", ColumnDeclaration::new("text"))
                .index("label"),
        )
        .unwrap();
    let report = Reconciler::new(&conn, &registry)
        .with_options(options)
        .sync_all()
        .await
        .unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].subject, "label");
    assert!(report.sql().iter().any(|sql| sql.starts_with("create index")));

    drop_schema(&pool, &schema).await;
}

#[tokio::test]
#[ignore]
async fn test_live_sync_with_config() {
    let schema = test_schema("config");
    let config = SchemasyncConfig {
        database: DatabaseConfig {
            url: Some(database_url()),
            ..Default::default()
        },
        sync: SyncConfig {
            schema: Some(schema.clone()),
            ..Default::default()
        },
    };

    let report = schemasync::sync_with_config(&config, &registry())
        .await
        .unwrap();
    assert_eq!(report.created_tables.len(), 2);

    let pool = PgPool::connect(&database_url()).unwrap();
    drop_schema(&pool, &schema).await;
}
