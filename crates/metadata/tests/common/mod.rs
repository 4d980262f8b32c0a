//! Entry store test utilities.

use pathmend_metadata::{
    MetadataError, MetadataResult, MetadataStore, MySqlStore, PostgresStore, SqliteStore,
};
use std::sync::Arc;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::mysql::Mysql;
use testcontainers_modules::postgres::Postgres;

/// A SQLite test store in a temporary directory, removed on drop.
#[allow(dead_code)]
pub struct TestStore {
    pub store: Arc<dyn MetadataStore>,
    _temp_dir: TempDir,
}

impl TestStore {
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let store = SqliteStore::new(&db_path, "filecache", None).await?;

        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// PostgreSQL test store backed by a testcontainer.
pub struct PostgresTestStore {
    pub store: Arc<dyn MetadataStore>,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestStore {
    pub async fn new() -> MetadataResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                MetadataError::Internal(format!("Failed to start PostgreSQL container: {e}"))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
        let store = PostgresStore::from_url(&url, "filecache", 5, None).await?;

        Ok(Self {
            store: Arc::new(store),
            _container: container,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// MySQL test store backed by a testcontainer.
pub struct MySqlTestStore {
    pub store: Arc<dyn MetadataStore>,
    _container: ContainerAsync<Mysql>,
}

impl MySqlTestStore {
    pub async fn new() -> MetadataResult<Self> {
        let container = Mysql::default().start().await.map_err(|e| {
            MetadataError::Internal(format!("Failed to start MySQL container: {e}"))
        })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(3306)
            .await
            .expect("Failed to get port");

        // testcontainers-modules mysql: passwordless root, database `test`
        let url = format!("mysql://root@{}:{}/test", host, port);
        let store = MySqlStore::from_url(&url, "filecache", 5).await?;

        Ok(Self {
            store: Arc::new(store),
            _container: container,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// Run a test against SQLite, and against PostgreSQL and MySQL when Docker
/// is available. `SKIP_POSTGRES_TESTS` / `SKIP_MYSQL_TESTS` opt out per backend.
pub async fn run_store_test_all<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn MetadataStore>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestStore::new()
        .await
        .expect("Failed to create SQLite test store");
    test_fn.clone()(sqlite.store()).await;

    if std::env::var("SKIP_POSTGRES_TESTS").is_err() {
        match PostgresTestStore::new().await {
            Ok(postgres) => test_fn.clone()(postgres.store()).await,
            Err(err) => eprintln!("Skipping PostgreSQL entry store tests: {err}"),
        }
    }

    if std::env::var("SKIP_MYSQL_TESTS").is_err() {
        match MySqlTestStore::new().await {
            Ok(mysql) => test_fn(mysql.store()).await,
            Err(err) => eprintln!("Skipping MySQL entry store tests: {err}"),
        }
    }
}
