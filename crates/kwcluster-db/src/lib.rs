//! # kwcluster-db
//!
//! PostgreSQL database layer for kwcluster.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for research jobs and keyword records
//! - An in-memory store with the same transition rules, for local runs and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use kwcluster_db::{Database, JobRepository, CreateJobRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/kwcluster").await?;
//!     db.migrate().await?;
//!
//!     let job = db.jobs.create(CreateJobRequest::new(
//!         "alice", "keywords.csv", None, "./uploads/abc.csv", false,
//!     )).await?;
//!     println!("Created job: {}", job.id);
//!     Ok(())
//! }
//! ```

pub mod jobs;
pub mod keywords;
pub mod memory;
pub mod pool;

// Test fixtures for integration tests
pub mod test_fixtures;

// Re-export core types
pub use kwcluster_core::*;

pub use jobs::PgJobRepository;
pub use keywords::PgKeywordRepository;
pub use memory::MemoryStore;
pub use pool::{connect_pool, PoolConfig};

/// Database handle bundling the pool and every repository.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Research job repository.
    pub jobs: PgJobRepository,
    /// Keyword record repository.
    pub keywords: PgKeywordRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgJobRepository::new(pool.clone()),
            keywords: PgKeywordRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = connect_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }
}
