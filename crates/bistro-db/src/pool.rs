//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Service Startup                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::from_env() / DbConfig::new(path) ← Configure pool settings  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├── db.tables().find_by_id(..)   auto-commit, any connection    │
//! │       └── db.atomic(|tx| ..)           one connection, BEGIN IMMEDIATE │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode and Busy Timeout
//! WAL lets readers proceed while one writer holds the lock. Writers queue on
//! the lock for up to `busy_timeout`; without it a second `BEGIN IMMEDIATE`
//! fails at once with `SQLITE_BUSY`.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ConfigError, DbError, DbResult};
use crate::events::{DomainEvent, EventBus, DEFAULT_EVENT_CAPACITY};
use crate::handle::DbHandle;
use crate::migrations;
use crate::repository::account::AccountRepository;
use crate::repository::cart::CartLineRepository;
use crate::repository::merchant::MerchantRepository;
use crate::repository::reconciliation::ReconciliationRepository;
use crate::repository::settlement::SettlementRepository;
use crate::repository::store::StoreRepository;
use crate::repository::table::TableRepository;
use crate::repository::user::UserRepository;

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/bistro/bistro.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long to wait for a free pooled connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// How long a writer waits for the database lock.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Buffer of the domain event channel.
    /// Default: 256
    pub event_capacity: usize,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the lock wait of writers.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// A single connection: the database lives and dies with it.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(IN_MEMORY_PATH)
    }

    /// Reads the configuration from `BISTRO_*` environment variables.
    ///
    /// ## Variables
    /// ```text
    /// BISTRO_DATABASE_PATH         file path, or ":memory:"    (./bistro.db)
    /// BISTRO_DB_MAX_CONNECTIONS    u32                         (5)
    /// BISTRO_DB_MIN_CONNECTIONS    u32                         (1)
    /// BISTRO_DB_BUSY_TIMEOUT_MS    u64 milliseconds            (5000)
    /// BISTRO_DB_RUN_MIGRATIONS     true | false                (true)
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`DbConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("BISTRO_DATABASE_PATH").unwrap_or_else(|| "./bistro.db".to_string());
        let mut config = if path == IN_MEMORY_PATH {
            DbConfig::in_memory()
        } else {
            DbConfig::new(path)
        };

        if let Some(max) = parse_var(&lookup, "BISTRO_DB_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(min) = parse_var(&lookup, "BISTRO_DB_MIN_CONNECTIONS")? {
            config.min_connections = min;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "BISTRO_DB_BUSY_TIMEOUT_MS")? {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(run) = parse_var(&lookup, "BISTRO_DB_RUN_MIGRATIONS")? {
            config.run_migrations = run;
        }

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue("BISTRO_DB_MAX_CONNECTIONS".to_string()));
        }
        if config.min_connections > config.max_connections {
            return Err(ConfigError::InvalidValue("BISTRO_DB_MIN_CONNECTIONS".to_string()));
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access and atomic blocks.
///
/// Cheap to clone; clones share the pool, the event channel and the store
/// identity used by the nested-transaction guard.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::from_env()?).await?;
///
/// // Single statements auto-commit
/// let table = db.tables().find_by_id(4).await?;
///
/// // Several statements commit together
/// db.atomic(|tx| Box::pin(async move { ... })).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Identity of this store instance.
    id: Uuid,

    events: EventBus,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    ///    - Busy timeout so writers queue on the lock
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let base = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new().filename(&config.database_path)
        };

        let connect_options = base
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!(busy_timeout_ms = config.busy_timeout.as_millis() as u64, "Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout));

        if config.is_in_memory() {
            // Closing the only connection would drop the database.
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let db = Database {
            pool,
            id: Uuid::new_v4(),
            events: EventBus::new(config.event_capacity),
        };

        info!(
            store = %db.id,
            max_connections = config.max_connections,
            "Database pool created"
        );

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    ///
    /// Idempotent; called by `new()` when `run_migrations` is set.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Identity of this store, shared by clones.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Receives every domain event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    fn handle(&self) -> DbHandle<'static> {
        DbHandle::pooled(self.pool.clone(), self.events.clone())
    }

    /// Dine tables, each call auto-committing.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let seated = db.tables().transition_status(4, Some(order_id), Idle, Occupied).await?;
    /// ```
    pub fn tables(&self) -> TableRepository<'static> {
        TableRepository::new(self.handle())
    }

    pub fn cart_lines(&self) -> CartLineRepository<'static> {
        CartLineRepository::new(self.handle())
    }

    pub fn accounts(&self) -> AccountRepository<'static> {
        AccountRepository::new(self.handle())
    }

    pub fn settlements(&self) -> SettlementRepository<'static> {
        SettlementRepository::new(self.handle())
    }

    pub fn reconciliations(&self) -> ReconciliationRepository<'static> {
        ReconciliationRepository::new(self.handle())
    }

    pub fn merchants(&self) -> MerchantRepository<'static> {
        MerchantRepository::new(self.handle())
    }

    pub fn stores(&self) -> StoreRepository<'static> {
        StoreRepository::new(self.handle())
    }

    pub fn users(&self) -> UserRepository<'static> {
        UserRepository::new(self.handle())
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
