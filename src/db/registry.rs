//! Named connection pool registry.
//!
//! [`PoolRegistry`] maps pool identifiers to live pools. It is a cheaply
//! cloneable handle; clones share the same pools.
//!
//! # Concurrency
//!
//! - Each identifier owns a `OnceCell`, so concurrent registrations of the
//!   same identifier construct at most one pool and the first success wins
//! - Distinct identifiers are constructed in parallel; the map lock is never
//!   held across pool construction or pool shutdown
//! - A pool whose construction finishes after its identifier was destroyed is
//!   closed instead of being published

use super::driver::{AccessMode, ConnectionSource, DriverConnection, PoolFactory};
use super::executor::SqlExecutor;
use super::sqlx_driver::SqlxPoolFactory;
use crate::config::{OptionDiagnostic, PoolDefinition, PoolSettings};
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// Connection type handed out by a registry built on factory `F`.
pub type ConnectionOf<F> = <<F as PoolFactory>::Pool as ConnectionSource>::Connection;

type PoolSlot<P> = Arc<OnceCell<Arc<P>>>;

/// Outcome of [`PoolRegistry::initialize`].
#[derive(Debug, Default)]
pub struct InitializeSummary {
    /// Pools constructed by this call.
    pub registered: Vec<String>,
    /// Identifiers that already had a live pool; their definitions were ignored.
    pub already_present: Vec<String>,
    pub disabled: Vec<String>,
    pub failed: Vec<(String, DbError)>,
    /// Tuning option problems, per pool identifier.
    pub diagnostics: Vec<(String, OptionDiagnostic)>,
}

impl InitializeSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Registration {
    Created(Vec<OptionDiagnostic>),
    AlreadyPresent,
}

pub struct PoolRegistry<F: PoolFactory = SqlxPoolFactory> {
    factory: Arc<F>,
    pools: Arc<RwLock<HashMap<String, PoolSlot<F::Pool>>>>,
}

impl<F: PoolFactory> Clone for PoolRegistry<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            pools: Arc::clone(&self.pools),
        }
    }
}

impl PoolRegistry<SqlxPoolFactory> {
    /// Create an empty registry backed by sqlx pools.
    pub fn new() -> Self {
        Self::with_factory(SqlxPoolFactory)
    }
}

impl Default for PoolRegistry<SqlxPoolFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: PoolFactory> PoolRegistry<F> {
    pub fn with_factory(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a pool for every enabled definition that has none yet.
    ///
    /// A definition that fails validation or construction is logged and
    /// skipped; the remaining definitions are still processed.
    pub async fn initialize(&self, definitions: &[PoolDefinition]) -> InitializeSummary {
        let mut summary = InitializeSummary::default();

        for definition in definitions {
            let id = definition.pool_id().to_string();
            if !definition.enabled {
                warn!(pool_id = %id, "Pool definition is disabled, skipping");
                summary.disabled.push(id);
                continue;
            }

            match self.register(definition).await {
                Ok(Registration::Created(diagnostics)) => {
                    summary
                        .diagnostics
                        .extend(diagnostics.into_iter().map(|d| (id.clone(), d)));
                    summary.registered.push(id);
                }
                Ok(Registration::AlreadyPresent) => {
                    debug!(pool_id = %id, "Pool already registered");
                    summary.already_present.push(id);
                }
                Err(e) => {
                    warn!(pool_id = %id, error = %e, "Failed to create pool");
                    summary.failed.push((id, e));
                }
            }
        }

        info!(
            registered = summary.registered.len(),
            already_present = summary.already_present.len(),
            disabled = summary.disabled.len(),
            failed = summary.failed.len(),
            "Pool registry initialized"
        );
        summary
    }

    async fn register(&self, definition: &PoolDefinition) -> DbResult<Registration> {
        let id = definition.pool_id();
        let cell = self.slot(id).await;

        let mut created = None;
        let created_ref = &mut created;
        let result = cell
            .get_or_try_init(|| async move {
                definition.validate()?;
                let (mut settings, mut diagnostics) =
                    PoolSettings::from_options(&definition.options);
                if let Some(kind) = definition.driver_kind() {
                    diagnostics.extend(settings.clamp_to_capacity(kind));
                }
                for diagnostic in &diagnostics {
                    warn!(pool_id = %id, option = %diagnostic.option, "{}", diagnostic.message);
                }

                info!(
                    pool_id = %id,
                    url = %definition.masked_url(),
                    driver = ?definition.driver_kind(),
                    "Creating pool"
                );
                let pool = self.factory.create_pool(definition, &settings).await?;
                *created_ref = Some(diagnostics);
                Ok::<_, DbError>(Arc::new(pool))
            })
            .await;

        let pool = match result {
            Ok(pool) => Arc::clone(pool),
            Err(e) => {
                self.discard_empty_slot(id, &cell).await;
                return Err(e);
            }
        };

        let Some(diagnostics) = created else {
            return Ok(Registration::AlreadyPresent);
        };

        let published = {
            let pools = self.pools.read().await;
            pools.get(id).is_some_and(|slot| Arc::ptr_eq(slot, &cell))
        };
        if !published {
            warn!(pool_id = %id, "Pool was destroyed during construction, closing it");
            pool.close().await;
            return Err(DbError::pool_not_found(id));
        }

        info!(pool_id = %id, "Pool registered");
        Ok(Registration::Created(diagnostics))
    }

    /// Get or insert the slot for `id`.
    async fn slot(&self, id: &str) -> PoolSlot<F::Pool> {
        {
            let pools = self.pools.read().await;
            if let Some(cell) = pools.get(id) {
                return Arc::clone(cell);
            }
        }
        let mut pools = self.pools.write().await;
        Arc::clone(
            pools
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Remove a slot left uninitialized by a failed construction.
    async fn discard_empty_slot(&self, id: &str, cell: &PoolSlot<F::Pool>) {
        let mut pools = self.pools.write().await;
        let stale = pools
            .get(id)
            .is_some_and(|slot| Arc::ptr_eq(slot, cell) && slot.get().is_none());
        if stale {
            pools.remove(id);
        }
    }

    async fn pool(&self, id: &str) -> DbResult<Arc<F::Pool>> {
        let pools = self.pools.read().await;
        pools
            .get(id)
            .and_then(|cell| cell.get())
            .cloned()
            .ok_or_else(|| DbError::pool_not_found(id))
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    /// Borrow a read-only connection with auto-commit on.
    pub async fn acquire_connection(&self, id: &str) -> DbResult<ConnectionOf<F>> {
        self.acquire_with(id, AccessMode::ReadOnly).await
    }

    /// Borrow a writable connection with auto-commit on. The caller drives
    /// commit and rollback.
    pub async fn acquire_tx_connection(&self, id: &str) -> DbResult<ConnectionOf<F>> {
        self.acquire_with(id, AccessMode::ReadWrite).await
    }

    pub async fn acquire_with(&self, id: &str, mode: AccessMode) -> DbResult<ConnectionOf<F>> {
        let pool = self.pool(id).await?;
        let mut conn = pool.acquire().await?;
        if let Err(e) = apply_mode(&mut conn, mode).await {
            if let Err(close_err) = conn.close().await {
                warn!(pool_id = %id, error = %close_err, "Failed to release connection");
            }
            return Err(e);
        }
        debug!(pool_id = %id, mode = ?mode, "Connection acquired");
        Ok(conn)
    }

    /// Executor over a read-only connection.
    pub async fn acquire_executor(&self, id: &str) -> DbResult<SqlExecutor<ConnectionOf<F>>> {
        self.acquire_executor_with(id, AccessMode::ReadOnly).await
    }

    /// Executor over a writable connection with auto-commit on.
    pub async fn acquire_tx_executor(&self, id: &str) -> DbResult<SqlExecutor<ConnectionOf<F>>> {
        self.acquire_executor_with(id, AccessMode::ReadWrite).await
    }

    pub async fn acquire_executor_with(
        &self,
        id: &str,
        mode: AccessMode,
    ) -> DbResult<SqlExecutor<ConnectionOf<F>>> {
        let conn = self.acquire_with(id, mode).await?;
        SqlExecutor::new(conn)
    }

    // =========================================================================
    // Teardown and inspection
    // =========================================================================

    /// Remove and close one pool. No-op when `id` is unknown.
    pub async fn destroy(&self, id: &str) {
        let removed = {
            let mut pools = self.pools.write().await;
            pools.remove(id)
        }; // Lock released here

        if let Some(pool) = removed.as_ref().and_then(|cell| cell.get()) {
            info!(pool_id = %id, "Closing pool");
            pool.close().await;
        }
    }

    /// Remove and close every pool. The registry stays usable.
    pub async fn destroy_all(&self) {
        let drained: Vec<_> = {
            let mut pools = self.pools.write().await;
            pools.drain().collect()
        }; // Lock released here

        for (id, cell) in drained {
            if let Some(pool) = cell.get() {
                info!(pool_id = %id, "Closing pool");
                pool.close().await;
            }
        }
        info!("All pools closed");
    }

    /// Sorted identifiers of the live pools.
    pub async fn list_ids(&self) -> Vec<String> {
        let pools = self.pools.read().await;
        let mut ids: Vec<String> = pools
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn contains(&self, id: &str) -> bool {
        let pools = self.pools.read().await;
        pools.get(id).is_some_and(|cell| cell.initialized())
    }
}

async fn apply_mode<C: DriverConnection>(conn: &mut C, mode: AccessMode) -> DbResult<()> {
    let (read_only, auto_commit) = match mode {
        AccessMode::ReadOnly => (true, true),
        AccessMode::ReadWrite => (false, true),
        AccessMode::Transactional => (false, false),
    };
    // Read-only first: it applies to the transaction opened by auto-commit off.
    if conn.is_read_only() != read_only {
        conn.set_read_only(read_only).await?;
    }
    if conn.is_auto_commit() != auto_commit {
        conn.set_auto_commit(auto_commit).await?;
    }
    Ok(())
}
