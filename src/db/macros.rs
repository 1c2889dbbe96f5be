//! Dispatch macros shared by the pool and query layers.
//!
//! The engine keeps one concrete sqlx pool type per dialect instead of
//! `AnyPool`, so every operation that touches a pool fans out three ways.
//! These macros keep those fan-outs linear.

/// Match on a `DbPool` and run the same body against each concrete pool.
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => p.size(),
///     Postgres(p) => p.size(),
///     Sqlite(p) => p.size(),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Apply [`PoolSizing`](crate::db::pool::PoolSizing) and the health-check
/// probe to a dialect-specific `PoolOptions` builder.
///
/// Idle connections are checked with the probe statement before they are
/// handed out; sqlx's own ping is disabled so the check runs once.
#[macro_export]
macro_rules! configure_pool {
    ($builder:expr, $sizing:expr, $probe:expr) => {{
        let probe: &'static str = $probe;
        $builder
            .max_connections($sizing.max_connections)
            .min_connections($sizing.min_idle)
            .acquire_timeout($sizing.connect_timeout)
            .idle_timeout(Some($sizing.idle_timeout))
            .test_before_acquire(false)
            .before_acquire(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::Executor::execute(&mut *conn, probe).await?;
                    Ok(true)
                })
            })
    }};
}

pub use configure_pool;
pub use impl_db_dispatch;
