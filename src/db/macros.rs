//! Backend dispatch macros for reducing code duplication.
//!
//! The sqlx types for each backend differ, but much of the code driving them
//! is textually identical. These macros expand that code once per backend at
//! compile time.

/// Expand one body per backend variant of a two-backend enum.
///
/// The enum must have `MySql` and `Sqlite` tuple variants and be in scope
/// under `$ty`.
///
/// # Example
///
/// ```ignore
/// dispatch_backend!(self, SqlxPool, pool => pool.close().await)
/// ```
macro_rules! dispatch_backend {
    ($value:expr, $ty:ident, $inner:ident => $body:expr) => {
        match $value {
            $ty::MySql($inner) => $body,
            $ty::Sqlite($inner) => $body,
        }
    };
}

/// Attach validation-query hooks to a sqlx `PoolOptions`.
///
/// With `test_on_borrow` the query runs before a connection is handed out and
/// a failure discards it. With `test_on_return` it runs when a connection is
/// returned and a failure closes it instead of keeping it idle.
macro_rules! with_validation_hooks {
    ($options:expr, $settings:expr) => {{
        let mut options = $options;
        if let Some(query) = $settings.validation_query.clone() {
            if $settings.test_on_borrow {
                let query = query.clone();
                options = options.before_acquire(move |conn, _meta| {
                    let query = query.clone();
                    Box::pin(async move {
                        sqlx::Executor::execute(&mut *conn, query.as_str()).await?;
                        Ok(true)
                    })
                });
            }
            if $settings.test_on_return {
                options = options.after_release(move |conn, _meta| {
                    let query = query.clone();
                    Box::pin(async move {
                        Ok(sqlx::Executor::execute(&mut *conn, query.as_str())
                            .await
                            .is_ok())
                    })
                });
            }
        }
        options
    }};
}

pub(crate) use dispatch_backend;
pub(crate) use with_validation_hooks;
