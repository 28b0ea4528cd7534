//! Mediator wiring for the file queries
//!
//! The read side only needs the pool, so every query handler is registered
//! here. Commands also need the blob store and the ingestion queue and are
//! dispatched by the routes directly.

pub use mediator::DefaultAsyncMediator;
use sqlx::SqlitePool;

pub type AppMediator = DefaultAsyncMediator;

/// Register the file query handlers
///
/// Registration blocks in place, so this must be called from a multi-threaded
/// Tokio runtime.
pub fn build_mediator(pool: SqlitePool) -> AppMediator {
    DefaultAsyncMediator::builder()
        .add_handler({
            let pool = pool.clone();
            move |query| {
                let pool = pool.clone();
                async move { crate::features::files::queries::list::handle(pool, query).await }
            }
        })
        .add_handler({
            let pool = pool.clone();
            move |query| {
                let pool = pool.clone();
                async move { crate::features::files::queries::get::handle(pool, query).await }
            }
        })
        .add_handler({
            let pool = pool.clone();
            move |query| {
                let pool = pool.clone();
                async move { crate::features::files::queries::rows::handle(pool, query).await }
            }
        })
        .add_handler({
            let pool = pool.clone();
            move |query| {
                let pool = pool.clone();
                async move { crate::features::files::queries::progress::handle(pool, query).await }
            }
        })
        .build()
}
