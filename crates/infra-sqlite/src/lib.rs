// Taskbelt Infrastructure - SQLite Adapter
// Implements: JobStore (atomic claim, transactional transitions, metrics log)

mod connection;
mod job_store;
mod migration;

pub use connection::create_pool;
pub use job_store::SqliteJobStore;
pub use migration::run_migrations;

// sqlx::Error conversion is wrapped in helper functions here; orphan
// rules prevent implementing From<sqlx::Error> for QueueError in core.
