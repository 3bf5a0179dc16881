//! HTTP Dashboard
//!
//! Read-mostly JSON API over the queue manager. Binds to loopback by
//! default; authentication is out of scope.

mod error;
mod server;
mod types;

pub use server::{build_router, serve};
pub use types::{EnqueueBody, JobView};
