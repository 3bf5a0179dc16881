// Application Layer - services orchestrating the domain over the ports

pub mod pool;
pub mod queue;
pub mod worker;

pub use pool::WorkerPool;
pub use queue::{EnqueueRequest, QueueManager};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerSettings};
