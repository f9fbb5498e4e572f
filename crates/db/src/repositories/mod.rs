pub mod queue_repo;
pub mod worker_repo;

pub use queue_repo::QueueRepo;
pub use worker_repo::WorkerRepo;
