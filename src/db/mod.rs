pub mod applications;
pub mod documents;
pub mod emails;
pub mod events;
pub mod forms;
pub mod pool;
pub mod reports;
pub mod saved_files;

pub use pool::{create_pool, ping, run_migrations};
