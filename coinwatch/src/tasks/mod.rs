//! Background work owned by the query client.
//!
//! Prefetches run here, keyed by the query they fill so the same key is never
//! prefetched twice at once.
//!
//! ```no_run
//! use coinwatch::QueryKey;
//! use coinwatch::tasks::{TaskConfig, TaskManager};
//! use std::time::Duration;
//!
//! # async fn run() {
//! let tasks = TaskManager::new(TaskConfig::default().timeout(Duration::from_secs(10)));
//! tasks.spawn_with_key(QueryKey::list(2), async { /* ... */ });
//! tasks.wait_all().await;
//! # }
//! ```

mod manager;
mod policy;

pub use manager::TaskManager;
pub use policy::{TaskConfig, TimeoutPolicy};
