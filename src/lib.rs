// taskflow - hierarchical task list with versioned key-value persistence

pub mod config;
pub mod date;
pub mod error;
pub mod filter;
pub mod id;
pub mod kv;
pub mod persist;
pub mod store;
pub mod task;
pub mod tasks;
pub mod view;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use filter::{Filter, StatusFilter, Visibility};
pub use kv::{FileKv, KvError, KvStore, MemoryKv, SqliteKv};
pub use persist::{LoadSource, Persistence};
pub use store::TaskStore;
pub use task::{NewTask, Priority, Stats, Task};
pub use tasks::TaskList;
pub use view::Row;
