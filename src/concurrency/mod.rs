pub mod memory_lock;

pub use memory_lock::{MemoryLock, MemoryLockGuard};
