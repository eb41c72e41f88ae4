//! 存储模块

mod memory_store;

pub use memory_store::MemoryStore;
