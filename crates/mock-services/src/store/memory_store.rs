//! 内存存储
//!
//! 使用 DashMap 实现的并发内存存储，模拟服务的全部状态都保存在这里。

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// 通用内存存储
///
/// 克隆后共享同一份数据。
#[derive(Debug)]
pub struct MemoryStore<T> {
    data: Arc<DashMap<String, T>>,
}

impl<T: Clone> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    /// 插入或覆盖
    pub fn insert(&self, id: &str, value: T) {
        self.data.insert(id.to_string(), value);
    }

    /// 仅在 key 不存在时插入，返回是否插入成功
    ///
    /// 检查与插入在同一个分片锁内完成，并发登记同一 key 时只有一个成功。
    pub fn insert_if_absent(&self, id: &str, value: T) -> bool {
        match self.data.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// 原地修改已存在的值，返回修改后的克隆
    pub fn update<F>(&self, id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        self.data.get_mut(id).map(|mut entry| {
            f(entry.value_mut());
            entry.value().clone()
        })
    }

    /// 返回数据的克隆，不持有锁
    pub fn get(&self, id: &str) -> Option<T> {
        self.data.get(id).map(|v| v.clone())
    }

    pub fn list(&self) -> Vec<T> {
        self.data
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.data.contains_key(id)
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}

impl<T: Clone> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}
