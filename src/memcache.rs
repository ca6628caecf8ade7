// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 共享内存缓存
//!
//! 进程内的键值缓存，按逻辑名称的校验和寻址，另有一张独立的过期时间表。
//! 数据与过期表位于同一把锁下，`set` 的删除、重建、写入与过期更新是原子的。
//! 不可用时 `can_mem_cache()` 返回 false，读写一律视为未命中。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::exception::Exception;

const MAX_TTL_SECONDS: u64 = (i64::MAX / 1000) as u64;

/// 数据段同时记录逻辑名称，淘汰时据此清理过期表
struct Segments {
    data: LruCache<u64, (String, Bytes)>,
    expiry: HashMap<String, DateTime<Utc>>,
}

impl Segments {
    fn remove(&mut self, name: &str) {
        self.expiry.remove(name);
        self.data.pop(&MemoryCache::checksum(name));
    }
}

pub struct MemoryCache {
    inner: Option<Mutex<Segments>>,
}

impl MemoryCache {
    /// 以给定容量创建；容量为 0 时缓存不可用
    pub fn new(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(capacity) => Self {
                inner: Some(Mutex::new(Segments {
                    data: LruCache::new(capacity),
                    expiry: HashMap::new(),
                })),
            },
            None => {
                warn!("{}", Exception::CacheUnavailable("memory capacity is 0".to_string()));
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn can_mem_cache(&self) -> bool {
        self.inner.is_some()
    }

    pub fn checksum(name: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        hasher.finish()
    }

    fn lock(&self) -> Option<std::sync::MutexGuard<'_, Segments>> {
        let inner = self.inner.as_ref()?;
        Some(match inner.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("内存缓存锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        })
    }

    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.get_at(name, Utc::now())
    }

    pub fn get_at<T: DeserializeOwned>(&self, name: &str, now: DateTime<Utc>) -> Option<T> {
        let mut segments = self.lock()?;
        let expiry = *segments.expiry.get(name)?;
        if now > expiry {
            debug!("内存缓存{}已过期", name);
            segments.remove(name);
            return None;
        }
        let (_, payload) = segments.data.get(&Self::checksum(name))?.clone();
        drop(segments);
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("内存缓存{}无法反序列化：{}", name, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, name: &str, value: &T, ttl_seconds: u64) -> bool {
        self.set_at(name, value, ttl_seconds, Utc::now())
    }

    pub fn set_at<T: Serialize>(
        &self,
        name: &str,
        value: &T,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> bool {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!("内存缓存{}无法序列化：{}", name, e);
                return false;
            }
        };
        // Duration::seconds 的上限为 i64::MAX / 1000
        let ttl = Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64);
        let expiry = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let Some(mut segments) = self.lock() else {
            return false;
        };
        let key = Self::checksum(name);
        // 校验和冲突时旧名称的过期记录一并作废
        if let Some((previous, _)) = segments.data.pop(&key) {
            segments.expiry.remove(&previous);
        }
        let entry = (name.to_string(), payload);
        if let Some((evicted, (evicted_name, _))) = segments.data.push(key, entry) {
            debug!("内存缓存容量已满，淘汰条目{:x}", evicted);
            segments.expiry.remove(&evicted_name);
        }
        segments.expiry.insert(name.to_string(), expiry);
        true
    }

    /// 当前保存的条目数
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |s| s.data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_derive::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stats {
        hits: u32,
        label: String,
    }

    #[test]
    fn test_round_trip_within_ttl() {
        let cache = MemoryCache::new(8);
        let stats = Stats {
            hits: 3,
            label: "daily".to_string(),
        };
        assert!(cache.set("stats", &stats, 86400));
        assert_eq!(cache.get::<Stats>("stats"), Some(stats));
    }

    #[test]
    fn test_expires_after_ttl() {
        let cache = MemoryCache::new(8);
        let now = Utc::now();
        cache.set_at("stats", &42u32, 86400, now);
        assert_eq!(cache.get_at::<u32>("stats", now + Duration::seconds(86400)), Some(42));
        assert_eq!(cache.get_at::<u32>("stats", now + Duration::seconds(86401)), None);
    }

    #[test]
    fn test_set_replaces_value_and_expiry() {
        let cache = MemoryCache::new(8);
        let now = Utc::now();
        cache.set_at("k", &"old", 10, now);
        cache.set_at("k", &"new", 100, now);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get_at::<String>("k", now + Duration::seconds(50)),
            Some("new".to_string())
        );
    }

    #[test]
    fn test_type_mismatch_is_miss() {
        let cache = MemoryCache::new(8);
        cache.set("k", &"text", 60);
        assert_eq!(cache.get::<u32>("k"), None);
    }

    #[test]
    fn test_unknown_name_is_miss() {
        let cache = MemoryCache::new(8);
        assert_eq!(cache.get::<u32>("missing"), None);
    }

    #[test]
    fn test_disabled_capability() {
        let cache = MemoryCache::new(0);
        assert!(!cache.can_mem_cache());
        assert!(!cache.set("k", &1u8, 60));
        assert_eq!(cache.get::<u8>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expiry_table_bounded_by_capacity() {
        let cache = MemoryCache::new(2);
        let now = Utc::now();
        for i in 0..1000 {
            cache.set_at(&format!("user.{}", i), &i, 60, now);
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lock().unwrap().expiry.len(), 2);
        assert_eq!(cache.get_at::<u32>("user.999", now), Some(999));
        assert_eq!(cache.get_at::<u32>("user.0", now), None);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = MemoryCache::new(4);
        let now = Utc::now();
        cache.set_at("stats", &1u8, 10, now);
        assert_eq!(cache.get_at::<u8>("stats", now + Duration::seconds(11)), None);
        assert!(cache.is_empty());
        assert!(cache.lock().unwrap().expiry.is_empty());
    }

    #[test]
    fn test_eviction_is_a_miss() {
        let cache = MemoryCache::new(1);
        cache.set("a", &1u8, 60);
        cache.set("b", &2u8, 60);
        assert_eq!(cache.get::<u8>("a"), None);
        assert_eq!(cache.get::<u8>("b"), Some(2));
    }
}
