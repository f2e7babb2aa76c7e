//! # PoolRegistry：主机连接池仓储
//!
//! ## 核心意图（Why）
//! - 提供基于 `DashMap` 的并发安全存储，保证多个主机的连接池并行建立时，注册、查询、回收都具备原子语义；
//!
//! ## 行为契约（What）
//! - `register`：只接受 `READY` 的连接池；同一主机已存在时返回 `false`，不覆盖已有池；
//! - `get`：返回 `Arc` 克隆，不把 `DashMap` guard 暴露给调用方；
//! - `drain`：原子地取出全部连接池，用于关闭流程。
//!
//! ## 风险提示（Trade-offs）
//! - 中止的连接池从不进入仓储，因此“已连接主机”即仓储中的键集合。

use std::sync::Arc;

use corvid_core::{Endpoint, status::PoolState};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::pool::HostConnectionPool;

/// 以主机为键的连接池仓储。
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: DashMap<Endpoint, Arc<HostConnectionPool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个已就绪的连接池。
    pub fn register(&self, pool: Arc<HostConnectionPool>) -> bool {
        if pool.state() != PoolState::Ready {
            return false;
        }
        match self.pools.entry(pool.host()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(pool);
                true
            }
        }
    }

    pub fn get(&self, host: &Endpoint) -> Option<Arc<HostConnectionPool>> {
        self.pools.get(host).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, host: &Endpoint) -> Option<Arc<HostConnectionPool>> {
        self.pools.remove(host).map(|(_, pool)| pool)
    }

    /// 已注册主机，按地址排序。
    pub fn hosts(&self) -> Vec<Endpoint> {
        let mut hosts: Vec<_> = self.pools.iter().map(|entry| *entry.key()).collect();
        hosts.sort();
        hosts
    }

    /// 取出全部连接池。
    pub fn drain(&self) -> Vec<Arc<HostConnectionPool>> {
        let hosts: Vec<_> = self.pools.iter().map(|entry| *entry.key()).collect();
        hosts
            .into_iter()
            .filter_map(|host| self.remove(&host))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}
