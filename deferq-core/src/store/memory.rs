//! 内存版存储（InMemoryEventStore）
//!
//! 基于 `dashmap` 的单进程实现，满足 `EventRecordStore` 协议：
//! - 条件更新在分片写锁内完成“判断守卫 + 应用迁移”，与数据库的
//!   `UPDATE ... WHERE` 等价；
//! - 典型用途：测试环境、示例与本地开发。多个调度器共享同一实例即可模拟集群。
//!
use super::EventRecordStore;
use crate::error::{DispatchError, DispatchResult as Result};
use crate::event::EntityRef;
use crate::record::{
    ClaimGuard, EventFilter, EventRecord, EventTransition, ListenerRegistration, QueueAggregate,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<DashMap<Uuid, EventRecord>>,
    listeners: Arc<DashSet<ListenerRegistration>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 故障注入：置为 true 后所有操作返回存储错误
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DispatchError::store("in-memory store marked unavailable"));
        }
        Ok(())
    }

    fn scan(&self, filter: &EventFilter) -> Vec<EventRecord> {
        let mut out: Vec<EventRecord> = self
            .events
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|r| r.deadline());
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        out
    }
}

#[async_trait]
impl EventRecordStore for InMemoryEventStore {
    async fn insert_event(&self, record: &EventRecord) -> Result<()> {
        self.check()?;
        if self.events.contains_key(&record.id()) {
            return Err(DispatchError::store(format!(
                "duplicate event id {}",
                record.id()
            )));
        }
        self.events.insert(record.id(), record.clone());
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<EventRecord>> {
        self.check()?;
        Ok(self.events.get(&id).map(|r| r.value().clone()))
    }

    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>> {
        self.check()?;
        Ok(self.scan(filter))
    }

    async fn aggregate_events(&self, filter: &EventFilter) -> Result<QueueAggregate> {
        self.check()?;
        let mut agg = QueueAggregate::default();
        for entry in self.events.iter() {
            let record = entry.value();
            if !filter.matches(record) {
                continue;
            }
            agg.count += 1;
            agg.min_deadline = Some(match agg.min_deadline {
                Some(min) => min.min(record.deadline()),
                None => record.deadline(),
            });
        }
        Ok(agg)
    }

    async fn delete_events(&self, filter: &EventFilter) -> Result<u64> {
        self.check()?;
        let candidates: Vec<Uuid> = self.scan(filter).iter().map(EventRecord::id).collect();

        let mut removed = 0;
        for id in candidates {
            // 扫描后记录可能已被认领，删除时重新判断
            if self.events.remove_if(&id, |_, r| filter.matches(r)).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn transition_event(
        &self,
        id: Uuid,
        guard: &ClaimGuard,
        transition: &EventTransition,
    ) -> Result<bool> {
        self.check()?;
        let Some(mut record) = self.events.get_mut(&id) else {
            return Ok(false);
        };
        if !guard.matches(&record) {
            return Ok(false);
        }
        record.apply(transition);
        Ok(true)
    }

    async fn insert_listener(&self, registration: &ListenerRegistration) -> Result<bool> {
        self.check()?;
        Ok(self.listeners.insert(registration.clone()))
    }

    async fn delete_listeners(&self, registration: &ListenerRegistration) -> Result<u64> {
        self.check()?;
        Ok(self.listeners.remove(registration).map_or(0, |_| 1))
    }

    async fn find_listeners(
        &self,
        event_type: &str,
        target: &EntityRef,
    ) -> Result<Vec<ListenerRegistration>> {
        self.check()?;
        Ok(self
            .listeners
            .iter()
            .filter(|r| r.is_interested_in(event_type, target))
            .map(|r| r.key().clone())
            .collect())
    }
}
