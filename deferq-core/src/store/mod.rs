//! 事件记录存储（EventRecordStore）
//!
//! 对关系型/可查询存储的薄抽象：记录的增删查、COUNT/MIN 聚合、
//! 以及条件更新（乐观并发）原语。集群各节点之间的协调完全经由共享存储完成。
//!
//! 存储错误以 `DispatchError::Store` 直接返回给调用方，本子系统内部不做重试。
//!
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PgEventStore;

use crate::error::DispatchResult as Result;
use crate::event::EntityRef;
use crate::record::{
    ClaimGuard, EventFilter, EventRecord, EventTransition, ListenerRegistration, QueueAggregate,
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait EventRecordStore: Send + Sync {
    // --- EventRecord ---

    async fn insert_event(&self, record: &EventRecord) -> Result<()>;

    async fn get_event(&self, id: Uuid) -> Result<Option<EventRecord>>;

    /// 按条件查询，结果按 `deadline` 升序
    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>>;

    /// COUNT(*) 与 MIN(deadline)
    async fn aggregate_events(&self, filter: &EventFilter) -> Result<QueueAggregate>;

    async fn delete_events(&self, filter: &EventFilter) -> Result<u64>;

    /// 条件更新：仅当记录仍满足 `guard` 时应用 `transition`，返回是否生效。
    /// 竞争失败返回 `Ok(false)`，不是错误。
    async fn transition_event(
        &self,
        id: Uuid,
        guard: &ClaimGuard,
        transition: &EventTransition,
    ) -> Result<bool>;

    // --- ListenerRegistration ---

    /// 不存在时插入，返回是否插入了新行
    async fn insert_listener(&self, registration: &ListenerRegistration) -> Result<bool>;

    async fn delete_listeners(&self, registration: &ListenerRegistration) -> Result<u64>;

    async fn find_listeners(
        &self,
        event_type: &str,
        target: &EntityRef,
    ) -> Result<Vec<ListenerRegistration>>;

    async fn listener_exists(&self, event_type: &str, target: &EntityRef) -> Result<bool> {
        Ok(!self.find_listeners(event_type, target).await?.is_empty())
    }
}

#[async_trait]
impl<T> EventRecordStore for Arc<T>
where
    T: EventRecordStore + ?Sized,
{
    async fn insert_event(&self, record: &EventRecord) -> Result<()> {
        (**self).insert_event(record).await
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<EventRecord>> {
        (**self).get_event(id).await
    }

    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>> {
        (**self).find_events(filter).await
    }

    async fn aggregate_events(&self, filter: &EventFilter) -> Result<QueueAggregate> {
        (**self).aggregate_events(filter).await
    }

    async fn delete_events(&self, filter: &EventFilter) -> Result<u64> {
        (**self).delete_events(filter).await
    }

    async fn transition_event(
        &self,
        id: Uuid,
        guard: &ClaimGuard,
        transition: &EventTransition,
    ) -> Result<bool> {
        (**self).transition_event(id, guard, transition).await
    }

    async fn insert_listener(&self, registration: &ListenerRegistration) -> Result<bool> {
        (**self).insert_listener(registration).await
    }

    async fn delete_listeners(&self, registration: &ListenerRegistration) -> Result<u64> {
        (**self).delete_listeners(registration).await
    }

    async fn find_listeners(
        &self,
        event_type: &str,
        target: &EntityRef,
    ) -> Result<Vec<ListenerRegistration>> {
        (**self).find_listeners(event_type, target).await
    }

    async fn listener_exists(&self, event_type: &str, target: &EntityRef) -> Result<bool> {
        (**self).listener_exists(event_type, target).await
    }
}
