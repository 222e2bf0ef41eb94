//! 事件分发服务（EventDispatchService）
//!
//! 对外 API：立即触发、定时调度、动态登记/注销监听、取消待处理事件、
//! 查询下一次触发时间与队列统计。
//!
//! - `fire_event` 在没有任何监听者时不落库（避免无人关心的事件无限堆积）；
//! - `schedule_event` 总是落库，因为监听者可能在到期前才登记；
//! - 写入后调用 `SchedulerNotifier` 提示调度器尽快处理。
//!
//! 所有操作都同步写存储，不等待投递完成；投递失败不会反馈给调用方。
//!
use super::{NodeIdentity, NoopNotifier, SchedulerNotifier};
use crate::clock::{Clock, system_clock};
use crate::error::{DispatchError, DispatchResult as Result};
use crate::event::{AppEvent, EntityRef, EventRels};
use crate::listener::ListenerDirectory;
use crate::record::{EventFilter, EventRecord, EventState, FIRED_PENDING, ListenerRegistration};
use crate::stats::{QueueStats, QueueStatsAggregator};
use crate::store::EventRecordStore;
use bon::Builder;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

fn noop_notifier() -> Arc<dyn SchedulerNotifier> {
    Arc::new(NoopNotifier)
}

#[derive(Builder)]
pub struct EventDispatchService {
    store: Arc<dyn EventRecordStore>,
    directory: ListenerDirectory,
    #[builder(default = noop_notifier())]
    notifier: Arc<dyn SchedulerNotifier>,
    #[builder(default)]
    node: NodeIdentity,
    #[builder(default = system_clock())]
    clock: Arc<dyn Clock>,
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DispatchError::invalid_argument(format!("{what} must not be empty")));
    }
    Ok(())
}

impl EventDispatchService {
    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    pub fn directory(&self) -> &ListenerDirectory {
        &self.directory
    }

    /// 登记动态监听；相同三元组已存在时为空操作，返回 false
    pub async fn register_listener(
        &self,
        listener_id: &EntityRef,
        event_type: &str,
        target: &EntityRef,
    ) -> Result<bool> {
        require(listener_id.as_str(), "listener id")?;
        require(event_type, "event type")?;
        require(target.as_str(), "target")?;

        let registration = ListenerRegistration::new(listener_id.clone(), event_type, target.clone());
        let inserted = self.directory.dynamic().register(&registration).await?;
        tracing::debug!(
            listener_id = %listener_id,
            event_type,
            target = %target,
            inserted,
            "listener registered"
        );
        Ok(inserted)
    }

    /// 注销动态监听，返回删除的行数（0 不是错误）
    pub async fn deregister_listener(
        &self,
        listener_id: &EntityRef,
        event_type: &str,
        target: &EntityRef,
    ) -> Result<u64> {
        let registration = ListenerRegistration::new(listener_id.clone(), event_type, target.clone());
        let removed = self.directory.dynamic().deregister(&registration).await?;
        tracing::debug!(
            listener_id = %listener_id,
            event_type,
            target = %target,
            removed,
            "listener deregistered"
        );
        Ok(removed)
    }

    /// 立即触发事件，目标即为源。
    ///
    /// 缺少 `source` 时静默返回（记录 warn 日志）；没有任何监听者时不落库。
    pub async fn fire_event<E: AppEvent>(
        &self,
        source: Option<&EntityRef>,
        event: &E,
        rels: EventRels,
    ) -> Result<Option<EventRecord>> {
        self.fire(source, None, event, rels).await
    }

    /// 与 `fire_event` 相同，但目标与源不同
    pub async fn fire_event_to<E: AppEvent>(
        &self,
        source: Option<&EntityRef>,
        target: &EntityRef,
        event: &E,
        rels: EventRels,
    ) -> Result<Option<EventRecord>> {
        self.fire(source, Some(target), event, rels).await
    }

    async fn fire<E: AppEvent>(
        &self,
        source: Option<&EntityRef>,
        target: Option<&EntityRef>,
        event: &E,
        rels: EventRels,
    ) -> Result<Option<EventRecord>> {
        let event_type = E::EVENT_TYPE;
        let Some(source) = source else {
            tracing::warn!(event_type, "fire_event called without a source, ignored");
            return Ok(None);
        };
        require(source.as_str(), "source")?;
        let target = target.unwrap_or(source);
        require(target.as_str(), "target")?;

        if !self.directory.exists(event_type, target).await? {
            tracing::info!(
                event_type,
                target = %target,
                "no listener for event, not persisted"
            );
            return Ok(None);
        }

        let now = self.clock.now();
        let record = EventRecord::builder()
            .id(Uuid::now_v7())
            .event_type(event_type.to_string())
            .source(source.clone())
            .target(target.clone())
            .maybe_rel0(rels.rel0)
            .maybe_rel1(rels.rel1)
            .payload(serde_json::to_value(event)?)
            .created(now)
            .deadline(now)
            .fired(now)
            .host(self.node.node_id().to_string())
            .state(EventState::Pending)
            .build();

        self.store.insert_event(&record).await?;
        tracing::debug!(
            record_id = %record.id(),
            event_type,
            target = %target,
            "event fired"
        );
        self.notifier.notify_fired(record.id());

        Ok(Some(record))
    }

    /// 在 `when` 调度事件；无论当前是否有监听者都会落库
    pub async fn schedule_event<E: AppEvent>(
        &self,
        when: DateTime<Utc>,
        source: &EntityRef,
        target: &EntityRef,
        event: &E,
        rels: EventRels,
    ) -> Result<EventRecord> {
        require(source.as_str(), "source")?;
        require(target.as_str(), "target")?;

        let event_type = E::EVENT_TYPE;
        // 中心节点预置亲和，其余节点留空由任意节点认领
        let host = self
            .node
            .is_central()
            .then(|| self.node.node_id().to_string());

        let record = EventRecord::builder()
            .id(Uuid::now_v7())
            .event_type(event_type.to_string())
            .source(source.clone())
            .target(target.clone())
            .maybe_rel0(rels.rel0)
            .maybe_rel1(rels.rel1)
            .payload(serde_json::to_value(event)?)
            .created(self.clock.now())
            .deadline(when)
            .fired(FIRED_PENDING)
            .maybe_host(host)
            .state(EventState::Pending)
            .build();

        self.store.insert_event(&record).await?;
        tracing::debug!(
            record_id = %record.id(),
            event_type,
            target = %target,
            deadline = %when,
            "event scheduled"
        );
        self.notifier.notify_scheduled(when);

        Ok(record)
    }

    /// 取消 source 下、指定目标与类型的全部 Pending 记录；已认领的记录不受影响
    pub async fn delete_events(
        &self,
        source: &EntityRef,
        target: &EntityRef,
        event_type: &str,
    ) -> Result<u64> {
        let removed = self
            .store
            .delete_events(&EventFilter::pending_for(source, target, event_type))
            .await?;
        tracing::debug!(
            source = %source,
            target = %target,
            event_type,
            removed,
            "pending events deleted"
        );
        Ok(removed)
    }

    /// 匹配的 Pending 记录中最早的 deadline
    pub async fn next_event_time(
        &self,
        source: &EntityRef,
        target: &EntityRef,
        event_type: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let agg = self
            .store
            .aggregate_events(&EventFilter::pending_for(source, target, event_type))
            .await?;
        Ok(agg.min_deadline)
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        QueueStatsAggregator::new(self.store.clone(), self.clock.clone())
            .stats()
            .await
    }

    /// 查看某类型、某目标下的动态登记
    pub async fn listeners(
        &self,
        event_type: &str,
        target: &EntityRef,
    ) -> Result<Vec<ListenerRegistration>> {
        self.directory.dynamic().listeners(event_type, target).await
    }

    /// 读取单条记录（诊断用，Failed 记录附带 `last_error`）
    pub async fn event(&self, id: Uuid) -> Result<EventRecord> {
        self.store
            .get_event(id)
            .await?
            .ok_or_else(|| DispatchError::not_found(format!("event {id}")))
    }
}
