//! 组件目录（ComponentDirectory）
//!
//! 外部协作者：给定组件 id，返回可被调度器调用的监听组件。
//! 动态登记行只保存 `listener_id`，投递时经由这里解析为 `EventListener`。
//!
use crate::event::EntityRef;
use crate::scheduler::EventDelivery;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// 可接收事件的运行时组件
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, delivery: &EventDelivery) -> anyhow::Result<()>;

    /// 当组件本身就是事件的 `target` 时，是否直接接收该类型事件
    fn accepts_direct(&self, _event_type: &str) -> bool {
        false
    }
}

pub trait ComponentDirectory: Send + Sync {
    fn component(&self, id: &EntityRef) -> Option<Arc<dyn EventListener>>;
}

/// 基于内存映射的组件目录
#[derive(Clone, Default)]
pub struct InMemoryComponentDirectory {
    components: Arc<DashMap<EntityRef, Arc<dyn EventListener>>>,
}

impl InMemoryComponentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: impl Into<EntityRef>, listener: Arc<dyn EventListener>) {
        self.components.insert(id.into(), listener);
    }

    pub fn remove(&self, id: &EntityRef) -> Option<Arc<dyn EventListener>> {
        self.components.remove(id).map(|(_, listener)| listener)
    }
}

impl ComponentDirectory for InMemoryComponentDirectory {
    fn component(&self, id: &EntityRef) -> Option<Arc<dyn EventListener>> {
        self.components.get(id).map(|entry| entry.value().clone())
    }
}
