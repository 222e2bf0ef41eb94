//! 静态事件处理器（EventHandler）
//!
//! 编译期注册的“无状态接收者”：声明自己处理的事件类型，与具体目标无关。
//! `StaticHandlerRegistry` 按类型索引这些处理器。
//!
use crate::error::DispatchResult as Result;
use crate::event::EntityRef;
use crate::listener::ListenerSource;
use crate::scheduler::EventDelivery;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum HandledEventType {
    One(String),
    Many(Vec<String>),
    All,
}

/// 事件处理器：处理某一类型的事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于失败诊断与日志）
    fn handler_name(&self) -> &str;
    /// 返回该处理器支持的事件类型
    fn handled_event_type(&self) -> HandledEventType;
    /// 处理事件
    async fn handle(&self, delivery: &EventDelivery) -> anyhow::Result<()>;
}

#[derive(Clone, Default)]
pub struct StaticHandlerRegistry {
    by_type: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    all: Vec<Arc<dyn EventHandler>>,
}

impl StaticHandlerRegistry {
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Self {
        let mut by_type: HashMap<String, Vec<Arc<dyn EventHandler>>> = HashMap::new();
        let mut all: Vec<Arc<dyn EventHandler>> = Vec::new();

        for h in handlers {
            match h.handled_event_type() {
                HandledEventType::All => all.push(h),
                HandledEventType::One(t) => {
                    by_type.entry(t).or_default().push(h);
                }
                HandledEventType::Many(ts) => {
                    for t in ts {
                        by_type.entry(t).or_default().push(h.clone());
                    }
                }
            }
        }

        Self { by_type, all }
    }

    pub fn has_handler(&self, event_type: &str) -> bool {
        !self.all.is_empty()
            || self
                .by_type
                .get(event_type)
                .is_some_and(|list| !list.is_empty())
    }

    pub fn matching(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        let mut merged: Vec<Arc<dyn EventHandler>> = Vec::new();
        if let Some(list) = self.by_type.get(event_type) {
            merged.extend(list.iter().cloned());
        }
        merged.extend(self.all.iter().cloned());
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty() && self.all.is_empty()
    }
}

#[async_trait]
impl ListenerSource for StaticHandlerRegistry {
    async fn has_listener(&self, event_type: &str, _target: &EntityRef) -> Result<bool> {
        Ok(self.has_handler(event_type))
    }
}
