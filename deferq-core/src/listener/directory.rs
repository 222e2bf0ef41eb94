//! 监听者目录（ListenerDirectory）
//!
//! 组合两类监听来源：
//! - 静态处理器注册表（与目标无关的无状态接收者）；
//! - 存储支撑的动态登记表（运行时增删的 `(listener, type, target)` 行）。
//!
//! `exists` 为两者的逻辑或，用于在 `fire` 时短路持久化；
//! `resolve_handlers` 在投递时给出具体需要调用的处理器。
//!
use super::{ComponentDirectory, EventHandler, EventListener, StaticHandlerRegistry};
use crate::error::DispatchResult as Result;
use crate::event::EntityRef;
use crate::record::ListenerRegistration;
use crate::scheduler::EventDelivery;
use crate::store::EventRecordStore;
use async_trait::async_trait;
use std::sync::Arc;

/// 监听来源能力接口：某类型、某目标下是否存在任何感兴趣的一方
#[async_trait]
pub trait ListenerSource: Send + Sync {
    async fn has_listener(&self, event_type: &str, target: &EntityRef) -> Result<bool>;
}

/// 动态登记表，读写 `ListenerRegistration`
#[derive(Clone)]
pub struct DynamicListenerTable {
    store: Arc<dyn EventRecordStore>,
}

impl DynamicListenerTable {
    pub fn new(store: Arc<dyn EventRecordStore>) -> Self {
        Self { store }
    }

    pub async fn register(&self, registration: &ListenerRegistration) -> Result<bool> {
        self.store.insert_listener(registration).await
    }

    pub async fn deregister(&self, registration: &ListenerRegistration) -> Result<u64> {
        self.store.delete_listeners(registration).await
    }

    pub async fn listeners(
        &self,
        event_type: &str,
        target: &EntityRef,
    ) -> Result<Vec<ListenerRegistration>> {
        self.store.find_listeners(event_type, target).await
    }
}

#[async_trait]
impl ListenerSource for DynamicListenerTable {
    async fn has_listener(&self, event_type: &str, target: &EntityRef) -> Result<bool> {
        self.store.listener_exists(event_type, target).await
    }
}

/// 投递时解析出的具体处理器
#[derive(Clone)]
pub enum ResolvedHandler {
    /// 编译期注册的静态处理器
    Static(Arc<dyn EventHandler>),
    /// 事件目标本身即为接收组件
    Recipient {
        component_id: EntityRef,
        listener: Arc<dyn EventListener>,
    },
    /// 动态登记的监听组件
    Listener {
        listener_id: EntityRef,
        listener: Arc<dyn EventListener>,
    },
}

impl ResolvedHandler {
    pub fn name(&self) -> String {
        match self {
            ResolvedHandler::Static(h) => h.handler_name().to_string(),
            ResolvedHandler::Recipient { component_id, .. } => format!("recipient:{component_id}"),
            ResolvedHandler::Listener { listener_id, .. } => format!("listener:{listener_id}"),
        }
    }

    pub async fn invoke(&self, delivery: &EventDelivery) -> anyhow::Result<()> {
        match self {
            ResolvedHandler::Static(h) => h.handle(delivery).await,
            ResolvedHandler::Recipient { listener, .. }
            | ResolvedHandler::Listener { listener, .. } => listener.on_event(delivery).await,
        }
    }
}

#[derive(Clone)]
pub struct ListenerDirectory {
    statics: Arc<StaticHandlerRegistry>,
    dynamic: DynamicListenerTable,
    components: Arc<dyn ComponentDirectory>,
}

impl ListenerDirectory {
    pub fn new(
        statics: StaticHandlerRegistry,
        store: Arc<dyn EventRecordStore>,
        components: Arc<dyn ComponentDirectory>,
    ) -> Self {
        Self {
            statics: Arc::new(statics),
            dynamic: DynamicListenerTable::new(store),
            components,
        }
    }

    pub fn dynamic(&self) -> &DynamicListenerTable {
        &self.dynamic
    }

    pub fn has_static_handler(&self, event_type: &str) -> bool {
        self.statics.has_handler(event_type)
    }

    pub async fn has_dynamic_listener(&self, event_type: &str, target: &EntityRef) -> Result<bool> {
        self.dynamic.has_listener(event_type, target).await
    }

    /// 按顺序询问的监听来源；静态注册表无需访问存储，排在前面
    fn sources(&self) -> [&dyn ListenerSource; 2] {
        [self.statics.as_ref(), &self.dynamic]
    }

    /// 任一来源存在监听即为 true
    pub async fn exists(&self, event_type: &str, target: &EntityRef) -> Result<bool> {
        for source in self.sources() {
            if source.has_listener(event_type, target).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 投递时的处理器列表：
    /// 1. 该类型的全部静态处理器；
    /// 2. 若目标本身是直接接收该类型的组件，则只调用它；
    /// 3. 否则视为广播，通知该类型、该目标下的全部动态监听组件。
    pub async fn resolve_handlers(
        &self,
        event_type: &str,
        target: &EntityRef,
    ) -> Result<Vec<ResolvedHandler>> {
        let mut resolved: Vec<ResolvedHandler> = self
            .statics
            .matching(event_type)
            .into_iter()
            .map(ResolvedHandler::Static)
            .collect();

        if let Some(listener) = self
            .components
            .component(target)
            .filter(|c| c.accepts_direct(event_type))
        {
            resolved.push(ResolvedHandler::Recipient {
                component_id: target.clone(),
                listener,
            });
            return Ok(resolved);
        }

        for registration in self.dynamic.listeners(event_type, target).await? {
            match self.components.component(registration.listener_id()) {
                Some(listener) => resolved.push(ResolvedHandler::Listener {
                    listener_id: registration.listener_id().clone(),
                    listener,
                }),
                None => {
                    tracing::warn!(
                        listener_id = %registration.listener_id(),
                        event_type,
                        target = %target,
                        "registered listener has no live component, skipped"
                    );
                }
            }
        }

        Ok(resolved)
    }
}
