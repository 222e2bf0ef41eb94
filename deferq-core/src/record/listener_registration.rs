//! 动态监听登记（ListenerRegistration）
//!
//! `(listener_id, event_type, target)` 三元组唯一；重复登记为幂等空操作。
//! 登记行只会被创建或删除，不会被修改。
//!
use crate::event::EntityRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerRegistration {
    listener_id: EntityRef,
    event_type: String,
    target: EntityRef,
}

impl ListenerRegistration {
    pub fn new(
        listener_id: impl Into<EntityRef>,
        event_type: impl Into<String>,
        target: impl Into<EntityRef>,
    ) -> Self {
        Self {
            listener_id: listener_id.into(),
            event_type: event_type.into(),
            target: target.into(),
        }
    }

    pub fn listener_id(&self) -> &EntityRef {
        &self.listener_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target(&self) -> &EntityRef {
        &self.target
    }

    pub fn is_interested_in(&self, event_type: &str, target: &EntityRef) -> bool {
        self.event_type == event_type && &self.target == target
    }
}
