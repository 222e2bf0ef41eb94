//! 集群节点身份
//!
//! `node_id` 写入记录的 `host` 列，用于亲和与超时认领的判断。
//! 中心节点（central node）由外部的选主协作者决定；它只影响调度事件的
//! `host` 预置，处理阶段不依赖任何主节点。
//!
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// 选主协作者：当前节点是否为中心节点
pub trait LeaderDesignation: Send + Sync {
    fn is_central(&self) -> bool;
}

/// 固定角色，可在运行时切换
#[derive(Debug, Default)]
pub struct FixedRole(AtomicBool);

impl FixedRole {
    pub fn new(central: bool) -> Self {
        Self(AtomicBool::new(central))
    }

    pub fn set_central(&self, central: bool) {
        self.0.store(central, Ordering::Relaxed);
    }
}

impl LeaderDesignation for FixedRole {
    fn is_central(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct NodeIdentity {
    node_id: String,
    leader: Arc<dyn LeaderDesignation>,
}

impl NodeIdentity {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self::with_leader(node_id, Arc::new(FixedRole::new(false)))
    }

    pub fn central(node_id: impl Into<String>) -> Self {
        Self::with_leader(node_id, Arc::new(FixedRole::new(true)))
    }

    pub fn with_leader(node_id: impl Into<String>, leader: Arc<dyn LeaderDesignation>) -> Self {
        Self {
            node_id: node_id.into(),
            leader,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_central(&self) -> bool {
        self.leader.is_central()
    }
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self::new(format!("node-{}", Uuid::new_v4()))
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("node_id", &self.node_id)
            .field("central", &self.is_central())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_node_id_is_unique() {
        let a = NodeIdentity::default();
        let b = NodeIdentity::default();
        assert!(a.node_id().starts_with("node-"));
        assert_ne!(a.node_id(), b.node_id());
        assert!(!a.is_central());
    }

    #[test]
    fn leader_role_can_change() {
        let role = Arc::new(FixedRole::new(false));
        let node = NodeIdentity::with_leader("n1", role.clone());
        assert!(!node.is_central());
        role.set_central(true);
        assert!(node.is_central());
        assert!(NodeIdentity::central("n2").is_central());
    }
}
