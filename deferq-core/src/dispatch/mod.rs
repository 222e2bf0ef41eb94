//! 分发服务（dispatch）
//!
//! - `EventDispatchService`：对外 API；
//! - `SchedulerNotifier`：写入后唤醒调度器的钩子；
//! - `NodeIdentity`/`LeaderDesignation`：节点身份与中心节点判定。
//!
mod node;
mod notifier;
mod service;

pub use node::{FixedRole, LeaderDesignation, NodeIdentity};
pub use notifier::{NoopNotifier, SchedulerNotifier};
pub use service::EventDispatchService;
