//! 持久化数据模型（record）
//!
//! - `EventRecord`：每个被触发/调度的事件一行，含认领与处理的时间戳；
//! - `ListenerRegistration`：运行时登记的动态监听；
//! - `EventFilter`/`QueueAggregate`：查询条件与聚合投影；
//! - `ClaimGuard`/`EventTransition`：条件更新（比较并设置）的前置条件与迁移。
//!
mod event_record;
mod filter;
mod listener_registration;

pub use event_record::{ClaimGuard, EventRecord, EventState, EventTransition, FIRED_PENDING};
pub use filter::{EventFilter, QueueAggregate};
pub use listener_registration::ListenerRegistration;
