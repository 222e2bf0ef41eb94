//! 持久化的延迟应用事件分发（deferq-core）
//!
//! 应用组件可以立即触发事件，也可以在未来某个时间点调度事件；事件先落库，
//! 再由集群中任意节点的调度器在到期后认领并投递给监听者：
//! - 事件与监听建模（`event`、`record`）
//! - 存储抽象与内存/Postgres 实现（`store`）
//! - 静态处理器与动态监听的解析（`listener`）
//! - 对外 API：触发、调度、取消、登记（`dispatch`）
//! - 到期认领、投递与超时重认领（`scheduler`）
//! - 队列统计（`stats`）
//!
//! 节点之间不直接通信，所有协调都经由共享存储上的条件更新完成，
//! 节点崩溃后遗留的认领在超时后由其它节点接管。
//!
//! 典型用法：
//! 1. 用 `#[derive(AppEvent)]` 定义事件类型；
//! 2. 选择 `EventRecordStore` 实现，构建 `ListenerDirectory`；
//! 3. 构建并启动 `DeadlineScheduler`，把它的 `waker()` 交给 `EventDispatchService`；
//! 4. 通过服务触发或调度事件。
//!
pub mod clock;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod listener;
pub mod record;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use dispatch::EventDispatchService;
pub use error::{DispatchError, DispatchResult};
pub use event::{AppEvent, EntityRef, EventRels};
pub use scheduler::{DeadlineScheduler, EventDelivery, SchedulerConfig};

// 允许在本 crate 内部通过 ::deferq_core 进行自引用，
// 以便过程宏在本 crate 的测试中也能解析到 ::deferq_core 路径。
extern crate self as deferq_core;
