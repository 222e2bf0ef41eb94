//! 调度子系统
//!
//! - `DeadlineScheduler`：轮询认领到期记录并驱动处理器；
//! - `SchedulerWaker`：服务层写入后的唤醒钩子；
//! - `EventDelivery`：交给处理器的只读投递视图。
//!
mod config;
mod delivery;
mod engine;
mod waker;

pub use config::SchedulerConfig;
pub use delivery::EventDelivery;
pub use engine::{ClaimedEvent, DeadlineScheduler, SchedulerHandle};
pub use waker::SchedulerWaker;
