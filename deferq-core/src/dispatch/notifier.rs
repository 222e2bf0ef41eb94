//! 调度唤醒钩子（SchedulerNotifier）
//!
//! 服务在持久化新记录后调用，用于缩短调度器的等待时间。
//! 钩子只是优化：调度器始终按固定间隔轮询，丢失的唤醒只会增加延迟，不会丢失投递。
//!
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub trait SchedulerNotifier: Send + Sync {
    /// 新的立即事件已入库
    fn notify_fired(&self, record_id: Uuid);

    /// 新的调度事件已入库，`when` 早于当前闹钟时应提前唤醒
    fn notify_scheduled(&self, when: DateTime<Utc>);
}

/// 不做任何事的钩子（未连接调度器时使用）
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl SchedulerNotifier for NoopNotifier {
    fn notify_fired(&self, _record_id: Uuid) {}

    fn notify_scheduled(&self, _when: DateTime<Utc>) {}
}
