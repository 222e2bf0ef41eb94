//! 调度器唤醒器（SchedulerWaker）
//!
//! `SchedulerNotifier` 的本地实现：`notify_fired` 立即唤醒轮询循环，
//! `notify_scheduled` 在新的 deadline 早于当前闹钟时提前闹钟。
//! 状态只属于单个调度器实例，集群内其它节点依赖轮询兜底。
//!
use crate::dispatch::SchedulerNotifier;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct SchedulerWaker {
    notify: Arc<Notify>,
    alarm: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl SchedulerWaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 唤醒轮询循环；若循环当前未在等待，许可会保留到下一次等待
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn alarm(&self) -> Option<DateTime<Utc>> {
        *self.lock_alarm()
    }

    /// 下一次等待时长：不超过 `poll_interval`，闹钟更早时以闹钟为准。
    /// 已过期的闹钟在此清除。
    pub fn next_delay(&self, now: DateTime<Utc>, poll_interval: Duration) -> Duration {
        let mut alarm = self.lock_alarm();
        match *alarm {
            Some(at) if at <= now => {
                *alarm = None;
                Duration::ZERO
            }
            Some(at) => (at - now)
                .to_std()
                .map_or(poll_interval, |until| until.min(poll_interval)),
            None => poll_interval,
        }
    }

    fn lock_alarm(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.alarm.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SchedulerNotifier for SchedulerWaker {
    fn notify_fired(&self, _record_id: Uuid) {
        self.wake();
    }

    fn notify_scheduled(&self, when: DateTime<Utc>) {
        let earlier = {
            let mut alarm = self.lock_alarm();
            match *alarm {
                Some(current) if current <= when => false,
                _ => {
                    *alarm = Some(when);
                    true
                }
            }
        };
        // 让循环按新的闹钟重新计算等待时长
        if earlier {
            self.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    const POLL: Duration = Duration::from_secs(5);

    #[test]
    fn delay_is_bounded_by_poll_interval() {
        let waker = SchedulerWaker::new();
        let now = Utc::now();
        assert_eq!(waker.next_delay(now, POLL), POLL);

        waker.notify_scheduled(now + ChronoDuration::seconds(60));
        assert_eq!(waker.next_delay(now, POLL), POLL);
    }

    #[test]
    fn earlier_schedule_moves_alarm_forward() {
        let waker = SchedulerWaker::new();
        let now = Utc::now();
        waker.notify_scheduled(now + ChronoDuration::seconds(3));
        waker.notify_scheduled(now + ChronoDuration::seconds(4));
        assert_eq!(waker.alarm(), Some(now + ChronoDuration::seconds(3)));
        assert_eq!(waker.next_delay(now, POLL), Duration::from_secs(3));

        waker.notify_scheduled(now + ChronoDuration::seconds(1));
        assert_eq!(waker.next_delay(now, POLL), Duration::from_secs(1));
    }

    #[test]
    fn expired_alarm_is_cleared() {
        let waker = SchedulerWaker::new();
        let now = Utc::now();
        waker.notify_scheduled(now - ChronoDuration::seconds(1));
        assert_eq!(waker.next_delay(now, POLL), Duration::ZERO);
        assert_eq!(waker.alarm(), None);
    }

    #[tokio::test]
    async fn fired_wake_is_not_lost_without_waiter() {
        let waker = SchedulerWaker::new();
        waker.notify_fired(Uuid::now_v7());
        // 许可已保存，立即返回
        tokio::time::timeout(Duration::from_secs(1), waker.notified())
            .await
            .expect("stored permit");
    }
}
