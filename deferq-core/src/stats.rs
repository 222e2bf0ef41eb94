//! 队列统计（QueueStatsAggregator）
//!
//! 纯读侧聚合：一次查询取得全集群 `Pending` 且 `deadline <= now` 的记录数
//! 与最早的 deadline。统计是集群范围而非本节点范围，供外部监控轮询。
//!
use crate::clock::Clock;
use crate::error::DispatchResult as Result;
use crate::record::EventFilter;
use crate::store::EventRecordStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// 已到期未处理的记录数
    pub num_in_queue: u64,
    /// 最早到期记录的逾期时长（毫秒）；队列为空时为 0
    pub current_wait_time_ms: u64,
}

#[derive(Clone)]
pub struct QueueStatsAggregator {
    store: Arc<dyn EventRecordStore>,
    clock: Arc<dyn Clock>,
}

impl QueueStatsAggregator {
    pub fn new(store: Arc<dyn EventRecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let now = self.clock.now();
        let agg = self.store.aggregate_events(&EventFilter::due(now)).await?;

        let current_wait_time_ms = match agg.min_deadline {
            Some(oldest) if agg.count > 0 => (now - oldest).num_milliseconds().max(0) as u64,
            _ => 0,
        };

        Ok(QueueStats {
            num_in_queue: agg.count,
            current_wait_time_ms,
        })
    }
}
