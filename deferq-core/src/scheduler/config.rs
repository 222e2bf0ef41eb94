use std::time::Duration;

/// 调度器配置
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// 兜底轮询间隔；唤醒信号丢失时的最大额外延迟
    pub poll_interval: Duration,
    /// 单次扫描最多认领的记录数
    pub batch_size: usize,
    /// 同时处理中的记录上限（工作者数量）
    pub worker_count: usize,
    /// 单条记录内多个处理器的并发度
    pub handler_concurrency: usize,
    /// 认领超时：超过该时长仍为 Processing 的记录可被任意节点重新认领
    pub claim_timeout: Duration,
    /// 最大认领次数，超时重认领达到该值后记录进入 Failed
    pub max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 32,
            worker_count: 8,
            handler_concurrency: 8,
            claim_timeout: Duration::from_secs(300),
            max_attempts: 5,
        }
    }
}
