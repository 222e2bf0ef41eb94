//! 截止时间调度器（DeadlineScheduler）
//!
//! 每个集群节点一个长驻轮询循环：
//! - 扫描已到期的 `Pending` 记录与认领超时的 `Processing` 记录；
//! - 通过存储的条件更新认领，竞争失败的记录直接跳过；
//! - 在受信号量限制的工作者任务中调用处理器并写回结果；
//! - 超时重认领次数达到上限的记录直接标记为 `Failed`。
//!
//! 等待期间可被 `SchedulerWaker` 提前唤醒，唤醒丢失时最多延迟一个轮询间隔。
//!
use super::{EventDelivery, SchedulerConfig, SchedulerWaker};
use crate::clock::{Clock, system_clock};
use crate::dispatch::NodeIdentity;
use crate::error::{DispatchError, DispatchResult as Result};
use crate::listener::{ListenerDirectory, ResolvedHandler};
use crate::record::{ClaimGuard, EventFilter, EventRecord, EventState, EventTransition};
use crate::store::EventRecordStore;
use bon::Builder;
use chrono::{DateTime, Utc};
use futures_util::{FutureExt, StreamExt, stream};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Builder)]
pub struct DeadlineScheduler {
    store: Arc<dyn EventRecordStore>,
    directory: ListenerDirectory,
    #[builder(default)]
    node: NodeIdentity,
    #[builder(default)]
    config: SchedulerConfig,
    #[builder(default = system_clock())]
    clock: Arc<dyn Clock>,
    #[builder(default)]
    waker: SchedulerWaker,
}

/// 本节点认领成功的记录，`guard` 用于写回结果
#[derive(Debug, Clone)]
pub struct ClaimedEvent {
    record: EventRecord,
    guard: ClaimGuard,
}

impl ClaimedEvent {
    pub fn record(&self) -> &EventRecord {
        &self.record
    }

    pub fn guard(&self) -> &ClaimGuard {
        &self.guard
    }
}

impl DeadlineScheduler {
    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 交给 `EventDispatchService` 作为 `SchedulerNotifier`
    pub fn waker(&self) -> SchedulerWaker {
        self.waker.clone()
    }

    /// 启动轮询循环，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let task = tokio::spawn(Self::poll_loop(self, token.clone(), tracker.clone()));

        SchedulerHandle {
            token,
            task: Some(task),
            tracker,
        }
    }

    async fn poll_loop(self: Arc<Self>, token: CancellationToken, tracker: TaskTracker) {
        let workers = self.config.worker_count.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        tracing::info!(
            node_id = self.node.node_id(),
            central = self.node.is_central(),
            workers,
            "deadline scheduler started"
        );

        loop {
            if token.is_cancelled() {
                break;
            }

            // 认领数量不超过空闲工作者，避免记录在本地排队时被视为超时
            let batch_size = self.config.batch_size.max(1);
            let capacity = permits.available_permits().min(batch_size);
            let mut batch_full = false;
            if capacity > 0 {
                match self.claim_due(capacity).await {
                    Ok(claimed) => {
                        batch_full = claimed.len() == batch_size;
                        for event in claimed {
                            let Ok(permit) = permits.clone().acquire_owned().await else {
                                break;
                            };
                            let this = self.clone();
                            tracker.spawn(async move {
                                let record_id = event.record.id();
                                if let Err(err) = this.process(event).await {
                                    tracing::error!(
                                        %record_id,
                                        error = %err,
                                        "event processing aborted, left for reclaim"
                                    );
                                }
                                drop(permit);
                                this.waker.wake();
                            });
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "claim scan failed");
                    }
                }
            }

            if batch_full {
                continue;
            }

            let delay = self
                .waker
                .next_delay(self.clock.now(), self.config.poll_interval);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.waker.notified() => {}
                _ = time::sleep(delay) => {}
            }
        }

        tracing::info!(node_id = self.node.node_id(), "deadline scheduler stopped");
    }

    /// 单次扫描：认领并在当前任务内处理全部到期记录，返回处理的记录数。
    /// 某条记录处理出错时其余记录照常处理，最后返回第一个错误。
    pub async fn run_once(&self) -> Result<usize> {
        let claimed = self.claim_due(self.config.batch_size.max(1)).await?;
        let count = claimed.len();
        let mut first_error = None;
        for event in claimed {
            let record_id = event.record.id();
            if let Err(err) = self.process(event).await {
                tracing::error!(
                    %record_id,
                    error = %err,
                    "event processing aborted, left for reclaim"
                );
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }

    /// 扫描并认领最多 `limit` 条记录（超时记录与到期记录按 deadline 合并）。
    /// 扫描之后单条记录的存储错误只记日志并跳过，已认领的记录总会返回。
    pub async fn claim_due(&self, limit: usize) -> Result<Vec<ClaimedEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let timeout = chrono::Duration::from_std(self.config.claim_timeout).map_err(|e| {
            DispatchError::Scheduler {
                reason: format!("invalid claim timeout: {e}"),
            }
        })?;

        let mut candidates = self
            .store
            .find_events(&EventFilter::stale_claims(now - timeout).with_limit(limit))
            .await?;
        candidates.extend(
            self.store
                .find_events(&EventFilter::due(now).with_limit(limit))
                .await?,
        );
        candidates.sort_by_key(EventRecord::deadline);

        let mut claimed = Vec::with_capacity(limit);
        for record in candidates {
            if claimed.len() >= limit {
                break;
            }
            if record.state() == EventState::Processing
                && record.attempts() >= self.config.max_attempts
            {
                if let Err(err) = self.dead_letter(&record, now).await {
                    tracing::error!(
                        record_id = %record.id(),
                        error = %err,
                        "dead letter failed, retried next pass"
                    );
                }
                continue;
            }
            match self.try_claim(&record).await {
                Ok(Some(event)) => claimed.push(event),
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(
                        record_id = %record.id(),
                        error = %err,
                        "claim failed, retried next pass"
                    );
                }
            }
        }

        Ok(claimed)
    }

    /// 以 `record` 当前的状态与版本为前提发起认领；竞争失败返回 `None`
    pub async fn try_claim(&self, record: &EventRecord) -> Result<Option<ClaimedEvent>> {
        if record.state().is_terminal() {
            return Ok(None);
        }

        let transition = EventTransition::Claim {
            host: self.node.node_id().to_string(),
            at: self.clock.now(),
        };
        let won = self
            .store
            .transition_event(record.id(), &record.guard(), &transition)
            .await?;
        if !won {
            tracing::debug!(
                record_id = %record.id(),
                host = self.node.node_id(),
                "claim lost to another node"
            );
            return Ok(None);
        }

        let mut claimed = record.clone();
        claimed.apply(&transition);
        let guard = ClaimGuard::held_by(self.node.node_id(), claimed.attempts());
        tracing::debug!(
            record_id = %claimed.id(),
            event_type = claimed.event_type(),
            host = self.node.node_id(),
            attempt = claimed.attempts(),
            "event claimed"
        );

        Ok(Some(ClaimedEvent {
            record: claimed,
            guard,
        }))
    }

    /// 调用全部处理器并写回结果；返回结果是否生效（认领已被他人接管时为 false）
    pub async fn process(&self, claimed: ClaimedEvent) -> Result<bool> {
        let ClaimedEvent { record, guard } = claimed;
        let delivery = Arc::new(EventDelivery::from(&record));
        let handlers = self
            .directory
            .resolve_handlers(record.event_type(), record.target())
            .await?;

        let errors: Vec<String> = stream::iter(handlers)
            .map(move |handler| invoke(handler, delivery.clone()))
            .buffered(self.config.handler_concurrency.max(1))
            .filter_map(|outcome| async move { outcome.err() })
            .collect()
            .await;

        let at = self.clock.now();
        let transition = if errors.is_empty() {
            EventTransition::Complete { at }
        } else {
            EventTransition::Fail {
                at,
                error: errors.join("; "),
            }
        };

        let applied = self
            .store
            .transition_event(record.id(), &guard, &transition)
            .await?;
        if !applied {
            tracing::warn!(
                record_id = %record.id(),
                host = self.node.node_id(),
                "claim was taken over before completion, outcome discarded"
            );
        } else if errors.is_empty() {
            tracing::debug!(
                record_id = %record.id(),
                event_type = record.event_type(),
                "event completed"
            );
        }

        Ok(applied)
    }

    async fn dead_letter(&self, record: &EventRecord, now: DateTime<Utc>) -> Result<()> {
        let error = format!("retry cap exceeded after {} attempts", record.attempts());
        let transition = EventTransition::Fail {
            at: now,
            error: error.clone(),
        };
        if self
            .store
            .transition_event(record.id(), &record.guard(), &transition)
            .await?
        {
            tracing::error!(
                record_id = %record.id(),
                event_type = record.event_type(),
                host = record.host().unwrap_or_default(),
                attempts = record.attempts(),
                "{error}"
            );
        }
        Ok(())
    }
}

/// 调用单个处理器，错误与 panic 都转为失败描述，互不影响
async fn invoke(
    handler: ResolvedHandler,
    delivery: Arc<EventDelivery>,
) -> std::result::Result<(), String> {
    let name = handler.name();
    let reason = match AssertUnwindSafe(handler.invoke(&delivery))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => format!("{err:#}"),
        Err(panic) => format!("panicked: {}", panic_message(&*panic)),
    };

    tracing::error!(
        record_id = %delivery.record_id(),
        event_type = delivery.event_type(),
        handler = %name,
        error = %reason,
        "event handler failed"
    );
    Err(format!("{name}: {reason}"))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// 调度器运行句柄：用于优雅关闭与等待在途投递结束
pub struct SchedulerHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    tracker: TaskTracker,
}

impl SchedulerHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
