use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use deferq_core::dispatch::{EventDispatchService, NodeIdentity};
use deferq_core::listener::{
    EventHandler, EventListener, HandledEventType, InMemoryComponentDirectory, ListenerDirectory,
    StaticHandlerRegistry,
};
use deferq_core::store::InMemoryEventStore;
use deferq_core::{
    AppEvent, DeadlineScheduler, EntityRef, EventDelivery, EventRels, SchedulerConfig,
};
use deferq_macros::AppEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize, AppEvent)]
#[app_event(type_id = "demo.Reminder")]
struct Reminder {
    note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, AppEvent)]
#[app_event(type_id = "demo.TaskClosed")]
struct TaskClosed {
    task: String,
}

/// 统计所有事件的静态处理器
struct AuditLog;

#[async_trait]
impl EventHandler for AuditLog {
    fn handler_name(&self) -> &str {
        "audit"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::All
    }

    async fn handle(&self, delivery: &EventDelivery) -> anyhow::Result<()> {
        tracing::info!(
            record_id = %delivery.record_id(),
            event_type = delivery.event_type(),
            source = %delivery.source(),
            attempt = delivery.attempt(),
            "audit"
        );
        Ok(())
    }
}

/// 用户的日历组件：直接接收发给自己的提醒
struct Calendar {
    owner: EntityRef,
}

#[async_trait]
impl EventListener for Calendar {
    async fn on_event(&self, delivery: &EventDelivery) -> anyhow::Result<()> {
        let reminder: Reminder = delivery.decode()?;
        tracing::info!(owner = %self.owner, note = %reminder.note, "reminder delivered");
        Ok(())
    }

    fn accepts_direct(&self, event_type: &str) -> bool {
        event_type == Reminder::EVENT_TYPE
    }
}

/// 关注某个任务的看板组件，通过动态登记接收通知
struct Board;

#[async_trait]
impl EventListener for Board {
    async fn on_event(&self, delivery: &EventDelivery) -> anyhow::Result<()> {
        if delivery.is::<TaskClosed>() {
            let closed: TaskClosed = delivery.decode()?;
            tracing::info!(task = %closed.task, "board updated");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,deferq_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(InMemoryEventStore::new());
    let alice = EntityRef::from("user-alice");
    let task = EntityRef::from("task-42");

    let components = InMemoryComponentDirectory::new();
    components.insert(
        alice.clone(),
        Arc::new(Calendar {
            owner: alice.clone(),
        }),
    );
    components.insert("board-1", Arc::new(Board));

    let directory = ListenerDirectory::new(
        StaticHandlerRegistry::new(vec![Arc::new(AuditLog)]),
        store.clone(),
        Arc::new(components),
    );
    let node = NodeIdentity::central("demo-node");
    let scheduler = Arc::new(
        DeadlineScheduler::builder()
            .store(store.clone())
            .directory(directory.clone())
            .node(node.clone())
            .config(SchedulerConfig {
                poll_interval: Duration::from_millis(500),
                ..SchedulerConfig::default()
            })
            .build(),
    );
    let service = EventDispatchService::builder()
        .store(store.clone())
        .directory(directory)
        .notifier(Arc::new(scheduler.waker()))
        .node(node)
        .build();
    let handle = scheduler.clone().start();

    // 看板关注任务关闭事件
    service
        .register_listener(&"board-1".into(), TaskClosed::EVENT_TYPE, &task)
        .await?;

    let now = Utc::now();
    for (secs, note) in [(1, "stand-up in 5 minutes"), (2, "lunch"), (30, "go home")] {
        service
            .schedule_event(
                now + ChronoDuration::seconds(secs),
                &alice,
                &alice,
                &Reminder {
                    note: note.to_string(),
                },
                EventRels::one(task.clone()),
            )
            .await?;
    }
    let next = service
        .next_event_time(&alice, &alice, Reminder::EVENT_TYPE)
        .await?;
    tracing::info!(next = ?next, "reminders scheduled");

    service
        .fire_event(
            Some(&task),
            &TaskClosed {
                task: task.to_string(),
            },
            EventRels::one(alice.clone()),
        )
        .await?;

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let stats = service.queue_stats().await?;
    tracing::info!(
        num_in_queue = stats.num_in_queue,
        current_wait_time_ms = stats.current_wait_time_ms,
        "queue stats"
    );

    // 剩余的提醒不再需要
    let cancelled = service
        .delete_events(&alice, &alice, Reminder::EVENT_TYPE)
        .await?;
    tracing::info!(cancelled, "pending reminders cancelled");

    handle.shutdown();
    handle.join().await;
    Ok(())
}
