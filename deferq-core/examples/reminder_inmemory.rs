/// 延迟事件分发（内存版）示例
/// 两个节点共享同一存储：调度提醒、取消其中一条、查看队列统计，并观察由哪个节点投递
use anyhow::Result as AnyResult;
use chrono::Utc;
use deferq_core::dispatch::{EventDispatchService, NodeIdentity};
use deferq_core::listener::{
    EventHandler, HandledEventType, InMemoryComponentDirectory, ListenerDirectory,
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

#[derive(Debug, Serialize, Deserialize, AppEvent)]
#[app_event(type_id = "demo.Reminder")]
struct Reminder {
    note: String,
}

// ============================================================================
// 处理器
// ============================================================================

struct PrintHandler {
    node: &'static str,
}

#[async_trait::async_trait]
impl EventHandler for PrintHandler {
    fn handler_name(&self) -> &str {
        "print"
    }

    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::One(Reminder::EVENT_TYPE.to_string())
    }

    async fn handle(&self, delivery: &EventDelivery) -> anyhow::Result<()> {
        let reminder: Reminder = delivery.decode()?;
        println!(
            "node={} target={} deadline={} note={}",
            self.node,
            delivery.target(),
            delivery.deadline(),
            reminder.note
        );
        Ok(())
    }
}

fn node(
    id: &'static str,
    store: Arc<InMemoryEventStore>,
) -> (Arc<DeadlineScheduler>, EventDispatchService) {
    let directory = ListenerDirectory::new(
        StaticHandlerRegistry::new(vec![Arc::new(PrintHandler { node: id })]),
        store.clone(),
        Arc::new(InMemoryComponentDirectory::new()),
    );
    let scheduler = Arc::new(
        DeadlineScheduler::builder()
            .store(store.clone())
            .directory(directory.clone())
            .node(NodeIdentity::new(id))
            .config(SchedulerConfig {
                poll_interval: Duration::from_millis(200),
                ..SchedulerConfig::default()
            })
            .build(),
    );
    let service = EventDispatchService::builder()
        .store(store)
        .directory(directory)
        .notifier(Arc::new(scheduler.waker()))
        .node(NodeIdentity::new(id))
        .build();
    (scheduler, service)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> AnyResult<()> {
    println!("=== 延迟事件分发（内存版）示例 ===\n");

    let store = Arc::new(InMemoryEventStore::new());
    let (a, service) = node("node-a", store.clone());
    let (b, _) = node("node-b", store.clone());
    let handles = [a.start(), b.start()];

    let user = EntityRef::from("user-1");
    let now = Utc::now();
    for (offset_ms, note) in [(300, "drink water"), (600, "stretch"), (900, "go home")] {
        service
            .schedule_event(
                now + chrono::Duration::milliseconds(offset_ms),
                &user,
                &user,
                &Reminder {
                    note: note.to_string(),
                },
                EventRels::none(),
            )
            .await?;
    }
    println!(
        "next reminder at {:?}",
        service
            .next_event_time(&user, &user, Reminder::EVENT_TYPE)
            .await?
    );

    tokio::time::sleep(Duration::from_millis(450)).await;
    let stats = service.queue_stats().await?;
    println!(
        "queue: {} due, oldest waiting {} ms",
        stats.num_in_queue, stats.current_wait_time_ms
    );

    // 取消尚未到期的提醒
    let cancelled = service
        .delete_events(&user, &user, Reminder::EVENT_TYPE)
        .await?;
    println!("cancelled {cancelled} pending reminder(s)");

    tokio::time::sleep(Duration::from_millis(700)).await;
    for handle in handles {
        handle.shutdown();
        handle.join().await;
    }

    println!("\n=== 完成 ===");
    Ok(())
}
