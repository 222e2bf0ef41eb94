use chrono::Utc;
use deferq_core::dispatch::{EventDispatchService, NodeIdentity};
use deferq_core::listener::{
    EventHandler, EventListener, HandledEventType, InMemoryComponentDirectory, ListenerDirectory,
    StaticHandlerRegistry,
};
use deferq_core::record::{EventRecord, EventState, FIRED_PENDING};
use deferq_core::store::{EventRecordStore, InMemoryEventStore};
use deferq_core::{AppEvent, DeadlineScheduler, EntityRef, EventDelivery, EventRels, SchedulerConfig};
use deferq_macros::AppEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, AppEvent)]
#[app_event(type_id = "Reminder")]
struct Reminder {
    note: String,
}

/// 记录每条投递的静态处理器
#[derive(Clone, Default)]
struct Recorder {
    notes: Arc<Mutex<Vec<String>>>,
    per_record: Arc<Mutex<HashMap<Uuid, usize>>>,
}

impl Recorder {
    fn notes(&self) -> Vec<String> {
        self.notes.lock().unwrap().clone()
    }

    fn deliveries(&self) -> HashMap<Uuid, usize> {
        self.per_record.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EventHandler for Recorder {
    fn handler_name(&self) -> &str {
        "recorder"
    }
    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::One(Reminder::EVENT_TYPE.to_string())
    }
    async fn handle(&self, delivery: &EventDelivery) -> anyhow::Result<()> {
        let reminder: Reminder = delivery.decode()?;
        self.notes.lock().unwrap().push(reminder.note);
        *self
            .per_record
            .lock()
            .unwrap()
            .entry(delivery.record_id())
            .or_default() += 1;
        Ok(())
    }
}

/// 运行时组件：可选择直接接收以自己为目标的事件
#[derive(Default)]
struct Component {
    direct: bool,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl EventListener for Component {
    async fn on_event(&self, _delivery: &EventDelivery) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn accepts_direct(&self, event_type: &str) -> bool {
        self.direct && event_type == Reminder::EVENT_TYPE
    }
}

struct Node {
    scheduler: Arc<DeadlineScheduler>,
    service: EventDispatchService,
}

fn node(
    id: &str,
    store: Arc<InMemoryEventStore>,
    components: InMemoryComponentDirectory,
    handlers: Vec<Arc<dyn EventHandler>>,
    poll_interval: Duration,
) -> Node {
    let directory = ListenerDirectory::new(
        StaticHandlerRegistry::new(handlers),
        store.clone(),
        Arc::new(components),
    );
    let scheduler = Arc::new(
        DeadlineScheduler::builder()
            .store(store.clone())
            .directory(directory.clone())
            .node(NodeIdentity::new(id))
            .config(SchedulerConfig {
                poll_interval,
                batch_size: 4,
                worker_count: 4,
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
    Node { scheduler, service }
}

fn due_record(note: &str) -> EventRecord {
    let now = Utc::now();
    EventRecord::builder()
        .id(Uuid::now_v7())
        .event_type(Reminder::EVENT_TYPE.to_string())
        .source(EntityRef::from("x"))
        .target(EntityRef::from("x"))
        .payload(serde_json::json!({ "note": note }))
        .created(now)
        .deadline(now)
        .fired(FIRED_PENDING)
        .state(EventState::Pending)
        .build()
}

async fn wait_for_state(store: &InMemoryEventStore, id: Uuid, state: EventState) -> EventRecord {
    let give_up = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = store.get_event(id).await.unwrap().unwrap();
        if record.state() == state {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < give_up,
            "record {id} stuck in {}",
            record.state()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_reminder_is_delivered_after_its_deadline() {
    let store = Arc::new(InMemoryEventStore::new());
    let recorder = Recorder::default();
    let handler: Arc<dyn EventHandler> = Arc::new(recorder.clone());
    // 轮询间隔很长，按时投递只能依靠调度唤醒
    let n = node(
        "n1",
        store.clone(),
        InMemoryComponentDirectory::new(),
        vec![handler],
        Duration::from_secs(60),
    );
    let handle = n.scheduler.clone().start();

    let x = EntityRef::from("x");
    let when = Utc::now() + chrono::Duration::milliseconds(300);
    let record = n
        .service
        .schedule_event(
            when,
            &x,
            &x,
            &Reminder {
                note: "stand up".to_string(),
            },
            EventRels::none(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(recorder.notes().is_empty());

    let done = wait_for_state(&store, record.id(), EventState::Completed).await;
    assert_eq!(recorder.notes(), ["stand up"]);
    assert!(done.is_fired());
    assert!(done.fired() >= when);
    assert_eq!(done.host(), Some("n1"));
    assert!(done.processing_end().is_some());
    assert_eq!(n.service.next_event_time(&x, &x, "Reminder").await.unwrap(), None);

    handle.shutdown();
    handle.join().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fired_event_reaches_dynamic_listeners_promptly() {
    let store = Arc::new(InMemoryEventStore::new());
    let components = InMemoryComponentDirectory::new();
    let watcher = Arc::new(Component::default());
    components.insert("watcher", watcher.clone());

    let n = node(
        "n1",
        store.clone(),
        components,
        vec![],
        Duration::from_secs(60),
    );
    let handle = n.scheduler.clone().start();

    let x = EntityRef::from("x");
    n.service
        .register_listener(&"watcher".into(), Reminder::EVENT_TYPE, &x)
        .await
        .unwrap();
    let record = n
        .service
        .fire_event(
            Some(&x),
            &Reminder {
                note: "now".to_string(),
            },
            EventRels::none(),
        )
        .await
        .unwrap()
        .expect("listener registered");

    wait_for_state(&store, record.id(), EventState::Completed).await;
    assert_eq!(watcher.calls.load(Ordering::SeqCst), 1);

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn direct_recipient_takes_precedence_over_broadcast() {
    let store = Arc::new(InMemoryEventStore::new());
    let components = InMemoryComponentDirectory::new();
    let recipient = Arc::new(Component {
        direct: true,
        ..Component::default()
    });
    let bystander = Arc::new(Component::default());
    components.insert("x", recipient.clone());
    components.insert("bystander", bystander.clone());

    let n = node(
        "n1",
        store.clone(),
        components,
        vec![],
        Duration::from_secs(60),
    );
    let x = EntityRef::from("x");
    n.service
        .register_listener(&"bystander".into(), Reminder::EVENT_TYPE, &x)
        .await
        .unwrap();
    n.service
        .schedule_event(
            Utc::now(),
            &x,
            &x,
            &Reminder {
                note: "direct".to_string(),
            },
            EventRels::none(),
        )
        .await
        .unwrap();

    assert_eq!(n.scheduler.run_once().await.unwrap(), 1);
    assert_eq!(recipient.calls.load(Ordering::SeqCst), 1);
    assert_eq!(bystander.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() {
    let store = Arc::new(InMemoryEventStore::new());
    let record = due_record("contested");
    store.insert_event(&record).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let n = node(
            &format!("n{i}"),
            store.clone(),
            InMemoryComponentDirectory::new(),
            vec![],
            Duration::from_secs(60),
        );
        let record = record.clone();
        tasks.push(tokio::spawn(async move {
            n.scheduler.try_claim(&record).await.unwrap().is_some()
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let stored = store.get_event(record.id()).await.unwrap().unwrap();
    assert_eq!(stored.state(), EventState::Processing);
    assert_eq!(stored.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cluster_processes_every_record_exactly_once() {
    let store = Arc::new(InMemoryEventStore::new());
    let mut ids = Vec::new();
    for i in 0..40 {
        let record = due_record(&format!("r{i}"));
        ids.push(record.id());
        store.insert_event(&record).await.unwrap();
    }

    let recorder = Recorder::default();
    let handles: Vec<_> = (0..3)
        .map(|i| {
            node(
                &format!("n{i}"),
                store.clone(),
                InMemoryComponentDirectory::new(),
                vec![Arc::new(recorder.clone()) as Arc<dyn EventHandler>],
                Duration::from_millis(20),
            )
            .scheduler
            .start()
        })
        .collect();

    for id in &ids {
        wait_for_state(&store, *id, EventState::Completed).await;
    }
    for handle in handles {
        handle.shutdown();
        handle.join().await;
    }

    let deliveries = recorder.deliveries();
    assert_eq!(deliveries.len(), ids.len());
    assert!(deliveries.values().all(|count| *count == 1));
}
