//! Postgres 存储（PgEventStore）
//!
//! 使用 sqlx 访问 `deferred_events` / `event_listeners` 两张表。条件更新翻译为
//! `UPDATE ... WHERE id = $1 AND state = $2 AND attempts = $3`，
//! 以受影响行数判断竞争胜负；多节点共享同一数据库即构成集群。
//!
use super::EventRecordStore;
use crate::error::{DispatchError, DispatchResult as Result};
use crate::event::EntityRef;
use crate::record::{
    ClaimGuard, EventFilter, EventRecord, EventState, EventTransition, FIRED_PENDING,
    ListenerRegistration, QueueAggregate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const EVENT_COLUMNS: &str = "id, event_type, source, target, rel0, rel1, payload, created, \
     deadline, fired, processing_start, processing_end, host, state, attempts, last_error";

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// 执行内置迁移（建表与索引）
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DispatchError::store(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    event_type: String,
    source: String,
    target: String,
    rel0: Option<String>,
    rel1: Option<String>,
    payload: serde_json::Value,
    created: DateTime<Utc>,
    deadline: DateTime<Utc>,
    fired: DateTime<Utc>,
    processing_start: Option<DateTime<Utc>>,
    processing_end: Option<DateTime<Utc>>,
    host: Option<String>,
    state: String,
    attempts: i32,
    last_error: Option<String>,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = DispatchError;

    fn try_from(row: EventRow) -> Result<Self> {
        let attempts = u32::try_from(row.attempts).map_err(|_| DispatchError::Parse {
            reason: format!("negative attempts on event {}", row.id),
        })?;

        Ok(EventRecord::builder()
            .id(row.id)
            .event_type(row.event_type)
            .source(EntityRef::from(row.source))
            .target(EntityRef::from(row.target))
            .maybe_rel0(row.rel0.map(EntityRef::from))
            .maybe_rel1(row.rel1.map(EntityRef::from))
            .payload(row.payload)
            .created(row.created)
            .deadline(row.deadline)
            .fired(row.fired)
            .maybe_processing_start(row.processing_start)
            .maybe_processing_end(row.processing_end)
            .maybe_host(row.host)
            .state(row.state.parse::<EventState>()?)
            .attempts(attempts)
            .maybe_last_error(row.last_error)
            .build())
    }
}

fn push_where(qb: &mut QueryBuilder<'_, Postgres>, filter: &EventFilter) {
    qb.push(" WHERE TRUE");
    if let Some(source) = &filter.source {
        qb.push(" AND source = ").push_bind(source.as_str().to_string());
    }
    if let Some(target) = &filter.target {
        qb.push(" AND target = ").push_bind(target.as_str().to_string());
    }
    if let Some(event_type) = &filter.event_type {
        qb.push(" AND event_type = ").push_bind(event_type.clone());
    }
    if let Some(state) = filter.state {
        qb.push(" AND state = ").push_bind(state.as_str());
    }
    if let Some(at) = filter.deadline_at_or_before {
        qb.push(" AND deadline <= ").push_bind(at);
    }
    if let Some(before) = filter.processing_started_before {
        qb.push(" AND processing_start < ").push_bind(before);
    }
}

#[async_trait]
impl EventRecordStore for PgEventStore {
    async fn insert_event(&self, record: &EventRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO deferred_events (
                id, event_type, source, target, rel0, rel1, payload, created,
                deadline, fired, processing_start, processing_end, host, state,
                attempts, last_error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(record.id())
        .bind(record.event_type())
        .bind(record.source().as_str())
        .bind(record.target().as_str())
        .bind(record.rel0().map(EntityRef::as_str))
        .bind(record.rel1().map(EntityRef::as_str))
        .bind(record.payload())
        .bind(record.created())
        .bind(record.deadline())
        .bind(record.fired())
        .bind(record.processing_start())
        .bind(record.processing_end())
        .bind(record.host())
        .bind(record.state().as_str())
        .bind(record.attempts() as i32)
        .bind(record.last_error())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<EventRecord>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM deferred_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EventRecord::try_from).transpose()
    }

    async fn find_events(&self, filter: &EventFilter) -> Result<Vec<EventRecord>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EVENT_COLUMNS} FROM deferred_events"
        ));
        push_where(&mut qb, filter);
        qb.push(" ORDER BY deadline ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(EventRecord::try_from).collect()
    }

    async fn aggregate_events(&self, filter: &EventFilter) -> Result<QueueAggregate> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) AS count, MIN(deadline) AS min_deadline FROM deferred_events",
        );
        push_where(&mut qb, filter);

        let (count, min_deadline): (i64, Option<DateTime<Utc>>) =
            qb.build_query_as().fetch_one(&self.pool).await?;

        Ok(QueueAggregate {
            count: count.max(0) as u64,
            min_deadline,
        })
    }

    async fn delete_events(&self, filter: &EventFilter) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM deferred_events");
        push_where(&mut qb, filter);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn transition_event(
        &self,
        id: Uuid,
        guard: &ClaimGuard,
        transition: &EventTransition,
    ) -> Result<bool> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE deferred_events SET ");
        match transition {
            EventTransition::Claim { host, at } => {
                qb.push("state = ")
                    .push_bind(EventState::Processing.as_str())
                    .push(", host = ")
                    .push_bind(host.clone())
                    .push(", processing_start = ")
                    .push_bind(*at)
                    .push(", processing_end = NULL, attempts = attempts + 1")
                    .push(", fired = CASE WHEN fired = ")
                    .push_bind(FIRED_PENDING)
                    .push(" THEN ")
                    .push_bind(*at)
                    .push(" ELSE fired END");
            }
            EventTransition::Complete { at } => {
                qb.push("state = ")
                    .push_bind(EventState::Completed.as_str())
                    .push(", processing_end = ")
                    .push_bind(*at);
            }
            EventTransition::Fail { at, error } => {
                qb.push("state = ")
                    .push_bind(EventState::Failed.as_str())
                    .push(", processing_end = ")
                    .push_bind(*at)
                    .push(", last_error = ")
                    .push_bind(error.clone());
            }
        }

        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND state = ")
            .push_bind(guard.state.as_str())
            .push(" AND attempts = ")
            .push_bind(guard.attempts as i32);
        if let Some(host) = &guard.host {
            qb.push(" AND host = ").push_bind(host.clone());
        }

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_listener(&self, registration: &ListenerRegistration) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO event_listeners (listener_id, event_type, target)
            VALUES ($1, $2, $3)
            ON CONFLICT (listener_id, event_type, target) DO NOTHING
            "#,
        )
        .bind(registration.listener_id().as_str())
        .bind(registration.event_type())
        .bind(registration.target().as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_listeners(&self, registration: &ListenerRegistration) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM event_listeners
            WHERE listener_id = $1 AND event_type = $2 AND target = $3
            "#,
        )
        .bind(registration.listener_id().as_str())
        .bind(registration.event_type())
        .bind(registration.target().as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_listeners(
        &self,
        event_type: &str,
        target: &EntityRef,
    ) -> Result<Vec<ListenerRegistration>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT listener_id, event_type, target
            FROM event_listeners
            WHERE event_type = $1 AND target = $2
            "#,
        )
        .bind(event_type)
        .bind(target.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(listener_id, event_type, target)| {
                ListenerRegistration::new(listener_id, event_type, target)
            })
            .collect())
    }

    async fn listener_exists(&self, event_type: &str, target: &EntityRef) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM event_listeners WHERE event_type = $1 AND target = $2
            )
            "#,
        )
        .bind(event_type)
        .bind(target.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
