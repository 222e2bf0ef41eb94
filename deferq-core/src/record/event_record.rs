//! 事件记录（EventRecord）
//!
//! 每次 `fire`/`schedule` 产生一行记录；之后只由调度器通过条件更新修改
//! （认领 → 处理 → 终态），除 `delete_events` 外不会被删除。
//!
use crate::error::DispatchError;
use crate::event::EntityRef;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// `fired` 的哨兵值：已调度但尚未到期的事件使用该值而非 NULL，
/// 使区间查询不必处理 NULL 比较。取 Unix 纪元以便关系库可表示。
pub const FIRED_PENDING: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// 记录状态；终态（Completed/Failed）不再被认领
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EventState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::Pending => "pending",
            EventState::Processing => "processing",
            EventState::Completed => "completed",
            EventState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventState::Completed | EventState::Failed)
    }
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventState {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EventState::Pending),
            "processing" => Ok(EventState::Processing),
            "completed" => Ok(EventState::Completed),
            "failed" => Ok(EventState::Failed),
            other => Err(DispatchError::Parse {
                reason: format!("unknown event state: {other}"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct EventRecord {
    /// 记录唯一标识，创建时分配
    id: Uuid,
    /// 事件的稳定类型标识
    event_type: String,
    /// 触发事件的实体
    source: EntityRef,
    /// 事件所关注的实体，用于监听者解析
    target: EntityRef,
    rel0: Option<EntityRef>,
    rel1: Option<EntityRef>,
    /// 序列化后的事件体
    payload: Value,
    created: DateTime<Utc>,
    /// 到达该时间后事件才可被投递
    deadline: DateTime<Utc>,
    /// 入队时间；未到期的调度事件为 `FIRED_PENDING`
    fired: DateTime<Utc>,
    processing_start: Option<DateTime<Utc>>,
    processing_end: Option<DateTime<Utc>>,
    /// 当前（或最近一次）认领该记录的节点
    host: Option<String>,
    state: EventState,
    /// 认领次数，兼作乐观并发版本号
    #[builder(default)]
    attempts: u32,
    /// 最近一次失败的诊断信息
    last_error: Option<String>,
}

impl EventRecord {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source(&self) -> &EntityRef {
        &self.source
    }

    pub fn target(&self) -> &EntityRef {
        &self.target
    }

    pub fn rel0(&self) -> Option<&EntityRef> {
        self.rel0.as_ref()
    }

    pub fn rel1(&self) -> Option<&EntityRef> {
        self.rel1.as_ref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn fired(&self) -> DateTime<Utc> {
        self.fired
    }

    /// 是否已离开“已调度未到期”的哨兵状态（即已触发）
    pub fn is_fired(&self) -> bool {
        self.fired != FIRED_PENDING
    }

    pub fn processing_start(&self) -> Option<DateTime<Utc>> {
        self.processing_start
    }

    pub fn processing_end(&self) -> Option<DateTime<Utc>> {
        self.processing_end
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// 当前状态与版本对应的守卫，用于发起条件更新
    pub fn guard(&self) -> ClaimGuard {
        ClaimGuard {
            state: self.state,
            attempts: self.attempts,
            host: None,
        }
    }

    /// 应用一次状态迁移（调用方需先确认守卫匹配）
    pub fn apply(&mut self, transition: &EventTransition) {
        match transition {
            EventTransition::Claim { host, at } => {
                self.state = EventState::Processing;
                self.host = Some(host.clone());
                self.processing_start = Some(*at);
                self.processing_end = None;
                self.attempts += 1;
                if !self.is_fired() {
                    self.fired = *at;
                }
            }
            EventTransition::Complete { at } => {
                self.state = EventState::Completed;
                self.processing_end = Some(*at);
            }
            EventTransition::Fail { at, error } => {
                self.state = EventState::Failed;
                self.processing_end = Some(*at);
                self.last_error = Some(error.clone());
            }
        }
    }
}

/// 条件更新的前置条件：记录的 `state`、`attempts`（以及可选的 `host`）必须仍然一致
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimGuard {
    pub state: EventState,
    pub attempts: u32,
    pub host: Option<String>,
}

impl ClaimGuard {
    /// 认领成功后由持有者使用的守卫
    pub fn held_by(host: impl Into<String>, attempts: u32) -> Self {
        Self {
            state: EventState::Processing,
            attempts,
            host: Some(host.into()),
        }
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        record.state == self.state
            && record.attempts == self.attempts
            && self
                .host
                .as_deref()
                .is_none_or(|host| record.host.as_deref() == Some(host))
    }
}

/// 调度器可执行的状态迁移
#[derive(Debug, Clone, PartialEq)]
pub enum EventTransition {
    /// Pending（或超时的 Processing）→ Processing，`attempts + 1`
    Claim { host: String, at: DateTime<Utc> },
    /// Processing → Completed
    Complete { at: DateTime<Utc> },
    /// Processing（或超时达上限）→ Failed，保留诊断信息
    Fail { at: DateTime<Utc>, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(deadline: DateTime<Utc>) -> EventRecord {
        EventRecord::builder()
            .id(Uuid::now_v7())
            .event_type("Reminder".to_string())
            .source(EntityRef::from("x"))
            .target(EntityRef::from("x"))
            .payload(serde_json::json!({}))
            .created(deadline)
            .deadline(deadline)
            .fired(FIRED_PENDING)
            .state(EventState::Pending)
            .build()
    }

    #[test]
    fn claim_sets_processing_and_bumps_attempts() {
        let now = Utc::now();
        let mut rec = pending(now);
        assert!(!rec.is_fired());

        let guard = rec.guard();
        assert!(guard.matches(&rec));
        rec.apply(&EventTransition::Claim {
            host: "node-a".into(),
            at: now,
        });

        assert_eq!(rec.state(), EventState::Processing);
        assert_eq!(rec.host(), Some("node-a"));
        assert_eq!(rec.processing_start(), Some(now));
        assert_eq!(rec.attempts(), 1);
        assert!(rec.is_fired());
        // 旧守卫失效
        assert!(!guard.matches(&rec));
        assert!(ClaimGuard::held_by("node-a", 1).matches(&rec));
        assert!(!ClaimGuard::held_by("node-b", 1).matches(&rec));
    }

    #[test]
    fn fail_retains_error() {
        let now = Utc::now();
        let mut rec = pending(now - Duration::seconds(1));
        rec.apply(&EventTransition::Claim {
            host: "n".into(),
            at: now,
        });
        rec.apply(&EventTransition::Fail {
            at: now,
            error: "boom".into(),
        });
        assert_eq!(rec.state(), EventState::Failed);
        assert!(rec.state().is_terminal());
        assert_eq!(rec.last_error(), Some("boom"));
        assert_eq!(rec.processing_end(), Some(now));
    }

    #[test]
    fn state_parses_from_its_own_name() {
        for s in [
            EventState::Pending,
            EventState::Processing,
            EventState::Completed,
            EventState::Failed,
        ] {
            assert_eq!(s.as_str().parse::<EventState>().unwrap(), s);
        }
        assert!("archived".parse::<EventState>().is_err());
    }
}
