//! 查询条件构造器
//!
//! `EventFilter` 描述一组 WHERE 条件（全部为 AND 关系），存储实现将其翻译为
//! 各自的查询语言；内存实现直接使用 `matches` 逐行判断。结果总是按 `deadline` 升序。
//!
use super::{EventRecord, EventState};
use crate::event::EntityRef;
use bon::Builder;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq, Builder)]
pub struct EventFilter {
    #[builder(into)]
    pub source: Option<EntityRef>,
    #[builder(into)]
    pub target: Option<EntityRef>,
    #[builder(into)]
    pub event_type: Option<String>,
    pub state: Option<EventState>,
    /// `deadline <= 该值`
    pub deadline_at_or_before: Option<DateTime<Utc>>,
    /// `processing_start < 该值`（用于找出超时的认领）
    pub processing_started_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventFilter {
    /// 已到期且尚未认领的记录
    pub fn due(now: DateTime<Utc>) -> Self {
        Self::builder()
            .state(EventState::Pending)
            .deadline_at_or_before(now)
            .build()
    }

    /// 认领已超时（节点可能已崩溃）的记录
    pub fn stale_claims(cutoff: DateTime<Utc>) -> Self {
        Self::builder()
            .state(EventState::Processing)
            .processing_started_before(cutoff)
            .build()
    }

    /// 指定 source/target/类型下仍为 Pending 的记录
    pub fn pending_for(source: &EntityRef, target: &EntityRef, event_type: &str) -> Self {
        Self::builder()
            .source(source.clone())
            .target(target.clone())
            .event_type(event_type)
            .state(EventState::Pending)
            .build()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        let started_before = match (self.processing_started_before, record.processing_start()) {
            (None, _) => true,
            (Some(before), Some(start)) => start < before,
            (Some(_), None) => false,
        };

        started_before
            && self.source.as_ref().is_none_or(|s| record.source() == s)
            && self.target.as_ref().is_none_or(|t| record.target() == t)
            && self
                .event_type
                .as_deref()
                .is_none_or(|t| record.event_type() == t)
            && self.state.is_none_or(|s| record.state() == s)
            && self
                .deadline_at_or_before
                .is_none_or(|at| record.deadline() <= at)
    }
}

/// COUNT / MIN(deadline) 投影结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueAggregate {
    pub count: u64,
    pub min_deadline: Option<DateTime<Utc>>,
}
