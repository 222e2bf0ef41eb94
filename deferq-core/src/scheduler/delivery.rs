//! 投递视图（EventDelivery）
//!
//! 处理器收到的事件：记录元信息、辅助引用与序列化载荷，
//! 可通过 `decode` 还原为调用方的事件类型。
//!
use crate::error::{DispatchError, DispatchResult as Result};
use crate::event::{AppEvent, EntityRef};
use crate::record::EventRecord;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventDelivery {
    record_id: Uuid,
    event_type: String,
    source: EntityRef,
    target: EntityRef,
    rel0: Option<EntityRef>,
    rel1: Option<EntityRef>,
    payload: Value,
    deadline: DateTime<Utc>,
    attempt: u32,
}

impl EventDelivery {
    pub fn record_id(&self) -> Uuid {
        self.record_id
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

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// 第几次认领（从 1 开始）
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is<E: AppEvent>(&self) -> bool {
        self.event_type == E::EVENT_TYPE
    }

    pub fn decode<E: AppEvent>(&self) -> Result<E> {
        if !self.is::<E>() {
            return Err(DispatchError::TypeMismatch {
                expected: E::EVENT_TYPE.to_string(),
                found: self.event_type.clone(),
            });
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

impl From<&EventRecord> for EventDelivery {
    fn from(record: &EventRecord) -> Self {
        Self {
            record_id: record.id(),
            event_type: record.event_type().to_string(),
            source: record.source().clone(),
            target: record.target().clone(),
            rel0: record.rel0().cloned(),
            rel1: record.rel1().cloned(),
            payload: record.payload().clone(),
            deadline: record.deadline(),
            attempt: record.attempts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EventState, FIRED_PENDING};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Reminder {
        text: String,
    }

    impl AppEvent for Reminder {
        const EVENT_TYPE: &'static str = "Reminder";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Other;

    impl AppEvent for Other {
        const EVENT_TYPE: &'static str = "Other";
    }

    fn delivery(event_type: &str, payload: Value) -> EventDelivery {
        let now = Utc::now();
        let record = EventRecord::builder()
            .id(Uuid::now_v7())
            .event_type(event_type.to_string())
            .source(EntityRef::from("s"))
            .target(EntityRef::from("t"))
            .rel0(EntityRef::from("r0"))
            .payload(payload)
            .created(now)
            .deadline(now)
            .fired(FIRED_PENDING)
            .state(EventState::Pending)
            .build();
        EventDelivery::from(&record)
    }

    #[test]
    fn decode_checks_type_before_payload() {
        let d = delivery("Reminder", serde_json::json!({"text": "hi"}));
        assert_eq!(d.rel0().map(EntityRef::as_str), Some("r0"));
        assert_eq!(d.rel1(), None);
        assert_eq!(
            d.decode::<Reminder>().unwrap(),
            Reminder { text: "hi".into() }
        );

        match d.decode::<Other>() {
            Err(DispatchError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, "Other");
                assert_eq!(found, "Reminder");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_reports_bad_payload() {
        let d = delivery("Reminder", serde_json::json!({"wrong": 1}));
        assert!(matches!(
            d.decode::<Reminder>(),
            Err(DispatchError::Serde { .. })
        ));
    }
}
