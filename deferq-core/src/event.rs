//! 应用事件（AppEvent）与实体引用
//!
//! 定义可被分发的事件载荷需要满足的最小接口，以及事件携带的
//! 源/目标/辅助引用（`EntityRef`、`EventRels`）。
//!
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 事件载荷需要满足的能力边界
///
/// `EVENT_TYPE` 是事件的稳定类型标识（通常为全限定类型名），
/// 用于监听者解析与持久化；可通过 `#[derive(AppEvent)]` 自动生成。
pub trait AppEvent: Serialize + DeserializeOwned + Send + Sync {
    const EVENT_TYPE: &'static str;

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }
}

/// 对业务实体（源、目标、监听组件）的不透明引用
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRef(String);

impl EntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for EntityRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 事件携带的至多两个辅助引用，仅供处理器使用，不参与监听者解析
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRels {
    pub rel0: Option<EntityRef>,
    pub rel1: Option<EntityRef>,
}

impl EventRels {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn one(rel0: impl Into<EntityRef>) -> Self {
        Self {
            rel0: Some(rel0.into()),
            rel1: None,
        }
    }

    pub fn two(rel0: impl Into<EntityRef>, rel1: impl Into<EntityRef>) -> Self {
        Self {
            rel0: Some(rel0.into()),
            rel1: Some(rel1.into()),
        }
    }
}
