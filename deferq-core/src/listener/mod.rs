//! 监听者解析（listener）
//!
//! - `EventHandler`/`StaticHandlerRegistry`：编译期注册的静态处理器；
//! - `DynamicListenerTable`：运行时登记的动态监听；
//! - `ComponentDirectory`/`EventListener`：由组件 id 解析出可调用的监听组件；
//! - `ListenerDirectory`：组合以上来源，提供存在性判断与投递时的处理器解析。
//!
mod component;
mod directory;
mod handler;

pub use component::{ComponentDirectory, EventListener, InMemoryComponentDirectory};
pub use directory::{DynamicListenerTable, ListenerDirectory, ListenerSource, ResolvedHandler};
pub use handler::{EventHandler, HandledEventType, StaticHandlerRegistry};
