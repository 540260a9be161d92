//! 服务层模块
//!
//! 包含核心业务逻辑

pub mod dispatch;
pub mod template;

pub use dispatch::Dispatcher;
