//! 基础设施模块
//!
//! 封装外部进程执行

pub mod command;

pub use command::{CommandError, CommandOutput, CommandRunner, ProcessRunner};
