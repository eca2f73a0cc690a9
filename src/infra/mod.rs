//! 基础设施模块
//!
//! 封装外部依赖（命令执行等）

pub mod command;

pub use command::CommandRunner;
