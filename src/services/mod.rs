//! 服务层模块
//!
//! 包含部署流水线的各项能力及其编排

pub mod deploy;
pub mod docker;
pub mod source;
pub mod tunnel;
