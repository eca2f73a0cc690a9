//! 部署回滚
//!
//! 每个成功的部署步骤压入一个补偿动作，失败时按相反顺序执行。

use crate::domain::source::Slug;

/// 补偿动作
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Compensation {
    /// 删除本次新 clone 的工作副本
    DiscardWorkingCopy(Slug),
    /// 强制删除本次构建的镜像
    RemoveImage(String),
    /// 停止并删除本次启动的容器
    RemoveContainer(String),
}

impl Compensation {
    pub fn describe(&self) -> String {
        match self {
            Compensation::DiscardWorkingCopy(slug) => format!("discard working copy {}", slug),
            Compensation::RemoveImage(id) => format!("remove image {}", id),
            Compensation::RemoveContainer(id) => format!("remove container {}", id),
        }
    }
}

/// 补偿动作栈
#[derive(Debug, Default)]
pub struct Rollback {
    actions: Vec<Compensation>,
}

impl Rollback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Compensation) {
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// 按执行顺序（后进先出）取出所有动作
    pub fn into_unwind_order(self) -> Vec<Compensation> {
        let mut actions = self.actions;
        actions.reverse();
        actions
    }
}
