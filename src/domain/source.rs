//! 源码仓库相关领域模型
//!
//! 纯数据结构：仓库引用、slug 派生、工作副本

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 仓库 slug
///
/// 由仓库 URL 的最后一段路径派生（去掉 `.git` 后缀并转为小写），
/// 同时满足文件系统目录名和镜像 tag 的命名要求。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

/// slug 最大长度（镜像 tag 还要加上 `deploy-` 前缀）
pub const MAX_SLUG_LEN: usize = 128;

/// 字母数字段之间只允许 `.`、`_`、`__` 或若干个 `-`
fn is_path_component(bytes: &[u8]) -> bool {
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let mut i = 0;
    loop {
        let start = i;
        while i < bytes.len() && alnum(bytes[i]) {
            i += 1;
        }
        if i == start {
            return false;
        }
        if i == bytes.len() {
            return true;
        }

        match bytes[i] {
            b'.' => i += 1,
            b'_' => {
                i += 1;
                if bytes.get(i) == Some(&b'_') {
                    i += 1;
                }
            }
            b'-' => {
                while bytes.get(i) == Some(&b'-') {
                    i += 1;
                }
            }
            _ => return false,
        }
    }
}

impl Slug {
    /// 从仓库 URL 派生 slug
    ///
    /// 支持 `https://host/ns/repo(.git)` 与 `git@host:ns/repo(.git)` 两种形式，
    /// 忽略末尾的 `/`。
    pub fn from_url(url: &str) -> Result<Self, InvalidSlug> {
        let trimmed = url.trim().trim_end_matches('/');
        let last = trimmed
            .rsplit(|c| c == '/' || c == ':')
            .next()
            .unwrap_or_default();
        let name = last.strip_suffix(".git").unwrap_or(last);

        Self::parse(name).map_err(|_| InvalidSlug(url.to_string()))
    }

    /// 校验并构造 slug
    ///
    /// 必须符合镜像名路径组件的语法：
    /// `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*`，且不超过 [`MAX_SLUG_LEN`]。
    pub fn parse(name: &str) -> Result<Self, InvalidSlug> {
        let lowered = name.to_ascii_lowercase();
        if lowered.len() <= MAX_SLUG_LEN && is_path_component(lowered.as_bytes()) {
            Ok(Self(lowered))
        } else {
            Err(InvalidSlug(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 镜像 tag：`deploy-<slug>`
    pub fn image_tag(&self) -> String {
        format!("deploy-{}", self.0)
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// slug 无法从输入派生
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidSlug(pub String);

impl fmt::Display for InvalidSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot derive a valid repository name from '{}'",
            self.0
        )
    }
}

impl std::error::Error for InvalidSlug {}

/// 远程仓库引用
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryReference {
    /// 调用方传入的原始 URL（原样返回给调用方）
    pub url: String,
    /// 派生出的 slug
    pub slug: Slug,
}

impl RepositoryReference {
    pub fn parse(url: &str) -> Result<Self, InvalidSlug> {
        let url = url.trim();
        if url.is_empty() {
            return Err(InvalidSlug(String::new()));
        }
        Ok(Self {
            url: url.to_string(),
            slug: Slug::from_url(url)?,
        })
    }
}

/// 本地工作副本
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkingCopy {
    pub slug: Slug,
    pub path: PathBuf,
    /// 本次 fetch 是否实际执行了 clone（false 表示复用已有目录）
    pub freshly_cloned: bool,
}
