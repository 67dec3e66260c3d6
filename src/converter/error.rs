//! # 加载错误模型
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载离屏图片加载阶段的所有错误来源。
//! 该类型需要通过 `error` 事件负载传递给处理器，因此实现 `Clone`。

/// 离屏图片加载错误。
///
/// 在转换器中被上转为 `GrayscaleError::Load`。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("跨域拦截：{0}")]
    CrossOrigin(String),
}
