//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `GrayscaleError` 枚举，覆盖一次灰度转换的全部失败分支：
//! 缺少 `src`、缺少 `background-image`、图片加载失败、像素读取失败。
//!
//! 所有公开入口统一返回 `Result<T, GrayscaleError>`，
//! 回调形式的入口也只会把同一个错误值交给回调，不会同时 panic。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `LoadError` 提供 `From` 转换，加载阶段可以直接 `?`。
//! - 实现 `Serialize` 将错误序列化为字符串，便于 CLI 输出 JSON。

use serde::Serialize;

use crate::converter::LoadError;

/// 灰度转换统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum GrayscaleError {
    /// `<img>` 元素没有设置 `src`
    #[error("<img> 元素未设置 \"src\" 属性")]
    MissingSource,

    /// 非 `<img>` 元素的行内样式与计算样式中都没有 `background-image`
    #[error("<{tag}> 元素未设置 \"background-image\" 样式")]
    MissingBackground { tag: String },

    /// 离屏图片加载失败（网络 / 解码 / 跨域拦截）
    #[error("图片加载失败：{0}")]
    Load(#[from] LoadError),

    /// 无法从绘制表面读取像素（通常是跨域污染）
    #[error("像素读取失败：{0}")]
    Extraction(String),

    /// 绘制表面编码为 data URI 失败
    #[error("图片编码失败：{0}")]
    Encode(String),

    /// 配置非法
    #[error("配置错误：{0}")]
    Config(String),
}

impl GrayscaleError {
    /// 稳定的错误分类码，供日志与 JSON 输出使用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSource => "missing_source",
            Self::MissingBackground { .. } => "missing_background",
            Self::Load(_) => "load",
            Self::Extraction(_) => "extraction",
            Self::Encode(_) => "encode",
            Self::Config(_) => "config",
        }
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for GrayscaleError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_background_message_names_the_tag() {
        let err = GrayscaleError::MissingBackground {
            tag: "div".to_string(),
        };

        assert!(err.to_string().contains("<div>"));
        assert_eq!(err.code(), "missing_background");
    }

    #[test]
    fn load_error_converts_and_serializes_as_string() {
        let err: GrayscaleError = LoadError::Network("HTTP 404: 未找到".to_string()).into();
        let json = serde_json::to_string(&err).expect("serialize failed");

        assert_eq!(err.code(), "load");
        assert!(json.starts_with('"'));
        assert!(json.contains("HTTP 404"));
    }
}
