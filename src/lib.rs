//! # 元素图片灰度化 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  调用方：convert / convert_with_callback / convert_or_raise │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↓ Result<(), GrayscaleError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │  ┌─ error ────── GrayscaleError (统一错误类型)            │
//! │  │                                                       │
//! │  ├─ element ──── Element trait / HtmlElement             │
//! │  │   └─ style        计算样式 + url(...) 解析             │
//! │  │                                                       │
//! │  ├─ events ───── bind / unbind 一次性事件                 │
//! │  │                                                       │
//! │  └─ converter ── 加载·解码·绘制·灰度·导出                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `GrayscaleError` |
//! | [`element`] | 目标元素抽象、内存版元素、计算样式 |
//! | [`events`] | 离屏图片 `load` / `error` 事件绑定 |
//! | [`converter`] | 灰度转换流水线与配置 |
//!
//! ## 示例
//!
//! ```rust,no_run
//! use canvas_grayscale::{Element, GrayscaleConfig, GrayscaleConverter, HtmlElement};
//!
//! # async fn demo() -> Result<(), canvas_grayscale::GrayscaleError> {
//! let converter = GrayscaleConverter::new(GrayscaleConfig::default())?;
//! let mut img = HtmlElement::new("img").with_attribute("src", "photo.png");
//! converter.convert(&mut img).await?;
//! assert!(img.src().unwrap_or_default().starts_with("data:image/png;base64,"));
//! # Ok(())
//! # }
//! ```

pub mod converter;
pub mod element;
pub mod error;
pub mod events;

pub use converter::{GrayscaleConfig, GrayscaleConverter, raise_on_error};
pub use element::{Element, HtmlElement};
pub use error::GrayscaleError;
