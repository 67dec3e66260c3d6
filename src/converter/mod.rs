//! # 灰度转换模块（converter）
//!
//! ## 设计思路
//!
//! 该模块将“地址解析 → 离屏加载 → 绘制取像素 → 灰度变换 → 写回导出”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `handler`：编排整条处理流水线（`GrayscaleConverter`）
//! - `loader`：负责 data URI / 文件 / HTTP 加载与安全校验
//! - `pipeline`：负责解码与资源上限
//! - `offscreen`：离屏图片与一次性 `load` / `error` 事件
//! - `surface`：绘制表面（读写像素、导出 data URI）
//! - `transform`：逐像素灰度变换
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 新同事快速上手
//!
//! ```text
//! GrayscaleConverter::convert(element)
//!    ├─ resolve_target（src / background-image / 计算样式）
//!    ├─ OffscreenImage::set_src ── loader.rs + pipeline.rs
//!    │        └─ load / error 事件 → oneshot
//!    ├─ DrawingSurface::draw_image / get_image_data
//!    ├─ transform::grayscale_in_place
//!    └─ put_image_data → to_data_url → 写回元素
//! ```

mod config;
mod error;
mod handler;
mod loader;
mod offscreen;
mod pipeline;
mod source;
mod surface;
mod transform;

pub use config::{CrossOriginMode, GrayscaleConfig};
pub use error::LoadError;
pub use handler::{GrayscaleConverter, raise_on_error};
pub use loader::{ImageFetcher, SourceLoader};
pub use offscreen::{ERROR_EVENT, ImageEvent, LOAD_EVENT, OffscreenImage};
pub use pipeline::{DecodeLimits, decode_rgba};
pub use source::{DecodedImage, ImageSource, RawImageData, ResolvedTarget};
pub use surface::DrawingSurface;
pub use transform::{PixelBuffer, grayscale_in_place, luminance};
