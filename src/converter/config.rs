//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `GrayscaleConfig`，保证运行时行为可观测、可调整、可测试。
//! 覆盖加载（体积 / 超时 / 重定向 / 内网拦截）、解码（像素与内存上限）
//! 以及跨域模型（文档源、`crossOrigin` 模式）三部分。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的配置。
//! - `serde(default)` 允许 JSON 只写需要覆盖的字段。
//! - `validate` 在构建转换器时统一校验取值范围。

use serde::{Deserialize, Serialize};

use crate::error::GrayscaleError;

/// 离屏图片的 `crossOrigin` 模式。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossOriginMode {
    /// 不发起 CORS 请求：跨域图片可以加载，但会污染绘制表面
    #[default]
    Unset,
    /// 以 CORS 方式请求：服务端未放行时加载直接失败
    Anonymous,
}

/// 灰度转换配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrayscaleConfig {
    /// 读取原始字节时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 网络下载总超时（秒）。
    pub download_timeout: u64,
    /// 建立连接超时（秒）。
    pub connect_timeout: u64,
    /// 下载首包超时（毫秒）。
    pub stream_first_byte_timeout_ms: u64,
    /// 下载分块读取超时（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 是否允许访问内网或本地地址（默认关闭，防 SSRF）。
    pub allow_private_network: bool,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 文档源，例如 `https://app.example`。
    ///
    /// 为 `None` 时不做跨域判定，所有图片视为同源。
    pub document_origin: Option<String>,
    /// 相对地址的解析基准。
    pub base_url: Option<String>,
    pub cross_origin: CrossOriginMode,
}

impl Default for GrayscaleConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_first_byte_timeout_ms: 10_000,
            stream_chunk_timeout_ms: 15_000,
            max_redirects: 5,
            allow_private_network: false,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            document_origin: None,
            base_url: None,
            cross_origin: CrossOriginMode::Unset,
        }
    }
}

impl GrayscaleConfig {
    /// 从 JSON 解析配置并校验。
    ///
    /// # 示例
    /// ```rust
    /// use canvas_grayscale::converter::{CrossOriginMode, GrayscaleConfig};
    ///
    /// let config = GrayscaleConfig::from_json_str(r#"{"cross_origin":"anonymous"}"#)?;
    /// assert_eq!(config.cross_origin, CrossOriginMode::Anonymous);
    /// # Ok::<(), canvas_grayscale::GrayscaleError>(())
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, GrayscaleError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GrayscaleError::Config(format!("配置 JSON 解析失败：{}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 校验各字段取值范围。
    pub fn validate(&self) -> Result<(), GrayscaleError> {
        if self.max_file_size == 0 {
            return Err(GrayscaleError::Config("max_file_size 必须大于 0".to_string()));
        }
        if !(1..=600).contains(&self.download_timeout) {
            return Err(GrayscaleError::Config("download_timeout 必须在 1~600 秒之间".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(GrayscaleError::Config("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if !(500..=120_000).contains(&self.stream_first_byte_timeout_ms) {
            return Err(GrayscaleError::Config(
                "stream_first_byte_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if !(500..=120_000).contains(&self.stream_chunk_timeout_ms) {
            return Err(GrayscaleError::Config(
                "stream_chunk_timeout_ms 必须在 500~120000 毫秒之间".to_string(),
            ));
        }
        if self.max_redirects > 20 {
            return Err(GrayscaleError::Config("max_redirects 不能大于 20".to_string()));
        }
        if self.max_decoded_pixels == 0 {
            return Err(GrayscaleError::Config("max_decoded_pixels 必须大于 0".to_string()));
        }
        if self.max_decoded_bytes < 4 {
            return Err(GrayscaleError::Config("max_decoded_bytes 至少为 4 字节".to_string()));
        }

        if let Some(origin) = &self.document_origin {
            let parsed = reqwest::Url::parse(origin).map_err(|e| {
                GrayscaleError::Config(format!("document_origin 格式错误：{}", e))
            })?;
            if !parsed.origin().is_tuple() {
                return Err(GrayscaleError::Config(format!(
                    "document_origin 不是有效的源：{}",
                    origin
                )));
            }
        }

        if let Some(base) = &self.base_url {
            reqwest::Url::parse(base)
                .map_err(|e| GrayscaleError::Config(format!("base_url 格式错误：{}", e)))?;
        }

        Ok(())
    }

    /// 文档源的规范化字符串（`scheme://host[:port]`）。
    pub(crate) fn document_origin_serialized(&self) -> Option<String> {
        let origin = self.document_origin.as_deref()?;
        let parsed = reqwest::Url::parse(origin).ok()?;
        Some(parsed.origin().ascii_serialization())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GrayscaleConfig::default().validate().is_ok());
    }

    #[test]
    fn json_only_needs_overridden_fields() {
        let config = GrayscaleConfig::from_json_str(
            r#"{"allow_private_network": true, "document_origin": "https://app.example/index.html"}"#,
        )
        .expect("config should parse");

        assert!(config.allow_private_network);
        assert_eq!(config.max_redirects, 5);
        assert_eq!(
            config.document_origin_serialized().as_deref(),
            Some("https://app.example")
        );
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = GrayscaleConfig::default();
        config.connect_timeout = 0;
        assert!(matches!(config.validate(), Err(GrayscaleError::Config(_))));

        let mut config = GrayscaleConfig::default();
        config.document_origin = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(GrayscaleError::Config(_))));
    }

    #[test]
    fn unknown_cross_origin_mode_fails_to_parse() {
        let result = GrayscaleConfig::from_json_str(r#"{"cross_origin":"use-credentials"}"#);
        assert!(matches!(result, Err(GrayscaleError::Config(_))));
    }
}
