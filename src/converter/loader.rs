//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（data URI / 本地文件 / HTTP）的原始字节加载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - HTTP：协议 + 主机安全 + 跨域判定 + 内容类型 + 体积校验 + 流式下载。
//! - data URI：格式解析 + 解码前体积估算。
//! - 文件：存在性 + metadata 体积限制 + 读取。
//! - 任何失败都不重试，直接映射为 `LoadError`。

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};

use super::source::{ImageSource, RawImageData, is_data_uri};
use super::{CrossOriginMode, GrayscaleConfig, LoadError};

const STREAM_SIGNATURE_PROBE_BYTES: usize = 4096;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 图片字节获取能力。
///
/// 默认实现为 `SourceLoader`；测试或宿主环境可以注入自己的实现。
pub trait ImageFetcher {
    fn fetch(
        &self,
        url: &str,
        mode: CrossOriginMode,
    ) -> impl Future<Output = Result<RawImageData, LoadError>> + Send;
}

/// 默认图片加载器。
pub struct SourceLoader {
    config: GrayscaleConfig,
    client: reqwest::Client,
}

impl SourceLoader {
    /// 根据配置创建加载器，同时构建复用型 HTTP 客户端。
    pub fn new(config: GrayscaleConfig) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| LoadError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self { config, client })
    }

    /// 从 data URI 加载图片原始字节。
    pub(crate) fn load_from_data_uri(&self, data: &str) -> Result<RawImageData, LoadError> {
        log::debug!("📝 开始处理 data URI 图片");

        let bytes = Self::parse_data_uri_with_limit(data, self.config.max_file_size)?;

        if bytes.len() as u64 > self.config.max_file_size {
            return Err(LoadError::ResourceLimit(format!(
                "data URI 解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                self.config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "data-uri",
            origin_clean: true,
        })
    }

    /// 从本地路径加载图片原始字节。
    pub(crate) fn load_from_file(&self, path: &Path) -> Result<RawImageData, LoadError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

        if !path.exists() {
            return Err(LoadError::FileSystem(format!("文件不存在：{}", path.display())));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| LoadError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > self.config.max_file_size {
            return Err(LoadError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                self.config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(path)
            .map_err(|e| LoadError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "file",
            origin_clean: true,
        })
    }

    /// 从 HTTP/HTTPS 地址加载图片原始字节。
    ///
    /// 设置了 `document_origin` 时按源比较：
    /// - `Anonymous` 模式下跨域响应必须携带匹配的 `Access-Control-Allow-Origin`，否则加载失败；
    /// - `Unset` 模式下跨域图片照常加载，但标记为非同源。
    pub(crate) async fn load_from_http(
        &self,
        url: reqwest::Url,
        mode: CrossOriginMode,
    ) -> Result<RawImageData, LoadError> {
        log::info!("🌐 开始下载图片 - URL: {}", redact_url_for_log(url.as_str()));

        Self::validate_url_safety(&url, &self.config)?;

        let document_origin = self.config.document_origin_serialized();
        let mut current_url = url;
        let mut crossed_origin = false;

        for redirect_count in 0..=self.config.max_redirects {
            let request_origin = current_url.origin().ascii_serialization();
            let is_cross_origin = document_origin
                .as_deref()
                .is_some_and(|doc| doc != request_origin);
            crossed_origin |= is_cross_origin;

            let mut request = self.client.get(current_url.clone()).header(
                reqwest::header::ACCEPT,
                "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
            );
            if mode == CrossOriginMode::Anonymous {
                if let Some(doc) = document_origin.as_deref() {
                    request = request.header(reqwest::header::ORIGIN, doc);
                }
            }

            let response = request
                .send()
                .await
                .map_err(|e| self.map_reqwest_error(e, current_url.as_str()))?;

            if response.status().is_redirection() {
                if redirect_count >= self.config.max_redirects {
                    return Err(LoadError::Network(format!(
                        "重定向次数超过限制（{}）",
                        self.config.max_redirects
                    )));
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .ok_or_else(|| LoadError::Network("重定向响应缺少 Location 头".to_string()))?;

                let location_str = location
                    .to_str()
                    .map_err(|e| LoadError::InvalidFormat(format!("重定向地址无效：{}", e)))?;

                let next_url = current_url
                    .join(location_str)
                    .map_err(|e| LoadError::InvalidFormat(format!("重定向 URL 解析失败：{}", e)))?;

                Self::validate_url_safety(&next_url, &self.config)?;

                log::debug!("↪️ 跳转到: {}", redact_url_for_log(next_url.as_str()));
                current_url = next_url;
                continue;
            }

            if !response.status().is_success() {
                return Err(LoadError::Network(format!(
                    "HTTP {}: {}",
                    response.status().as_u16(),
                    status_message(response.status().as_u16())
                )));
            }

            if crossed_origin && mode == CrossOriginMode::Anonymous {
                let allowed = response
                    .headers()
                    .get(reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN)
                    .and_then(|value| value.to_str().ok())
                    .map(str::trim);
                if !is_cors_allowed(allowed, document_origin.as_deref()) {
                    return Err(LoadError::CrossOrigin(format!(
                        "{} 未允许来自 {} 的跨域访问",
                        request_origin,
                        document_origin.as_deref().unwrap_or("null")
                    )));
                }
            }

            if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
                if let Ok(ct_str) = ct.to_str() {
                    if !is_image_content_type(ct_str) {
                        return Err(LoadError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                    }
                }
            }

            let bytes = self.read_body(response).await?;
            let origin_clean = !crossed_origin || mode == CrossOriginMode::Anonymous;
            if !origin_clean {
                log::debug!("🔒 跨域图片未经 CORS 放行，绘制后表面将被污染");
            }

            return Ok(RawImageData {
                bytes,
                source_hint: "http",
                origin_clean,
            });
        }

        Err(LoadError::Network("下载流程异常结束".to_string()))
    }

    /// 流式读取响应体。
    ///
    /// 首包与后续分块分别计时，并在前若干字节内完成签名探测。
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, LoadError> {
        let total_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|cl| cl.to_str().ok())
            .and_then(|cl| cl.parse::<u64>().ok());

        if let Some(size) = total_len {
            if size > self.config.max_file_size {
                return Err(LoadError::ResourceLimit(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    self.config.max_file_size as f64 / 1024.0 / 1024.0
                )));
            }
        }

        let initial_capacity = total_len
            .map(|len| len.min(self.config.max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;
        let mut signature_validated = false;
        let mut received_first_chunk = false;

        loop {
            let read_timeout = if received_first_chunk {
                Duration::from_millis(self.config.stream_chunk_timeout_ms)
            } else {
                Duration::from_millis(self.config.stream_first_byte_timeout_ms)
            };

            let next_chunk = tokio::time::timeout(read_timeout, response.chunk())
                .await
                .map_err(|_| {
                    if received_first_chunk {
                        LoadError::Timeout("下载数据流读取超时".to_string())
                    } else {
                        LoadError::Timeout("下载首包超时".to_string())
                    }
                })?;

            let Some(chunk) = next_chunk.map_err(|e| LoadError::Network(format!("下载失败：{}", e)))?
            else {
                break;
            };

            received_first_chunk = true;
            total = total.saturating_add(chunk.len() as u64);
            if total > self.config.max_file_size {
                return Err(LoadError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);

            if !signature_validated {
                signature_validated =
                    Self::validate_stream_signature_probe(&buffer, STREAM_SIGNATURE_PROBE_BYTES)?;
            }
        }

        if !signature_validated {
            Self::validate_image_signature(&buffer)?;
        }

        log::debug!("✅ 下载完成 - {} bytes", total);
        Ok(buffer)
    }

    /// 校验 URL 安全性。
    ///
    /// 默认阻止本地/内网目标，防止 SSRF 风险。
    fn validate_url_safety(url: &reqwest::Url, config: &GrayscaleConfig) -> Result<(), LoadError> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(LoadError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        if config.allow_private_network {
            return Ok(());
        }

        let host = url
            .host_str()
            .ok_or_else(|| LoadError::InvalidFormat("URL 缺少主机地址".to_string()))?;

        if is_local_hostname(host) {
            return Err(LoadError::InvalidFormat(format!(
                "禁止访问本地网络地址：{}",
                host
            )));
        }

        let bare_host = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare_host.parse::<IpAddr>() {
            if is_private_or_local_ip(ip) {
                return Err(LoadError::InvalidFormat(format!("禁止访问内网 IP：{}", ip)));
            }
        }

        Ok(())
    }

    fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, LoadError> {
        let len = base64_data.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| LoadError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| LoadError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 解析 `data:image/<type>;base64,<payload>`。
    pub(crate) fn parse_data_uri_with_limit(
        data: &str,
        max_file_size: u64,
    ) -> Result<Vec<u8>, LoadError> {
        let normalized = data.trim();
        let Some((header, payload)) = normalized.split_once(',') else {
            return Err(LoadError::InvalidFormat("data URI 缺少 ',' 分隔符".to_string()));
        };

        let header = header.to_ascii_lowercase();
        if !header.starts_with("data:image/") {
            return Err(LoadError::InvalidFormat(format!(
                "data URI 不是图片类型：{}",
                header
            )));
        }
        if !header.ends_with(";base64") {
            return Err(LoadError::InvalidFormat(
                "仅支持 base64 编码的 data URI".to_string(),
            ));
        }

        let estimated_len = Self::estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated_len > max_file_size {
            return Err(LoadError::ResourceLimit(format!(
                "data URI 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| LoadError::Decode(format!("Base64 解码失败：{}", e)))
    }

    /// 统一映射 reqwest 错误到加载错误。
    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> LoadError {
        let err_msg = e.to_string().replace(url, &redact_url_for_log(url));

        if e.is_timeout() {
            LoadError::Timeout(format!("下载超时（{}秒）", self.config.download_timeout))
        } else if e.is_connect() {
            LoadError::Network(format!("无法连接：{}", err_msg))
        } else {
            LoadError::Network(format!("请求失败：{}", err_msg))
        }
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), LoadError> {
        if bytes.is_empty() {
            return Err(LoadError::InvalidFormat("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| LoadError::InvalidFormat("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(LoadError::InvalidFormat(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }

    /// 流式下载阶段的签名探测：尽早识别并拒绝非图片内容。
    ///
    /// 返回值：
    /// - `Ok(true)`：已识别为图片
    /// - `Ok(false)`：当前字节不足以判断，继续下载
    /// - `Err(...)`：已识别为非图片，或达到探测上限仍无法识别
    fn validate_stream_signature_probe(bytes: &[u8], probe_limit: usize) -> Result<bool, LoadError> {
        if bytes.is_empty() {
            return Ok(false);
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(LoadError::InvalidFormat(format!(
                    "下载内容不是图片类型：{}",
                    kind.mime_type()
                )));
            }
            return Ok(true);
        }

        if bytes.len() >= probe_limit {
            return Err(LoadError::InvalidFormat(format!(
                "下载前 {} 字节内无法识别图片类型",
                probe_limit
            )));
        }

        Ok(false)
    }
}

impl ImageFetcher for SourceLoader {
    async fn fetch(&self, url: &str, mode: CrossOriginMode) -> Result<RawImageData, LoadError> {
        let source = ImageSource::resolve(url, self.config.base_url.as_deref())?;
        log::debug!("📥 图片来源类型: {}", source.hint());

        match source {
            ImageSource::DataUri(data) => self.load_from_data_uri(&data),
            ImageSource::File(path) => self.load_from_file(&path),
            ImageSource::Http(url) => self.load_from_http(url, mode).await,
        }
    }
}

/// 判断 `Access-Control-Allow-Origin` 是否放行文档源。
fn is_cors_allowed(allowed: Option<&str>, document_origin: Option<&str>) -> bool {
    match (allowed, document_origin) {
        (Some("*"), _) => true,
        (Some(allowed), Some(doc)) => allowed.eq_ignore_ascii_case(doc),
        _ => false,
    }
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// 去掉查询串与片段，避免把令牌写进日志。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    if is_data_uri(url) {
        return "data:<inline>".to_string();
    }

    let Ok(parsed) = reqwest::Url::parse(url) else {
        return url.split(['?', '#']).next().unwrap_or_default().to_string();
    };

    let host = parsed.host_str().unwrap_or("");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = parsed.path();

    format!("{}://{}{}{}", parsed.scheme(), host, port, path)
}

/// 判断主机名是否指向本地地址。
fn is_local_hostname(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.eq_ignore_ascii_case("localhost.")
        || host.ends_with(".local")
}

/// 判断 IP 是否属于本地/内网/链路本地等受限范围。
fn is_private_or_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            if v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
                || v4.is_multicast()
            {
                return true;
            }

            let octets = v4.octets();
            octets[0] == 0 || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
        }
    }
}

/// 常见 HTTP 状态码本地化文案。
fn status_message(code: u16) -> &'static str {
    match code {
        404 => "未找到",
        403 => "访问被拒绝",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}
