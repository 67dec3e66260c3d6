//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入语义”和“流水线中间结果”解耦：
//! - `ResolvedTarget` 表示分类后的元素与有效 URL
//! - `ImageSource` 表示 URL 指向的加载途径
//! - `RawImageData` 表示已加载但未解码的字节
//! - `DecodedImage` 表示离屏图片解码后的 RGBA 像素

use std::path::PathBuf;

use crate::element::ElementKind;

use super::LoadError;

/// 分类阶段输出：元素类别与有效图片地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub kind: ElementKind,
    pub url: String,
}

/// 图片加载途径。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// `data:` URI（仅支持 base64）。
    DataUri(String),
    /// 本地文件。
    File(PathBuf),
    /// HTTP/HTTPS 地址。
    Http(reqwest::Url),
}

impl ImageSource {
    /// 将元素上的地址解析为加载途径。
    ///
    /// 相对地址在设置了 `base_url` 时按其拼接，否则视为本地路径。
    pub fn resolve(url: &str, base_url: Option<&str>) -> Result<Self, LoadError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(LoadError::InvalidFormat("图片地址为空".to_string()));
        }

        if is_data_uri(url) {
            return Ok(Self::DataUri(url.to_string()));
        }

        if !has_scheme(url) {
            return match base_url {
                Some(base) => {
                    let base = reqwest::Url::parse(base)
                        .map_err(|e| LoadError::InvalidFormat(format!("基准地址格式错误：{}", e)))?;
                    let joined = base
                        .join(url)
                        .map_err(|e| LoadError::InvalidFormat(format!("相对地址解析失败：{}", e)))?;
                    Self::from_absolute(joined)
                }
                None => Ok(Self::File(PathBuf::from(url))),
            };
        }

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| LoadError::InvalidFormat(format!("URL 格式错误：{}", e)))?;

        // `C:/img.png` 这类 Windows 路径会被解析成单字母 scheme
        if parsed.scheme().len() == 1 {
            return Ok(Self::File(PathBuf::from(url)));
        }

        Self::from_absolute(parsed)
    }

    fn from_absolute(url: reqwest::Url) -> Result<Self, LoadError> {
        match url.scheme() {
            "http" | "https" => Ok(Self::Http(url)),
            "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|_| LoadError::InvalidFormat(format!("无效的文件地址：{}", url))),
            other => Err(LoadError::InvalidFormat(format!(
                "不支持的地址协议：{}（可选：http / https / file / data）",
                other
            ))),
        }
    }

    /// 来源提示（用于日志与诊断）。
    pub fn hint(&self) -> &'static str {
        match self {
            Self::DataUri(_) => "data-uri",
            Self::File(_) => "file",
            Self::Http(_) => "http",
        }
    }
}

/// 判断地址是否为 `data:` URI（大小写不敏感，按字节比较前缀）。
pub(crate) fn is_data_uri(url: &str) -> bool {
    url.as_bytes()
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(b"data:"))
}

/// 判断地址是否以 `scheme:` 开头。
fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once(':') else {
        return false;
    };

    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// 加载阶段输出：原始字节与来源标识。
#[derive(Debug, Clone)]
pub struct RawImageData {
    /// 原始图片字节。
    pub bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub source_hint: &'static str,
    /// 是否同源（或已通过 CORS 放行）。为 `false` 时绘制会污染表面。
    pub origin_clean: bool,
}

/// 解码阶段输出：离屏图片的自然尺寸与 RGBA 像素。
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// RGBA 字节数组（`width * height * 4`）。
    pub pixels: Vec<u8>,
    pub origin_clean: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_is_detected_case_insensitively() {
        let source = ImageSource::resolve("DATA:image/png;base64,AAAA", None).expect("resolve");
        assert_eq!(source.hint(), "data-uri");
    }

    #[test]
    fn non_ascii_paths_resolve_without_slicing_inside_a_char() {
        assert_eq!(
            ImageSource::resolve("/été.png", None).expect("resolve"),
            ImageSource::File(PathBuf::from("/été.png"))
        );
        assert_eq!(
            ImageSource::resolve("图片.png", None).expect("resolve"),
            ImageSource::File(PathBuf::from("图片.png"))
        );
        assert!(!is_data_uri("数据:x"));
        assert!(!is_data_uri("dat"));
    }

    #[test]
    fn relative_reference_uses_base_url() {
        let source = ImageSource::resolve("img/a.png", Some("https://cdn.example/assets/"))
            .expect("resolve");

        match source {
            ImageSource::Http(url) => assert_eq!(url.as_str(), "https://cdn.example/assets/img/a.png"),
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn relative_reference_without_base_is_a_path() {
        assert_eq!(
            ImageSource::resolve("img/a.png", None).expect("resolve"),
            ImageSource::File(PathBuf::from("img/a.png"))
        );
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(matches!(
            ImageSource::resolve("ftp://example.com/a.png", None),
            Err(LoadError::InvalidFormat(_))
        ));
    }
}
