//! # 元素模型模块（element）
//!
//! ## 设计思路
//!
//! 灰度转换只关心目标元素的三件事：标签名、`src` 属性、`background-image` 样式。
//! 因此用 `Element` trait 描述这组最小能力，转换器对具体 DOM 实现无感知：
//!
//! - 真实 DOM 绑定只需实现 `Element` 即可接入
//! - `HtmlElement` 是内存版实现，供 CLI 与测试使用
//!
//! ## 实现思路
//!
//! - `ElementKind::of` 按标签名（忽略大小写）区分图片型与背景型元素。
//! - 行内样式以属性名 → 值的映射保存，可与 `style` 属性字符串互相转换。

pub mod style;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use style::{ComputedStyleResolver, StyleSheet, background_image_url};

/// 背景图片的 CSS 属性名。
pub const BACKGROUND_IMAGE: &str = "background-image";

/// 目标元素需要提供的最小能力集合。
pub trait Element {
    /// 标签名（大小写不敏感）。
    fn tag_name(&self) -> &str;

    /// 读取属性值。
    fn attribute(&self, name: &str) -> Option<&str>;

    /// 写入属性值，覆盖原值。
    fn set_attribute(&mut self, name: &str, value: String);

    /// 读取行内样式中的某个属性。
    fn inline_style(&self, property: &str) -> Option<&str>;

    /// 写入行内样式中的某个属性，覆盖原值。
    fn set_inline_style(&mut self, property: &str, value: String);

    fn src(&self) -> Option<&str> {
        self.attribute("src")
    }

    fn set_src(&mut self, uri: String) {
        self.set_attribute("src", uri);
    }
}

/// 元素类别：决定从哪里读取 URL、把结果写回哪里。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// `<img>`：读写 `src` 属性
    Image,
    /// 其它元素：读写 `background-image` 样式
    Background,
}

impl ElementKind {
    pub fn of<E: Element + ?Sized>(element: &E) -> Self {
        if element.tag_name().eq_ignore_ascii_case("img") {
            Self::Image
        } else {
            Self::Background
        }
    }
}

/// 内存版元素。
///
/// # 示例
/// ```rust
/// use canvas_grayscale::element::{Element, HtmlElement};
///
/// let div = HtmlElement::new("div").with_style("background-image", "url(a.png)");
/// assert_eq!(div.inline_style("background-image"), Some("url(a.png)"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlElement {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub style: BTreeMap<String, String>,
}

impl HtmlElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if name.eq_ignore_ascii_case("style") {
            self.style = parse_style_declarations(&value);
        } else {
            self.attributes.insert(name.to_ascii_lowercase(), value);
        }
        self
    }

    pub fn with_style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.style
            .insert(property.into().trim().to_ascii_lowercase(), value.into());
        self
    }
}

impl Element for HtmlElement {
    fn tag_name(&self) -> &str {
        &self.tag
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn set_attribute(&mut self, name: &str, value: String) {
        self.attributes.insert(name.to_ascii_lowercase(), value);
    }

    fn inline_style(&self, property: &str) -> Option<&str> {
        self.style
            .get(&property.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn set_inline_style(&mut self, property: &str, value: String) {
        self.style.insert(property.to_ascii_lowercase(), value);
    }
}

/// 解析 `prop: value; prop2: value2` 形式的声明块。
///
/// 值中括号内的 `;` 不视为分隔符（例如 `url(data:image/png;base64,...)`）。
pub fn parse_style_declarations(text: &str) -> BTreeMap<String, String> {
    let mut declarations = BTreeMap::new();

    for declaration in split_top_level(text, ';') {
        let Some((property, value)) = declaration.split_once(':') else {
            continue;
        };

        let property = property.trim().to_ascii_lowercase();
        let value = value.trim();
        if property.is_empty() || value.is_empty() {
            continue;
        }

        declarations.insert(property, value.to_string());
    }

    declarations
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth: usize = 0;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);

    parts
}
