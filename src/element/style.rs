//! # 计算样式模块
//!
//! ## 设计思路
//!
//! 行内样式缺失时，`background-image` 可能来自样式表。
//! `ComputedStyleResolver` 抽象“元素 → 最终样式映射”这一能力，
//! `StyleSheet` 提供一个足够转换器使用的最小级联实现。
//!
//! ## 实现思路
//!
//! - 选择器只支持 `*`、`tag`、`.class`、`#id`，按特异性与声明顺序级联。
//! - 行内 `background-image` 最后叠加，优先级最高。
//! - `background_image_url` 负责剥离 `url(...)` 包裹与引号。

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Element, parse_style_declarations, split_top_level};

/// 匹配整段 `url(...)` 包裹，取出其中内容。
static URL_WRAPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^url\((.*)\)$").expect("url() pattern is valid"));

/// 计算样式解析能力。
pub trait ComputedStyleResolver {
    /// 返回元素最终生效的 CSS 属性映射（属性名小写）。
    fn resolve<E: Element + ?Sized>(&self, element: &E) -> HashMap<String, String>;
}

/// 从 `background-image` 值中提取图片地址。
///
/// 空白值与 `none` 返回 `None`；`url(...)` 包裹及其内部成对引号会被剥离，
/// 其余值原样返回。
///
/// # 示例
/// ```rust
/// use canvas_grayscale::element::background_image_url;
///
/// assert_eq!(background_image_url("url(\"a.png\")").as_deref(), Some("a.png"));
/// assert_eq!(background_image_url("none"), None);
/// ```
pub fn background_image_url(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return None;
    }

    let Some(captures) = URL_WRAPPER.captures(value) else {
        return Some(value.to_string());
    };

    let inner = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
    let inner = strip_matching_quotes(inner).trim();
    if inner.is_empty() {
        return None;
    }

    Some(inner.to_string())
}

fn strip_matching_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Universal,
    Tag(String),
    Class(String),
    Id(String),
}

impl Selector {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "*" {
            return Some(Self::Universal);
        }
        if let Some(id) = text.strip_prefix('#') {
            return (!id.is_empty()).then(|| Self::Id(id.to_string()));
        }
        if let Some(class) = text.strip_prefix('.') {
            return (!class.is_empty()).then(|| Self::Class(class.to_string()));
        }
        if !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Some(Self::Tag(text.to_ascii_lowercase()));
        }
        None
    }

    fn specificity(&self) -> u8 {
        match self {
            Self::Universal => 0,
            Self::Tag(_) => 1,
            Self::Class(_) => 2,
            Self::Id(_) => 3,
        }
    }

    fn matches<E: Element + ?Sized>(&self, element: &E) -> bool {
        match self {
            Self::Universal => true,
            Self::Tag(tag) => element.tag_name().eq_ignore_ascii_case(tag),
            Self::Class(class) => element
                .attribute("class")
                .map(|classes| classes.split_whitespace().any(|c| c == class))
                .unwrap_or(false),
            Self::Id(id) => element.attribute("id") == Some(id.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    declarations: Vec<(String, String)>,
}

/// 最小样式表。
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    rules: Vec<Rule>,
}

impl StyleSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条规则；无法识别的选择器会被忽略。
    pub fn add_rule(&mut self, selector: &str, declarations: &str) -> &mut Self {
        match Selector::parse(selector) {
            Some(selector) => self.rules.push(Rule {
                selector,
                declarations: parse_style_declarations(declarations).into_iter().collect(),
            }),
            None => log::warn!("⚠️ 忽略不支持的选择器：{}", selector),
        }
        self
    }

    /// 解析 `selector, selector { prop: value; }` 形式的样式文本。
    pub fn parse(css: &str) -> Self {
        let mut sheet = Self::new();
        let mut rest = css;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|idx| open + idx) else {
                log::warn!("⚠️ 样式表缺少闭合大括号，剩余内容已忽略");
                break;
            };

            let selectors = &rest[..open];
            let body = &rest[open + 1..close];
            for selector in split_top_level(selectors, ',') {
                sheet.add_rule(selector, body);
            }

            rest = &rest[close + 1..];
        }

        sheet
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ComputedStyleResolver for StyleSheet {
    fn resolve<E: Element + ?Sized>(&self, element: &E) -> HashMap<String, String> {
        let mut matched: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|rule| rule.selector.matches(element))
            .collect();
        // 稳定排序：同特异性保持声明顺序
        matched.sort_by_key(|rule| rule.selector.specificity());

        let mut computed = HashMap::new();
        for rule in matched {
            for (property, value) in &rule.declarations {
                computed.insert(property.clone(), value.clone());
            }
        }

        if let Some(inline) = element.inline_style(super::BACKGROUND_IMAGE) {
            if !inline.trim().is_empty() {
                computed.insert(super::BACKGROUND_IMAGE.to_string(), inline.to_string());
            }
        }

        computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::HtmlElement;

    #[test]
    fn url_wrapper_is_stripped_with_and_without_quotes() {
        assert_eq!(background_image_url("url(a.png)").as_deref(), Some("a.png"));
        assert_eq!(background_image_url("url(\"a.png\")").as_deref(), Some("a.png"));
        assert_eq!(background_image_url("url('a.png')").as_deref(), Some("a.png"));
        assert_eq!(background_image_url("URL( a.png )").as_deref(), Some("a.png"));
    }

    #[test]
    fn raw_value_is_used_when_there_is_no_wrapper() {
        assert_eq!(
            background_image_url("https://example.com/a.png").as_deref(),
            Some("https://example.com/a.png")
        );
    }

    #[test]
    fn blank_and_none_are_missing() {
        assert_eq!(background_image_url(""), None);
        assert_eq!(background_image_url("   "), None);
        assert_eq!(background_image_url("none"), None);
        assert_eq!(background_image_url("url(\"\")"), None);
    }

    #[test]
    fn cascade_prefers_specificity_then_order() {
        let sheet = StyleSheet::parse(
            "#hero { background-image: url(id.png) }
             div { background-image: url(tag.png) }
             .banner { background-image: url(class.png) }
             div { background-image: url(tag-late.png) }",
        );
        assert_eq!(sheet.len(), 4);

        let plain = HtmlElement::new("div");
        assert_eq!(
            sheet.resolve(&plain).get("background-image").map(String::as_str),
            Some("url(tag-late.png)")
        );

        let banner = HtmlElement::new("div").with_attribute("class", "wide banner");
        assert_eq!(
            sheet.resolve(&banner).get("background-image").map(String::as_str),
            Some("url(class.png)")
        );

        let hero = banner.with_attribute("id", "hero");
        assert_eq!(
            sheet.resolve(&hero).get("background-image").map(String::as_str),
            Some("url(id.png)")
        );
    }

    #[test]
    fn inline_style_wins_over_rules() {
        let sheet = StyleSheet::parse("* { background-image: url(all.png); }");
        let el = HtmlElement::new("span").with_style("background-image", "url(inline.png)");

        assert_eq!(
            sheet.resolve(&el).get("background-image").map(String::as_str),
            Some("url(inline.png)")
        );
    }

    #[test]
    fn unsupported_selectors_are_skipped() {
        let sheet = StyleSheet::parse("div > p { color: red } section, .x { color: blue }");
        assert_eq!(sheet.len(), 2);
    }
}
