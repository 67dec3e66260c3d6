//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `GrayscaleConverter` 只负责流程编排，不直接依赖具体 DOM。
//! 处理链路固定为：
//! 1. 分类元素并解析图片地址
//! 2. 离屏图片加载（唯一的 `await` 点）
//! 3. 绘制到同尺寸表面并读取像素
//! 4. 逐像素灰度变换
//! 5. 写回表面、导出 data URI、应用到元素
//!
//! ## 实现思路
//!
//! - `load` / `error` 处理器经由 oneshot 通道汇合成一个 `Result`，
//!   二者互斥且只会送达一次。
//! - 任何阶段失败都直接返回，元素保持原样（没有部分写回）。
//! - 记录 `load/transform/encode/total` 阶段耗时，便于性能诊断。
//! - 加载永不结束时转换也永不结束；转换器本身不提供取消与超时。

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::oneshot;

use crate::element::{
    BACKGROUND_IMAGE, ComputedStyleResolver, Element, ElementKind, StyleSheet, background_image_url,
};
use crate::error::GrayscaleError;
use crate::events;

use super::loader::{ImageFetcher, SourceLoader, redact_url_for_log};
use super::offscreen::{ERROR_EVENT, ImageEvent, LOAD_EVENT, OffscreenImage};
use super::source::{DecodedImage, ResolvedTarget};
use super::surface::DrawingSurface;
use super::transform::grayscale_in_place;
use super::{GrayscaleConfig, LoadError};

type Completion = Arc<Mutex<Option<oneshot::Sender<Result<(), LoadError>>>>>;

/// 灰度转换器。
///
/// 持有配置、图片获取器与计算样式解析器。
pub struct GrayscaleConverter<F = SourceLoader, S = StyleSheet> {
    config: GrayscaleConfig,
    fetcher: F,
    styles: S,
}

impl GrayscaleConverter {
    /// 使用默认加载器与空样式表创建转换器。
    ///
    /// # 示例
    /// ```rust
    /// use canvas_grayscale::{GrayscaleConfig, GrayscaleConverter};
    ///
    /// let converter = GrayscaleConverter::new(GrayscaleConfig::default())?;
    /// # let _ = converter;
    /// # Ok::<(), canvas_grayscale::GrayscaleError>(())
    /// ```
    pub fn new(config: GrayscaleConfig) -> Result<Self, GrayscaleError> {
        config.validate()?;
        let fetcher = SourceLoader::new(config.clone())?;
        Ok(Self {
            config,
            fetcher,
            styles: StyleSheet::new(),
        })
    }

    /// 替换默认样式表。
    pub fn with_stylesheet(mut self, styles: StyleSheet) -> Self {
        self.styles = styles;
        self
    }
}

impl<F, S> GrayscaleConverter<F, S>
where
    F: ImageFetcher,
    S: ComputedStyleResolver,
{
    /// 注入自定义图片获取器与样式解析器。
    pub fn with_parts(config: GrayscaleConfig, fetcher: F, styles: S) -> Result<Self, GrayscaleError> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            styles,
        })
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// 分类元素并取得有效图片地址。
    ///
    /// `<img>` 读取 `src`；其它元素先读行内 `background-image`，为空时回退到计算样式。
    pub fn resolve_target<E: Element + ?Sized>(
        &self,
        element: &E,
    ) -> Result<ResolvedTarget, GrayscaleError> {
        let kind = ElementKind::of(element);

        let url = match kind {
            ElementKind::Image => element
                .src()
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .map(str::to_string)
                .ok_or(GrayscaleError::MissingSource)?,
            ElementKind::Background => element
                .inline_style(BACKGROUND_IMAGE)
                .and_then(background_image_url)
                .or_else(|| {
                    log::debug!("🎨 行内 background-image 为空，回退到计算样式");
                    self.styles
                        .resolve(element)
                        .get(BACKGROUND_IMAGE)
                        .and_then(|value| background_image_url(value))
                })
                .ok_or_else(|| GrayscaleError::MissingBackground {
                    tag: element.tag_name().to_ascii_lowercase(),
                })?,
        };

        Ok(ResolvedTarget { kind, url })
    }

    /// 处理主入口：把元素的图片替换为灰度版本。
    ///
    /// 失败时元素保持不变。
    pub async fn convert<E: Element + ?Sized>(&self, element: &mut E) -> Result<(), GrayscaleError> {
        let target = match self.resolve_target(element) {
            Ok(target) => target,
            Err(err) => {
                log::warn!("⚠️ 无法确定 <{}> 的图片地址：{}", element.tag_name(), err);
                return Err(err);
            }
        };

        log::info!(
            "🖼️ 开始灰度转换 - <{}> {:?}: {}",
            element.tag_name(),
            target.kind,
            redact_url_for_log(&target.url)
        );

        let total_start = Instant::now();

        let load_start = Instant::now();
        let decoded = self.load_offscreen(&target.url).await?;
        let load_elapsed = load_start.elapsed();

        let transform_start = Instant::now();
        let mut surface = DrawingSurface::new(decoded.width, decoded.height);
        surface.draw_image(&decoded);
        drop(decoded);

        let mut pixels = surface.get_image_data()?;
        grayscale_in_place(&mut pixels);
        surface.put_image_data(&pixels);
        let transform_elapsed = transform_start.elapsed();

        let encode_start = Instant::now();
        let uri = surface.to_data_url()?;
        let encode_elapsed = encode_start.elapsed();

        Self::apply_result(element, target.kind, uri);

        log::info!(
            "✅ 灰度转换完成 - {}x{} load={}ms transform={}ms encode={}ms total={}ms",
            surface.width(),
            surface.height(),
            load_elapsed.as_millis(),
            transform_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(())
    }

    /// 回调形式的入口：回调恰好被调用一次，成功时参数为 `None`。
    pub async fn convert_with_callback<E, C>(&self, element: &mut E, callback: C)
    where
        E: Element + ?Sized,
        C: FnOnce(Option<GrayscaleError>),
    {
        callback(self.convert(element).await.err());
    }

    /// 未提供回调时的形式：失败以 panic 抛出。
    pub async fn convert_or_raise<E: Element + ?Sized>(&self, element: &mut E) {
        self.convert_with_callback(element, raise_on_error).await;
    }

    /// 创建离屏图片、绑定一次性处理器并等待加载结果。
    async fn load_offscreen(&self, url: &str) -> Result<DecodedImage, GrayscaleError> {
        let image = OffscreenImage::new(&self.config);
        let (tx, rx) = oneshot::channel();
        let completion: Completion = Arc::new(Mutex::new(Some(tx)));

        let on_load = Arc::clone(&completion);
        events::bind(
            &image,
            LOAD_EVENT,
            Arc::new(move |_: &ImageEvent| complete(&on_load, Ok(()))),
        );

        let on_error = Arc::clone(&completion);
        events::bind(
            &image,
            ERROR_EVENT,
            Arc::new(move |event: &ImageEvent| {
                let outcome = match event {
                    ImageEvent::Error(err) => Err(err.clone()),
                    ImageEvent::Load => Ok(()),
                };
                complete(&on_error, outcome);
            }),
        );

        image.set_src(&self.fetcher, url).await;

        rx.await
            .map_err(|_| LoadError::Network("离屏图片未产生加载结果".to_string()))??;

        image
            .take_decoded()
            .ok_or_else(|| LoadError::Decode("离屏图片缺少像素数据".to_string()).into())
    }

    fn apply_result<E: Element + ?Sized>(element: &mut E, kind: ElementKind, uri: String) {
        match kind {
            ElementKind::Image => element.set_src(uri),
            ElementKind::Background => {
                element.set_inline_style(BACKGROUND_IMAGE, format!("url({})", uri))
            }
        }
    }
}

/// 把结果送入通道；只有第一次调用生效。
fn complete(completion: &Completion, outcome: Result<(), LoadError>) {
    let sender = match completion.lock() {
        Ok(mut slot) => slot.take(),
        Err(_) => None,
    };

    if let Some(tx) = sender {
        let _ = tx.send(outcome);
    }
}

/// 默认回调：有错误时以 panic 抛出。
///
/// 需要静默失败的调用方应传入显式的空回调。
pub fn raise_on_error(error: Option<GrayscaleError>) {
    if let Some(err) = error {
        panic!("灰度转换失败：{}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::CrossOriginMode;
    use crate::converter::source::RawImageData;
    use crate::element::HtmlElement;

    struct NeverCalled;

    impl ImageFetcher for NeverCalled {
        async fn fetch(&self, url: &str, _mode: CrossOriginMode) -> Result<RawImageData, LoadError> {
            panic!("fetch should not be called for {}", url);
        }
    }

    fn converter(styles: StyleSheet) -> GrayscaleConverter<NeverCalled, StyleSheet> {
        GrayscaleConverter::with_parts(GrayscaleConfig::default(), NeverCalled, styles)
            .expect("default config is valid")
    }

    #[test]
    fn image_source_is_trimmed() {
        let el = HtmlElement::new("img").with_attribute("src", "  a.png ");
        let target = converter(StyleSheet::new()).resolve_target(&el).expect("resolve");

        assert_eq!(target.kind, ElementKind::Image);
        assert_eq!(target.url, "a.png");
    }

    #[test]
    fn blank_source_is_missing() {
        let el = HtmlElement::new("img").with_attribute("src", "   ");
        assert!(matches!(
            converter(StyleSheet::new()).resolve_target(&el),
            Err(GrayscaleError::MissingSource)
        ));
    }

    #[test]
    fn inline_background_wins_over_computed() {
        let styles = StyleSheet::parse("div { background-image: url(sheet.png) }");
        let el = HtmlElement::new("div").with_style("background-image", "url('inline.png')");

        let target = converter(styles).resolve_target(&el).expect("resolve");
        assert_eq!(target.kind, ElementKind::Background);
        assert_eq!(target.url, "inline.png");
    }

    #[test]
    fn blank_inline_background_falls_back_to_computed() {
        let styles = StyleSheet::parse(".hero { background-image: url(\"sheet.png\") }");
        let el = HtmlElement::new("section")
            .with_attribute("class", "hero")
            .with_style("background-image", "  ");

        let target = converter(styles).resolve_target(&el).expect("resolve");
        assert_eq!(target.url, "sheet.png");
    }

    #[test]
    fn background_none_everywhere_is_missing() {
        let styles = StyleSheet::parse("div { background-image: none }");
        let el = HtmlElement::new("DIV");

        match converter(styles).resolve_target(&el) {
            Err(GrayscaleError::MissingBackground { tag }) => assert_eq!(tag, "div"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn completion_is_delivered_once() {
        let (tx, mut rx) = oneshot::channel();
        let completion: Completion = Arc::new(Mutex::new(Some(tx)));

        complete(&completion, Err(LoadError::Timeout("t".to_string())));
        complete(&completion, Ok(()));

        assert_eq!(rx.try_recv().expect("one value"), Err(LoadError::Timeout("t".to_string())));
    }

    #[test]
    fn raise_on_error_is_silent_on_success() {
        raise_on_error(None);
    }

    #[test]
    #[should_panic(expected = "灰度转换失败")]
    fn raise_on_error_panics_with_the_error() {
        raise_on_error(Some(GrayscaleError::MissingSource));
    }
}
