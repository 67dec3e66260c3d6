//! # 离屏图片
//!
//! ## 设计思路
//!
//! 与 DOM 的 `new Image()` 对应：先绑定 `load` / `error` 处理器，再设置 `src` 触发加载。
//! 一张离屏图片只加载一次，且只会派发 `load` 与 `error` 二者之一；
//! 派发后监听表被清空，处理器不会再次触发。
//!
//! ## 实现思路
//!
//! - 加载结果（字节获取 + 解码）保存在内部状态中，供绘制阶段取走。
//! - 状态锁不跨越 `await` 持有。

use std::sync::Mutex;

use crate::events::{EventTarget, Listeners};

use super::loader::{ImageFetcher, redact_url_for_log};
use super::pipeline::{self, DecodeLimits};
use super::source::DecodedImage;
use super::{CrossOriginMode, GrayscaleConfig, LoadError};

pub const LOAD_EVENT: &str = "load";
pub const ERROR_EVENT: &str = "error";

/// 离屏图片事件负载。
#[derive(Debug, Clone)]
pub enum ImageEvent {
    Load,
    Error(LoadError),
}

#[derive(Debug)]
enum ImageState {
    Idle,
    Loading,
    Complete(DecodedImage),
    Broken,
    /// 像素已被绘制阶段取走
    Consumed,
}

/// 离屏图片。
pub struct OffscreenImage {
    listeners: Listeners<ImageEvent>,
    state: Mutex<ImageState>,
    cross_origin: CrossOriginMode,
    limits: DecodeLimits,
}

impl OffscreenImage {
    pub fn new(config: &GrayscaleConfig) -> Self {
        Self {
            listeners: Listeners::new(),
            state: Mutex::new(ImageState::Idle),
            cross_origin: config.cross_origin,
            limits: DecodeLimits {
                max_pixels: config.max_decoded_pixels,
                max_bytes: config.max_decoded_bytes,
            },
        }
    }

    /// 设置图片地址并完成加载，结束时派发 `load` 或 `error`。
    ///
    /// 对同一张图片重复调用会被忽略。
    pub async fn set_src<F: ImageFetcher>(&self, fetcher: &F, url: &str) {
        {
            let Ok(mut state) = self.state.lock() else {
                self.settle(ERROR_EVENT, &ImageEvent::Error(LoadError::Decode(
                    "离屏图片状态锁已中毒".to_string(),
                )));
                return;
            };
            if !matches!(*state, ImageState::Idle) {
                log::warn!("⚠️ 离屏图片已设置过 src，忽略：{}", redact_url_for_log(url));
                return;
            }
            *state = ImageState::Loading;
        }

        let outcome = match fetcher.fetch(url, self.cross_origin).await {
            Ok(raw) => pipeline::decode_rgba(raw, self.limits),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(decoded) => {
                self.replace_state(ImageState::Complete(decoded));
                self.settle(LOAD_EVENT, &ImageEvent::Load);
            }
            Err(err) => {
                log::warn!("⚠️ 离屏图片加载失败 - {}：{}", redact_url_for_log(url), err);
                self.replace_state(ImageState::Broken);
                self.settle(ERROR_EVENT, &ImageEvent::Error(err));
            }
        }
    }

    /// 自然尺寸；未加载完成时为 `None`。
    pub fn natural_size(&self) -> Option<(u32, u32)> {
        match &*self.state.lock().ok()? {
            ImageState::Complete(decoded) => Some((decoded.width, decoded.height)),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.natural_size().is_some()
    }

    /// 取走解码结果，离屏图片随后不再持有像素。
    pub fn take_decoded(&self) -> Option<DecodedImage> {
        let mut state = self.state.lock().ok()?;
        match std::mem::replace(&mut *state, ImageState::Consumed) {
            ImageState::Complete(decoded) => Some(decoded),
            other => {
                *state = other;
                None
            }
        }
    }

    fn replace_state(&self, next: ImageState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    fn settle(&self, event: &str, payload: &ImageEvent) {
        self.listeners.dispatch(event, payload);
        self.listeners.clear();
    }
}

impl EventTarget for OffscreenImage {
    type Payload = ImageEvent;

    fn listeners(&self) -> &Listeners<ImageEvent> {
        &self.listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::source::RawImageData;
    use crate::events::{Handler, bind};
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticFetcher(Result<Vec<u8>, LoadError>);

    impl ImageFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str, _mode: CrossOriginMode) -> Result<RawImageData, LoadError> {
            self.0.clone().map(|bytes| RawImageData {
                bytes,
                source_hint: "static",
                origin_clean: true,
            })
        }
    }

    fn png_2x1() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 1, image::Rgba([1, 2, 3, 4]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png failed");
        bytes
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Handler<ImageEvent> {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &ImageEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn load_fires_once_and_error_never() {
        let image = OffscreenImage::new(&GrayscaleConfig::default());
        let loads = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        bind(&image, LOAD_EVENT, counting(&loads));
        bind(&image, ERROR_EVENT, counting(&errors));

        let fetcher = StaticFetcher(Ok(png_2x1()));
        image.set_src(&fetcher, "a.png").await;
        image.set_src(&fetcher, "a.png").await;

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
        assert_eq!(image.natural_size(), Some((2, 1)));
        assert_eq!(image.listeners().count(LOAD_EVENT), 0);

        let decoded = image.take_decoded().expect("decoded pixels");
        assert_eq!(decoded.pixels, vec![1, 2, 3, 4, 1, 2, 3, 4]);
        assert!(image.take_decoded().is_none());
    }

    #[tokio::test]
    async fn decode_failure_fires_error() {
        let image = OffscreenImage::new(&GrayscaleConfig::default());
        let loads = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        bind(&image, LOAD_EVENT, counting(&loads));
        bind(&image, ERROR_EVENT, counting(&errors));

        let fetcher = StaticFetcher(Ok(b"GIF89a-truncated".to_vec()));
        image.set_src(&fetcher, "broken.gif").await;

        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!image.is_complete());
    }

    #[tokio::test]
    async fn fetch_failure_fires_error_with_payload() {
        let image = OffscreenImage::new(&GrayscaleConfig::default());
        let seen = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        bind(
            &image,
            ERROR_EVENT,
            Arc::new(move |event: &ImageEvent| {
                if let ImageEvent::Error(err) = event {
                    if let Ok(mut slot) = slot.lock() {
                        *slot = Some(err.clone());
                    }
                }
            }),
        );

        let fetcher = StaticFetcher(Err(LoadError::Network("HTTP 404: 未找到".to_string())));
        image.set_src(&fetcher, "missing.png").await;

        let seen = seen.lock().expect("lock").clone();
        assert_eq!(seen, Some(LoadError::Network("HTTP 404: 未找到".to_string())));
    }
}
