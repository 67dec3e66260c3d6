//! # 绘制表面
//!
//! ## 设计思路
//!
//! 与 `<canvas>` 2D 上下文对应的最小能力：绘制图片、读取像素、写回像素、导出 data URI。
//! 绘制过未经 CORS 放行的跨域图片后，表面被标记为“已污染”，
//! 之后读取像素与导出都会失败，且污染状态不可撤销。

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose};
use image::{ImageFormat, RgbaImage};

use crate::error::GrayscaleError;

use super::source::DecodedImage;
use super::transform::{BYTES_PER_PIXEL, PixelBuffer};

/// 空表面导出结果，与浏览器一致。
const EMPTY_DATA_URL: &str = "data:,";

/// 离屏 RGBA 绘制表面，初始为全透明。
pub struct DrawingSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    origin_clean: bool,
}

impl DrawingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            pixels: vec![0; len],
            origin_clean: true,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_origin_clean(&self) -> bool {
        self.origin_clean
    }

    /// 在 (0,0) 处按原尺寸绘制图片，超出表面的部分被裁剪。
    ///
    /// 表面初始全透明，绘制等价于逐行拷贝。
    pub fn draw_image(&mut self, image: &DecodedImage) {
        self.blit(image.width, image.height, &image.pixels);
        self.origin_clean &= image.origin_clean;
    }

    /// 读取整个表面的像素。
    pub fn get_image_data(&self) -> Result<PixelBuffer, GrayscaleError> {
        self.ensure_origin_clean()?;

        if self.width == 0 || self.height == 0 {
            return Err(GrayscaleError::Extraction(format!(
                "绘制表面尺寸为零：{}x{}",
                self.width, self.height
            )));
        }

        PixelBuffer::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| GrayscaleError::Extraction("绘制表面像素长度异常".to_string()))
    }

    /// 在 (0,0) 处写回像素，不影响污染状态。
    pub fn put_image_data(&mut self, data: &PixelBuffer) {
        self.blit(data.width, data.height, &data.data);
    }

    /// 以 PNG 编码导出为 data URI。
    pub fn to_data_url(&self) -> Result<String, GrayscaleError> {
        self.ensure_origin_clean()?;

        if self.width == 0 || self.height == 0 {
            return Ok(EMPTY_DATA_URL.to_string());
        }

        let image = RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| GrayscaleError::Encode("绘制表面像素长度异常".to_string()))?;

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| GrayscaleError::Encode(format!("PNG 编码失败：{}", e)))?;

        Ok(format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&png)
        ))
    }

    fn ensure_origin_clean(&self) -> Result<(), GrayscaleError> {
        if self.origin_clean {
            Ok(())
        } else {
            Err(GrayscaleError::Extraction(
                "绘制表面已被跨域图片污染，无法读取像素".to_string(),
            ))
        }
    }

    fn blit(&mut self, src_width: u32, src_height: u32, src: &[u8]) {
        let copy_width = src_width.min(self.width) as usize;
        let copy_height = src_height.min(self.height) as usize;
        let row_bytes = copy_width * BYTES_PER_PIXEL;

        for y in 0..copy_height {
            let src_start = y * src_width as usize * BYTES_PER_PIXEL;
            let dst_start = y * self.width as usize * BYTES_PER_PIXEL;
            let (Some(from), Some(to)) = (
                src.get(src_start..src_start + row_bytes),
                self.pixels.get_mut(dst_start..dst_start + row_bytes),
            ) else {
                log::warn!("⚠️ 绘制源像素长度不足，停止于第 {} 行", y);
                return;
            };
            to.copy_from_slice(from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(width: u32, height: u32, origin_clean: bool) -> DecodedImage {
        let pixels = (0..width * height)
            .flat_map(|i| [i as u8, 10, 20, 255])
            .collect();
        DecodedImage {
            width,
            height,
            pixels,
            origin_clean,
        }
    }

    #[test]
    fn draw_then_read_returns_the_image() {
        let image = decoded(3, 2, true);
        let mut surface = DrawingSurface::new(3, 2);
        surface.draw_image(&image);

        let data = surface.get_image_data().expect("clean surface");
        assert_eq!(data.data, image.pixels);
    }

    #[test]
    fn drawing_larger_image_is_clipped() {
        let mut surface = DrawingSurface::new(1, 1);
        surface.draw_image(&decoded(3, 2, true));

        let data = surface.get_image_data().expect("clean surface");
        assert_eq!(data.data, vec![0, 10, 20, 255]);
    }

    #[test]
    fn tainted_surface_refuses_reads_and_exports() {
        let mut surface = DrawingSurface::new(2, 2);
        surface.draw_image(&decoded(2, 2, false));

        assert!(!surface.is_origin_clean());
        assert!(matches!(surface.get_image_data(), Err(GrayscaleError::Extraction(_))));
        assert!(matches!(surface.to_data_url(), Err(GrayscaleError::Extraction(_))));

        // 再绘制同源图片也无法恢复
        surface.draw_image(&decoded(2, 2, true));
        assert!(!surface.is_origin_clean());
    }

    #[test]
    fn zero_area_surface_cannot_be_read() {
        let surface = DrawingSurface::new(0, 5);
        assert!(matches!(surface.get_image_data(), Err(GrayscaleError::Extraction(_))));
        assert_eq!(surface.to_data_url().expect("empty export"), "data:,");
    }

    #[test]
    fn data_url_round_trips_pixels() {
        let mut surface = DrawingSurface::new(2, 1);
        let buffer = PixelBuffer::from_raw(2, 1, vec![9, 9, 9, 255, 1, 2, 3, 128]).expect("2x1");
        surface.put_image_data(&buffer);

        let url = surface.to_data_url().expect("export");
        let payload = url
            .strip_prefix("data:image/png;base64,")
            .expect("png data url");
        let png = general_purpose::STANDARD.decode(payload).expect("base64");
        let reloaded = image::load_from_memory(&png).expect("png").to_rgba8();

        assert_eq!(reloaded.into_raw(), buffer.data);
    }
}
