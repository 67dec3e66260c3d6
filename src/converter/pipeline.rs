//! # 解码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → RGBA”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素上限与内存上限快速拒绝
//! 3. 完整解码
//! 4. 转换 RGBA，并校验字节长度一致性

use std::io::Cursor;

use image::GenericImageView;

use super::LoadError;
use super::source::{DecodedImage, RawImageData};

/// 解码资源上限。
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    pub max_pixels: u64,
    pub max_bytes: u64,
}

/// 将原始字节解码为 RGBA 像素。
pub fn decode_rgba(raw: RawImageData, limits: DecodeLimits) -> Result<DecodedImage, LoadError> {
    image::guess_format(&raw.bytes)
        .map_err(|e| LoadError::InvalidFormat(format!("不支持的图片格式：{}", e)))?;

    let (header_width, header_height) = inspect_dimensions_from_memory(&raw.bytes)?;
    validate_limits(limits, header_width, header_height)?;

    let decoded = image::load_from_memory(&raw.bytes)
        .map_err(|e| LoadError::Decode(format!("图片解码失败：{}", e)))?;

    let (width, height) = decoded.dimensions();
    validate_limits(limits, width, height)?;

    let pixels = decoded.to_rgba8().into_raw();

    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|count| count.checked_mul(4))
        .ok_or_else(|| LoadError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))?;

    if pixels.len() != expected_len {
        return Err(LoadError::Decode("解码后像素数据长度异常".to_string()));
    }

    log::debug!(
        "✅ 图片解码成功 - 来源: {} 尺寸: {}x{} 同源: {}",
        raw.source_hint,
        width,
        height,
        raw.origin_clean
    );

    Ok(DecodedImage {
        width,
        height,
        pixels,
        origin_clean: raw.origin_clean,
    })
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), LoadError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LoadError::InvalidFormat(format!("无法识别图片格式：{}", e)))?
        .into_dimensions()
        .map_err(|e| LoadError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
}

/// 校验像素数量与预计 RGBA 内存是否超过上限。
fn validate_limits(limits: DecodeLimits, width: u32, height: u32) -> Result<(), LoadError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| LoadError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > limits.max_pixels {
        return Err(LoadError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, limits.max_pixels
        )));
    }

    let estimated = pixels
        .checked_mul(4)
        .ok_or_else(|| LoadError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > limits.max_bytes {
        return Err(LoadError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            limits.max_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}
