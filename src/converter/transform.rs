//! # 灰度变换
//!
//! 亮度按 `0.30·R + 0.59·G + 0.11·B` 计算并截断取整。
//! 使用整数运算 `(30R + 59G + 11B) / 100`，保证 R = G = B 的像素是不动点。

/// RGBA 像素缓冲，行优先，下标为 `(y * width + x) * 4 + channel`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// 校验长度后构建缓冲。
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(BYTES_PER_PIXEL)?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// 像素首字节下标。
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    /// 读取单个像素；坐标越界时返回 `None`。
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.index(x, y);
        let bytes = self.data.get(i..i + BYTES_PER_PIXEL)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

pub const BYTES_PER_PIXEL: usize = 4;

/// 单个像素的亮度。
///
/// # 示例
/// ```rust
/// use canvas_grayscale::converter::luminance;
///
/// assert_eq!(luminance(200, 100, 50), 124);
/// assert_eq!(luminance(77, 77, 77), 77);
/// ```
pub fn luminance(red: u8, green: u8, blue: u8) -> u8 {
    let weighted = 30 * red as u32 + 59 * green as u32 + 11 * blue as u32;
    (weighted / 100) as u8
}

/// 原地把缓冲转为灰度，alpha 通道不变。
pub fn grayscale_in_place(buffer: &mut PixelBuffer) {
    let width = buffer.width;
    let height = buffer.height;

    for y in 0..height {
        for x in 0..width {
            let start = buffer.index(x, y);

            let red = buffer.data[start];
            let green = buffer.data[start + 1];
            let blue = buffer.data[start + 2];

            let gray = luminance(red, green, blue);

            buffer.data[start] = gray;
            buffer.data[start + 1] = gray;
            buffer.data[start + 2] = gray;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn buffer_strategy() -> impl Strategy<Value = PixelBuffer> {
        (1u32..8, 1u32..8).prop_flat_map(|(w, h)| {
            prop::collection::vec(any::<u8>(), (w * h * 4) as usize)
                .prop_map(move |data| PixelBuffer::from_raw(w, h, data).expect("length matches"))
        })
    }

    #[test]
    fn reference_pixel_truncates() {
        let mut buffer = PixelBuffer::from_raw(1, 1, vec![200, 100, 50, 77]).expect("1x1");
        grayscale_in_place(&mut buffer);

        assert_eq!(buffer.data, vec![124, 124, 124, 77]);
    }

    #[test]
    fn extremes_stay_in_range() {
        assert_eq!(luminance(255, 255, 255), 255);
        assert_eq!(luminance(0, 0, 0), 0);
        assert_eq!(luminance(255, 0, 0), 76);
        assert_eq!(luminance(0, 255, 0), 150);
        assert_eq!(luminance(0, 0, 255), 28);
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 15]).is_none());
        assert!(PixelBuffer::from_raw(0, 0, Vec::new()).is_some());
    }

    #[test]
    fn row_major_indexing() {
        let data: Vec<u8> = (0..2 * 3 * 4).map(|v| v as u8).collect();
        let buffer = PixelBuffer::from_raw(2, 3, data).expect("2x3");

        assert_eq!(buffer.index(1, 2), (2 * 2 + 1) * 4);
        assert_eq!(buffer.pixel(1, 2), Some([20, 21, 22, 23]));
    }

    #[test]
    fn out_of_range_pixel_is_none() {
        let buffer = PixelBuffer::from_raw(2, 3, vec![0; 2 * 3 * 4]).expect("2x3");

        assert_eq!(buffer.pixel(2, 0), None);
        assert_eq!(buffer.pixel(0, 3), None);
        assert_eq!(buffer.pixel(u32::MAX, u32::MAX), None);
    }

    proptest! {
        #[test]
        fn gray_pixels_are_fixed_points(v in any::<u8>()) {
            prop_assert_eq!(luminance(v, v, v), v);
        }

        #[test]
        fn transform_is_idempotent(original in buffer_strategy()) {
            let mut once = original.clone();
            grayscale_in_place(&mut once);

            let mut twice = once.clone();
            grayscale_in_place(&mut twice);

            prop_assert_eq!(once, twice);
        }

        #[test]
        fn every_pixel_depends_only_on_itself(original in buffer_strategy()) {
            let mut converted = original.clone();
            grayscale_in_place(&mut converted);

            for y in 0..original.height {
                for x in 0..original.width {
                    let [r, g, b, a] = original.pixel(x, y).expect("in range");
                    let gray = luminance(r, g, b);
                    prop_assert_eq!(converted.pixel(x, y), Some([gray, gray, gray, a]));
                }
            }
        }
    }
}
