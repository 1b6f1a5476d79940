// 图片压缩
//
// 超出最大尺寸时等比缩小（向下取整，不放大），PNG 保持 PNG，其余格式统一转 JPEG。
// 解码或编码失败时原样返回原文件，压缩失败不影响上传。

use crate::config::CompressionSettings;
use crate::uploader::ImageFile;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use std::io::Cursor;
use tracing::{debug, warn};

const PNG_MIME: &str = "image/png";
const JPEG_MIME: &str = "image/jpeg";

/// 计算缩放后的尺寸
///
/// 两个维度都在限制内时原样返回
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    if width == 0 || height == 0 {
        return (width, height);
    }

    // 整数运算比较 max_w/w 与 max_h/h，避免浮点误差导致少 1px
    let (w, h) = (u64::from(width), u64::from(height));
    let (max_w, max_h) = (u64::from(max_width), u64::from(max_height));
    let (new_width, new_height) = if max_w * h <= max_h * w {
        (max_w, h * max_w / w)
    } else {
        (w * max_h / h, max_h)
    };
    (new_width.max(1) as u32, new_height.max(1) as u32)
}

/// 压缩图片
///
/// 未启用压缩时直接返回原文件
pub fn compress_image(file: &ImageFile, settings: &CompressionSettings) -> ImageFile {
    if !settings.enabled {
        return file.clone();
    }

    match try_compress(file, settings) {
        Ok(compressed) => {
            debug!(
                "压缩完成: {} {} -> {} bytes",
                file.name,
                file.data.len(),
                compressed.data.len()
            );
            compressed
        }
        Err(e) => {
            warn!("图片压缩失败，使用原文件: {}: {}", file.name, e);
            file.clone()
        }
    }
}

fn try_compress(file: &ImageFile, settings: &CompressionSettings) -> image::ImageResult<ImageFile> {
    let decoded = image::load_from_memory(&file.data)?;
    let (width, height) = decoded.dimensions();
    let (target_width, target_height) =
        fit_within(width, height, settings.max_width, settings.max_height);

    let resized = if (target_width, target_height) != (width, height) {
        debug!(
            "缩放 {}: {}x{} -> {}x{}",
            file.name, width, height, target_width, target_height
        );
        decoded.resize_exact(target_width, target_height, FilterType::Lanczos3)
    } else {
        decoded
    };

    let mut data = Vec::new();
    let mime = if file.mime == PNG_MIME {
        resized.write_to(&mut Cursor::new(&mut data), ImageOutputFormat::Png)?;
        PNG_MIME
    } else {
        let quality = jpeg_quality(settings);
        // JPEG 不支持透明通道
        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
        rgb.write_to(&mut Cursor::new(&mut data), ImageOutputFormat::Jpeg(quality))?;
        JPEG_MIME
    };

    Ok(ImageFile::new(file.name.clone(), mime, data))
}

/// 编码器质量换算为 JPEG 编码参数 1..=100
fn jpeg_quality(settings: &CompressionSettings) -> u8 {
    let quality = (settings.encoder_quality() * 100.0).round() as u8;
    quality.clamp(1, 100)
}

/// 根据文件大小推荐压缩质量
pub fn optimal_quality(file_size: u64) -> u8 {
    const MB: u64 = 1024 * 1024;
    match file_size {
        s if s > 5 * MB => 60,
        s if s > 2 * MB => 70,
        s if s > MB => 80,
        _ => 90,
    }
}

/// 压缩率（百分比，四舍五入；变大时为负数）
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> i64 {
    if original_size == 0 {
        return 0;
    }
    ((1.0 - compressed_size as f64 / original_size as f64) * 100.0).round() as i64
}
