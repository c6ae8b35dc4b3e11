//! Reads a rendered frame back from the GPU and writes it out as PNG.

use std::path::Path;

use crossbeam::channel;
use image::RgbaImage;
use tracing::{debug, info};

use crate::error::CaptureError;

const BYTES_PER_PIXEL: u32 = 4;

/// Rows of a texture-to-buffer copy must start on 256-byte boundaries.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Whether pixels of `format` arrive as BGRA and need their channels
/// swapped for PNG.
pub fn needs_swizzle(format: wgpu::TextureFormat) -> Result<bool, CaptureError> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => Ok(false),
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => Ok(true),
        other => Err(CaptureError::Format(other)),
    }
}

/// Strips row padding from a readback and converts BGRA to RGBA when asked.
pub fn unpad_rows(
    data: &[u8],
    width: u32,
    height: u32,
    padded_row: u32,
    swizzle: bool,
) -> Result<Vec<u8>, CaptureError> {
    let row = (width * BYTES_PER_PIXEL) as usize;
    let padded_row = padded_row as usize;
    if padded_row < row || data.len() < padded_row * height as usize {
        return Err(CaptureError::BufferSize { width, height });
    }

    let mut pixels = Vec::with_capacity(row * height as usize);
    for line in data.chunks(padded_row).take(height as usize) {
        pixels.extend_from_slice(&line[..row]);
    }
    if swizzle {
        for pixel in pixels.chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }
    }
    Ok(pixels)
}

/// A frame copy recorded into an encoder, waiting for submission.
pub struct PendingCapture {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
    swizzle: bool,
}

impl PendingCapture {
    /// Records a copy of `texture` into a fresh readback buffer. The
    /// texture must have been created with `COPY_SRC`.
    pub fn record(
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
    ) -> Result<Self, CaptureError> {
        if !texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
            return Err(CaptureError::Unsupported);
        }
        let swizzle = needs_swizzle(texture.format())?;
        let size = texture.size();
        let padded_row = padded_bytes_per_row(size.width);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Capture Readback Buffer"),
            size: padded_row as u64 * size.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );

        Ok(Self {
            buffer,
            width: size.width,
            height: size.height,
            padded_row,
            swizzle,
        })
    }

    /// Blocks until the copy has landed. Call after the encoder was
    /// submitted.
    pub fn finish(self, device: &wgpu::Device) -> Result<RgbaImage, CaptureError> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| CaptureError::Map("map callback was dropped".into()))?
            .map_err(|e| CaptureError::Map(e.to_string()))?;

        let pixels = {
            let data = slice.get_mapped_range();
            unpad_rows(&data, self.width, self.height, self.padded_row, self.swizzle)?
        };
        self.buffer.unmap();
        self.buffer.destroy();
        debug!(width = self.width, height = self.height, "read back frame");

        RgbaImage::from_raw(self.width, self.height, pixels).ok_or(CaptureError::BufferSize {
            width: self.width,
            height: self.height,
        })
    }
}

pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), CaptureError> {
    image.save_with_format(path, image::ImageFormat::Png)?;
    info!(path = %path.display(), width = image.width(), height = image.height(), "saved snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_256_bytes() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(800), 3200);
    }

    #[test]
    fn unpadding_drops_tail_and_swaps_channels() {
        let padded = padded_bytes_per_row(2) as usize;
        let mut data = vec![0xEE; padded * 2];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        data[padded..padded + 8].copy_from_slice(&[9, 10, 11, 12, 13, 14, 15, 16]);

        let plain = unpad_rows(&data, 2, 2, padded as u32, false).unwrap();
        assert_eq!(plain, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);

        let swapped = unpad_rows(&data, 2, 2, padded as u32, true).unwrap();
        assert_eq!(&swapped[..4], &[3, 2, 1, 4]);
        assert_eq!(&swapped[12..], &[15, 14, 13, 16]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let data = vec![0; 100];
        assert!(matches!(
            unpad_rows(&data, 2, 2, 256, false),
            Err(CaptureError::BufferSize { width: 2, height: 2 })
        ));
    }

    #[test]
    fn only_8_bit_color_formats_are_supported() {
        assert!(!needs_swizzle(wgpu::TextureFormat::Rgba8UnormSrgb).unwrap());
        assert!(needs_swizzle(wgpu::TextureFormat::Bgra8Unorm).unwrap());
        assert!(needs_swizzle(wgpu::TextureFormat::Rgba16Float).is_err());
    }

    #[test]
    fn png_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        let image = RgbaImage::from_pixel(3, 2, image::Rgba([255, 255, 255, 255]));
        save_png(&image, &path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
    }
}
