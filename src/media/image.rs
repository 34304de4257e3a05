//! Still images: PNG re-encoding and truncation-tolerant decoding.

use crate::error::{Result, StoreError};
use image::{DynamicImage, ImageBuffer};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::warn;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// Largest pixel buffer a non-PNG decode may allocate.
const MAX_ALLOC: u64 = 512 << 20;

/// A metadata entry attached to an image.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataValue {
    Text(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
}

impl MetadataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// A decoded image with its metadata.
#[derive(Clone, Debug)]
pub struct Image {
    pixels: DynamicImage,
    metadata: BTreeMap<String, MetadataValue>,
    truncated: bool,
}

impl Image {
    pub fn new(pixels: DynamicImage) -> Self {
        Self {
            pixels,
            metadata: BTreeMap::new(),
            truncated: false,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> DynamicImage {
        self.pixels
    }

    pub fn metadata(&self) -> &BTreeMap<String, MetadataValue> {
        &self.metadata
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Whether the source stream ended early.
    ///
    /// Truncated PNGs keep the rows decoded before the cut and zero the
    /// rest. Other formats come back as an all-zero canvas of the header's
    /// size.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl From<DynamicImage> for Image {
    fn from(pixels: DynamicImage) -> Self {
        Image::new(pixels)
    }
}

/// What `write_image` accepts.
#[derive(Clone, Debug)]
pub enum ImageInput {
    /// An encoded image file, stored byte for byte.
    Path(PathBuf),
    /// An in-memory image, re-encoded as PNG.
    Decoded(Image),
}

impl From<&Path> for ImageInput {
    fn from(path: &Path) -> Self {
        ImageInput::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for ImageInput {
    fn from(path: PathBuf) -> Self {
        ImageInput::Path(path)
    }
}

impl From<&str> for ImageInput {
    fn from(path: &str) -> Self {
        ImageInput::Path(PathBuf::from(path))
    }
}

impl From<String> for ImageInput {
    fn from(path: String) -> Self {
        ImageInput::Path(PathBuf::from(path))
    }
}

impl From<Image> for ImageInput {
    fn from(image: Image) -> Self {
        ImageInput::Decoded(image)
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(pixels: DynamicImage) -> Self {
        ImageInput::Decoded(Image::new(pixels))
    }
}

/// Encode an image as PNG.
///
/// Only text metadata is carried over; other entries are dropped.
pub fn encode_png(image: &Image) -> Result<Vec<u8>> {
    let (color, depth, data) = png_layout(&image.pixels);

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, image.width(), image.height());
        encoder.set_color(color);
        encoder.set_depth(depth);

        for (key, value) in &image.metadata {
            let Some(text) = value.as_text() else {
                continue;
            };
            if is_latin1(text) {
                encoder.add_text_chunk(key.clone(), text.to_string())?;
            } else {
                encoder.add_itxt_chunk(key.clone(), text.to_string())?;
            }
        }

        let mut writer = encoder.write_header()?;
        writer.write_image_data(&data)?;
        writer.finish()?;
    }

    Ok(out)
}

/// Decode an encoded image.
///
/// A stream cut short after its header still decodes; the result is
/// flagged as truncated. See [`Image::is_truncated`] for what survives.
pub fn decode(bytes: &[u8]) -> Result<Image> {
    if bytes.starts_with(PNG_SIGNATURE) {
        decode_png(bytes)
    } else {
        decode_other(bytes)
    }
}

fn decode_png(bytes: &[u8]) -> Result<Image> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    // Palettes and sub-byte depths widen to 8 bits; 16-bit samples stay.
    decoder.set_transformations(png::Transformations::EXPAND);
    decoder.set_ignore_text_chunk(false);

    let mut reader = decoder
        .read_info()
        .map_err(|e| StoreError::ImageDecode(e.to_string()))?;
    let (width, height) = {
        let info = reader.info();
        (info.width, info.height)
    };
    let (color, depth) = reader.output_color_type();

    // Rows decoded before an error stay in the buffer.
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let truncated = match reader.next_frame(&mut buf) {
        Ok(_) => false,
        Err(e) => {
            warn!(width, height, error = %e, "decoding truncated png");
            true
        }
    };

    let metadata = png_text(reader.info());
    let pixels = png_pixels(width, height, color, depth, buf)
        .ok_or_else(|| StoreError::ImageDecode(format!("unexpected png layout {color:?}/{depth:?}")))?;

    Ok(Image {
        pixels,
        metadata,
        truncated,
    })
}

fn png_pixels(
    width: u32,
    height: u32,
    color: png::ColorType,
    depth: png::BitDepth,
    buf: Vec<u8>,
) -> Option<DynamicImage> {
    use png::{BitDepth, ColorType};

    match depth {
        BitDepth::Eight => match color {
            ColorType::Grayscale => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma8)
            }
            ColorType::GrayscaleAlpha => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
            }
            ColorType::Rgb => ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
            ColorType::Rgba => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
            }
            ColorType::Indexed => None,
        },
        BitDepth::Sixteen => {
            let samples = from_be_bytes(&buf);
            match color {
                ColorType::Grayscale => {
                    ImageBuffer::from_raw(width, height, samples).map(DynamicImage::ImageLuma16)
                }
                ColorType::GrayscaleAlpha => {
                    ImageBuffer::from_raw(width, height, samples).map(DynamicImage::ImageLumaA16)
                }
                ColorType::Rgb => {
                    ImageBuffer::from_raw(width, height, samples).map(DynamicImage::ImageRgb16)
                }
                ColorType::Rgba => {
                    ImageBuffer::from_raw(width, height, samples).map(DynamicImage::ImageRgba16)
                }
                ColorType::Indexed => None,
            }
        }
        _ => None,
    }
}

fn decode_other(bytes: &[u8]) -> Result<Image> {
    let err = match reader(bytes)?.decode() {
        Ok(pixels) => return Ok(Image::new(pixels)),
        Err(err) => err,
    };

    // With the header intact, substitute a blank canvas of its size. Rows
    // that did decode are not recovered.
    let (width, height) = reader(bytes)?
        .into_dimensions()
        .map_err(|_| StoreError::from(err))?;
    if u64::from(width) * u64::from(height) * 3 > MAX_ALLOC {
        return Err(StoreError::ImageDecode(format!(
            "truncated image header claims {width}x{height}"
        )));
    }
    warn!(width, height, "decoding truncated image as blank");

    Ok(Image {
        pixels: DynamicImage::new_rgb8(width, height),
        metadata: BTreeMap::new(),
        truncated: true,
    })
}

fn reader(bytes: &[u8]) -> Result<image::io::Reader<Cursor<&[u8]>>> {
    let mut reader = image::io::Reader::new(Cursor::new(bytes)).with_guessed_format()?;
    let mut limits = image::io::Limits::default();
    limits.max_alloc = Some(MAX_ALLOC);
    reader.limits(limits);
    Ok(reader)
}

fn png_layout(pixels: &DynamicImage) -> (png::ColorType, png::BitDepth, Vec<u8>) {
    use png::{BitDepth, ColorType};

    match pixels {
        DynamicImage::ImageLuma8(buf) => (ColorType::Grayscale, BitDepth::Eight, buf.as_raw().clone()),
        DynamicImage::ImageLumaA8(buf) => {
            (ColorType::GrayscaleAlpha, BitDepth::Eight, buf.as_raw().clone())
        }
        DynamicImage::ImageRgb8(buf) => (ColorType::Rgb, BitDepth::Eight, buf.as_raw().clone()),
        DynamicImage::ImageRgba8(buf) => (ColorType::Rgba, BitDepth::Eight, buf.as_raw().clone()),
        DynamicImage::ImageLuma16(buf) => (ColorType::Grayscale, BitDepth::Sixteen, be_bytes(buf.as_raw())),
        DynamicImage::ImageLumaA16(buf) => {
            (ColorType::GrayscaleAlpha, BitDepth::Sixteen, be_bytes(buf.as_raw()))
        }
        DynamicImage::ImageRgb16(buf) => (ColorType::Rgb, BitDepth::Sixteen, be_bytes(buf.as_raw())),
        DynamicImage::ImageRgba16(buf) => (ColorType::Rgba, BitDepth::Sixteen, be_bytes(buf.as_raw())),
        other => {
            let buf = other.to_rgba16();
            (ColorType::Rgba, BitDepth::Sixteen, be_bytes(buf.as_raw()))
        }
    }
}

/// PNG stores 16-bit samples big-endian.
fn be_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

fn from_be_bytes(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

fn is_latin1(text: &str) -> bool {
    text.chars().all(|c| (c as u32) < 0x100)
}

fn png_text(info: &png::Info<'_>) -> BTreeMap<String, MetadataValue> {
    let mut metadata = BTreeMap::new();

    for chunk in &info.uncompressed_latin1_text {
        metadata.insert(chunk.keyword.clone(), MetadataValue::Text(chunk.text.clone()));
    }
    for chunk in &info.compressed_latin1_text {
        if let Ok(text) = chunk.get_text() {
            metadata.insert(chunk.keyword.clone(), MetadataValue::Text(text));
        }
    }
    for chunk in &info.utf8_text {
        if let Ok(text) = chunk.get_text() {
            metadata.insert(chunk.keyword.clone(), MetadataValue::Text(text));
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn noise(width: u32, height: u32) -> DynamicImage {
        let mut state = 0x2545_f491u32;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [a, b, c, _] = state.to_le_bytes();
            Rgb([a, b, c])
        }))
    }

    #[test]
    fn test_png_roundtrip_is_lossless() {
        let pixels = noise(16, 9);
        let bytes = encode_png(&Image::new(pixels.clone())).unwrap();
        assert!(bytes.starts_with(PNG_SIGNATURE));

        let decoded = decode(&bytes).unwrap();
        assert!(!decoded.is_truncated());
        assert_eq!(decoded.pixels().to_rgb8(), pixels.to_rgb8());
    }

    #[test]
    fn test_only_text_metadata_is_kept() {
        let image = Image::new(noise(4, 4))
            .with_metadata("Title", MetadataValue::Text("cat".into()))
            .with_metadata("Comment", MetadataValue::Text("naïve ☃".into()))
            .with_metadata("icc", MetadataValue::Bytes(vec![1, 2, 3]))
            .with_metadata("dpi", MetadataValue::Int(72));

        let decoded = decode(&encode_png(&image).unwrap()).unwrap();
        let keys: Vec<_> = decoded.metadata().keys().cloned().collect();
        assert_eq!(keys, vec!["Comment".to_string(), "Title".to_string()]);
        assert_eq!(decoded.metadata()["Title"].as_text(), Some("cat"));
        assert_eq!(decoded.metadata()["Comment"].as_text(), Some("naïve ☃"));
    }

    #[test]
    fn test_sixteen_bit_is_preserved() {
        let pixels = DynamicImage::ImageLuma16(
            image::ImageBuffer::from_raw(2, 1, vec![0x1234u16, 0xABCD]).unwrap(),
        );
        let bytes = encode_png(&Image::new(pixels)).unwrap();

        let decoded = decode(&bytes).unwrap();
        let DynamicImage::ImageLuma16(buf) = decoded.pixels() else {
            panic!("expected 16-bit luma, got {:?}", decoded.pixels().color());
        };
        assert_eq!(buf.as_raw(), &vec![0x1234u16, 0xABCD]);
    }

    #[test]
    fn test_sixteen_bit_rgba_is_preserved() {
        let pixels = DynamicImage::ImageRgba16(image::ImageBuffer::from_fn(3, 2, |x, y| {
            image::Rgba([x as u16 * 300 + 1, y as u16 * 7000 + 2, 0xFFFE, 0x0102])
        }));
        let bytes = encode_png(&Image::new(pixels.clone())).unwrap();

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.pixels(), &pixels);
    }

    #[test]
    fn test_truncated_png_decodes() {
        let bytes = encode_png(&Image::new(noise(64, 64))).unwrap();
        let cut = &bytes[..bytes.len() / 2];

        let decoded = decode(cut).unwrap();
        assert!(decoded.is_truncated());
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_oversized_header_is_rejected() {
        // BMP header claiming 100000x100000 RGB with no pixel data.
        let mut bmp = b"BM".to_vec();
        bmp.extend_from_slice(&0u32.to_le_bytes());
        bmp.extend_from_slice(&0u32.to_le_bytes());
        bmp.extend_from_slice(&54u32.to_le_bytes());
        bmp.extend_from_slice(&40u32.to_le_bytes());
        bmp.extend_from_slice(&100_000i32.to_le_bytes());
        bmp.extend_from_slice(&100_000i32.to_le_bytes());
        bmp.extend_from_slice(&1u16.to_le_bytes());
        bmp.extend_from_slice(&24u16.to_le_bytes());
        bmp.extend_from_slice(&[0u8; 24]);

        assert!(matches!(decode(&bmp), Err(StoreError::ImageDecode(_))));
    }

    #[test]
    fn test_garbage_fails() {
        assert!(matches!(
            decode(b"definitely not an image"),
            Err(StoreError::ImageDecode(_))
        ));
    }
}
