//! Per-type payload encoding.

use crate::error::Result;
use crate::media::{image, Image, ImageInput, NdArray, VideoReader};
use crate::types::{Data, Fields, RecordType};
use std::fs;
use std::path::Path;

pub fn encode_image(input: &ImageInput) -> Result<Vec<u8>> {
    match input {
        ImageInput::Path(path) => Ok(fs::read(path)?),
        ImageInput::Decoded(image) => image::encode_png(image),
    }
}

pub fn encode_video(path: &Path) -> Result<Vec<u8>> {
    Ok(fs::read(path)?)
}

pub fn encode_array(array: &NdArray) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(array)?)
}

pub fn encode_fields(fields: &Fields) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(fields)?)
}

pub fn decode_image(bytes: &[u8]) -> Result<Image> {
    image::decode(bytes)
}

pub fn decode_array(bytes: &[u8]) -> Result<NdArray> {
    Ok(rmp_serde::from_slice(bytes)?)
}

pub fn decode_fields(bytes: &[u8]) -> Result<Fields> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Decode a stored payload as `ty`.
pub fn decode(ty: RecordType, bytes: &[u8]) -> Result<Data> {
    match ty {
        RecordType::Image => decode_image(bytes).map(Data::Image),
        RecordType::Video => Ok(Data::Video(VideoReader::new(bytes.to_vec()))),
        RecordType::Numpy => decode_array(bytes).map(Data::Array),
        RecordType::Dict => decode_fields(bytes).map(Data::Dict),
    }
}
