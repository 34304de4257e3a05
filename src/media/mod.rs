//! Media payloads: images, videos and numeric arrays.

mod array;
pub mod image;
mod video;

pub use self::array::{DType, Element, NdArray};
pub use self::image::{Image, ImageInput, MetadataValue};
pub use self::video::{VideoDecoder, VideoReader};
