//! Extractor plugins, one per content family.
//!
//! - `image` - EXIF metadata from photos
//! - `pdf` - document information dictionary and XMP from PDFs

pub mod image;
pub mod pdf;

pub use image::{convert_to_degrees, GpsBlock, ImageExtractor, ImageMetadata};
pub use pdf::PdfExtractor;
