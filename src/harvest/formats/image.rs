//! EXIF metadata extraction for image files.

use exif::{Exif, In, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::file_types::IMAGES;
use crate::model::{ExtractionResult, MiscRecord};
use crate::parser::{unique, DataParser};
use crate::traits::{ExtractionError, MetadataExtractor};

/// Degree/minute/second rationals as stored in a GPS block.
pub type Dms = [(u32, u32); 3];

/// Extracts photographer identity, capture time, camera and GPS position.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageExtractor;

impl MetadataExtractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn handled_types(&self) -> &'static [&'static str] {
        IMAGES
    }

    fn parse_data(
        &self,
        path: &Path,
        file_type: &str,
    ) -> Result<Option<ExtractionResult>, ExtractionError> {
        if !self.handles(file_type) {
            return Ok(None);
        }

        let mut reader = BufReader::new(File::open(path)?);
        let exif = match exif::Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            // A valid image without an EXIF block has nothing to report.
            Err(exif::Error::NotFound(_)) => return Ok(Some(ExtractionResult::default())),
            Err(exif::Error::Io(e)) => return Err(ExtractionError::IoError(e)),
            Err(e) => return Err(ExtractionError::InvalidContent(e.to_string())),
        };

        Ok(Some(ImageMetadata::from_exif(&exif).into_result()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsBlock {
    pub latitude: Option<Dms>,
    pub latitude_ref: Option<String>,
    pub longitude: Option<Dms>,
    pub longitude_ref: Option<String>,
}

impl GpsBlock {
    /// Signed (latitude, longitude) in decimal degrees, if all four parts are present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = convert_to_degrees(self.latitude.as_ref()?)?;
        let lng = convert_to_degrees(self.longitude.as_ref()?)?;
        let lat = if self.latitude_ref.as_deref()? == "N" { lat } else { -lat };
        let lng = if self.longitude_ref.as_deref()? == "E" { lng } else { -lng };
        Some((lat, lng))
    }
}

/// The EXIF fields this extractor cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    pub artist: Option<String>,
    pub copyright: Option<String>,
    pub date_time: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub gps: Option<GpsBlock>,
}

impl ImageMetadata {
    pub fn from_exif(exif: &Exif) -> Self {
        let gps = GpsBlock {
            latitude: rationals(exif, Tag::GPSLatitude),
            latitude_ref: ascii(exif, Tag::GPSLatitudeRef),
            longitude: rationals(exif, Tag::GPSLongitude),
            longitude_ref: ascii(exif, Tag::GPSLongitudeRef),
        };
        let has_gps = gps != GpsBlock::default();

        Self {
            artist: ascii(exif, Tag::Artist),
            copyright: ascii(exif, Tag::Copyright),
            date_time: ascii(exif, Tag::DateTime),
            make: ascii(exif, Tag::Make),
            model: ascii(exif, Tag::Model),
            gps: has_gps.then_some(gps),
        }
    }

    /// Artist and Copyright are user candidates and are mined for emails.
    pub fn into_result(self) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        for identity in [self.artist, self.copyright].into_iter().flatten() {
            result.emails.extend(DataParser::new(&identity).emails());
            result.users.push(identity);
        }
        result.emails = unique(result.emails);

        if let Some(taken) = self.date_time {
            result.misc.push(MiscRecord::Taken(taken));
        }
        if let Some((latitude, longitude)) = self.gps.as_ref().and_then(GpsBlock::coordinates) {
            result.misc.push(MiscRecord::Gps {
                latitude,
                longitude,
            });
        }
        if self.make.is_some() || self.model.is_some() {
            result.misc.push(MiscRecord::Camera {
                vendor: self.make,
                model: self.model,
            });
        }

        result
    }
}

/// Converts degree/minute/second rationals to decimal degrees.
///
/// Returns `None` when any denominator is zero.
pub fn convert_to_degrees(dms: &Dms) -> Option<f64> {
    let mut parts = [0f64; 3];
    for (part, &(num, denom)) in parts.iter_mut().zip(dms.iter()) {
        if denom == 0 {
            return None;
        }
        *part = f64::from(num) / f64::from(denom);
    }
    Some(parts[0] + parts[1] / 60.0 + parts[2] / 3600.0)
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Ascii(ref chunks) = field.value else {
        return None;
    };
    let text = chunks
        .iter()
        .map(|chunk| String::from_utf8_lossy(chunk).replace('\0', ""))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn rationals(exif: &Exif, tag: Tag) -> Option<Dms> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Rational(ref v) if v.len() >= 3 => Some([
            (v[0].num, v[0].denom),
            (v[1].num, v[1].denom),
            (v[2].num, v[2].denom),
        ]),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "test_image_{}_{}_{}",
            name.replace('.', "_"),
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn test_convert_to_degrees() {
        let value = convert_to_degrees(&[(10, 1), (30, 1), (0, 1)]).unwrap();
        assert!((value - 10.5).abs() < 1e-9);
        assert!(convert_to_degrees(&[(10, 0), (30, 1), (0, 1)]).is_none());
    }

    #[test]
    fn test_south_latitude_is_negated() {
        let block = |lat_ref: &str| GpsBlock {
            latitude: Some([(10, 1), (30, 1), (0, 1)]),
            latitude_ref: Some(lat_ref.to_string()),
            longitude: Some([(5, 1), (0, 1), (0, 1)]),
            longitude_ref: Some("E".to_string()),
        };
        let (north, _) = block("N").coordinates().unwrap();
        let (south, _) = block("S").coordinates().unwrap();
        assert_eq!(south, -north);
    }

    #[test]
    fn test_incomplete_gps_block_has_no_coordinates() {
        let block = GpsBlock {
            latitude: Some([(10, 1), (30, 1), (0, 1)]),
            latitude_ref: Some("N".to_string()),
            ..Default::default()
        };
        assert!(block.coordinates().is_none());
    }

    #[test]
    fn test_metadata_into_result() {
        let metadata = ImageMetadata {
            artist: Some("Jane Doe <jane@example.com>".into()),
            copyright: Some("Jane <jane@example.com>".into()),
            date_time: Some("2019:05:04 10:00:00".into()),
            make: None,
            model: Some("EOS 5D".into()),
            gps: None,
        };
        let result = metadata.into_result();

        assert_eq!(
            result.users,
            vec!["Jane Doe <jane@example.com>", "Jane <jane@example.com>"]
        );
        assert_eq!(result.emails, vec!["jane@example.com"]);
        assert_eq!(
            result.misc,
            vec![
                MiscRecord::Taken("2019:05:04 10:00:00".into()),
                MiscRecord::Camera {
                    vendor: None,
                    model: Some("EOS 5D".into())
                },
            ]
        );
    }

    #[test]
    fn test_rejects_other_types_without_io() {
        let result = ImageExtractor
            .parse_data(Path::new("/nonexistent/file.pdf"), "pdf")
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_parse_tiff_file() {
        let path = temp_file("photo.tiff");
        testing::write_tiff(&path, "Jane Doe <jane@example.com>");

        let result = ImageExtractor.parse_data(&path, "tiff").unwrap().unwrap();
        assert_eq!(
            result.users,
            vec!["Jane Doe <jane@example.com>", "(c) Example Corp"]
        );
        assert_eq!(result.emails, vec!["jane@example.com"]);
        assert!(result.misc.contains(&MiscRecord::Gps {
            latitude: -10.5,
            longitude: -20.25
        }));
        assert!(result.misc.contains(&MiscRecord::Camera {
            vendor: Some("Canon".into()),
            model: Some("EOS 5D".into())
        }));

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let path = temp_file("broken.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        assert!(ImageExtractor.parse_data(&path, "jpg").is_err());

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
