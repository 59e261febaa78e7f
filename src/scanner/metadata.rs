use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::photo::{PhotoError, PhotoRecord};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("malformed metadata in {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: exif::Error,
    },

    #[error("unusable location in {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected error reading {}: {message}", .path.display())]
    Other { path: PathBuf, message: String },
}

impl ExtractError {
    /// Broken or location-less photos are expected and skipped without a report.
    pub fn is_expected(&self) -> bool {
        !matches!(self, ExtractError::Other { .. })
    }

    fn parse(path: &Path, reason: impl Into<String>) -> Self {
        ExtractError::Parse {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Turns an image file into a [`PhotoRecord`].
pub trait PhotoExtractor: Send + Sync {
    fn extract(&self, directory: &Path, file: &Path) -> Result<PhotoRecord, ExtractError>;
}

/// Reads the GPS position and image direction from EXIF tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifExtractor;

impl PhotoExtractor for ExifExtractor {
    fn extract(&self, directory: &Path, file: &Path) -> Result<PhotoRecord, ExtractError> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ExtractError::parse(file, "no file name"))?;

        let mut bufreader = BufReader::new(File::open(file)?);
        let exif = exif::Reader::new()
            .read_from_container(&mut bufreader)
            .map_err(|e| classify_exif_error(file, e))?;

        let lat = read_coordinate(&exif, file, exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef, 'S')?;
        let lon = read_coordinate(&exif, file, exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef, 'W')?;

        // Direction is optional, an unreadable value is treated as absent
        let direction = exif
            .get_field(exif::Tag::GPSImgDirection, exif::In::PRIMARY)
            .and_then(|field| match field.value {
                exif::Value::Rational(ref v) => v.first().map(|r| r.to_f64()),
                _ => None,
            })
            .filter(|d| d.is_finite());

        PhotoRecord::from_degrees(lat, lon, direction, directory, name)
            .map_err(|e: PhotoError| ExtractError::parse(file, e.to_string()))
    }
}

fn classify_exif_error(path: &Path, error: exif::Error) -> ExtractError {
    match error {
        exif::Error::Io(e) => ExtractError::Io(e),
        exif::Error::NotFound(_) | exif::Error::BlankValue(_) => {
            ExtractError::parse(path, error.to_string())
        }
        exif::Error::InvalidFormat(_) | exif::Error::UnexpectedValue(_) => ExtractError::Decode {
            path: path.to_path_buf(),
            source: error,
        },
        other => ExtractError::Other {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    }
}

/// Read a degrees/minutes/seconds coordinate and apply its hemisphere reference.
fn read_coordinate(
    exif: &exif::Exif,
    path: &Path,
    value_tag: exif::Tag,
    ref_tag: exif::Tag,
    negative_ref: char,
) -> Result<f64, ExtractError> {
    let value = exif
        .get_field(value_tag, exif::In::PRIMARY)
        .ok_or_else(|| ExtractError::parse(path, format!("missing {}", value_tag)))?;
    let reference = exif
        .get_field(ref_tag, exif::In::PRIMARY)
        .ok_or_else(|| ExtractError::parse(path, format!("missing {}", ref_tag)))?;

    let dms = match value.value {
        exif::Value::Rational(ref v) if v.len() >= 3 => v,
        _ => return Err(ExtractError::parse(path, format!("{} is not a DMS triple", value_tag))),
    };
    let degrees = dms_to_decimal(dms[0].to_f64(), dms[1].to_f64(), dms[2].to_f64());
    if !degrees.is_finite() {
        return Err(ExtractError::parse(path, format!("{} has a zero denominator", value_tag)));
    }

    let reference = reference.display_value().to_string();
    Ok(if reference.contains(negative_ref) { -degrees } else { degrees })
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use exif::experimental::Writer;
    use exif::{Field, In, Rational, Tag, Value};
    use std::io::Cursor;
    use tempfile::tempdir;

    fn rational(num: u32, denom: u32) -> Rational {
        Rational { num, denom }
    }

    fn ascii(value: &str) -> Value {
        Value::Ascii(vec![value.as_bytes().to_vec()])
    }

    /// Write a bare TIFF container carrying the given GPS fields.
    fn write_tiff(path: &Path, fields: &[Field]) {
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false).unwrap();
        std::fs::write(path, buf.into_inner()).unwrap();
    }

    fn gps_fields(direction: Option<Rational>) -> Vec<Field> {
        let mut fields = vec![
            Field {
                tag: Tag::GPSLatitude,
                ifd_num: In::PRIMARY,
                value: Value::Rational(vec![rational(48, 1), rational(30, 1), rational(0, 1)]),
            },
            Field {
                tag: Tag::GPSLatitudeRef,
                ifd_num: In::PRIMARY,
                value: ascii("N"),
            },
            Field {
                tag: Tag::GPSLongitude,
                ifd_num: In::PRIMARY,
                value: Value::Rational(vec![rational(7, 1), rational(15, 1), rational(0, 1)]),
            },
            Field {
                tag: Tag::GPSLongitudeRef,
                ifd_num: In::PRIMARY,
                value: ascii("W"),
            },
        ];
        if let Some(direction) = direction {
            fields.push(Field {
                tag: Tag::GPSImgDirection,
                ifd_num: In::PRIMARY,
                value: Value::Rational(vec![direction]),
            });
        }
        fields
    }

    #[test]
    fn test_dms_to_decimal() {
        assert_eq!(dms_to_decimal(48.0, 30.0, 0.0), 48.5);
        assert_eq!(dms_to_decimal(0.0, 0.0, 36.0), 0.01);
    }

    #[test]
    fn test_extract_gps_position() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("geo.jpg");
        write_tiff(&file, &gps_fields(None));

        let photo = ExifExtractor.extract(dir.path(), &file).unwrap();
        assert_eq!(photo.lat(), 485_000_000);
        assert_eq!(photo.lon(), -72_500_000);
        assert_eq!(photo.direction(), None);
        assert_eq!(photo.directory(), dir.path());
        assert_eq!(photo.name(), "geo.jpg");
    }

    #[test]
    fn test_extract_direction() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("geo.jpg");
        write_tiff(&file, &gps_fields(Some(rational(1805, 10))));

        let photo = ExifExtractor.extract(dir.path(), &file).unwrap();
        assert_eq!(photo.direction(), Some(181));
    }

    #[test]
    fn test_missing_gps_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("nogps.jpg");
        write_tiff(
            &file,
            &[Field {
                tag: Tag::Make,
                ifd_num: In::PRIMARY,
                value: ascii("Camera"),
            }],
        );

        let err = ExifExtractor.extract(dir.path(), &file).unwrap_err();
        assert!(matches!(err, ExtractError::Parse { .. }));
        assert!(err.is_expected());
    }

    #[test]
    fn test_garbage_file_is_expected_failure() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("broken.jpg");
        std::fs::write(&file, b"definitely not an image").unwrap();

        let err = ExifExtractor.extract(dir.path(), &file).unwrap_err();
        assert!(err.is_expected());
    }

    #[test]
    fn test_exif_error_classification() {
        let path = Path::new("/sd/DCIM/a.jpg");

        let err = classify_exif_error(path, exif::Error::InvalidFormat("bad header"));
        assert!(matches!(err, ExtractError::Decode { .. }));
        assert!(err.is_expected());

        let err = classify_exif_error(path, exif::Error::NotFound("no exif"));
        assert!(matches!(err, ExtractError::Parse { .. }));

        let err = classify_exif_error(path, exif::Error::TooBig("huge ifd"));
        assert!(matches!(err, ExtractError::Other { .. }));
        assert!(!err.is_expected());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = ExifExtractor
            .extract(dir.path(), &dir.path().join("missing.jpg"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }
}
