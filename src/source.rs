use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, ImageResult};
use std::io::{BufRead, Cursor, Seek};
use std::path::{Path, PathBuf};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tif", "tiff"];

/// A decoded image, already rotated upright, plus the color profile found in
/// the file (re-attached on save).
pub struct LoadedImage {
    pub image: DynamicImage,
    pub icc_profile: Option<Vec<u8>>,
}

pub fn load_path(path: &Path) -> ImageResult<LoadedImage> {
    decode(ImageReader::open(path)?)
}

pub fn load_bytes(data: &[u8]) -> ImageResult<LoadedImage> {
    decode(ImageReader::new(Cursor::new(data)))
}

fn decode<R: BufRead + Seek>(reader: ImageReader<R>) -> ImageResult<LoadedImage> {
    let mut decoder = reader.with_guessed_format()?.into_decoder()?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let icc_profile = decoder.icc_profile().ok().flatten();

    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);

    Ok(LoadedImage { image, icc_profile })
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Supported image files directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_supported(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("a/photo.JPG")));
        assert!(is_supported(Path::new("scan.tiff")));
        assert!(is_supported(Path::new("x.Png")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("noext")));
    }

    #[test]
    fn test_list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "c.txt", "d.BMP"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();

        let names: Vec<_> = list_images(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.jpg", "b.png", "d.BMP"]);
    }

    #[test]
    fn test_load_bytes_png() {
        let img = RgbImage::from_pixel(6, 4, Rgb([1, 2, 3]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let loaded = load_bytes(&buf).unwrap();
        assert_eq!((loaded.image.width(), loaded.image.height()), (6, 4));
    }

    #[test]
    fn test_load_garbage_fails() {
        assert!(load_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load_path(Path::new("/nonexistent/photo.jpg")).is_err());
    }
}
