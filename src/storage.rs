use std::{
    io::Write,
    path::{Path, PathBuf},
};

use image::{DynamicImage, ImageFormat};
use uuid::Uuid;

use crate::error::AppResult;

pub fn capture_filename(timestamp: u64) -> String {
    format!("sign_capture_{timestamp}.jpg")
}

pub fn video_filename(timestamp: u64) -> String {
    format!("sign_video_{timestamp}.mp4")
}

/// Writes a debug copy of a request image as JPEG. Blocking.
pub fn save_capture(dir: &Path, filename: &str, image: &DynamicImage) -> AppResult<PathBuf> {
    let path = dir.join(filename);
    // JPEG has no alpha channel
    DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(&path, ImageFormat::Jpeg)?;
    Ok(path)
}

pub async fn save_video(dir: &Path, filename: &str, bytes: &[u8]) -> AppResult<PathBuf> {
    let path = dir.join(filename);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Replaces `target` with `bytes` so that readers only ever observe the old or
/// the new file in full. The temp file lives next to the target so the final
/// rename stays on one filesystem. Blocking.
pub fn replace_atomically(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    let tmp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let result = (|| {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, target)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    #[test]
    fn filenames_are_timestamp_derived() {
        assert_eq!(capture_filename(42), "sign_capture_42.jpg");
        assert_eq!(video_filename(42), "sign_video_42.mp4");
    }

    #[test]
    fn capture_with_alpha_is_saved_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 128])));

        let path = save_capture(dir.path(), "x.jpg", &img).unwrap();
        let saved = image::open(path).unwrap();
        assert_eq!((saved.width(), saved.height()), (4, 4));
    }

    #[test]
    fn replace_overwrites_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("model.pb");

        replace_atomically(&target, b"first").unwrap();
        replace_atomically(&target, b"second").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        let entries = std::fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
