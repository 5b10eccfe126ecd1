//! Checks run on uploaded avatars before they are stored.

use std::io::Cursor;

use image::ImageReader;

pub const MAX_SIZE: usize = 2 * 1024 * 1024;
pub const MAX_DIMENSION: u32 = 1600;
const ALLOWED_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

/// Reason an upload is refused. Displayed to the user as is.
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("Only JPEG and PNG images are accepted.")]
    UnsupportedType,
    #[error("The image must not exceed 2 MiB.")]
    TooLarge,
    #[error("The image must not exceed 1600x1600 pixels.")]
    Dimensions,
    #[error("The file is not a readable image.")]
    Unreadable(#[from] image::ImageError),
    #[error("No image was provided.")]
    Missing,
}

/// Uploaded file as read from the multipart body.
#[derive(Debug)]
pub struct Upload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Check declared content type, byte size and pixel dimensions.
///
/// Only the image header is decoded.
pub fn check(upload: &Upload) -> Result<(u32, u32), AvatarError> {
    if !ALLOWED_TYPES.contains(&upload.content_type.as_str()) {
        return Err(AvatarError::UnsupportedType);
    }

    if upload.bytes.len() > MAX_SIZE {
        return Err(AvatarError::TooLarge);
    }

    let (width, height) = ImageReader::new(Cursor::new(&upload.bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .into_dimensions()?;

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(AvatarError::Dimensions);
    }

    Ok((width, height))
}
