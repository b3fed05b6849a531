use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use validator::ValidationError;

/// Largest embedded photo accepted, in decoded bytes (512KiB).
pub const MAX_PHOTO_BYTES: usize = 512 * 1024;

/// A photo reference is either an embedded `data:<mime>;base64,...` image or
/// an absolute URI pointing somewhere else.
pub fn validate_photo(photo: &str) -> Result<(), ValidationError> {
    if let Some(rest) = photo.strip_prefix("data:") {
        return validate_data_uri(rest);
    }
    url::Url::parse(photo).map_err(|_| invalid("photo must be a data URI or an absolute URL"))?;
    Ok(())
}

fn validate_data_uri(rest: &str) -> Result<(), ValidationError> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("data URI is missing its payload"))?;
    let declared = header
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("data URI must be base64 encoded"))?;

    // Rough upper bound before decoding anything
    if payload.len() / 4 * 3 > MAX_PHOTO_BYTES + 3 {
        return Err(invalid("photo exceeds 512KiB limit"));
    }
    let bytes = STANDARD
        .decode(payload)
        .map_err(|_| invalid("data URI payload is not valid base64"))?;
    if bytes.len() > MAX_PHOTO_BYTES {
        return Err(invalid("photo exceeds 512KiB limit"));
    }

    if !infer::is_image(&bytes) {
        return Err(invalid("photo must be an image"));
    }
    let file_type = infer::get(&bytes).ok_or_else(|| invalid("Invalid file type"))?;
    if !declared.is_empty() && !same_mime(declared, file_type.mime_type()) {
        return Err(invalid("declared MIME type does not match photo contents"));
    }
    Ok(())
}

fn same_mime(declared: &str, detected: &str) -> bool {
    let declared = declared.to_ascii_lowercase();
    declared == detected || (declared == "image/jpg" && detected == "image/jpeg")
}

fn invalid(message: &'static str) -> ValidationError {
    let mut err = ValidationError::new("photo");
    err.message = Some(message.into());
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn accepts_embedded_png() {
        assert!(validate_photo(&format!("data:image/png;base64,{}", PIXEL_PNG)).is_ok());
    }

    #[test]
    fn rejects_mismatched_mime() {
        let err = validate_photo(&format!("data:image/jpeg;base64,{}", PIXEL_PNG)).unwrap_err();
        assert_eq!(err.code, "photo");
    }

    #[test]
    fn rejects_non_image_payload() {
        let text = STANDARD.encode(b"just some text, definitely not a picture");
        assert!(validate_photo(&format!("data:image/png;base64,{}", text)).is_err());
    }

    #[test]
    fn rejects_broken_base64() {
        assert!(validate_photo("data:image/png;base64,@@@not-base64@@@").is_err());
        assert!(validate_photo("data:image/png,rawbytes").is_err());
    }

    #[test]
    fn rejects_oversized_photo() {
        let mut png = STANDARD.decode(PIXEL_PNG).unwrap();
        png.resize(MAX_PHOTO_BYTES + 1, 0);
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(png));
        assert!(validate_photo(&uri).is_err());
    }

    #[test]
    fn accepts_absolute_urls_only() {
        assert!(validate_photo("https://cdn.example.com/photos/ana.jpg").is_ok());
        assert!(validate_photo("file:///var/mobile/photo.png").is_ok());
        assert!(validate_photo("photos/ana.jpg").is_err());
    }
}
