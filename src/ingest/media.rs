// Pre-ASR validation of recording files.
// Rejects anything the transcription stage would choke on before it is
// handed off.

use std::fs;
use std::path::Path;

use crate::errors::MediaError;

const MAX_FILE_SIZE_MB: u64 = 500;
const ALLOWED_MIME_TYPES: [&str; 4] = [
    "audio/mpeg",  // .mp3
    "audio/wav",   // .wav
    "audio/x-m4a", // .m4a
    "video/mp4",   // .mp4
];

/// Validate a recording file for ingestion. Returns a short human-readable
/// description (mime type and size) on success.
pub fn validate_media_file(path_str: &str) -> Result<String, MediaError> {
    let path = Path::new(path_str);

    if !path.exists() {
        return Err(MediaError::FileNotFound(path_str.to_string()));
    }

    let metadata = fs::metadata(path)?;
    if metadata.len() == 0 {
        return Err(MediaError::FileEmpty);
    }

    let size_mb = metadata.len() / (1024 * 1024);
    if size_mb > MAX_FILE_SIZE_MB {
        return Err(MediaError::FileTooLarge {
            limit: MAX_FILE_SIZE_MB,
            got: size_mb,
        });
    }

    let kind = infer::get_from_path(path)
        .map_err(|_| MediaError::UnknownType)?
        .ok_or(MediaError::UnknownType)?;

    if !ALLOWED_MIME_TYPES.contains(&kind.mime_type()) {
        return Err(MediaError::InvalidFormat(
            kind.mime_type().to_string(),
            &ALLOWED_MIME_TYPES,
        ));
    }

    Ok(format!("{} ({}MB)", kind.mime_type(), size_mb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file() {
        let result = validate_media_file("/nonexistent/call.mp3");
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[test]
    fn test_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        fs::File::create(&path).unwrap();

        let result = validate_media_file(path.to_str().unwrap());
        assert!(matches!(result, Err(MediaError::FileEmpty)));
    }

    #[test]
    fn test_valid_wav_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("call.wav");
        let mut f = fs::File::create(&path).unwrap();
        // Minimal RIFF/WAVE header plus some payload.
        f.write_all(b"RIFF\x24\x00\x00\x00WAVEfmt ").unwrap();
        f.write_all(&[0u8; 64]).unwrap();

        let info = validate_media_file(path.to_str().unwrap()).unwrap();
        assert!(info.contains("audio/wav"), "got: {}", info);
    }

    #[test]
    fn test_rejects_unknown_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "just text, not audio").unwrap();

        let result = validate_media_file(path.to_str().unwrap());
        assert!(matches!(result, Err(MediaError::UnknownType)));
    }
}
