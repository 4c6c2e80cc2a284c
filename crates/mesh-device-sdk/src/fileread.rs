//! Local file reads performed on behalf of a `ReadFile` RPC (spec §4.7/§4.9).
//! The device itself owns the filesystem; the coordinator and tool executor
//! only see the returned bytes (base64) and a short preview.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mesh_domain::file::{ReadFileRequest, ReadFileResponse, ReadMode};

const PREVIEW_BYTES: usize = 200;

/// Never returns `Err`: any failure (missing file, bad range, io error) is
/// reported in `ReadFileResponse.error`, matching the ticket/status-probe
/// fail-soft shape used elsewhere in this system.
pub fn read_local_file(request: &ReadFileRequest) -> ReadFileResponse {
    let bytes = match std::fs::read(&request.path) {
        Ok(b) => b,
        Err(e) => {
            return ReadFileResponse {
                error: Some(format!("failed to read {}: {e}", request.path)),
                ..Default::default()
            }
        }
    };
    let size_bytes = bytes.len() as u64;

    let slice_result = match request.mode {
        ReadMode::Full => Ok(slice_capped(&bytes, 0, bytes.len())),
        ReadMode::Head => Ok(slice_capped(&bytes, 0, request.max_bytes as usize)),
        ReadMode::Tail => {
            let len = bytes.len();
            let take = (request.max_bytes as usize).min(len);
            Ok(slice_capped(&bytes, len - take, len))
        }
        ReadMode::Range => {
            let (offset, length) = match (request.offset, request.length) {
                (Some(o), Some(l)) => (o, l),
                _ => {
                    return ReadFileResponse {
                        error: Some("range mode requires both offset and length".to_string()),
                        size_bytes,
                        ..Default::default()
                    }
                }
            };
            let start = offset as usize;
            if start > bytes.len() {
                Err(format!(
                    "offset {offset} is past end of file ({size_bytes} bytes)"
                ))
            } else {
                let end = (start + length as usize).min(bytes.len());
                Ok(slice_capped(&bytes[start..end], 0, request.max_bytes as usize))
            }
        }
    };

    let (data, truncated) = match slice_result {
        Ok(v) => v,
        Err(e) => {
            return ReadFileResponse {
                error: Some(e),
                size_bytes,
                ..Default::default()
            }
        }
    };

    ReadFileResponse {
        content_base64: BASE64.encode(&data),
        content_preview: preview(&data),
        size_bytes,
        bytes_returned: data.len() as u64,
        truncated,
        error: None,
    }
}

/// Returns `(slice, truncated)`, `slice` never longer than the input's
/// remaining bytes from `start` nor than `[start, end)`'s natural span.
fn slice_capped(bytes: &[u8], start: usize, end: usize) -> (Vec<u8>, bool) {
    let end = end.min(bytes.len());
    let start = start.min(end);
    (bytes[start..end].to_vec(), end < bytes.len() && start == 0)
}

fn preview(bytes: &[u8]) -> String {
    let take = bytes.len().min(PREVIEW_BYTES);
    String::from_utf8_lossy(&bytes[..take]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::file::default_max_bytes;

    fn write_temp(name: &str, contents: &[u8]) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("mesh-device-sdk-test-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn missing_file_reports_an_error_not_a_panic() {
        let request = ReadFileRequest {
            device_id: String::new(),
            path: "/definitely/does/not/exist".into(),
            mode: ReadMode::Full,
            max_bytes: default_max_bytes(),
            offset: None,
            length: None,
        };
        let response = read_local_file(&request);
        assert!(response.error.is_some());
    }

    #[test]
    fn full_read_round_trips_small_file_content() {
        let path = write_temp("full", b"hello world");
        let request = ReadFileRequest {
            device_id: String::new(),
            path,
            mode: ReadMode::Full,
            max_bytes: default_max_bytes(),
            offset: None,
            length: None,
        };
        let response = read_local_file(&request);
        assert!(response.error.is_none());
        assert_eq!(response.content_preview, "hello world");
        assert_eq!(response.size_bytes, 11);
        assert!(!response.truncated);
    }

    #[test]
    fn head_mode_caps_at_max_bytes() {
        let path = write_temp("head", b"0123456789");
        let request = ReadFileRequest {
            device_id: String::new(),
            path,
            mode: ReadMode::Head,
            max_bytes: 4,
            offset: None,
            length: None,
        };
        let response = read_local_file(&request);
        assert_eq!(response.bytes_returned, 4);
        assert_eq!(response.content_preview, "0123");
        assert!(response.truncated);
    }

    #[test]
    fn tail_mode_returns_the_last_bytes() {
        let path = write_temp("tail", b"0123456789");
        let request = ReadFileRequest {
            device_id: String::new(),
            path,
            mode: ReadMode::Tail,
            max_bytes: 4,
            offset: None,
            length: None,
        };
        let response = read_local_file(&request);
        assert_eq!(response.content_preview, "6789");
    }

    #[test]
    fn range_mode_without_offset_and_length_is_rejected() {
        let path = write_temp("range-missing", b"0123456789");
        let request = ReadFileRequest {
            device_id: String::new(),
            path,
            mode: ReadMode::Range,
            max_bytes: default_max_bytes(),
            offset: None,
            length: None,
        };
        let response = read_local_file(&request);
        assert!(response.error.unwrap().contains("requires both"));
    }

    #[test]
    fn range_mode_reads_the_requested_slice() {
        let path = write_temp("range", b"0123456789");
        let request = ReadFileRequest {
            device_id: String::new(),
            path,
            mode: ReadMode::Range,
            max_bytes: default_max_bytes(),
            offset: Some(2),
            length: Some(3),
        };
        let response = read_local_file(&request);
        assert_eq!(response.content_preview, "234");
    }
}
