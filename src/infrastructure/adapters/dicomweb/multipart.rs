//! multipart/related 编解码
//!
//! 解码 WADO-RS 响应为有序的对象列表；编码 STOW-RS 请求体

use crate::application::ports::ArchiveError;

/// 从 Content-Type 中提取 boundary 参数
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

/// 从消息体第一行推断 boundary
fn boundary_from_body(body: &[u8]) -> Option<String> {
    let start = body.iter().position(|b| !b.is_ascii_whitespace())?;
    let rest = &body[start..];
    let line_end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
    let line = std::str::from_utf8(&rest[..line_end]).ok()?.trim_end();
    let boundary = line.strip_prefix("--")?;
    (!boundary.is_empty()).then(|| boundary.to_string())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// 解码 multipart 消息体，按顺序返回每个部分的内容
pub fn decode_multipart(
    body: &[u8],
    content_type: Option<&str>,
) -> Result<Vec<Vec<u8>>, ArchiveError> {
    let boundary = content_type
        .and_then(boundary_from_content_type)
        .or_else(|| boundary_from_body(body))
        .ok_or_else(|| ArchiveError::InvalidResponse("missing multipart boundary".into()))?;
    let delimiter = format!("--{}", boundary).into_bytes();

    let mut parts = Vec::new();
    let Some(mut pos) = find(body, &delimiter, 0) else {
        return Ok(parts);
    };

    loop {
        pos += delimiter.len();
        // 结束分隔符
        if body[pos..].starts_with(b"--") {
            break;
        }

        let headers_start = match find(body, b"\n", pos) {
            Some(i) => i + 1,
            None => break,
        };
        // 跳过部分头
        let content_start = if body[headers_start..].starts_with(b"\r\n") {
            headers_start + 2
        } else if let Some(i) = find(body, b"\r\n\r\n", headers_start) {
            i + 4
        } else {
            find(body, b"\n\n", headers_start)
                .map(|i| i + 2)
                .ok_or_else(|| {
                    ArchiveError::InvalidResponse("malformed multipart part headers".into())
                })?
        };

        let next = find(body, &delimiter, content_start).ok_or_else(|| {
            ArchiveError::InvalidResponse("unterminated multipart part".into())
        })?;

        let mut content_end = next;
        if content_end > content_start && body[content_end - 1] == b'\n' {
            content_end -= 1;
            if content_end > content_start && body[content_end - 1] == b'\r' {
                content_end -= 1;
            }
        }

        parts.push(body[content_start..content_end].to_vec());
        pos = next;
    }

    Ok(parts)
}

/// 编码单个 DICOM 对象的 multipart/related 请求体
pub fn encode_multipart_related(boundary: &str, content_type: &str, parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(parts.iter().map(|p| p.len() + 128).sum());
    for part in parts {
        out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        out.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        out.extend_from_slice(part);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    out
}
