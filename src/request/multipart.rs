//! `multipart/form-data` decoding
//!
//! Splits a fully buffered body on its boundary and turns each part into a
//! form field. Parts carrying a `filename` become file uploads.

use hyper::body::Bytes;

use super::params::{FileUpload, ParamValue, Params};

/// One decoded body part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Extract the `boundary` parameter of a multipart content type
pub fn boundary(content_type: &str) -> Option<String> {
    let mut params = split_params(content_type).into_iter();
    let mime = params.next()?;
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|param| parse_param(&param))
        .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// Decode all named parts of `body`
///
/// Parsing stops quietly at the first malformed part; parts read before it
/// are kept.
pub fn parse(body: &Bytes, boundary: &str) -> Vec<Part> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let mut parts = Vec::new();

    let Some(first) = find(body, delimiter, 0) else {
        return parts;
    };
    let mut pos = first + delimiter.len();

    loop {
        // Closing delimiter
        if body[pos..].starts_with(b"--") {
            break;
        }
        pos = skip_line_break(body, pos);

        let Some(headers_end) = find(body, b"\r\n\r\n", pos) else {
            break;
        };
        let headers = String::from_utf8_lossy(&body[pos..headers_end]);
        let data_start = headers_end + 4;

        let mut next_delimiter = Vec::with_capacity(delimiter.len() + 2);
        next_delimiter.extend_from_slice(b"\r\n");
        next_delimiter.extend_from_slice(delimiter);
        let Some(data_end) = find(body, &next_delimiter, data_start) else {
            break;
        };

        if let Some(part) = build_part(&headers, body.slice(data_start..data_end)) {
            parts.push(part);
        }
        pos = data_end + next_delimiter.len();
    }

    parts
}

/// Group parts into form parameters
///
/// A name used by a single part maps to its text, or to a file upload if the
/// part has a filename. A repeated name maps to the text of every part.
pub fn into_params(parts: Vec<Part>) -> Params {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: std::collections::HashMap<String, Vec<Part>> = std::collections::HashMap::new();
    for part in parts {
        if !grouped.contains_key(&part.name) {
            order.push(part.name.clone());
        }
        grouped.entry(part.name.clone()).or_default().push(part);
    }

    let mut params = Params::new();
    for name in order {
        let Some(mut group) = grouped.remove(&name) else {
            continue;
        };
        let value = if group.len() == 1 {
            let part = group.remove(0);
            match part.filename {
                Some(filename) => ParamValue::File(FileUpload {
                    filename,
                    content_type: part.content_type,
                    data: part.data,
                }),
                None => ParamValue::Single(String::from_utf8_lossy(&part.data).into_owned()),
            }
        } else {
            ParamValue::Multiple(
                group
                    .iter()
                    .map(|part| String::from_utf8_lossy(&part.data).into_owned())
                    .collect(),
            )
        };
        params.insert(name, value);
    }
    params
}

fn build_part(headers: &str, data: Bytes) -> Option<Part> {
    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in headers.split("\r\n") {
        let Some((header, value)) = line.split_once(':') else {
            continue;
        };
        let header = header.trim();
        if header.eq_ignore_ascii_case("content-disposition") {
            for (key, value) in split_params(value).iter().skip(1).filter_map(|p| parse_param(p)) {
                if key.eq_ignore_ascii_case("name") {
                    name = Some(value);
                } else if key.eq_ignore_ascii_case("filename") {
                    filename = Some(value);
                }
            }
        } else if header.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    Some(Part {
        name: name?,
        filename,
        content_type,
        data,
    })
}

/// Split a header value on `;` outside of quoted strings
fn split_params(value: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            ';' if !in_quotes => params.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    params.push(current);
    params
}

/// Parse `key=value` or `key="quoted value"`
fn parse_param(param: &str) -> Option<(String, String)> {
    let (key, value) = param.split_once('=')?;
    let value = value.trim();
    let value = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(quoted) => quoted.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    };
    Some((key.trim().to_string(), value))
}

fn skip_line_break(body: &[u8], pos: usize) -> usize {
    if body[pos..].starts_with(b"\r\n") {
        pos + 2
    } else if body[pos..].starts_with(b"\n") {
        pos + 1
    } else {
        pos
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}
