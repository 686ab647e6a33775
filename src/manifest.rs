use std::sync::Arc;

use log::warn;
use url::Url;

use crate::config::Conventions;
use crate::error::{PipelineError, PipelineResult};

/// 主播放列表中的一个码率变体
#[derive(Debug, Clone)]
pub struct StreamVariant {
    pub bandwidth: u64,
    pub uri: String,
    pub program_id: Option<String>,
    pub subtitles: Option<String>,
}

/// EXT-X-MEDIA条目
#[derive(Debug, Clone, Default)]
pub struct MediaRecord {
    pub kind: Option<String>,
    pub group_id: Option<String>,
    pub name: Option<String>,
    pub language: Option<String>,
    pub uri: Option<String>,
}

/// 密钥记录：同一密钥在后续分段间共享引用，不复制
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// Epoch label derived from the key URI path, partitions the output tree.
    pub name: String,
    pub uri: String,
    /// Lowercase hex, `0x` marker stripped.
    pub iv: String,
}

/// 媒体分段
#[derive(Debug, Clone)]
pub struct MediaSegment {
    pub url: String,
    /// Trailing numeric token of the filename stem, diagnostics only.
    pub index: String,
    /// None means the segment is unencrypted.
    pub key: Option<Arc<KeyRecord>>,
}

#[derive(Debug, Default)]
pub struct MasterManifest {
    pub variants: Vec<StreamVariant>,
    pub media: Vec<MediaRecord>,
}

#[derive(Debug, Default)]
pub struct MediaManifest {
    pub segments: Vec<MediaSegment>,
    pub keys: Vec<Arc<KeyRecord>>,
}

impl MediaManifest {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

const KEY_TAG: &str = "#EXT-X-KEY:";
const EXTINF_TAG: &str = "#EXTINF:";
const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF:";
const MEDIA_TAG: &str = "#EXT-X-MEDIA:";
const DISCONTINUITY_TAG: &str = "#EXT-X-DISCONTINUITY";

/// 是否为主播放列表
pub fn is_master(text: &str) -> bool {
    text.lines()
        .any(|line| line.trim_start().starts_with(STREAM_INF_TAG))
}

/// 解析主播放列表
pub fn parse_master(text: &str) -> MasterManifest {
    let mut manifest = MasterManifest::default();
    let mut lines = text.lines().map(str::trim).peekable();

    while let Some(line) = lines.next() {
        if let Some(rest) = line.strip_prefix(STREAM_INF_TAG) {
            let attrs = parse_attributes(rest);
            // The variant URI is the immediately following non-tag line.
            let uri = loop {
                match lines.peek().copied() {
                    Some(next) if next.is_empty() => {
                        lines.next();
                    }
                    Some(next) if !next.starts_with('#') => break Some(next.to_string()),
                    _ => break None,
                }
            };
            let bandwidth = attr_value(&attrs, "bandwidth").and_then(|v| v.parse::<u64>().ok());
            match (bandwidth, uri) {
                (Some(bandwidth), Some(uri)) => {
                    lines.next();
                    manifest.variants.push(StreamVariant {
                        bandwidth,
                        uri,
                        program_id: attr_value(&attrs, "program-id"),
                        subtitles: attr_value(&attrs, "subtitles"),
                    });
                }
                _ => warn!("Skipping malformed STREAM-INF line: {}", line),
            }
        } else if let Some(rest) = line.strip_prefix(MEDIA_TAG) {
            let attrs = parse_attributes(rest);
            manifest.media.push(MediaRecord {
                kind: attr_value(&attrs, "type"),
                group_id: attr_value(&attrs, "group-id"),
                name: attr_value(&attrs, "name"),
                language: attr_value(&attrs, "language"),
                uri: attr_value(&attrs, "uri"),
            });
        }
    }

    manifest
}

/// 解析媒体播放列表
///
/// Scans lines with a current-key slot; stops at the first discontinuity
/// marker since content past it no longer pairs with the collected keys.
pub fn parse_media(text: &str, conventions: &Conventions) -> PipelineResult<MediaManifest> {
    let mut manifest = MediaManifest::default();
    let mut current_key: Option<Arc<KeyRecord>> = None;
    let mut lines = text.lines().map(str::trim);

    'scan: while let Some(line) = lines.next() {
        if let Some(rest) = line.strip_prefix(KEY_TAG) {
            let attrs = parse_attributes(rest);
            let uri = attr_value(&attrs, "uri")
                .ok_or_else(|| PipelineError::Parse(format!("EXT-X-KEY without URI: {}", line)))?;
            let iv = attr_value(&attrs, "iv")
                .ok_or_else(|| PipelineError::Parse(format!("EXT-X-KEY without IV: {}", line)))?;
            if conventions.is_sentinel(&uri) {
                // Filler-asset key; its segments are dropped by their own URL
                // match, the previous key stays current.
                continue;
            }
            let iv = iv
                .strip_prefix("0x")
                .or_else(|| iv.strip_prefix("0X"))
                .unwrap_or(&iv)
                .to_ascii_lowercase();
            let record = Arc::new(KeyRecord {
                name: derive_key_name(&uri, conventions),
                uri,
                iv,
            });
            manifest.keys.push(Arc::clone(&record));
            current_key = Some(record);
        } else if let Some(rest) = line.strip_prefix(EXTINF_TAG) {
            let duration = rest.split(',').next().unwrap_or("").trim();
            duration.parse::<f64>().map_err(|_| {
                PipelineError::Parse(format!("bad EXTINF duration: {}", line))
            })?;
            // The next non-tag line is the segment URL.
            let url = loop {
                match lines.next() {
                    Some(next) if next.is_empty() => continue,
                    Some(next) if next == DISCONTINUITY_TAG => break 'scan,
                    Some(next) if next.starts_with('#') => continue,
                    Some(next) => break next,
                    None => {
                        return Err(PipelineError::Parse(
                            "EXTINF with no following segment URL".to_string(),
                        ))
                    }
                }
            };
            if conventions.is_sentinel(url) {
                continue;
            }
            manifest.segments.push(MediaSegment {
                url: url.to_string(),
                index: index_from_url(url),
                key: current_key.clone(),
            });
        } else if line == DISCONTINUITY_TAG {
            break;
        }
    }

    Ok(manifest)
}

/// 选择码率最高的变体，并列时取manifest中先出现的
pub fn select_variant(variants: &[StreamVariant]) -> Option<&StreamVariant> {
    let mut best: Option<&StreamVariant> = None;
    for variant in variants {
        match best {
            Some(current) if variant.bandwidth <= current.bandwidth => {}
            _ => best = Some(variant),
        }
    }
    best
}

/// 解析ATTR=value属性串，键小写，值剥去一层引号
fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    let mut push_piece = |piece: &str, attrs: &mut Vec<(String, String)>| {
        if let Some((key, value)) = piece.split_once('=') {
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            attrs.push((key, value.to_string()));
        }
    };

    for (i, c) in raw.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                push_piece(raw[start..i].trim(), &mut attrs);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < raw.len() {
        push_piece(raw[start..].trim(), &mut attrs);
    }

    attrs
}

fn attr_value(attrs: &[(String, String)], key: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

/// 从密钥URI推导epoch名称（部署约定，见config::Conventions）
fn derive_key_name(uri: &str, conventions: &Conventions) -> String {
    let segments: Vec<String> = match Url::parse(uri) {
        Ok(url) => url
            .path_segments()
            .map(|parts| {
                parts
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        Err(_) => uri
            .split(['?', '#'])
            .next()
            .unwrap_or(uri)
            .split('/')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    };

    let segment = match segments
        .get(conventions.key_name_segment)
        .or_else(|| segments.last())
    {
        Some(segment) => segment,
        None => return "key".to_string(),
    };

    match segment.get(conventions.key_name_offset..) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => segment.clone(),
    }
}

/// 提取文件名主干中最后一个`-`之后的序号
fn index_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => file,
    };
    match stem.rsplit_once('-') {
        Some((_, index)) => index.to_string(),
        None => String::new(),
    }
}
