use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::Conventions;
use crate::crypto::{decrypt_data, normalize_key, parse_iv};
use crate::error::{PipelineError, PipelineResult};
use crate::http::fetch_bytes;
use crate::manifest::{self, MediaSegment};

/// 单次process调用的统计结果
#[derive(Debug, Default)]
pub struct ProcessSummary {
    pub written: usize,
    pub skipped: usize,
    pub failures: Vec<(String, PipelineError)>,
}

impl ProcessSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.written + self.skipped + self.failures.len()
    }
}

enum Outcome {
    Written,
    Skipped,
}

/// 分段解密落盘引擎
///
/// Output paths are a pure function of (show, key name, segment URL), so a
/// re-run against an overlapping manifest skips everything already on disk.
pub struct SegmentDecryptor {
    client: Arc<Client>,
    output_root: PathBuf,
    base_url: Option<Url>,
    conventions: Conventions,
}

impl SegmentDecryptor {
    pub fn new(
        client: Arc<Client>,
        output_root: PathBuf,
        base_url: Option<Url>,
        conventions: Conventions,
    ) -> Self {
        SegmentDecryptor {
            client,
            output_root,
            base_url,
            conventions,
        }
    }

    /// 处理媒体播放列表：逐段取回、解密并写盘
    ///
    /// Segments are handled strictly in manifest order, one at a time. A
    /// failed segment is logged and counted, the scan continues; callers
    /// decide what a non-empty failure list means for the run.
    pub async fn process(&self, media_text: &str, show: &str) -> PipelineResult<ProcessSummary> {
        let playlist = manifest::parse_media(media_text, &self.conventions)?;
        let mut summary = ProcessSummary::default();

        if playlist.is_empty() {
            info!("No segments to materialize for {}. Nothing to do.", show);
            return Ok(summary);
        }

        info!(
            "Processing {} segments ({} keys) for {}",
            playlist.segments.len(),
            playlist.keys.len(),
            show
        );

        let pb = ProgressBar::new(playlist.segments.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );

        // Key bytes live only for this invocation, deduplicated by URI.
        let mut key_cache: HashMap<String, Vec<u8>> = HashMap::new();

        for segment in &playlist.segments {
            match self.handle_segment(segment, show, &mut key_cache).await {
                Ok(Outcome::Written) => summary.written += 1,
                Ok(Outcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!("Segment {} failed: {}", segment.url, e);
                    summary.failures.push((segment.url.clone(), e));
                }
            }
            pb.inc(1);
        }
        pb.finish_with_message("processed");

        Ok(summary)
    }

    /// 处理单个分段：跳过已存在的文件，其余取回-解密-写入
    async fn handle_segment(
        &self,
        segment: &MediaSegment,
        show: &str,
        key_cache: &mut HashMap<String, Vec<u8>>,
    ) -> PipelineResult<Outcome> {
        let path = self.output_path(show, segment);
        if fs::metadata(&path).await.is_ok() {
            debug!("Segment {:?} already exists. Skipping.", path);
            return Ok(Outcome::Skipped);
        }

        let url = self.resolve_url(&segment.url)?;
        let body = fetch_bytes(&self.client, &url).await?;

        let plaintext = match &segment.key {
            Some(key) => {
                let key_bytes = self.resolve_key(&key.uri, key_cache).await?;
                let iv = parse_iv(&key.iv)?;
                decrypt_data(&body, &key_bytes, &iv)?
            }
            None => body,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&path).await?;
        file.write_all(&plaintext).await?;

        Ok(Outcome::Written)
    }

    /// 取回并缓存密钥字节（按URI去重，单次process内有效）
    async fn resolve_key(
        &self,
        key_uri: &str,
        key_cache: &mut HashMap<String, Vec<u8>>,
    ) -> PipelineResult<Vec<u8>> {
        if let Some(bytes) = key_cache.get(key_uri) {
            return Ok(bytes.clone());
        }
        let key_url = self.resolve_url(key_uri)?;
        debug!("Fetching key from {}", key_url);
        let fetched = fetch_bytes(&self.client, &key_url).await?;
        let bytes = normalize_key(&fetched)?;
        key_cache.insert(key_uri.to_string(), bytes.clone());
        Ok(bytes)
    }

    /// 推导确定性输出路径: {show}/{key.name|clear}/{父目录}/{文件名}
    fn output_path(&self, show: &str, segment: &MediaSegment) -> PathBuf {
        let epoch = segment
            .key
            .as_ref()
            .map(|k| k.name.as_str())
            .unwrap_or("clear");
        let (subdir, file) = url_tail(&segment.url);
        let mut path = self.output_root.join(show).join(epoch);
        if let Some(subdir) = subdir {
            path = path.join(subdir);
        }
        path.join(file)
    }

    fn resolve_url(&self, raw: &str) -> PipelineResult<Url> {
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(_) => match &self.base_url {
                Some(base) => base
                    .join(raw)
                    .map_err(|e| PipelineError::download(raw, format!("cannot resolve URL: {}", e))),
                None => Err(PipelineError::download(raw, "relative URL with no base URL")),
            },
        }
    }
}

/// 从分段URL提取 (父目录, 文件名)，查询串剥离，路径遍历成分过滤
fn url_tail(url: &str) -> (Option<String>, String) {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => without_query,
    };
    let parts: Vec<&str> = path
        .split('/')
        .filter(|p| !p.is_empty() && *p != "." && *p != "..")
        .collect();
    let file = parts.last().copied().unwrap_or("segment").to_string();
    let subdir = (parts.len() >= 2).then(|| parts[parts.len() - 2].to_string());
    (subdir, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::KeyRecord;

    fn decryptor(root: &str) -> SegmentDecryptor {
        SegmentDecryptor::new(
            Arc::new(Client::new()),
            PathBuf::from(root),
            Some(Url::parse("https://cdn.example.com/drama/ep1/index.m3u8").unwrap()),
            Conventions::default(),
        )
    }

    fn keyed_segment(url: &str, name: &str) -> MediaSegment {
        MediaSegment {
            url: url.to_string(),
            index: String::new(),
            key: Some(Arc::new(KeyRecord {
                name: name.to_string(),
                uri: "https://keys.example.com/k".to_string(),
                iv: "00000000000000000000000000000000".to_string(),
            })),
        }
    }

    #[test]
    fn test_url_tail_splits_dir_and_file() {
        let (subdir, file) = url_tail("https://cdn.example.com/drama/ep1/seg-0.ts?tok=a");
        assert_eq!(subdir.as_deref(), Some("ep1"));
        assert_eq!(file, "seg-0.ts");

        let (subdir, file) = url_tail("seg-1.ts");
        assert_eq!(subdir, None);
        assert_eq!(file, "seg-1.ts");
    }

    #[test]
    fn test_url_tail_drops_traversal_components() {
        let (subdir, file) = url_tail("https://cdn.example.com/a/../seg-0.ts");
        assert_eq!(subdir.as_deref(), Some("a"));
        assert_eq!(file, "seg-0.ts");
    }

    #[test]
    fn test_output_path_is_deterministic() {
        let d = decryptor("out");
        let segment = keyed_segment("https://cdn.example.com/drama/ep1/seg-0.ts", "20260101");
        let first = d.output_path("myshow", &segment);
        assert_eq!(
            first,
            PathBuf::from("out/myshow/20260101/ep1/seg-0.ts")
        );
        assert_eq!(first, d.output_path("myshow", &segment));
    }

    #[test]
    fn test_output_path_clear_for_unkeyed() {
        let d = decryptor("out");
        let segment = MediaSegment {
            url: "https://cdn.example.com/drama/ep1/seg-3.ts".to_string(),
            index: "3".to_string(),
            key: None,
        };
        assert_eq!(
            d.output_path("myshow", &segment),
            PathBuf::from("out/myshow/clear/ep1/seg-3.ts")
        );
    }

    #[test]
    fn test_resolve_url_joins_relative_against_base() {
        let d = decryptor("out");
        let url = d.resolve_url("seg-5.ts").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/drama/ep1/seg-5.ts");
        let absolute = d.resolve_url("https://other.example.com/x/seg.ts").unwrap();
        assert_eq!(absolute.as_str(), "https://other.example.com/x/seg.ts");
    }
}
