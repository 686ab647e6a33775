use anyhow::Result;
use log::{debug, warn};
use reqwest::{Client, header::{HeaderMap, HeaderName, HeaderValue}};
use std::time::Duration;
use url::Url;

use crate::error::{PipelineError, PipelineResult};

/// 构建HTTP客户端，包含自定义请求头
pub fn build_http_client(custom_headers: &[String]) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "User-Agent",
        HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36")
    );

    for header in custom_headers {
        if let Some((key, value)) = header.split_once(':') {
            let header_name = HeaderName::from_bytes(key.trim().as_bytes())?;
            let header_value = HeaderValue::from_str(value.trim())?;
            headers.insert(header_name, header_value);
        } else {
            warn!("Ignoring malformed header: {}", header);
        }
    }

    debug!("Using HTTP headers: {:?}", headers);

    let client = Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(30))
        .build()?;

    Ok(client)
}

/// 抓取UTF-8文本（manifest）
pub async fn fetch_text(client: &Client, url: &Url) -> PipelineResult<String> {
    let response = send_checked(client, url).await?;
    response
        .text()
        .await
        .map_err(|e| PipelineError::download(url.as_str(), e))
}

/// 抓取原始字节（密钥、分段密文）
pub async fn fetch_bytes(client: &Client, url: &Url) -> PipelineResult<Vec<u8>> {
    let response = send_checked(client, url).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::download(url.as_str(), e))?;
    Ok(bytes.to_vec())
}

async fn send_checked(client: &Client, url: &Url) -> PipelineResult<reqwest::Response> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| PipelineError::download(url.as_str(), e))?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::download(
            url.as_str(),
            format!("unexpected status {}", status),
        ));
    }
    Ok(response)
}
