/// 源站约定：密钥命名规则和需要排除的填充资源标识
///
/// The key-name rule is a per-deployment URL convention, not generic URL
/// parsing, so it lives here instead of in the parser.
#[derive(Debug, Clone)]
pub struct Conventions {
    /// 0-based index into the key URI's path segments holding the epoch label.
    pub key_name_segment: usize,
    /// Characters to skip inside that segment (label prefix length).
    pub key_name_offset: usize,
    /// Filler-asset markers; matching key URIs and segment URLs are dropped.
    pub sentinels: Vec<String>,
}

impl Default for Conventions {
    fn default() -> Self {
        Conventions {
            key_name_segment: 5,
            key_name_offset: 3,
            sentinels: vec![
                "creative/slate".to_string(),
                "creative/bumper".to_string(),
            ],
        }
    }
}

impl Conventions {
    /// 判断URI是否为填充资源
    pub fn is_sentinel(&self, uri: &str) -> bool {
        self.sentinels.iter().any(|s| uri.contains(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_match_is_substring() {
        let conv = Conventions::default();
        assert!(conv.is_sentinel("https://cdn.example.com/creative/slate/seg-0.ts"));
        assert!(conv.is_sentinel("https://keys.example.com/v2/creative/bumper/aes.key"));
        assert!(!conv.is_sentinel("https://cdn.example.com/show/ep1/seg-0.ts"));
    }

    #[test]
    fn test_custom_sentinels_replace_defaults() {
        let conv = Conventions {
            sentinels: vec!["/filler/".to_string()],
            ..Conventions::default()
        };
        assert!(conv.is_sentinel("https://cdn.example.com/filler/a.ts"));
        assert!(!conv.is_sentinel("https://cdn.example.com/creative/slate/a.ts"));
    }
}
