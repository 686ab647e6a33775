use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::config::Conventions;

/// Archives stitched HLS streams: fetches the manifest, decrypts the
/// AES-128 segments and persists them for later reassembly.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group = ArgGroup::new("source").required(true).args(["url", "boot_url"]))]
pub struct Args {
    /// The manifest URL to archive (master or media playlist).
    #[arg(short, long)]
    pub url: Option<String>,

    /// Session bootstrap endpoint returning the stitcher URL and token.
    #[arg(short, long)]
    pub boot_url: Option<String>,

    /// Show label used as the root of the output tree.
    #[arg(short, long)]
    pub show: String,

    /// Directory to save decrypted segments.
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Polling interval in seconds; 0 runs the pipeline once and exits.
    #[arg(short, long, default_value_t = 0)]
    pub interval: u64,

    /// Filler-asset marker(s); matching key URIs and segment URLs are dropped.
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub excludes: Vec<String>,

    /// Path segment of the key URI holding the epoch label (0-based).
    #[arg(long, default_value_t = 5)]
    pub key_name_segment: usize,

    /// Characters to skip inside that segment.
    #[arg(long, default_value_t = 3)]
    pub key_name_offset: usize,

    /// Custom HTTP header(s). E.g., -H "Cookie: mycookie"
    #[arg(short = 'H', long = "header", action = clap::ArgAction::Append)]
    pub headers: Vec<String>,
}

impl Args {
    /// 组装源站约定；未指定--exclude时保留默认sentinel
    pub fn conventions(&self) -> Conventions {
        let mut conventions = Conventions {
            key_name_segment: self.key_name_segment,
            key_name_offset: self.key_name_offset,
            ..Conventions::default()
        };
        if !self.excludes.is_empty() {
            conventions.sentinels = self.excludes.clone();
        }
        conventions
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}
