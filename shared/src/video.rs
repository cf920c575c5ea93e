use serde::{Deserialize, Serialize};
use thiserror::Error;

const YOUTUBE_ID_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "youtube")]
    YouTube,
    #[serde(rename = "youtube_short")]
    YouTubeShort,
    #[serde(rename = "tiktok")]
    TikTok,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::YouTubeShort => "youtube_short",
            Platform::TikTok => "tiktok",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "youtube" => Some(Platform::YouTube),
            "youtube_short" => Some(Platform::YouTubeShort),
            "tiktok" => Some(Platform::TikTok),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoRefError {
    #[error("not a YouTube or TikTok URL")]
    UnsupportedHost,
    #[error("could not find a video id in the URL")]
    MissingId,
}

/// Content reference held by a claimed cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoRef {
    pub platform: Platform,
    pub video_id: String,
}

impl VideoRef {
    pub fn new(platform: Platform, video_id: impl Into<String>) -> Self {
        Self {
            platform,
            video_id: video_id.into(),
        }
    }

    /// Detect platform and id from a submitted video URL.
    pub fn parse(url: &str) -> Result<Self, VideoRefError> {
        let url = url.trim();
        if url.contains("tiktok.com") {
            return tiktok_id(url)
                .map(|id| VideoRef::new(Platform::TikTok, id))
                .ok_or(VideoRefError::MissingId);
        }
        if !(url.contains("youtube.com") || url.contains("youtu.be")) {
            return Err(VideoRefError::UnsupportedHost);
        }
        let id = youtube_id(url).ok_or(VideoRefError::MissingId)?;
        let platform = if url.contains("youtube.com/shorts/") {
            Platform::YouTubeShort
        } else {
            Platform::YouTube
        };
        Ok(VideoRef::new(platform, id))
    }

    pub fn watch_url(&self) -> String {
        match self.platform {
            Platform::YouTube => format!("https://youtube.com/watch?v={}", self.video_id),
            Platform::YouTubeShort => format!("https://youtube.com/shorts/{}", self.video_id),
            Platform::TikTok => format!("https://www.tiktok.com/@/video/{}", self.video_id),
        }
    }

    pub fn embed_url(&self) -> String {
        match self.platform {
            Platform::YouTube | Platform::YouTubeShort => {
                format!("https://www.youtube.com/embed/{}", self.video_id)
            }
            Platform::TikTok => format!("https://www.tiktok.com/embed/v2/{}", self.video_id),
        }
    }

    /// Static thumbnail URL. TikTok has none; those tiles render as placeholders.
    pub fn thumbnail_url(&self) -> Option<String> {
        match self.platform {
            Platform::YouTube | Platform::YouTubeShort => Some(format!(
                "https://img.youtube.com/vi/{}/mqdefault.jpg",
                self.video_id
            )),
            Platform::TikTok => None,
        }
    }
}

fn is_youtube_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn take_while(rest: &str, pred: fn(char) -> bool) -> &str {
    let end = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
    &rest[..end]
}

fn youtube_id(url: &str) -> Option<String> {
    const MARKERS: [&str; 4] = [
        "youtube.com/watch?v=",
        "youtube.com/embed/",
        "youtube.com/shorts/",
        "youtu.be/",
    ];
    MARKERS.iter().find_map(|marker| {
        let start = url.find(marker)? + marker.len();
        let candidate = take_while(&url[start..], is_youtube_id_char);
        (candidate.len() >= YOUTUBE_ID_LEN).then(|| candidate[..YOUTUBE_ID_LEN].to_string())
    })
}

fn tiktok_id(url: &str) -> Option<String> {
    if let Some(start) = url.find("tiktok.com/@") {
        let rest = &url[start + "tiktok.com/@".len()..];
        let user = take_while(rest, |c| is_word_char(c) || c == '.' || c == '-');
        let after_user = &rest[user.len()..];
        if !user.is_empty()
            && let Some(tail) = after_user.strip_prefix("/video/")
        {
            let id = take_while(tail, is_word_char);
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }
    for marker in ["tiktok.com/t/", "vm.tiktok.com/"] {
        if let Some(start) = url.find(marker) {
            let id = take_while(&url[start + marker.len()..], is_word_char);
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }
    None
}
