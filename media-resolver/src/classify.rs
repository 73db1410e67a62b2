//! Decides whether a post links to an image, a video, or neither.
//!
//! Image rules are checked first, so a URL matching both (an `i.redd.it`
//! gif, say) is sent as a photo.

use relay_core::{CandidatePost, MediaKind};
use url::Url;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif"];
const IMAGE_HOSTS: &[&str] = &["i.redd.it", "imgur.com"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm"];
const VIDEO_HOSTS: &[&str] = &["redgifs.com", "v.redd.it"];

pub const REDGIFS_HOST: &str = "redgifs.com";

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map_or(false, |prefix| prefix.ends_with('.'))
}

/// Parsed view of a URL; `None` fields mean the URL did not parse.
struct UrlParts {
    host: Option<String>,
    path: Option<String>,
    raw: String,
}

impl UrlParts {
    fn new(url: &str) -> Self {
        let parsed = Url::parse(url.trim()).ok();
        Self {
            host: parsed
                .as_ref()
                .and_then(|u| u.host_str())
                .map(|h| h.to_ascii_lowercase()),
            path: parsed.as_ref().map(|u| u.path().to_ascii_lowercase()),
            raw: url.trim().to_ascii_lowercase(),
        }
    }

    fn has_extension(&self, extensions: &[&str]) -> bool {
        let target = self.path.as_deref().unwrap_or(&self.raw);
        extensions.iter().any(|ext| target.ends_with(ext))
    }

    fn on_host(&self, domains: &[&str]) -> bool {
        match &self.host {
            Some(host) => domains.iter().any(|domain| host_matches(host, domain)),
            None => domains.iter().any(|domain| self.raw.contains(domain)),
        }
    }
}

pub fn is_image_url(url: &str) -> bool {
    let parts = UrlParts::new(url);
    parts.has_extension(IMAGE_EXTENSIONS) || parts.on_host(IMAGE_HOSTS)
}

pub fn is_video_url(url: &str, is_video: Option<bool>) -> bool {
    if is_video.unwrap_or(false) {
        return true;
    }
    let parts = UrlParts::new(url);
    parts.has_extension(VIDEO_EXTENSIONS) || parts.on_host(VIDEO_HOSTS)
}

pub fn is_redgifs_url(url: &str) -> bool {
    UrlParts::new(url).on_host(&[REDGIFS_HOST])
}

pub fn classify(url: &str, is_video: Option<bool>) -> Option<MediaKind> {
    if is_image_url(url) {
        Some(MediaKind::Image)
    } else if is_video_url(url, is_video) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

pub fn classify_post(post: &CandidatePost) -> Option<MediaKind> {
    classify(&post.url, post.is_video)
}
