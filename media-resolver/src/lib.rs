pub mod classify;
pub mod download;
pub mod redgifs;
pub mod resolver;

pub use classify::{classify, classify_post, is_image_url, is_redgifs_url, is_video_url};
pub use download::{media_filename, MediaDownloader};
pub use redgifs::{
    extract_gif_id, RedgifsClient, REDGIFS_API_BASE, REDGIFS_REFRESH_MARGIN,
    REDGIFS_TOKEN_LIFETIME,
};
pub use resolver::MediaResolver;

use relay_core::TokenCache;
use std::sync::Arc;

/// Shared Redgifs token cache with the standard lifetime and margin.
pub fn redgifs_token_cache(client: RedgifsClient) -> Arc<TokenCache<RedgifsClient>> {
    Arc::new(TokenCache::new(
        client,
        REDGIFS_TOKEN_LIFETIME,
        REDGIFS_REFRESH_MARGIN,
    ))
}
