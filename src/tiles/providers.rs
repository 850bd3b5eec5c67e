//! Tile pixel providers backed by the file system and by HTTP URL templates.
//!
//! Both decode PNG/JPEG/etc. with the `image` crate into RGBA8. A tile that is
//! missing or fails to decode is [`TileDecodeResult::Unavailable`]; the
//! pyramid treats that as "no data at this level" and keeps borrowing.

use crate::tiles::loader::CancelToken;
use crate::tiles::source::{PixelBuffer, TileDecodeResult};
use crate::traits::TilePixelProvider;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::time::Duration;

/// Shared async HTTP client for tile fetches
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("quadtile/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
});

/// Decodes an encoded image into RGBA8 pixels
pub fn decode_image(bytes: &[u8]) -> TileDecodeResult {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let rgba = img.to_rgba8();
            let (width, height) = rgba.dimensions();
            match PixelBuffer::new(width, height, rgba.into_raw()) {
                Ok(pixels) => TileDecodeResult::Pixels(pixels),
                Err(e) => {
                    log::warn!("decoded tile has inconsistent size: {}", e);
                    TileDecodeResult::Unavailable
                }
            }
        }
        Err(e) => {
            log::debug!("tile decode failed: {}", e);
            TileDecodeResult::Unavailable
        }
    }
}

/// Tiles stored as `{root}/{level}/{col}/{row}.{ext}`
#[derive(Debug, Clone)]
pub struct FileTileProvider {
    root: PathBuf,
    extension: String,
}

impl FileTileProvider {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn tile_path(&self, level: u32, row: u32, col: u32) -> PathBuf {
        self.root
            .join(level.to_string())
            .join(col.to_string())
            .join(format!("{}.{}", row, self.extension))
    }
}

impl TilePixelProvider for FileTileProvider {
    fn decode(
        &self,
        level: u32,
        row: u32,
        col: u32,
        cancel: CancelToken,
    ) -> BoxFuture<'_, TileDecodeResult> {
        let path = self.tile_path(level, row, col);
        Box::pin(async move {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return TileDecodeResult::Unavailable;
                }
                Err(e) => {
                    log::warn!("failed to read {}: {}", path.display(), e);
                    return TileDecodeResult::Unavailable;
                }
            };
            if cancel.is_canceled() {
                return TileDecodeResult::Unavailable;
            }
            decode_image(&bytes)
        })
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Tiles fetched over HTTP from a `{z}/{x}/{y}` URL template
///
/// `{z}` is the level, `{x}` the column and `{y}` the row. Rows count
/// northward from the grid origin; for servers that count from the top use
/// [`UrlTemplateProvider::with_flipped_rows`].
#[derive(Debug, Clone)]
pub struct UrlTemplateProvider {
    template: String,
    zero_level_rows: Option<u32>,
    max_retries: usize,
    retry_delay: Duration,
}

impl UrlTemplateProvider {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            zero_level_rows: None,
            max_retries: 2,
            retry_delay: Duration::from_millis(25),
        }
    }

    /// Numbers rows from the north edge, given the row count at level 0
    pub fn with_flipped_rows(mut self, zero_level_rows: u32) -> Self {
        self.zero_level_rows = Some(zero_level_rows);
        self
    }

    pub fn with_retries(mut self, max_retries: usize, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn url(&self, level: u32, row: u32, col: u32) -> String {
        let y = match self.zero_level_rows {
            Some(rows) => (rows << level).saturating_sub(1).saturating_sub(row),
            None => row,
        };
        self.template
            .replace("{z}", &level.to_string())
            .replace("{x}", &col.to_string())
            .replace("{y}", &y.to_string())
    }

    async fn fetch(&self, url: &str, cancel: &CancelToken) -> Option<Vec<u8>> {
        for attempt in 0..=self.max_retries {
            if cancel.is_canceled() {
                return None;
            }
            match HTTP_CLIENT.get(url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => return None,
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => match ok.bytes().await {
                        Ok(bytes) => return Some(bytes.to_vec()),
                        Err(e) => log::debug!("reading {} failed: {}", url, e),
                    },
                    Err(e) => log::debug!("{} returned {}", url, e),
                },
                Err(e) => log::debug!("request to {} failed: {}", url, e),
            }
            if attempt < self.max_retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        log::warn!("giving up on {} after {} attempts", url, self.max_retries + 1);
        None
    }
}

impl TilePixelProvider for UrlTemplateProvider {
    fn decode(
        &self,
        level: u32,
        row: u32,
        col: u32,
        cancel: CancelToken,
    ) -> BoxFuture<'_, TileDecodeResult> {
        Box::pin(async move {
            let url = self.url(level, row, col);
            match self.fetch(&url, &cancel).await {
                Some(bytes) if !cancel.is_canceled() => decode_image(&bytes),
                _ => TileDecodeResult::Unavailable,
            }
        })
    }

    fn name(&self) -> &str {
        "url"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(width, height, Rgba(rgba));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_decode_image() {
        match decode_image(&png(3, 2, [10, 20, 30, 255])) {
            TileDecodeResult::Pixels(px) => {
                assert_eq!((px.width, px.height), (3, 2));
                assert_eq!(&px.data[..4], &[10, 20, 30, 255]);
            }
            TileDecodeResult::Unavailable => panic!("expected pixels"),
        }
        assert_eq!(decode_image(b"not an image"), TileDecodeResult::Unavailable);
    }

    #[test]
    fn test_url_template() {
        let provider = UrlTemplateProvider::new("https://tiles.example/{z}/{x}/{y}.png");
        assert_eq!(provider.url(3, 1, 5), "https://tiles.example/3/5/1.png");

        let flipped = provider.with_flipped_rows(1);
        // level 3 has 8 rows, row 1 from the south is row 6 from the north
        assert_eq!(flipped.url(3, 1, 5), "https://tiles.example/3/5/6.png");
    }

    #[tokio::test]
    async fn test_file_provider() {
        let root = std::env::temp_dir().join(format!("quadtile-tiles-{}", std::process::id()));
        let provider = FileTileProvider::new(&root, "png");
        let path = provider.tile_path(2, 1, 3);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, png(4, 4, [1, 2, 3, 255])).unwrap();

        let found = provider.decode(2, 1, 3, CancelToken::new()).await;
        assert!(matches!(found, TileDecodeResult::Pixels(ref px) if px.width == 4));

        let missing = provider.decode(2, 0, 0, CancelToken::new()).await;
        assert_eq!(missing, TileDecodeResult::Unavailable);

        let _ = std::fs::remove_dir_all(&root);
    }
}
