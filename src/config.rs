use std::collections::BTreeSet;

/// Configuration shared by the catalog, mutation, and thumbnail components.
///
/// Constructed once at startup and passed into each component; nothing in
/// the crate reads configuration from ambient state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL prepended to raw keys when deriving public icon URLs.
    /// May be empty, in which case URLs are root-relative.
    pub public_base: String,

    /// Reserved key the manifest is persisted under. Never a valid
    /// upload, rename, or delete target.
    pub manifest_key: String,

    /// Lowercased extensions (without the dot) that count as images.
    pub allowed_extensions: BTreeSet<String>,

    /// Catalog title, copied verbatim into the manifest.
    pub title: String,

    /// Catalog description, copied verbatim into the manifest.
    pub description: String,

    /// Keys requested per `list` page during a catalog rebuild.
    pub list_page_size: usize,

    /// Hard bound on `list` pages per rebuild. Exceeding it fails the
    /// rebuild rather than producing a partial manifest.
    pub max_list_pages: usize,

    /// Approximate byte budget for the thumbnail edge cache.
    pub thumb_cache_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            public_base: String::new(),
            manifest_key: "icons.json".to_string(),
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            title: "Icons".to_string(),
            description: "Derived index of the stored icons".to_string(),
            list_page_size: 1000,
            max_list_pages: 64,
            thumb_cache_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Public URL for a stored key: the base joined with the raw key,
    /// not re-encoded.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base.trim_end_matches('/'), key)
    }
}
