//! Object-storage collaborator.
//!
//! Rendered videos live in an S3-compatible bucket fronted by a public CDN
//! base URL. The core only ever hands out locators like
//! `renders/rz_file_xxx.mp4`; resolving one to a fetchable URL happens here.

#[derive(Debug, Clone)]
pub struct ObjectStore {
    public_base_url: String,
}

impl ObjectStore {
    pub fn new(public_base_url: &str) -> Self {
        Self {
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a resource locator to the URL the download response redirects to.
    pub fn url_for(&self, resource: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url,
            resource.trim_start_matches('/')
        )
    }
}
