/// What gets posted: a caption and a publicly reachable image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub caption: String,
    pub image_url: String,
}

/// Platform identifiers for a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub platform_post_id: String,
    pub url: Option<String>,
}
