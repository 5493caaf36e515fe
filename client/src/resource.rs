use core::fmt;
use url::Url;

/// Server endpoint built from a base URI and path segments.
#[derive(Clone)]
pub struct Resource {
    url: Url,
}

impl Resource {
    /// `None` for URIs that cannot carry a path, like `mailto:` ones.
    #[must_use]
    pub fn new(uri: &str) -> Option<Resource> {
        let url = Url::parse(uri).ok()?;
        if url.cannot_be_a_base() {
            return None;
        }
        Some(Resource { url })
    }

    /// Appends one literal segment, percent-encoding anything that would
    /// change the path structure (`/`, `?`, `#`, spaces).
    pub fn append_segment(&mut self, segment: &str) -> &mut Self {
        if let Ok(mut segments) = self.url.path_segments_mut() {
            segments.pop_if_empty().push(segment);
        }
        self
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
