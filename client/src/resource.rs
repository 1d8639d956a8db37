use core::fmt;

use url::Url;

use crate::error::{Error, Result};

const SEP: char = '/';

/// Service endpoint URL built up from a base address.
#[derive(Clone)]
pub struct Resource {
    url: Url,
}

impl Resource {
    /// Parses a service base address.
    pub fn new(uri: &str) -> Result<Resource> {
        let url = Url::parse(uri)
            .map_err(|e| Error::Configuration(format!("invalid service address '{uri}': {e}")))?;
        if url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "service address '{uri}' cannot be a base"
            )));
        }
        Ok(Resource { url })
    }

    /// Appends a slash separated path. Empty segments are dropped and a trailing
    /// slash of `path` is kept.
    pub fn append_path(&mut self, path: &str) -> &mut Self {
        let mut segments: Vec<String> = self
            .url
            .path_segments()
            .map(|s| s.filter(|x| !x.is_empty()).map(str::to_owned).collect())
            .unwrap_or_default();
        segments.extend(
            path.split(SEP)
                .filter(|x| !x.is_empty())
                .map(str::to_owned),
        );

        let mut joined = segments.join("/");
        if path.ends_with(SEP) {
            joined.push(SEP);
        }
        self.url.set_path(&joined);
        self
    }

    /// Appends one path segment, escaping separators and reserved characters inside it.
    pub fn append_segment(&mut self, segment: &str) -> &mut Self {
        let escaped = url_escape::encode_component(segment);
        self.append_path(&escaped)
    }

    pub fn append_query(&mut self, name: &str, value: &str) -> &mut Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}
