use std::fmt;

/// Hierarchical cache key, e.g. `["arrivals", "list", "page=1"]`.
///
/// Keys are compared segment-wise, so `["arrivals", "detail", "4"]` is not a
/// prefix of `["arrivals", "detail", "42"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// This key extended by one segment.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Parse a `/`-separated key such as `"arrivals/list"`.
impl From<&str> for QueryKey {
    fn from(path: &str) -> Self {
        Self::new(path.split('/').filter(|s| !s.is_empty()))
    }
}

impl<const N: usize> From<[&str; N]> for QueryKey {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}
