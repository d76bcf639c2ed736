use url::Url;

/// A parsed request URL. Construction goes through
/// [`parse_target`](crate::utils::parse_target), which guarantees a host and
/// a port.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: Url,
}

impl Target {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host as written in the URL; IPv6 literals keep their brackets.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Host in the form a resolver or TLS server name expects.
    pub fn dial_host(&self) -> Option<&str> {
        self.host()
            .map(|h| h.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(h))
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    /// `:authority` value. Default ports are left out.
    pub fn authority(&self) -> Option<String> {
        let host = self.host()?;
        Some(match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// `:path` value: path plus query, never empty.
    pub fn path(&self) -> String {
        let mut value = match self.url.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };
        if let Some(query) = self.url.query() {
            value.push('?');
            value.push_str(query);
        }
        value
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}
