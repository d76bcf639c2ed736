#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_pseudo(&self) -> bool {
        self.name.starts_with(':')
    }

    /// HTTP/3 field names are sent in lowercase.
    pub fn normalize(&mut self) {
        if self.name.bytes().any(|b| b.is_ascii_uppercase()) {
            self.name = self.name.to_ascii_lowercase();
        }
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}
