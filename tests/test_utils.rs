use riph3::types::Header;
use riph3::utils::{header_value, is_connection_specific};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let headers = vec![
            Header::new("content-type", "text/html"),
            Header::new("x-a", "1"),
            Header::new("X-A", "2"),
        ];
        assert_eq!(header_value(&headers, "Content-Type"), Some("text/html"));
        assert_eq!(header_value(&headers, "x-a"), Some("1"));
        assert_eq!(header_value(&headers, "missing"), None);
    }

    #[test]
    fn test_connection_specific_headers() {
        for name in ["Connection", "keep-alive", "Transfer-Encoding", "upgrade", "proxy-connection"] {
            assert!(is_connection_specific(name), "{}", name);
        }
        assert!(!is_connection_specific("te"));
        assert!(!is_connection_specific("content-type"));
    }
}
