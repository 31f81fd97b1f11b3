//! Parser for the CLI's indented `Key: Value` detail blocks.

use std::collections::HashMap;

/// Parse `show detail`-style output into a key/value map.
///
/// Only indented lines of the form `  Key: Value` participate; section
/// headers and anything else are ignored. There is no error path: malformed
/// lines simply do not populate the map, and callers check for the keys they
/// need.
///
/// ```
/// use bmctty::parse_detail;
///
/// let details = parse_detail("Chassis:\n Power: on\n Serial Number: ABC123\n");
/// assert_eq!(details.get("Power").map(String::as_str), Some("on"));
/// assert_eq!(details.get("Serial Number").map(String::as_str), Some("ABC123"));
/// assert!(!details.contains_key("Chassis"));
/// ```
pub fn parse_detail(data: &str) -> HashMap<String, String> {
    let mut details = HashMap::new();
    for line in data.lines() {
        if !line.starts_with(' ') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            details.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chassis_block() {
        let data = "Chassis:\n    Power: on\n    Serial Number: WZP2326007Q\n    Product Name:\n";
        let details = parse_detail(data);
        assert_eq!(details.get("Power").map(String::as_str), Some("on"));
        assert_eq!(
            details.get("Serial Number").map(String::as_str),
            Some("WZP2326007Q")
        );
        assert_eq!(details.get("Product Name").map(String::as_str), Some(""));
    }

    #[test]
    fn test_headers_ignored() {
        let details = parse_detail("Chassis:\n Power: on\n");
        assert!(!details.contains_key("Chassis"));
        assert_eq!(details.len(), 1);
    }

    #[test]
    fn test_value_keeps_embedded_separators() {
        let details = parse_detail(" UUID: 13AA6335:143A:4FBE\n");
        assert_eq!(details.get("UUID").map(String::as_str), Some("13AA6335:143A:4FBE"));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let details = parse_detail(" no separator here\nTop: level\n");
        assert!(details.is_empty());
    }
}
