//! Candidate parser for `host:port#CC` lines

use crate::error::ParseError;
use crate::proxy::models::Candidate;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::trace;

/// Port most candidate lists are filtered on
pub const DEFAULT_REQUIRED_PORT: u16 = 443;

/// Trailing `#CC` country tag
static COUNTRY_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([A-Z]{2})$").expect("Invalid country regex"));

/// Parser turning candidate list text into [`Candidate`]s
#[derive(Debug, Clone)]
pub struct CandidateParser {
    required_port: Option<u16>,
}

impl Default for CandidateParser {
    fn default() -> Self {
        Self {
            required_port: Some(DEFAULT_REQUIRED_PORT),
        }
    }
}

impl CandidateParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept candidates on any port
    pub fn any_port() -> Self {
        Self {
            required_port: None,
        }
    }

    pub fn with_required_port(mut self, port: Option<u16>) -> Self {
        self.required_port = port;
        self
    }

    pub fn required_port(&self) -> Option<u16> {
        self.required_port
    }

    /// Parse a single line, dropping it silently when malformed
    pub fn parse_line(&self, line: &str) -> Option<Candidate> {
        match self.try_parse_line(line) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                trace!(line, reason = %e, "dropping candidate line");
                None
            }
        }
    }

    /// Parse a single line
    ///
    /// Accepted shape: `HOST:PORT#CC`, optionally with extra `#`-separated
    /// annotations between the address and the trailing country code.
    pub fn try_parse_line(&self, line: &str) -> std::result::Result<Candidate, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        if line.starts_with('#') {
            return Err(ParseError::Comment);
        }
        if line.contains("***") || line.contains("...") {
            return Err(ParseError::Masked);
        }

        let country = COUNTRY_REGEX
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(ParseError::MissingCountry)?;

        let address_part = line.split('#').next().unwrap_or_default().trim();
        let (host, port) = address_part
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedAddress(address_part.to_string()))?;

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(ParseError::MalformedAddress(address_part.to_string()));
        }
        let port: u16 = port
            .parse()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| ParseError::MalformedAddress(address_part.to_string()))?;

        if let Some(required) = self.required_port {
            if port != required {
                return Err(ParseError::PortFiltered {
                    found: port,
                    required,
                });
            }
        }

        Ok(Candidate::new(
            format!("{}:{}", host, port),
            country,
            line.to_string(),
        ))
    }

    /// Parse candidates from a string (multiple lines)
    pub fn parse_string(&self, content: &str) -> Vec<Candidate> {
        content
            .lines()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// Parse candidates from a file
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Candidate>> {
        let content = fs::read_to_string(path)?;
        Ok(self.parse_string(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_line() {
        let candidate = CandidateParser::new().parse_line("1.1.1.1:443#US").unwrap();
        assert_eq!(candidate.address, "1.1.1.1:443");
        assert_eq!(candidate.country, "US");
        assert_eq!(candidate.raw_line, "1.1.1.1:443#US");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let candidate = CandidateParser::new()
            .parse_line("  8.8.8.8:443#NL \r")
            .unwrap();
        assert_eq!(candidate.address, "8.8.8.8:443");
        assert_eq!(candidate.raw_line, "8.8.8.8:443#NL");
    }

    #[test]
    fn test_parse_with_extra_annotation() {
        let candidate = CandidateParser::new()
            .parse_line("5.6.7.8:443#Cloud#JP")
            .unwrap();
        assert_eq!(candidate.address, "5.6.7.8:443");
        assert_eq!(candidate.country, "JP");
    }

    #[test]
    fn test_parse_hostname() {
        let candidate = CandidateParser::new()
            .parse_line("proxy.example.com:443#DE")
            .unwrap();
        assert_eq!(candidate.address, "proxy.example.com:443");
    }

    #[test]
    fn test_parse_empty_and_comment() {
        let parser = CandidateParser::new();
        assert_eq!(parser.try_parse_line("   "), Err(ParseError::Empty));
        assert_eq!(parser.try_parse_line("# list"), Err(ParseError::Comment));
    }

    #[test]
    fn test_parse_masked_lines() {
        let parser = CandidateParser::new();
        assert_eq!(parser.try_parse_line("1.2.***.4:443#US"), Err(ParseError::Masked));
        assert_eq!(parser.try_parse_line("1.2...:443#US"), Err(ParseError::Masked));
    }

    #[test]
    fn test_parse_missing_country() {
        let parser = CandidateParser::new();
        assert_eq!(parser.try_parse_line("1.1.1.1:443"), Err(ParseError::MissingCountry));
        assert_eq!(parser.try_parse_line("1.1.1.1:443#us"), Err(ParseError::MissingCountry));
        assert_eq!(parser.try_parse_line("1.1.1.1:443#USA"), Err(ParseError::MissingCountry));
    }

    #[test]
    fn test_parse_malformed_address() {
        let parser = CandidateParser::any_port();
        assert!(matches!(
            parser.try_parse_line("1.1.1.1#US"),
            Err(ParseError::MalformedAddress(_))
        ));
        assert!(matches!(
            parser.try_parse_line("1.1.1.1:abc#US"),
            Err(ParseError::MalformedAddress(_))
        ));
        assert!(matches!(
            parser.try_parse_line("1.1.1.1:0#US"),
            Err(ParseError::MalformedAddress(_))
        ));
        assert!(matches!(
            parser.try_parse_line(":443#US"),
            Err(ParseError::MalformedAddress(_))
        ));
    }

    #[test]
    fn test_port_filter() {
        let parser = CandidateParser::new();
        assert_eq!(
            parser.try_parse_line("1.1.1.1:8443#US"),
            Err(ParseError::PortFiltered {
                found: 8443,
                required: 443
            })
        );
        assert!(CandidateParser::any_port()
            .parse_line("1.1.1.1:8443#US")
            .is_some());
    }

    #[test]
    fn test_parse_string() {
        let content = r#"
1.1.1.1:443#US
# comment
2.2.2.2:443#us
3.3.3.3:80#NL
4.4.4.4:443#NL
"#;
        let candidates = CandidateParser::new().parse_string(content);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].address, "1.1.1.1:443");
        assert_eq!(candidates[1].address, "4.4.4.4:443");
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.txt");
        fs::write(&path, "1.1.1.1:443#US\n2.2.2.2:443#IN\n").unwrap();

        let candidates = CandidateParser::new().parse_file(&path).unwrap();
        assert_eq!(candidates.len(), 2);
    }
}
