//! Reporting year and authority discovery from file paths

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::AuthorityConfig;

fn year_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // 2022-23, 2022_23, 202223, 2022/23
            Regex::new(r"(?:^|\D)(20\d{2})[-_/ ]?(\d{2})(?:\D|$)").expect("valid year range pattern"),
            Regex::new(r"(?:^|\D)(20\d{2})(?:\D|$)").expect("valid year pattern"),
        ]
    })
}

/// Find the reporting year in a file name or path
///
/// A fiscal-year range resolves to its end year (`2022-23` => 2023) when the
/// two halves are consecutive; otherwise the first four-digit year is used.
pub fn find_year(name: &str) -> Result<u16, DiscoveryError> {
    let [range, single] = year_patterns();

    for captures in range.captures_iter(name) {
        let start: u16 = captures[1].parse().unwrap_or_default();
        let end: u16 = captures[2].parse().unwrap_or_default();
        if (start + 1) % 100 == end {
            return Ok(start + 1);
        }
    }

    single
        .captures(name)
        .and_then(|c| c[1].parse().ok())
        .ok_or_else(|| DiscoveryError::MissingYear(name.to_string()))
}

fn squash(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Find which configured authority a path belongs to
pub fn find_authority<'a>(
    path: &Path,
    authorities: &'a [AuthorityConfig],
) -> Result<&'a AuthorityConfig, DiscoveryError> {
    let haystack = squash(&path.to_string_lossy());
    let segments: Vec<String> = path
        .iter()
        .map(|s| squash(&s.to_string_lossy()))
        .collect();

    authorities
        .iter()
        .find(|authority| {
            segments.iter().any(|s| *s == squash(&authority.code))
                || authority
                    .names
                    .iter()
                    .map(|n| squash(n))
                    .any(|n| !n.is_empty() && haystack.contains(&n))
        })
        .ok_or_else(|| DiscoveryError::MissingAuthority(path.display().to_string()))
}

/// Discovery errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("No reporting year found in '{0}'")]
    MissingYear(String),

    #[error("No local authority found in '{0}'")]
    MissingAuthority(String),
}
