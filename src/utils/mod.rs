pub mod fs;

use regex::Regex;
use url::Url;

/// Extract the file ID from a pixeldrain URL (`https://pixeldrain.com/u/abc123`)
/// or accept a bare ID.
pub fn extract_file_id(input: &str) -> Option<String> {
    let input = input.trim();

    let candidate = match Url::parse(input) {
        Ok(url) => url
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .next_back()?
            .to_string(),
        Err(_) => input.trim_end_matches('/').rsplit('/').next()?.to_string(),
    };

    let re = Regex::new(r"^[A-Za-z0-9_-]+$").ok()?;
    if re.is_match(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}
