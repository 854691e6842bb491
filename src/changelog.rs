//! Changelog section extraction.
//!
//! Mod changelogs are a single text blob of per-version sections separated by
//! a line of 99 dashes:
//!
//! ```text
//! ---------------------------------------------------------------------------------------------------
//! Version: 1.2.0
//! Date: 2024-01-01
//!   Features:
//!     - Added a thing
//! ```

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::utils::text::truncate;

/// Maximum length of an extracted section, in characters.
pub const MAX_SECTION_LENGTH: usize = 4096;

const SEPARATOR_WIDTH: usize = 99;
const VERSION_HEADER: &str = "Version:";
const DATE_HEADER: &str = "Date:";
const MAX_STRIPPED_INDENT: usize = 4;

/// Extract and format the changelog section for `version`.
///
/// Returns an empty string when no section has a matching `Version:` header;
/// callers render their own fallback text in that case. Issue references like
/// `#12` become links only when `source_url` points at a GitHub repository.
///
/// # Examples
///
/// ```
/// use modwatch::changelog::extract_section;
///
/// let sep = "-".repeat(99);
/// let blob = format!("{sep}\nVersion: 1.0.0\n  Bugfixes:\n    - Fixed #3\n");
/// let text = extract_section(&blob, "1.0.0", None);
/// assert_eq!(text, "**Bugfixes:**\n- Fixed #3");
/// assert_eq!(extract_section(&blob, "2.0.0", None), "");
/// ```
pub fn extract_section(changelog: &str, version: &str, source_url: Option<&str>) -> String {
    let separator = "-".repeat(SEPARATOR_WIDTH);
    let changelog = changelog.replace('\r', "");

    for section in changelog.split(separator.as_str()) {
        let Some(body) = section_body(section, version) else {
            continue;
        };
        let mut text = normalize(&body);
        if let Some(repo) = source_url.and_then(github_repository) {
            text = link_issues(&text, &repo);
        }
        return truncate(&text, MAX_SECTION_LENGTH);
    }
    String::new()
}

/// The lines after the header of the section for `version`, minus the date line.
fn section_body(section: &str, version: &str) -> Option<String> {
    let mut lines = section.lines().skip_while(|line| line.trim().is_empty());
    let header = lines.next()?.trim();
    let found = header.strip_prefix(VERSION_HEADER)?.trim();
    if found != version {
        return None;
    }

    let mut body: Vec<&str> = lines.collect();
    if let Some(pos) = body.iter().position(|line| !line.trim().is_empty()) {
        if body[pos].trim_start().starts_with(DATE_HEADER) {
            body.remove(pos);
        }
    }
    Some(body.join("\n"))
}

fn normalize(body: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            // Collapse blank runs; leading blanks are dropped entirely
            if out.last().is_some_and(|last| !last.is_empty()) {
                out.push(String::new());
            }
            continue;
        }

        let line = strip_indent(line).replace("__", "\\_\\_");
        let indented = line.starts_with(char::is_whitespace);
        if !indented && line.trim_end().ends_with(':') {
            out.push(format!("**{}**", line.trim_end()));
        } else {
            out.push(line.trim_end().to_string());
        }
    }
    while out.last().is_some_and(|last| last.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

fn strip_indent(line: &str) -> &str {
    let indent = line
        .chars()
        .take(MAX_STRIPPED_INDENT)
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum::<usize>();
    &line[indent..]
}

/// `https://github.com/<owner>/<repo>` for a recognized GitHub URL.
fn github_repository(source_url: &str) -> Option<String> {
    let url = Url::parse(source_url).ok()?;
    if url.scheme() != "https" || url.host_str() != Some("github.com") {
        return None;
    }
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?.trim_end_matches(".git");
    Some(format!("https://github.com/{}/{}", owner, repo))
}

fn link_issues(text: &str, repository: &str) -> String {
    static ISSUE: OnceLock<Regex> = OnceLock::new();
    let re = ISSUE.get_or_init(|| Regex::new(r"#([0-9]+)").expect("issue pattern is valid"));
    re.replace_all(text, |caps: &regex::Captures<'_>| {
        format!("[#{}]({}/issues/{})", &caps[1], repository, &caps[1])
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(sections: &[&str]) -> String {
        let sep = "-".repeat(99);
        sections
            .iter()
            .map(|s| format!("{}\n{}", sep, s))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn sample() -> String {
        blob(&[
            "Version: 1.3\nDate: 2024-02-01\n  Features:\n    - Added __literal__ thing\n    - See #12",
            "Version: 1.2\nDate: 2024-01-01\n  Bugfixes:\n    - Fixed __literal__ crash\n\n\n\n  Changes:\n    - Tweaked",
        ])
    }

    #[test]
    fn test_extracts_requested_section_only() {
        let text = extract_section(&sample(), "1.2", None);
        assert_eq!(
            text,
            "**Bugfixes:**\n- Fixed \\_\\_literal\\_\\_ crash\n\n**Changes:**\n- Tweaked"
        );
        assert!(!text.contains("Date:"));
        assert!(!text.contains("Added"));
    }

    #[test]
    fn test_first_section_also_matches() {
        let text = extract_section(&sample(), "1.3", None);
        assert!(text.starts_with("**Features:**\n- Added \\_\\_literal\\_\\_ thing"));
        assert!(text.contains("- See #12"));
    }

    #[test]
    fn test_missing_version_is_empty() {
        assert_eq!(extract_section(&sample(), "1.2.1", None), "");
        assert_eq!(extract_section("", "1.0", None), "");
        assert_eq!(extract_section("no separators here", "1.0", None), "");
    }

    #[test]
    fn test_version_must_match_exactly() {
        assert_eq!(extract_section(&sample(), "1", None), "");
        assert_eq!(extract_section(&sample(), "1.2.0", None), "");
    }

    #[test]
    fn test_deep_indentation_is_not_bolded() {
        let text = extract_section(&blob(&["Version: 1.0\n  Notes:\n        Keep going:"]), "1.0", None);
        assert_eq!(text, "**Notes:**\n    Keep going:");
    }

    #[test]
    fn test_carriage_returns_removed() {
        let raw = blob(&["Version: 1.0\r\nDate: today\r\n  Info:\r\n    - Line\r\n"]);
        assert_eq!(extract_section(&raw, "1.0", None), "**Info:**\n- Line");
    }

    #[test]
    fn test_issue_links_only_for_github() {
        let text = extract_section(&sample(), "1.3", Some("https://github.com/acme/thing"));
        assert!(text.contains("- See [#12](https://github.com/acme/thing/issues/12)"));

        let text = extract_section(&sample(), "1.3", Some("https://github.com/acme/thing.git/"));
        assert!(text.contains("[#12](https://github.com/acme/thing/issues/12)"));

        let text = extract_section(&sample(), "1.3", Some("https://gitlab.com/acme/thing"));
        assert!(text.contains("- See #12"));

        let text = extract_section(&sample(), "1.3", Some("https://github.com/acme"));
        assert!(text.contains("- See #12"));
    }

    #[test]
    fn test_truncates_to_limit() {
        let long = "x".repeat(4100);
        let raw = blob(&[&format!("Version: 1.0\n{}", long)]);
        let text = extract_section(&raw, "1.0", None);
        assert_eq!(text.chars().count(), 4096);
        assert!(text.ends_with("..."));
    }
}
