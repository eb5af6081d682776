use std::sync::OnceLock;

use regex::Regex;

/// A wall post address: `(owner_id, post_id)`. Negative owners are groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostRef {
    pub owner_id: i64,
    pub post_id: i64,
}

impl PostRef {
    pub fn url(&self) -> String {
        format!("https://vk.com/wall{}_{}", self.owner_id, self.post_id)
    }
}

fn screen_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"vk\.com/([a-zA-Z0-9._-]+)").expect("valid screen name regex"))
}

// Checked in order; the first pattern that matches wins.
fn post_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"vk\.com/wall(?P<owner>-?\d+)_(?P<post>\d+)"),
            Regex::new(r"vk\.com/[a-zA-Z0-9._-]+\?w=wall(?P<owner>-?\d+)_(?P<post>\d+)"),
            Regex::new(r"m\.vk\.com/wall(?P<owner>-?\d+)_(?P<post>\d+)"),
        ]
        .map(|pattern| pattern.expect("valid post link regex"))
    })
}

/// Returns the screen name from the first `vk.com/<name>` occurrence in `text`.
pub fn extract_screen_name(text: &str) -> Option<&str> {
    screen_name_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Extracts the post address from a canonical, short-name-with-query or mobile
/// wall link. Zero ids are treated as no match.
pub fn parse_post_link(text: &str) -> Option<PostRef> {
    post_patterns().iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let owner_id = caps["owner"].parse::<i64>().ok()?;
        let post_id = caps["post"].parse::<i64>().ok()?;
        (owner_id != 0 && post_id != 0).then_some(PostRef { owner_id, post_id })
    })
}
