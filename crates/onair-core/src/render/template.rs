use std::sync::LazyLock;

use onair_detect::{MediaRecord, ParsedTitle};
use regex::Regex;

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%artist|%title").unwrap());

/// Literal `%artist` / `%title` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Empty when there is no record or the record has neither artist nor title.
    pub fn render(&self, record: Option<&MediaRecord>) -> String {
        match record {
            Some(record) if !record.is_empty() => self
                .text
                .replace("%artist", &record.artist)
                .replace("%title", &record.title),
            _ => String::new(),
        }
    }

    /// Recover artist and title from a string this template rendered.
    ///
    /// Fails when the template has no placeholders, the text does not fit,
    /// or the split is ambiguous enough that re-rendering gives different text.
    pub fn extract(&self, rendered: &str) -> Option<ParsedTitle> {
        let mut pattern = String::from("(?s)^");
        let mut last = 0;
        let (mut has_artist, mut has_title) = (false, false);
        for placeholder in RE_PLACEHOLDER.find_iter(&self.text) {
            pattern.push_str(&regex::escape(&self.text[last..placeholder.start()]));
            let seen = match placeholder.as_str() {
                "%artist" => std::mem::replace(&mut has_artist, true),
                _ => std::mem::replace(&mut has_title, true),
            };
            if seen {
                pattern.push_str("(?:.*?)");
            } else {
                pattern.push_str(&format!("(?P<{}>.*?)", &placeholder.as_str()[1..]));
            }
            last = placeholder.end();
        }
        if !has_artist && !has_title {
            return None;
        }
        pattern.push_str(&regex::escape(&self.text[last..]));
        pattern.push('$');

        let captures = Regex::new(&pattern).ok()?.captures(rendered)?;
        let field = |name| {
            captures
                .name(name)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };
        let parsed = ParsedTitle {
            artist: field("artist"),
            title: field("title"),
        };

        let candidate = MediaRecord::new("", parsed.artist.as_str(), parsed.title.as_str());
        (self.render(Some(&candidate)) == rendered).then_some(parsed)
    }
}
