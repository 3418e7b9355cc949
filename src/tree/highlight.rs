//! Match marking for filtered titles.
//!
//! Matches are first wrapped in sentinel characters that cannot occur in
//! normal text, the whole string is then HTML-escaped, and only afterwards
//! are the sentinels turned into `<mark>` tags. Marking after escaping would
//! match inside entities; escaping after marking would destroy the tags.

use std::ops::Range;

/// Opens a marked span before escaping.
pub const MARK_START: char = '\u{FFF7}';
/// Closes a marked span before escaping.
pub const MARK_END: char = '\u{FFF8}';

pub const MARK_OPEN: &str = "<mark>";
pub const MARK_CLOSE: &str = "</mark>";

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn is_sentinel(c: char) -> bool {
    c == MARK_START || c == MARK_END
}

/// Escape text for inclusion in markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode the entities `escape_html` produces, plus numeric references.
/// Unknown entities are kept verbatim.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|end| *end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(|dec| dec.parse::<u32>()))
                    .and_then(|code| code.ok())
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Plain text content of a markup title: tags dropped, entities decoded.
pub fn extract_html_text(markup: &str) -> String {
    let mut text = String::with_capacity(markup.len());
    let mut in_tag = false;
    for c in markup.chars() {
        match c {
            '<' if !in_tag => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    decode_entities(&text)
}

/// Case-insensitive, non-overlapping occurrences of `query`, as char ranges.
pub fn find_literal(text: &str, query: &str) -> Vec<Range<usize>> {
    let hay: Vec<char> = text.chars().map(fold).collect();
    let needle: Vec<char> = query.chars().map(fold).collect();
    let mut found = Vec::new();
    if needle.is_empty() || needle.len() > hay.len() {
        return found;
    }
    let mut i = 0;
    while i + needle.len() <= hay.len() {
        if hay[i..i + needle.len()] == needle[..] {
            found.push(i..i + needle.len());
            i += needle.len();
        } else {
            i += 1;
        }
    }
    found
}

/// Wrap every literal occurrence of `query` in sentinels.
pub fn mark_literal(text: &str, query: &str) -> String {
    let ranges = find_literal(text, query);
    let mut out = String::with_capacity(text.len() + ranges.len() * 2);
    let mut ranges = ranges.into_iter().peekable();
    for (i, c) in text.chars().enumerate() {
        if ranges.peek().is_some_and(|r| r.start == i) {
            out.push(MARK_START);
        }
        out.push(c);
        if ranges.peek().is_some_and(|r| r.end == i + 1) {
            out.push(MARK_END);
            ranges.next();
        }
    }
    out
}

/// Subsequence match of `query` against `text`, case-insensitive.
///
/// Each query character takes its first occurrence after the previous one.
/// Returns, per query character, how many title characters were skipped
/// before it matched.
pub fn fuzzy_match(text: &str, query: &str) -> Option<Vec<usize>> {
    let mut gaps = Vec::with_capacity(query.len());
    let mut hay = text.chars().map(fold);
    for q in query.chars().map(fold) {
        let mut skipped = 0;
        loop {
            match hay.next() {
                Some(c) if c == q => break,
                Some(_) => skipped += 1,
                None => return None,
            }
        }
        gaps.push(skipped);
    }
    Some(gaps)
}

/// Title positions of the characters matched by `fuzzy_match`.
///
/// The position of query character `i` is its gap plus the previous
/// position, plus one for each earlier matched character.
pub fn fuzzy_indices(gaps: &[usize]) -> Vec<usize> {
    let mut indices: Vec<usize> = Vec::with_capacity(gaps.len());
    for (i, gap) in gaps.iter().enumerate() {
        let offset = if i == 0 { 0 } else { 1 };
        let previous = indices.last().copied().unwrap_or(0);
        indices.push(gap + offset + previous);
    }
    indices
}

/// Wrap the characters at `indices` in sentinels. Out-of-range indices are
/// ignored.
pub fn mark_fuzzy(text: &str, indices: &[usize]) -> String {
    let mut chars: Vec<String> = text.chars().map(String::from).collect();
    for &i in indices {
        if let Some(c) = chars.get_mut(i) {
            *c = format!("{MARK_START}{c}{MARK_END}");
        }
    }
    chars.concat()
}

/// Escape the sentinel-marked text and turn the sentinels into tags.
pub fn finish_markup(marked: &str) -> String {
    escape_html(marked)
        .replace(MARK_START, MARK_OPEN)
        .replace(MARK_END, MARK_CLOSE)
}

/// Remove sentinel characters a title might carry before it is marked.
pub fn strip_sentinels(text: &str) -> String {
    text.chars().filter(|c| !is_sentinel(*c)).collect()
}

/// A run of display text, highlighted or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub highlighted: bool,
}

/// Split highlight markup into plain-text runs for a terminal renderer.
///
/// `<mark>` toggles highlighting, other tags are dropped and entities decoded.
pub fn markup_segments(markup: &str) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut highlighted = false;
    let mut push = |text: &str, highlighted: bool| {
        if text.is_empty() {
            return;
        }
        let text = decode_entities(text);
        match segments.last_mut() {
            Some(last) if last.highlighted == highlighted => last.text.push_str(&text),
            _ => segments.push(Segment { text, highlighted }),
        }
    };
    let mut rest = markup;
    while let Some(open) = rest.find('<') {
        push(&rest[..open], highlighted);
        let tail = &rest[open..];
        let Some(close) = tail.find('>') else {
            push(tail, highlighted);
            rest = "";
            break;
        };
        match &tail[..=close] {
            MARK_OPEN => highlighted = true,
            MARK_CLOSE => highlighted = false,
            _ => {}
        }
        rest = &tail[close + 1..];
    }
    push(rest, highlighted);
    segments
}
