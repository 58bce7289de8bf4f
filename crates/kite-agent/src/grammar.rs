//! Action tag vocabulary and the lexer shared by the parser and the
//! streaming assembler.
//!
//! Tags look like XML but are lexed leniently: attribute values may use
//! single or double quotes (or none), attributes come in any order, and a
//! tag is either self-closing (`<read path="a"/>`) or paired with a matching
//! close tag (`<bash>ls</bash>`). Nested tags of the same name are balanced
//! by depth counting.

/// Every tag name that denotes an action
pub const ACTION_TAGS: &[&str] = &[
    "bash",
    "read",
    "edit",
    "multi-edit",
    "write",
    "create",
    "glob",
    "grep",
    "ls",
    "git",
    "fetch",
    "search",
    "format",
    "typecheck",
    "schedule",
    "notify",
    "skill",
    "skill-install",
    "plan",
    "task",
    "explore",
    "ps",
    "kill",
    "connector-config",
];

/// Whether `name` is a known action tag
pub fn is_action_tag(name: &str) -> bool {
    ACTION_TAGS.contains(&name)
}

/// Whether more input could still turn `partial` into an action tag name
fn could_become_action_tag(partial: &str) -> bool {
    ACTION_TAGS.iter().any(|tag| tag.starts_with(partial))
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

/// Attribute names compare case-insensitively, ignoring `-` and `_`, so
/// `replace-all`, `replace_all` and `replaceAll` are the same attribute.
fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Attributes of an open tag, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    /// Look up an attribute value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        let key = normalize_name(name);
        self.0
            .iter()
            .find(|(k, _)| normalize_name(k) == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up an attribute and drop it if blank
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Boolean attribute: present without a value, or `true`/`yes`/`1`
    pub fn flag(&self, name: &str) -> bool {
        match self.get(name) {
            Some(v) => matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "" | "true" | "yes" | "1"
            ),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of lexing an open tag at a `<`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTag<'a> {
    /// A fully received open tag ending at byte `end`
    Complete {
        name: &'a str,
        attrs: Attributes,
        self_closing: bool,
        end: usize,
    },
    /// The text ended before the tag did
    Partial { name: &'a str },
    /// Not a tag at all (`a < b`, `<=`, ...)
    NotATag,
}

/// Lex an open tag starting at `start`, which must point at a `<`
pub fn lex_open_tag(text: &str, start: usize) -> OpenTag<'_> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let name_start = start + 1;
    let mut i = name_start;
    while i < len && is_name_byte(bytes[i]) {
        i += 1;
    }
    let name = &text[name_start..i];
    if i == len {
        return OpenTag::Partial { name };
    }
    if name.is_empty() || !bytes[name_start].is_ascii_alphabetic() {
        return OpenTag::NotATag;
    }

    let mut attrs = Vec::new();
    loop {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == len {
            return OpenTag::Partial { name };
        }
        match bytes[i] {
            b'>' => {
                return OpenTag::Complete {
                    name,
                    attrs: Attributes(attrs),
                    self_closing: false,
                    end: i + 1,
                };
            }
            b'/' => {
                if i + 1 == len {
                    return OpenTag::Partial { name };
                }
                if bytes[i + 1] == b'>' {
                    return OpenTag::Complete {
                        name,
                        attrs: Attributes(attrs),
                        self_closing: true,
                        end: i + 2,
                    };
                }
                return OpenTag::NotATag;
            }
            b if is_name_byte(b) => {
                let key_start = i;
                while i < len && is_name_byte(bytes[i]) {
                    i += 1;
                }
                let key = &text[key_start..i];

                let mut j = i;
                while j < len && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j == len {
                    return OpenTag::Partial { name };
                }
                if bytes[j] != b'=' {
                    attrs.push((key.to_string(), String::new()));
                    continue;
                }

                j += 1;
                while j < len && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j == len {
                    return OpenTag::Partial { name };
                }

                let quote = bytes[j];
                let value = if quote == b'"' || quote == b'\'' {
                    let value_start = j + 1;
                    match text[value_start..].find(quote as char) {
                        Some(off) => {
                            i = value_start + off + 1;
                            &text[value_start..value_start + off]
                        }
                        None => return OpenTag::Partial { name },
                    }
                } else {
                    let value_start = j;
                    while j < len
                        && !bytes[j].is_ascii_whitespace()
                        && bytes[j] != b'>'
                        && !(bytes[j] == b'/' && bytes.get(j + 1) == Some(&b'>'))
                    {
                        j += 1;
                    }
                    if j == len {
                        return OpenTag::Partial { name };
                    }
                    i = j;
                    &text[value_start..j]
                };
                attrs.push((key.to_string(), unescape(value)));
            }
            _ => return OpenTag::NotATag,
        }
    }
}

/// Result of lexing a close tag at a `</`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseTag<'a> {
    Complete { name: &'a str, end: usize },
    Partial { name: &'a str },
    NotATag,
}

/// Lex a close tag starting at `start`, which must point at `</`
pub fn lex_close_tag(text: &str, start: usize) -> CloseTag<'_> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let name_start = start + 2;
    let mut i = name_start;
    while i < len && is_name_byte(bytes[i]) {
        i += 1;
    }
    let name = &text[name_start.min(len)..i];
    while i < len && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i == len {
        return CloseTag::Partial { name };
    }
    if bytes[i] == b'>' && !name.is_empty() {
        CloseTag::Complete { name, end: i + 1 }
    } else {
        CloseTag::NotATag
    }
}

/// Find the close tag matching an open `name` tag whose body starts at
/// `from`. Returns `(body_end, close_end)`.
pub fn find_close(text: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let mut depth = 1usize;
    let mut i = from;
    while let Some(off) = text[i..].find('<') {
        let pos = i + off;
        if text[pos..].starts_with("</") {
            if let CloseTag::Complete { name: found, end } = lex_close_tag(text, pos) {
                if found == name {
                    depth -= 1;
                    if depth == 0 {
                        return Some((pos, end));
                    }
                }
                i = end;
                continue;
            }
        } else if let OpenTag::Complete {
            name: found,
            self_closing: false,
            end,
            ..
        } = lex_open_tag(text, pos)
        {
            if found == name {
                depth += 1;
                i = end;
                continue;
            }
        }
        i = pos + 1;
    }
    None
}

/// A complete action tag located in some text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpan<'a> {
    pub name: &'a str,
    pub attrs: Attributes,
    /// Text between the open and close tag; `None` when self-closing
    pub body: Option<&'a str>,
    /// Byte offset of the `<`
    pub start: usize,
    /// Byte offset just past the closing `>`
    pub end: usize,
}

enum Found<'a> {
    Tag(TagSpan<'a>),
    /// An open tag whose close has not arrived
    Unterminated { start: usize, open_end: usize },
    /// A tag-open sequence cut off by the end of the text
    Partial { start: usize },
}

fn next_action(text: &str, from: usize) -> Option<Found<'_>> {
    let mut i = from;
    while let Some(off) = text[i..].find('<') {
        let pos = i + off;
        if text[pos..].starts_with("</") {
            if let CloseTag::Partial { name } = lex_close_tag(text, pos) {
                if could_become_action_tag(name) {
                    return Some(Found::Partial { start: pos });
                }
            }
            i = pos + 1;
            continue;
        }
        match lex_open_tag(text, pos) {
            OpenTag::Complete {
                name,
                attrs,
                self_closing,
                end,
            } if is_action_tag(name) => {
                if self_closing {
                    return Some(Found::Tag(TagSpan {
                        name,
                        attrs,
                        body: None,
                        start: pos,
                        end,
                    }));
                }
                return Some(match find_close(text, name, end) {
                    Some((body_end, close_end)) => Found::Tag(TagSpan {
                        name,
                        attrs,
                        body: Some(&text[end..body_end]),
                        start: pos,
                        end: close_end,
                    }),
                    None => Found::Unterminated {
                        start: pos,
                        open_end: end,
                    },
                });
            }
            OpenTag::Partial { name } if could_become_action_tag(name) => {
                return Some(Found::Partial { start: pos });
            }
            _ => {}
        }
        i = pos + 1;
    }
    None
}

/// All complete action tags in source order. Unterminated tags are skipped.
pub fn action_tags(text: &str) -> Vec<TagSpan<'_>> {
    let mut tags = Vec::new();
    let mut i = 0;
    while let Some(found) = next_action(text, i) {
        match found {
            Found::Tag(tag) => {
                i = tag.end;
                tags.push(tag);
            }
            Found::Unterminated { open_end, .. } => i = open_end,
            Found::Partial { start } => i = start + 1,
        }
    }
    tags
}

/// Byte offset of the first unterminated action tag or dangling partial
/// tag-open sequence, if any. Everything before it is safe to display.
pub fn pending_tag_start(text: &str) -> Option<usize> {
    let mut i = 0;
    while let Some(found) = next_action(text, i) {
        match found {
            Found::Tag(tag) => i = tag.end,
            Found::Unterminated { start, .. } | Found::Partial { start } => return Some(start),
        }
    }
    None
}

/// Remove every complete action tag from `text`
pub fn strip_action_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for tag in action_tags(text) {
        out.push_str(&text[last..tag.start]);
        last = tag.end;
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_self_closing_with_mixed_quotes() {
        let text = r#"<read limit='20' path="src/a.rs" />"#;
        match lex_open_tag(text, 0) {
            OpenTag::Complete {
                name,
                attrs,
                self_closing,
                end,
            } => {
                assert_eq!(name, "read");
                assert!(self_closing);
                assert_eq!(end, text.len());
                assert_eq!(attrs.get("path"), Some("src/a.rs"));
                assert_eq!(attrs.get("limit"), Some("20"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lex_gt_inside_quoted_value() {
        let text = r#"<grep pattern="a>b" path=src>"#;
        match lex_open_tag(text, 0) {
            OpenTag::Complete { attrs, end, .. } => {
                assert_eq!(attrs.get("pattern"), Some("a>b"));
                assert_eq!(attrs.get("path"), Some("src"));
                assert_eq!(end, text.len());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lex_partial_and_not_a_tag() {
        assert_eq!(lex_open_tag("<re", 0), OpenTag::Partial { name: "re" });
        assert_eq!(
            lex_open_tag(r#"<read path="a"#, 0),
            OpenTag::Partial { name: "read" }
        );
        assert_eq!(lex_open_tag("a < b", 2), OpenTag::NotATag);
        assert_eq!(lex_open_tag("<=", 0), OpenTag::NotATag);
    }

    #[test]
    fn test_attribute_names_normalized() {
        let text = r#"<edit path="a" replace_all="true">"#;
        if let OpenTag::Complete { attrs, .. } = lex_open_tag(text, 0) {
            assert!(attrs.flag("replace-all"));
            assert!(attrs.flag("replaceAll"));
        } else {
            panic!("expected complete tag");
        }
    }

    #[test]
    fn test_find_close_counts_depth() {
        let text = "<task>outer <task>inner</task> tail</task>";
        let (body_end, end) = find_close(text, "task", 6).unwrap();
        assert_eq!(&text[6..body_end], "outer <task>inner</task> tail");
        assert_eq!(end, text.len());
    }

    #[test]
    fn test_action_tags_in_order_skip_unknown() {
        let text = "Intro <b>bold</b>\n<read path=\"a\"/>\n<bash>ls -la</bash>\n<unknown x=\"1\"/>";
        let tags = action_tags(text);
        let names: Vec<_> = tags.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["read", "bash"]);
        assert_eq!(tags[1].body, Some("ls -la"));
    }

    #[test]
    fn test_pending_tag_start() {
        assert_eq!(pending_tag_start("hello <bash>ls"), Some(6));
        assert_eq!(pending_tag_start("hello <re"), Some(6));
        assert_eq!(pending_tag_start("hello <bash>ls</ba"), Some(6));
        assert_eq!(pending_tag_start("a <bash>ls</bash> b"), None);
        assert_eq!(pending_tag_start("x < y and <div>"), None);
        assert_eq!(pending_tag_start("done </re"), Some(5));
    }

    #[test]
    fn test_strip_action_tags() {
        let text = "Let me look.\n<read path=\"a\"/>\nThen run <bash>ls</bash>.";
        assert_eq!(strip_action_tags(text), "Let me look.\n\nThen run .");
    }

    #[test]
    fn test_unescape_attribute_values() {
        if let OpenTag::Complete { attrs, .. } =
            lex_open_tag(r#"<grep pattern="&lt;div&gt; &amp; &quot;x&quot;">"#, 0)
        {
            assert_eq!(attrs.get("pattern"), Some(r#"<div> & "x""#));
        } else {
            panic!("expected complete tag");
        }
    }

    #[test]
    fn test_multibyte_text_around_tags() {
        let text = "héllo → <read path=\"ü.rs\"/> ✓";
        let tags = action_tags(text);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].attrs.get("path"), Some("ü.rs"));
    }
}
