//! Scanner implementation
//!
//! Transforms a chunked byte stream into tag events, hiding lexical
//! concerns: partial tokens and partial UTF-8 sequences are retained across
//! chunk boundaries, ignored-tag regions are elided, and text outside any
//! wanted region is dropped.

use std::collections::BTreeSet;

use gasp_core::ParseIssue;
use tracing::{debug, trace};

use super::entities::decode_entities;
use super::event::{Attribute, TagEvent};

/// An isolated `<` that does not form a valid tag within this many bytes is
/// emitted as text.
const TAG_SCAN_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    /// Searching for an open tag that starts a wanted region.
    OutsideWanted,
    /// Emitting every nested event inside a wanted region.
    InsideWanted,
}

/// Resumable tag scanner over a chunked byte stream.
pub struct TagScanner {
    /// Un-consumed input, always resuming at a token boundary.
    buf: Vec<u8>,
    /// Absolute stream offset of `buf[0]`.
    offset: usize,
    mode: ScanMode,
    /// Tag names that open a wanted region; `None` accepts the first
    /// non-ignored tag (container and primitive roots have no fixed name).
    wanted: Option<Vec<String>>,
    ignored: BTreeSet<String>,
    /// Open element names inside the wanted region, region root first.
    open_tags: Vec<String>,
    /// Open tag names inside an elided ignored region within the wanted
    /// region. While non-empty, tags emit no events and text passes through.
    elided: Vec<String>,
    /// Ignored region being skipped outside any wanted region.
    skip_outside: Option<(String, usize)>,
    issues: Vec<ParseIssue>,
}

impl TagScanner {
    pub fn new(wanted: Option<Vec<String>>, ignored: BTreeSet<String>) -> Self {
        Self {
            buf: Vec::new(),
            offset: 0,
            mode: ScanMode::OutsideWanted,
            wanted,
            ignored,
            open_tags: Vec::new(),
            elided: Vec::new(),
            skip_outside: None,
            issues: Vec::new(),
        }
    }

    /// Feed one chunk and return every event producible from the buffered
    /// input. Never blocks on incomplete input: a trailing partial token
    /// yields nothing until more bytes arrive.
    pub fn consume(&mut self, chunk: &[u8]) -> Vec<TagEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut pos = 0;

        loop {
            let Some(rel) = self.buf[pos..].iter().position(|&b| b == b'<') else {
                pos = self.flush_tail(&mut events, pos);
                break;
            };
            let at = pos + rel;
            if self.mode == ScanMode::InsideWanted && at > pos {
                events.push(TagEvent::Text(lossy(&self.buf[pos..at])));
            }
            match parse_tag(&self.buf[at..]) {
                TagParse::Incomplete if self.buf.len() - at < TAG_SCAN_LIMIT => {
                    pos = at;
                    break;
                }
                TagParse::Incomplete | TagParse::Invalid => {
                    if self.buf.len() - at >= TAG_SCAN_LIMIT {
                        self.issues.push(ParseIssue::MalformedToken {
                            offset: self.offset + at,
                            reason: format!("no tag within {} bytes of '<'", TAG_SCAN_LIMIT),
                        });
                    }
                    if self.mode == ScanMode::InsideWanted {
                        events.push(TagEvent::Text("<".to_string()));
                    }
                    pos = at + 1;
                }
                TagParse::Tag { tag, len } => {
                    self.handle_tag(&mut events, tag);
                    pos = at + len;
                }
            }
        }

        self.offset += pos;
        self.buf.drain(..pos);
        events
    }

    /// Drain the recovery notes recorded since the last call.
    pub fn take_issues(&mut self) -> Vec<ParseIssue> {
        std::mem::take(&mut self.issues)
    }

    /// Emit the trailing text run, holding back a split multi-byte sequence
    /// so text events stay byte-boundary invariant.
    fn flush_tail(&mut self, events: &mut Vec<TagEvent>, pos: usize) -> usize {
        if self.mode != ScanMode::InsideWanted {
            return self.buf.len();
        }
        let end = utf8_boundary(&self.buf);
        if end > pos {
            events.push(TagEvent::Text(lossy(&self.buf[pos..end])));
        }
        end.max(pos)
    }

    fn wants(&self, name: &str) -> bool {
        match &self.wanted {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }

    fn handle_tag(&mut self, events: &mut Vec<TagEvent>, tag: ParsedTag) {
        match self.mode {
            ScanMode::OutsideWanted => self.handle_tag_outside(events, tag),
            ScanMode::InsideWanted => self.handle_tag_inside(events, tag),
        }
    }

    fn handle_tag_outside(&mut self, events: &mut Vec<TagEvent>, tag: ParsedTag) {
        if let Some((skip_name, depth)) = &mut self.skip_outside {
            match &tag {
                ParsedTag::Open {
                    name, self_closing, ..
                } if *name == **skip_name && !self_closing => *depth += 1,
                ParsedTag::Close { name } if *name == **skip_name => {
                    *depth -= 1;
                    if *depth == 0 {
                        self.skip_outside = None;
                    }
                }
                _ => {}
            }
            return;
        }

        match tag {
            ParsedTag::Open {
                name,
                attrs,
                self_closing,
            } => {
                if self.ignored.contains(&name) {
                    if !self_closing {
                        trace!(tag = %name, "eliding ignored region");
                        self.skip_outside = Some((name, 1));
                    }
                } else if self.wants(&name) {
                    self.mode = ScanMode::InsideWanted;
                    events.push(TagEvent::Open {
                        name: name.clone(),
                        attrs,
                    });
                    if self_closing {
                        events.push(TagEvent::Close { name });
                        self.mode = ScanMode::OutsideWanted;
                    } else {
                        self.open_tags.push(name);
                    }
                }
                // Stray opens outside a wanted region carry no meaning.
            }
            ParsedTag::Close { .. } => {}
        }
    }

    fn handle_tag_inside(&mut self, events: &mut Vec<TagEvent>, tag: ParsedTag) {
        if !self.elided.is_empty() {
            match tag {
                ParsedTag::Open {
                    name, self_closing, ..
                } => {
                    if !self_closing {
                        self.elided.push(name);
                    }
                }
                ParsedTag::Close { name } => {
                    if let Some(idx) = self.elided.iter().rposition(|t| *t == name) {
                        self.elided.truncate(idx);
                    } else if self.open_tags.iter().any(|t| *t == name) {
                        // An unbalanced ignored opening closes implicitly at
                        // the enclosing wanted-region boundary.
                        self.elided.clear();
                        self.close_inside(events, name);
                    } else {
                        trace!(tag = %name, "dropping stray close inside elided region");
                    }
                }
            }
            return;
        }

        match tag {
            ParsedTag::Open {
                name,
                attrs,
                self_closing,
            } => {
                if self.ignored.contains(&name) {
                    if !self_closing {
                        trace!(tag = %name, "eliding ignored tag, passing inner text through");
                        self.elided.push(name);
                    }
                    return;
                }
                events.push(TagEvent::Open {
                    name: name.clone(),
                    attrs,
                });
                if self_closing {
                    events.push(TagEvent::Close { name });
                } else {
                    self.open_tags.push(name);
                }
            }
            ParsedTag::Close { name } => self.close_inside(events, name),
        }
    }

    fn close_inside(&mut self, events: &mut Vec<TagEvent>, name: String) {
        let Some(idx) = self.open_tags.iter().rposition(|t| *t == name) else {
            debug!(tag = %name, "discarding close with no matching open");
            return;
        };
        // Synthesize the closes the stream never sent for inner scopes.
        while self.open_tags.len() > idx + 1 {
            if let Some(unclosed) = self.open_tags.pop() {
                debug!(tag = %unclosed, "synthesizing close at enclosing scope end");
                self.issues.push(ParseIssue::MismatchedClose {
                    expected: unclosed.clone(),
                    found: name.clone(),
                });
                events.push(TagEvent::Close { name: unclosed });
            }
        }
        self.open_tags.pop();
        events.push(TagEvent::Close { name });
        if self.open_tags.is_empty() {
            self.mode = ScanMode::OutsideWanted;
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Largest prefix of `buf` that does not end in a split multi-byte
/// character.
fn utf8_boundary(buf: &[u8]) -> usize {
    let end = buf.len();
    let mut i = end;
    let floor = end.saturating_sub(3);
    while i > floor {
        let b = buf[i - 1];
        if b < 0x80 {
            return end;
        }
        if b >= 0xC0 {
            let need = if b >= 0xF0 {
                4
            } else if b >= 0xE0 {
                3
            } else {
                2
            };
            let have = end - (i - 1);
            return if have < need { i - 1 } else { end };
        }
        i -= 1;
    }
    end
}

// ============================================================================
// TAG TOKENIZATION
// ============================================================================

enum TagParse {
    /// The buffer ends before the token does; retain and wait for bytes.
    Incomplete,
    /// No valid tag can start here no matter what arrives.
    Invalid,
    Tag {
        tag: ParsedTag,
        len: usize,
    },
}

enum ParsedTag {
    Open {
        name: String,
        attrs: Vec<Attribute>,
        self_closing: bool,
    },
    Close {
        name: String,
    },
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Tokenize one tag starting at `bytes[0] == b'<'`.
fn parse_tag(bytes: &[u8]) -> TagParse {
    let mut i = 1;
    let closing = match bytes.get(i) {
        None => return TagParse::Incomplete,
        Some(b'/') => {
            i += 1;
            true
        }
        Some(_) => false,
    };
    match bytes.get(i) {
        None => return TagParse::Incomplete,
        Some(&b) if is_name_start(b) => {}
        Some(_) => return TagParse::Invalid,
    }
    let name_start = i;
    while i < bytes.len() && is_name_char(bytes[i]) {
        i += 1;
    }
    if i >= bytes.len() {
        return TagParse::Incomplete;
    }
    let name = lossy(&bytes[name_start..i]);

    if closing {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        return match bytes.get(i) {
            None => TagParse::Incomplete,
            Some(b'>') => TagParse::Tag {
                tag: ParsedTag::Close { name },
                len: i + 1,
            },
            Some(_) => TagParse::Invalid,
        };
    }

    let mut attrs = Vec::new();
    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let Some(&b) = bytes.get(i) else {
            return TagParse::Incomplete;
        };
        match b {
            b'>' => {
                return TagParse::Tag {
                    tag: ParsedTag::Open {
                        name,
                        attrs,
                        self_closing: false,
                    },
                    len: i + 1,
                };
            }
            b'/' => match bytes.get(i + 1) {
                None => return TagParse::Incomplete,
                Some(b'>') => {
                    return TagParse::Tag {
                        tag: ParsedTag::Open {
                            name,
                            attrs,
                            self_closing: true,
                        },
                        len: i + 2,
                    };
                }
                Some(_) => {
                    i += 1;
                }
            },
            _ if is_name_start(b) => {
                let attr_start = i;
                while i < bytes.len() && is_name_char(bytes[i]) {
                    i += 1;
                }
                if i >= bytes.len() {
                    return TagParse::Incomplete;
                }
                let attr_name = lossy(&bytes[attr_start..i]);
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if i >= bytes.len() {
                    return TagParse::Incomplete;
                }
                if bytes[i] != b'=' {
                    // Attribute without a value aborts only this attribute.
                    continue;
                }
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                let Some(&quote) = bytes.get(i) else {
                    return TagParse::Incomplete;
                };
                if quote != b'"' && quote != b'\'' {
                    // Unquoted value: abort this attribute at the next
                    // delimiter.
                    while i < bytes.len()
                        && !bytes[i].is_ascii_whitespace()
                        && bytes[i] != b'>'
                        && bytes[i] != b'/'
                    {
                        i += 1;
                    }
                    continue;
                }
                i += 1;
                let value_start = i;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                if i >= bytes.len() {
                    return TagParse::Incomplete;
                }
                let raw = String::from_utf8_lossy(&bytes[value_start..i]);
                attrs.push(Attribute {
                    name: attr_name,
                    value: decode_entities(&raw).into_owned(),
                });
                i += 1;
            }
            _ => {
                // Junk byte inside the tag, skip it.
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner_for(root: &str) -> TagScanner {
        TagScanner::new(
            Some(vec![root.to_string()]),
            gasp_core::DEFAULT_IGNORED_TAGS.clone(),
        )
    }

    fn open(name: &str) -> TagEvent {
        TagEvent::Open {
            name: name.to_string(),
            attrs: Vec::new(),
        }
    }

    fn close(name: &str) -> TagEvent {
        TagEvent::Close {
            name: name.to_string(),
        }
    }

    fn text(t: &str) -> TagEvent {
        TagEvent::Text(t.to_string())
    }

    #[test]
    fn tag_split_across_chunks() {
        let mut scanner = scanner_for("Person");
        assert!(scanner.consume(b"preamble <Pers").is_empty());
        let events = scanner.consume(b"on><name>Alice");
        assert_eq!(
            events,
            vec![open("Person"), open("name"), text("Alice")]
        );
        let events = scanner.consume(b"</name></Person>");
        assert_eq!(events, vec![close("name"), close("Person")]);
    }

    #[test]
    fn attribute_split_across_chunks() {
        let mut scanner = scanner_for("Config");
        assert_eq!(scanner.consume(b"<Config><item key=\"the"), vec![open("Config")]);
        let events = scanner.consume(b"me\">dark</item>");
        assert_eq!(
            events[0],
            TagEvent::Open {
                name: "item".to_string(),
                attrs: vec![Attribute {
                    name: "key".to_string(),
                    value: "theme".to_string(),
                }],
            }
        );
        assert_eq!(&events[1..], &[text("dark"), close("item")]);
    }

    #[test]
    fn text_outside_wanted_region_is_dropped() {
        let mut scanner = scanner_for("Person");
        let events = scanner.consume(b"Sure! Here you go: <Person></Person> Done.");
        assert_eq!(events, vec![open("Person"), close("Person")]);
    }

    #[test]
    fn ignored_region_outside_is_fully_elided() {
        let mut scanner = scanner_for("Person");
        let events =
            scanner.consume(b"<think>I will use <Person> now</think><Person></Person>");
        assert_eq!(events, vec![open("Person"), close("Person")]);
    }

    #[test]
    fn ignored_tag_inside_passes_text_through() {
        let mut scanner = scanner_for("Person");
        let events = scanner.consume(b"<Person><think>note<b>x</b></think></Person>");
        assert_eq!(
            events,
            vec![open("Person"), text("note"), text("x"), close("Person")]
        );
    }

    #[test]
    fn unbalanced_ignored_tag_closes_at_region_boundary() {
        let mut scanner = scanner_for("Person");
        let events = scanner.consume(b"<Person><thinking>half done</Person>");
        assert_eq!(events, vec![open("Person"), text("half done"), close("Person")]);
    }

    #[test]
    fn isolated_angle_bracket_is_text() {
        let mut scanner = scanner_for("Person");
        let events = scanner.consume(b"<Person><name>a < b</name></Person>");
        assert_eq!(
            events,
            vec![
                open("Person"),
                open("name"),
                text("a "),
                text("<"),
                text(" b"),
                close("name"),
                close("Person"),
            ]
        );
    }

    #[test]
    fn self_closing_tag_emits_open_and_close() {
        let mut scanner = scanner_for("Person");
        let events = scanner.consume(b"<Person/>");
        assert_eq!(events, vec![open("Person"), close("Person")]);
    }

    #[test]
    fn mismatched_close_synthesizes_inner_closes() {
        let mut scanner = scanner_for("Person");
        let events = scanner.consume(b"<Person><address><city>x</Person>");
        assert_eq!(
            events,
            vec![
                open("Person"),
                open("address"),
                open("city"),
                text("x"),
                close("city"),
                close("address"),
                close("Person"),
            ]
        );
        assert_eq!(scanner.take_issues().len(), 2);
    }

    #[test]
    fn stray_close_is_discarded() {
        let mut scanner = scanner_for("Person");
        let events = scanner.consume(b"<Person></bogus><name>x</name></Person>");
        assert_eq!(
            events,
            vec![open("Person"), open("name"), text("x"), close("name"), close("Person")]
        );
    }

    #[test]
    fn split_multibyte_text_survives_chunking() {
        let mut scanner = scanner_for("Person");
        let bytes = "<Person><name>héllo</name></Person>".as_bytes();
        let cut = bytes.iter().position(|&b| b == 0xc3).expect("two-byte char") + 1;
        let mut events = scanner.consume(&bytes[..cut]);
        events.extend(scanner.consume(&bytes[cut..]));
        let text_content: String = events
            .iter()
            .filter_map(|e| match e {
                TagEvent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text_content, "héllo");
    }

    #[test]
    fn any_root_accepts_first_tag() {
        let mut scanner = TagScanner::new(None, gasp_core::DEFAULT_IGNORED_TAGS.clone());
        let events = scanner.consume(b"noise <t><item>1</item></t>");
        assert_eq!(
            events,
            vec![open("t"), open("item"), text("1"), close("item"), close("t")]
        );
    }

    #[test]
    fn malformed_attribute_does_not_abort_tag() {
        let mut scanner = scanner_for("Person");
        let events = scanner.consume(b"<Person type=oops name=\"ok\"></Person>");
        assert_eq!(
            events[0],
            TagEvent::Open {
                name: "Person".to_string(),
                attrs: vec![Attribute {
                    name: "name".to_string(),
                    value: "ok".to_string(),
                }],
            }
        );
    }
}
