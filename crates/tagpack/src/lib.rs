//! # Tagpack
//!
//! A small, human-readable text format for trees of explicitly tagged values.
//!
//! ## Philosophy
//!
//! - **Explicit Tags**: Every sequence, mapping and tagged scalar carries exactly one `Tag`.
//!   Plain sequences and mappings carry the core tags `seq` and `map`, which are never written.
//!   Read back, an explicit `!seq` or `!map` must sit on the matching kind of node.
//! - **Flow Syntax**: One document per string, whitespace-insensitive between tokens.
//! - **Bounded**: The parser is recursive but refuses to nest deeper than `MAX_DEPTH`.
//!
//! ## Format
//!
//! - **Null**: `~`
//! - **Bool**: `true` / `false`
//! - **Integer**: `-12`, `42`
//! - **Float**: `1.0`, `2.5e-7`, `.inf`, `-.inf`, `.nan`
//! - **String**: `"text"` with `\"`, `\\`, `\n`, `\r`, `\t` and `\u{hex}` escapes
//! - **Sequence**: `[a, b, c]`
//! - **Mapping**: `{key: value, "spaced key": value}`
//! - **Tagged**: `!Name value`, where value is a scalar, sequence or mapping

use std::borrow::Cow;
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;


/// Maximum nesting of sequences and mappings accepted by the parser.
pub const MAX_DEPTH: usize = 128;

/// Tagpack parse errors.
///
/// Positions are byte offsets into the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Input ended in the middle of a value.
    UnexpectedEnd,
    /// A character that cannot start or continue the current construct.
    UnexpectedChar { pos: usize, found: char },
    /// A plain token that is neither a keyword nor a number.
    InvalidToken { pos: usize, text: String },
    /// A backslash escape inside a string is not recognized.
    InvalidEscape { pos: usize },
    /// A `!` with no tag name after it.
    EmptyTag { pos: usize },
    /// A core tag on a node of the other kind, or on a scalar.
    MisplacedCoreTag { pos: usize, tag: String },
    /// A complete value was parsed but input remains.
    TrailingInput { pos: usize },
    /// Nesting went past `MAX_DEPTH`.
    DepthExceeded,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedEnd => write!(f, "unexpected end of input"),
            Error::UnexpectedChar { pos, found } => write!(f, "unexpected {:?} at byte {}", found, pos),
            Error::InvalidToken { pos, text } => write!(f, "invalid token {:?} at byte {}", text, pos),
            Error::InvalidEscape { pos } => write!(f, "invalid string escape at byte {}", pos),
            Error::EmptyTag { pos } => write!(f, "empty tag at byte {}", pos),
            Error::MisplacedCoreTag { pos, tag } => write!(f, "'!{}' does not fit the node at byte {}", tag, pos),
            Error::TrailingInput { pos } => write!(f, "trailing input at byte {}", pos),
            Error::DepthExceeded => write!(f, "nesting deeper than {} levels", MAX_DEPTH),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for Tagpack operations.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
//  TAGS
// ============================================================================

/// Identifies the wire representation scheme of a node.
///
/// Tag text must be non-empty and must not contain whitespace or any of `[]{},"`;
/// anything else (including `::` namespaces) is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Cow<'static, str>);

impl Tag {
    /// Implicit tag of a plain sequence.
    pub const SEQ: Tag = Tag(Cow::Borrowed("seq"));
    /// Implicit tag of a plain mapping.
    pub const MAP: Tag = Tag(Cow::Borrowed("map"));

    /// Creates a tag from a static name without allocating.
    pub const fn from_static(name: &'static str) -> Self {
        Tag(Cow::Borrowed(name))
    }

    /// Creates a tag from an owned name.
    pub fn new(name: impl Into<String>) -> Self {
        Tag(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the implicit `seq` and `map` tags.
    pub fn is_core(&self) -> bool {
        *self == Tag::SEQ || *self == Tag::MAP
    }

    /// True if the tag text survives a write/parse cycle unchanged.
    pub fn is_wire_safe(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(is_tag_char)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Tag {
    fn from(name: &'static str) -> Self {
        Tag::from_static(name)
    }
}

fn is_tag_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '[' | ']' | '{' | '}' | ',' | '"')
}

// ============================================================================
//  NODES
// ============================================================================

/// The in-flight serialized form.
///
/// `Null`, `Bool`, `Int`, `Float` and `Str` are primitive leaves. Every other
/// variant carries exactly one `Tag`.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A primitive leaf with an explicit tag. The boxed node is always primitive.
    Scalar(Tag, Box<Node>),
    Seq(Tag, Vec<Node>),
    /// Ordered key/value entries.
    Map(Tag, Vec<(String, Node)>),
}

impl Node {
    /// A plain (`seq`-tagged) sequence.
    pub fn seq(items: Vec<Node>) -> Self {
        Node::Seq(Tag::SEQ, items)
    }

    /// A plain (`map`-tagged) mapping.
    pub fn map(entries: Vec<(String, Node)>) -> Self {
        Node::Map(Tag::MAP, entries)
    }

    pub fn str(v: impl Into<String>) -> Self {
        Node::Str(v.into())
    }

    /// Replaces the tag of a sequence, mapping or tagged scalar, or wraps a
    /// primitive leaf into a tagged scalar.
    pub fn with_tag(self, tag: Tag) -> Self {
        match self {
            Node::Seq(_, items) => Node::Seq(tag, items),
            Node::Map(_, entries) => Node::Map(tag, entries),
            Node::Scalar(_, inner) => Node::Scalar(tag, inner),
            prim => Node::Scalar(tag, Box::new(prim)),
        }
    }

    /// Returns the tag, or `None` for primitive leaves.
    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Node::Scalar(tag, _) | Node::Seq(tag, _) | Node::Map(tag, _) => Some(tag),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.tag().is_none()
    }

    /// Looks through a tagged scalar to its primitive leaf.
    pub fn untagged(&self) -> &Node {
        match self {
            Node::Scalar(_, inner) => inner,
            other => other,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match self {
            Node::Seq(_, items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Node)]> {
        match self {
            Node::Map(_, entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a mapping entry by key. Returns `None` for non-mappings.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.untagged() {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.untagged() {
            Node::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Reads a number, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self.untagged() {
            Node::Int(v) => Some(*v as f64),
            Node::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.untagged() {
            Node::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_text(self))
    }
}

impl FromStr for Node {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        from_text(s)
    }
}

// ============================================================================
//  WRITER
// ============================================================================

/// Renders a node as a single line of text.
pub fn to_text(node: &Node) -> String {
    let mut out = String::with_capacity(64);
    write_node(&mut out, node);
    out
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Null => out.push('~'),
        Node::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Node::Int(v) => { let _ = write!(out, "{}", v); },
        Node::Float(v) => write_float(out, *v),
        Node::Str(s) => write_str(out, s),
        Node::Scalar(tag, inner) => {
            write_tag(out, tag);
            write_node(out, inner);
        }
        Node::Seq(tag, items) => {
            if *tag != Tag::SEQ {
                write_tag(out, tag);
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 { out.push_str(", "); }
                write_node(out, item);
            }
            out.push(']');
        }
        Node::Map(tag, entries) => {
            if *tag != Tag::MAP {
                write_tag(out, tag);
            }
            out.push('{');
            for (i, (key, value)) in entries.iter().enumerate() {
                if i > 0 { out.push_str(", "); }
                write_key(out, key);
                out.push_str(": ");
                write_node(out, value);
            }
            out.push('}');
        }
    }
}

fn write_tag(out: &mut String, tag: &Tag) {
    out.push('!');
    out.push_str(tag.as_str());
    out.push(' ');
}

// `{:?}` yields the shortest text that parses back to the same bits, and
// always contains a `.` or an exponent.
fn write_float(out: &mut String, v: f64) {
    if v.is_nan() {
        out.push_str(".nan");
    } else if v.is_infinite() {
        out.push_str(if v > 0.0 { ".inf" } else { "-.inf" });
    } else {
        let _ = write!(out, "{:?}", v);
    }
}

fn write_str(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => { let _ = write!(out, "\\u{{{:x}}}", c as u32); },
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_key(out: &mut String, key: &str) {
    if is_bare_key(key) {
        out.push_str(key);
    } else {
        write_str(out, key);
    }
}

fn is_bare_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(is_bare_key_char)
}

fn is_bare_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

// ============================================================================
//  PARSER
// ============================================================================

/// Parses exactly one node from `text`, ignoring surrounding whitespace.
pub fn from_text(text: &str) -> Result<Node> {
    let mut parser = Parser { src: text, pos: 0, depth: 0 };
    let node = parser.node()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(Error::TrailingInput { pos: parser.pos });
    }
    Ok(node)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() { break; }
            self.pos += c.len_utf8();
        }
    }

    fn unexpected(&self) -> Error {
        match self.peek() {
            Some(found) => Error::UnexpectedChar { pos: self.pos, found },
            None => Error::UnexpectedEnd,
        }
    }

    /// Consumes characters while `pred` holds and returns them.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let src = self.src;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) { break; }
            self.pos += c.len_utf8();
        }
        &src[start..self.pos]
    }

    fn node(&mut self) -> Result<Node> {
        self.skip_ws();
        match self.peek() {
            None => Err(Error::UnexpectedEnd),
            Some('!') => {
                let start = self.pos;
                let tag = self.tag()?;
                self.skip_ws();
                // `!seq` only on sequences and `!map` only on maps
                let fits = match self.peek() {
                    Some('[') => tag != Tag::MAP,
                    Some('{') => tag != Tag::SEQ,
                    _ => !tag.is_core(),
                };
                if !fits {
                    return Err(Error::MisplacedCoreTag { pos: start, tag: tag.as_str().to_string() });
                }
                match self.peek() {
                    Some('[') => Ok(Node::Seq(tag, self.seq_body()?)),
                    Some('{') => Ok(Node::Map(tag, self.map_body()?)),
                    Some('!') => Err(self.unexpected()),
                    _ => Ok(Node::Scalar(tag, Box::new(self.primitive()?))),
                }
            }
            Some('[') => Ok(Node::seq(self.seq_body()?)),
            Some('{') => Ok(Node::map(self.map_body()?)),
            Some(_) => self.primitive(),
        }
    }

    fn tag(&mut self) -> Result<Tag> {
        let start = self.pos;
        self.bump(); // '!'
        let name = self.take_while(is_tag_char);
        if name.is_empty() {
            return Err(Error::EmptyTag { pos: start });
        }
        Ok(Tag::new(name))
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::DepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    fn seq_body(&mut self) -> Result<Vec<Node>> {
        self.enter()?;
        self.bump(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.bump();
                break;
            }
            items.push(self.node()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => { self.bump(); },
                Some(']') => { self.bump(); break; },
                _ => return Err(self.unexpected()),
            }
        }
        self.depth -= 1;
        Ok(items)
    }

    fn map_body(&mut self) -> Result<Vec<(String, Node)>> {
        self.enter()?;
        self.bump(); // '{'
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.bump();
                break;
            }
            let key = self.key()?;
            self.skip_ws();
            if self.peek() != Some(':') {
                return Err(self.unexpected());
            }
            self.bump();
            let value = self.node()?;
            entries.push((key, value));
            self.skip_ws();
            match self.peek() {
                Some(',') => { self.bump(); },
                Some('}') => { self.bump(); break; },
                _ => return Err(self.unexpected()),
            }
        }
        self.depth -= 1;
        Ok(entries)
    }

    fn key(&mut self) -> Result<String> {
        if self.peek() == Some('"') {
            return self.string();
        }
        let key = self.take_while(is_bare_key_char);
        if key.is_empty() {
            return Err(self.unexpected());
        }
        Ok(key.to_string())
    }

    fn primitive(&mut self) -> Result<Node> {
        match self.peek() {
            Some('"') => Ok(Node::Str(self.string()?)),
            Some('~') => { self.bump(); Ok(Node::Null) },
            Some(c) if is_token_char(c) => {
                let start = self.pos;
                let text = self.take_while(is_token_char);
                parse_token(text).ok_or_else(|| Error::InvalidToken { pos: start, text: text.to_string() })
            }
            _ => Err(self.unexpected()),
        }
    }

    fn string(&mut self) -> Result<String> {
        self.bump(); // '"'
        let mut out = String::new();
        loop {
            let esc_pos = self.pos;
            match self.bump() {
                None => return Err(Error::UnexpectedEnd),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => out.push(self.unicode_escape(esc_pos)?),
                    Some(_) => return Err(Error::InvalidEscape { pos: esc_pos }),
                    None => return Err(Error::UnexpectedEnd),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn unicode_escape(&mut self, esc_pos: usize) -> Result<char> {
        if self.bump() != Some('{') {
            return Err(Error::InvalidEscape { pos: esc_pos });
        }
        let hex = self.take_while(|c| c.is_ascii_hexdigit());
        if self.bump() != Some('}') {
            return Err(Error::InvalidEscape { pos: esc_pos });
        }
        u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(Error::InvalidEscape { pos: esc_pos })
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_')
}

fn parse_token(text: &str) -> Option<Node> {
    match text {
        "true" => return Some(Node::Bool(true)),
        "false" => return Some(Node::Bool(false)),
        "null" => return Some(Node::Null),
        ".inf" | "+.inf" => return Some(Node::Float(f64::INFINITY)),
        "-.inf" => return Some(Node::Float(f64::NEG_INFINITY)),
        ".nan" => return Some(Node::Float(f64::NAN)),
        _ => {}
    }
    // Rust's float parser also accepts "inf" and "NaN"; restrict to numerals.
    if !text.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')) {
        return None;
    }
    if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().ok().map(Node::Float)
    } else {
        text.parse::<i64>().ok().map(Node::Int)
    }
}
