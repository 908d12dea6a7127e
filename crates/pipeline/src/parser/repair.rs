//! Lenient completion of truncated JSON
//!
//! The producer streams a JSON object token by token, so at any moment the
//! buffer is usually a prefix of a valid document. [`repair`] turns such a
//! prefix into parseable JSON by closing whatever is still open and dropping
//! members that cannot be completed. It never invents content beyond `null`
//! and the literal a partial token already commits to.
//!
//! While scanning it also counts how many elements of the top-level
//! `segments` array were closed by the producer itself. Elements closed only
//! by the repair may still be amended and are never treated as final.

/// Keys of the top-level array holding segments
const SEGMENT_KEYS: [&str; 2] = ["segments", "steps"];

/// Output of a successful repair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    pub json: String,
    /// Segment objects the producer closed with its own `}`
    pub sealed_segments: usize,
    /// The root object was closed by the producer
    pub root_closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Just after `{` or `[`
    First,
    /// Object key after a comma
    Key,
    Colon,
    /// Value after a colon (objects) or a comma (arrays)
    Value,
    /// Comma or closer
    Next,
}

#[derive(Debug)]
struct Frame {
    closer: char,
    expect: Expect,
    /// Output length to cut back to when the current member is incomplete
    rollback: usize,
    /// Last complete key seen in this object
    last_key: Option<String>,
    /// Array of segments directly under the root object
    tracks_segments: bool,
}

impl Frame {
    fn new(closer: char, rollback: usize, tracks_segments: bool) -> Self {
        Self {
            closer,
            expect: Expect::First,
            rollback,
            last_key: None,
            tracks_segments,
        }
    }

    fn is_object(&self) -> bool {
        self.closer == '}'
    }

    fn expects_value(&self) -> bool {
        if self.is_object() {
            self.expect == Expect::Value
        } else {
            matches!(self.expect, Expect::First | Expect::Value)
        }
    }

    fn expects_key(&self) -> bool {
        self.is_object() && matches!(self.expect, Expect::First | Expect::Key)
    }
}

#[derive(Debug)]
struct StringScan {
    is_key: bool,
    /// Output offset of the opening quote
    start: usize,
    escape: bool,
    unicode_left: u8,
    /// Output offset of the backslash starting the pending escape
    escape_pos: usize,
}

/// Scanner state over one buffer
struct Scanner {
    out: String,
    stack: Vec<Frame>,
    string: Option<StringScan>,
    token_start: Option<usize>,
    sealed_segments: usize,
    root_closed: bool,
}

/// Repair a possibly truncated JSON object
///
/// Returns `None` when the buffer holds no object start yet.
pub fn repair(raw: &str) -> Option<Repaired> {
    let start = raw.find('{')?;
    let text = strip_fences(&raw[start..]);

    let mut scanner = Scanner {
        out: String::with_capacity(text.len() + 16),
        stack: Vec::new(),
        string: None,
        token_start: None,
        sealed_segments: 0,
        root_closed: false,
    };

    for c in text.chars() {
        if scanner.root_closed {
            break;
        }
        scanner.feed(c);
    }
    scanner.finish();

    Some(Repaired {
        json: scanner.out,
        sealed_segments: scanner.sealed_segments,
        root_closed: scanner.root_closed,
    })
}

/// Drop trailing markdown fence markers the model may wrap its JSON in
fn strip_fences(text: &str) -> &str {
    let mut text = text.trim_end();
    while text.ends_with('`') {
        text = text.trim_end_matches('`').trim_end();
    }
    text
}

impl Scanner {
    fn top(&mut self) -> Option<&mut Frame> {
        self.stack.last_mut()
    }

    fn feed(&mut self, c: char) {
        if self.string.is_some() {
            self.feed_string(c);
            return;
        }

        if self.token_start.is_some() {
            if is_delimiter(c) {
                self.token_start = None;
            } else {
                self.out.push(c);
                return;
            }
        }

        match c {
            c if c.is_whitespace() => self.out.push(c),
            '"' => self.open_string(),
            '{' | '[' => self.open_container(c),
            '}' | ']' => self.close_container(c),
            ':' => {
                if let Some(frame) = self.stack.last_mut() {
                    if frame.is_object() && frame.expect == Expect::Colon {
                        frame.expect = Expect::Value;
                        self.out.push(':');
                    }
                }
            }
            ',' => {
                let len = self.out.len();
                if let Some(frame) = self.stack.last_mut() {
                    if frame.expect == Expect::Next {
                        frame.rollback = len;
                        frame.expect = if frame.is_object() { Expect::Key } else { Expect::Value };
                        self.out.push(',');
                    }
                }
            }
            _ => self.open_token(c),
        }
    }

    /// Insert a missing comma between two array values
    fn separate_array_value(&mut self) -> bool {
        let len = self.out.len();
        match self.stack.last_mut() {
            Some(frame) if !frame.is_object() && frame.expect == Expect::Next => {
                frame.rollback = len;
                frame.expect = Expect::Value;
                self.out.push(',');
                true
            }
            Some(frame) => frame.expects_value(),
            None => false,
        }
    }

    fn open_string(&mut self) {
        let len = self.out.len();
        let Some(frame) = self.stack.last_mut() else {
            return;
        };

        let is_key = if frame.expects_key() {
            true
        } else if frame.is_object() && frame.expect == Expect::Next {
            // Missing comma between members
            frame.rollback = len;
            frame.expect = Expect::Key;
            self.out.push(',');
            true
        } else if frame.is_object() && frame.expect == Expect::Colon {
            frame.expect = Expect::Value;
            self.out.push(':');
            false
        } else if self.separate_array_value() {
            false
        } else {
            return;
        };

        if !is_key {
            if let Some(frame) = self.top() {
                frame.expect = Expect::Next;
            }
        }

        self.string = Some(StringScan {
            is_key,
            start: self.out.len(),
            escape: false,
            unicode_left: 0,
            escape_pos: 0,
        });
        self.out.push('"');
    }

    fn feed_string(&mut self, c: char) {
        let Some(scan) = self.string.as_mut() else {
            return;
        };

        if scan.unicode_left > 0 {
            scan.unicode_left = if c.is_ascii_hexdigit() { scan.unicode_left - 1 } else { 0 };
            self.out.push(c);
            return;
        }
        if scan.escape {
            scan.escape = false;
            if c == 'u' {
                scan.unicode_left = 4;
            }
            self.out.push(c);
            return;
        }

        match c {
            '\\' => {
                scan.escape = true;
                scan.escape_pos = self.out.len();
                self.out.push(c);
            }
            '"' => {
                self.out.push(c);
                self.close_string();
            }
            // Raw control characters are invalid inside JSON strings
            '\n' => self.out.push_str("\\n"),
            '\r' => self.out.push_str("\\r"),
            '\t' => self.out.push_str("\\t"),
            _ => self.out.push(c),
        }
    }

    fn close_string(&mut self) {
        let Some(scan) = self.string.take() else {
            return;
        };
        if !scan.is_key {
            return;
        }
        let key = self.out[scan.start + 1..self.out.len() - 1].to_string();
        if let Some(frame) = self.top() {
            frame.last_key = Some(key);
            frame.expect = Expect::Colon;
        }
    }

    fn open_container(&mut self, c: char) {
        let closer = if c == '{' { '}' } else { ']' };

        if self.stack.is_empty() {
            self.out.push(c);
            let len = self.out.len();
            self.stack.push(Frame::new(closer, len, false));
            return;
        }

        if !self.separate_array_value() {
            return;
        }

        let depth = self.stack.len();
        let mut tracks_segments = false;
        if let Some(parent) = self.top() {
            tracks_segments = closer == ']'
                && depth == 1
                && parent
                    .last_key
                    .as_deref()
                    .is_some_and(|key| SEGMENT_KEYS.contains(&key));
            parent.expect = Expect::Next;
        }

        self.out.push(c);
        let len = self.out.len();
        self.stack.push(Frame::new(closer, len, tracks_segments));
    }

    fn close_container(&mut self, c: char) {
        let Some(frame) = self.stack.last() else {
            return;
        };
        if frame.closer != c {
            return;
        }

        let dangling = match (frame.is_object(), frame.expect) {
            (true, Expect::Key | Expect::Colon | Expect::Value) => true,
            (false, Expect::Value) => true,
            _ => false,
        };
        if dangling {
            let rollback = frame.rollback;
            self.out.truncate(rollback);
        }

        self.out.push(c);
        let closed = self.stack.pop();

        match self.stack.last_mut() {
            None => self.root_closed = true,
            Some(parent) => {
                parent.expect = Expect::Next;
                if parent.tracks_segments && closed.is_some_and(|f| f.is_object()) {
                    self.sealed_segments += 1;
                }
            }
        }
    }

    fn open_token(&mut self, c: char) {
        if !self.separate_array_value() {
            return;
        }
        if let Some(frame) = self.top() {
            frame.expect = Expect::Next;
        }
        self.token_start = Some(self.out.len());
        self.out.push(c);
    }

    /// Close everything left open at the end of the buffer
    fn finish(&mut self) {
        if let Some(scan) = self.string.take() {
            if scan.escape || scan.unicode_left > 0 {
                self.out.truncate(scan.escape_pos);
            }
            if scan.is_key {
                // A key without its value cannot be completed
                if let Some(frame) = self.stack.last() {
                    let rollback = frame.rollback;
                    self.out.truncate(rollback);
                }
            } else {
                self.out.push('"');
            }
        }

        if let Some(start) = self.token_start.take() {
            let completed = complete_token(&self.out[start..]);
            self.out.truncate(start);
            self.out.push_str(&completed);
        }

        while let Some(frame) = self.stack.pop() {
            match (frame.is_object(), frame.expect) {
                (true, Expect::Key | Expect::Colon) | (false, Expect::Value) => {
                    self.out.truncate(frame.rollback);
                }
                (true, Expect::Value) => self.out.push_str("null"),
                _ => {}
            }
            self.out.push(frame.closer);
        }
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '}' | ']' | ':' | '"')
}

/// Finish a bare literal or number cut off mid-token
fn complete_token(token: &str) -> String {
    for literal in ["true", "false", "null"] {
        if literal.starts_with(token) {
            return literal.to_string();
        }
    }

    let trimmed = token.trim_end_matches(['.', '-', '+', 'e', 'E']);
    if trimmed.is_empty() {
        "null".to_string()
    } else {
        trimmed.to_string()
    }
}
