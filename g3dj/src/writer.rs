//! Structured JSON document writer.
//!
//! A low-level, stack-disciplined emitter: the serializer opens and closes
//! containers, writes keys and scalars, and the writer handles comma
//! placement, indentation, escaping and float formatting. Nesting balance
//! is the caller's contract; the writer does not validate it.
//!
//! All output is buffered and flushed to the sink exactly once, either by
//! [`JsonWriter::finish`] or by `Drop` if `finish` was never called.

use std::fmt::Write as _;
use std::io;

use base64::Engine as _;

/// How non-finite floats are rendered. The document grammar forbids bare
/// `Infinity`/`NaN` literals, so they are either zeroed or quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatPolicy {
    /// Replace non-finite values with `0.0`.
    Substitute,
    /// Render quoted sentinel tokens: `"Infinity"`, `"-Infinity"`, `"NaN"`.
    #[default]
    Sentinel,
}

pub struct JsonWriter<W: io::Write> {
    sink: W,
    buf: String,
    depth: usize,
    /// One "no element written yet" flag per open container.
    first: Vec<bool>,
    /// Set by `key`, cleared by the next value so it prints on the key's line.
    after_key: bool,
    policy: FloatPolicy,
    flushed: bool,
}

impl<W: io::Write> JsonWriter<W> {
    pub fn new(sink: W, policy: FloatPolicy) -> Self {
        Self {
            sink,
            buf: String::new(),
            depth: 0,
            first: Vec::new(),
            after_key: false,
            policy,
            flushed: false,
        }
    }

    /// Position the cursor for a new child of the current container:
    /// comma if a sibling precedes it, then a fresh indented line.
    fn begin_child(&mut self) {
        match self.first.last_mut() {
            Some(first) if *first => *first = false,
            Some(_) => self.buf.push(','),
            None => {}
        }
        if !self.buf.is_empty() {
            self.buf.push('\n');
        }
        for _ in 0..self.depth {
            self.buf.push('\t');
        }
    }

    /// Position the cursor for a value: inline after a pending key,
    /// otherwise as a regular child.
    fn begin_value(&mut self) {
        if self.after_key {
            self.after_key = false;
        } else {
            self.begin_child();
        }
    }

    fn line_break(&mut self) {
        self.buf.push('\n');
        for _ in 0..self.depth {
            self.buf.push('\t');
        }
    }

    pub fn key(&mut self, name: &str) {
        self.begin_child();
        self.buf.push('"');
        self.buf.push_str(name);
        self.buf.push_str("\": ");
        self.after_key = true;
    }

    pub fn start_object(&mut self) {
        self.begin_value();
        self.buf.push('{');
        self.first.push(true);
        self.depth += 1;
    }

    pub fn end_object(&mut self) {
        self.depth -= 1;
        self.first.pop();
        self.line_break();
        self.buf.push('}');
    }

    pub fn start_array(&mut self) {
        self.begin_value();
        self.buf.push('[');
        self.first.push(true);
        self.depth += 1;
    }

    pub fn end_array(&mut self) {
        self.depth -= 1;
        self.first.pop();
        self.line_break();
        self.buf.push(']');
    }

    /// Quoted string with backslash and double quote escaped. No other
    /// transformation is applied.
    pub fn string(&mut self, value: &str) {
        self.begin_value();
        self.buf.push('"');
        for c in value.chars() {
            if c == '\\' || c == '"' {
                self.buf.push('\\');
            }
            self.buf.push(c);
        }
        self.buf.push('"');
    }

    pub fn int(&mut self, value: i64) {
        self.begin_value();
        let _ = write!(self.buf, "{value}");
    }

    pub fn float(&mut self, value: f32) {
        self.begin_value();
        if value.is_finite() {
            let _ = write!(self.buf, "{value}");
        } else {
            match self.policy {
                FloatPolicy::Substitute => self.buf.push_str("0.0"),
                FloatPolicy::Sentinel => {
                    let token = if value.is_nan() {
                        "\"NaN\""
                    } else if value > 0.0 {
                        "\"Infinity\""
                    } else {
                        "\"-Infinity\""
                    };
                    self.buf.push_str(token);
                }
            }
        }
    }

    /// Base64-encoded binary payload as a quoted string. Newlines an
    /// encoder might embed are collapsed to spaces; the grammar forbids
    /// literal newlines inside strings.
    pub fn binary(&mut self, bytes: &[u8]) {
        self.begin_value();
        let mut encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        if encoded.contains('\n') {
            encoded = encoded.replace('\n', " ");
        }
        self.buf.push('"');
        self.buf.push_str(&encoded);
        self.buf.push('"');
    }

    /// Flush the buffered document to the sink. Consumes the writer; the
    /// export path calls this so flush failures surface as errors.
    pub fn finish(mut self) -> io::Result<()> {
        self.flushed = true;
        self.sink.write_all(self.buf.as_bytes())?;
        self.sink.flush()
    }
}

impl<W: io::Write> Drop for JsonWriter<W> {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        // Last-resort flush so error paths still leave a partial document.
        let result = self
            .sink
            .write_all(self.buf.as_bytes())
            .and_then(|_| self.sink.flush());
        if let Err(e) = result {
            tracing::warn!("Failed to flush document on drop: {}", e);
        }
    }
}
