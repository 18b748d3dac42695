//! Incremental detection of protocol requests inside streamed model output.
//!
//! Model text arrives in fragments whose boundaries need not line up with JSON
//! tokens. The scanner drops everything before the first `{`, tracks brace
//! depth outside string literals, and tries to parse each balanced candidate.
//! Only objects carrying a `method` key count as requests.

use serde_json::Value;
use tracing::warn;

/// Default cap on the candidate buffer
pub const DEFAULT_MAX_BUFFER: usize = 64 * 1024;

enum Step {
    /// A request was found; the text after it is returned
    Found(Value, String),
    /// A balanced candidate was not a request; rescan from its second character
    Rejected(String),
    /// The input was consumed without completing a candidate
    NeedMore,
}

/// Stateful brace matcher. Create a fresh one for every model response.
#[derive(Debug)]
pub struct StreamScanner {
    buffer: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
    max_buffer: usize,
    found: bool,
}

impl Default for StreamScanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER)
    }
}

impl StreamScanner {
    pub fn new(max_buffer: usize) -> Self {
        Self {
            buffer: String::new(),
            depth: 0,
            in_string: false,
            escaped: false,
            max_buffer,
            found: false,
        }
    }

    /// Feed the next fragment. Returns the first complete request object, once;
    /// everything after it is ignored.
    pub fn push(&mut self, chunk: &str) -> Option<Value> {
        if self.found {
            return None;
        }
        let mut input = chunk.to_string();
        loop {
            match self.consume(&input) {
                Step::Found(value, _) => {
                    self.found = true;
                    return Some(value);
                }
                Step::Rejected(rest) => {
                    input = rest;
                }
                Step::NeedMore => {
                    return None;
                }
            }
        }
    }

    /// Whether a request has already been emitted
    pub fn is_done(&self) -> bool {
        self.found
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
    }

    fn consume(&mut self, input: &str) -> Step {
        for (i, c) in input.char_indices() {
            if self.buffer.is_empty() {
                if c == '{' {
                    self.buffer.push(c);
                    self.depth = 1;
                }
                continue;
            }

            self.buffer.push(c);
            if self.buffer.len() > self.max_buffer {
                warn!("Discarding {} bytes of unbalanced model output", self.buffer.len());
                self.reset();
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match c {
                '"' => {
                    self.in_string = true;
                }
                '{' => {
                    self.depth += 1;
                }
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let candidate = std::mem::take(&mut self.buffer);
                        self.reset();
                        let rest = &input[i + c.len_utf8()..];
                        if let Some(value) = as_request(&candidate) {
                            return Step::Found(value, rest.to_string());
                        }
                        // The opening brace is ASCII, so index 1 is a boundary
                        return Step::Rejected(format!("{}{}", &candidate[1..], rest));
                    }
                }
                _ => {}
            }
        }
        Step::NeedMore
    }
}

fn as_request(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.get("method").is_some() => Some(value),
        _ => None,
    }
}

/// Every request object embedded in a complete piece of text, in order
pub fn find_json_objects(text: &str) -> Vec<Value> {
    let mut scanner = StreamScanner::new(usize::MAX);
    let mut found = Vec::new();
    let mut input = text.to_string();
    loop {
        match scanner.consume(&input) {
            Step::Found(value, rest) => {
                found.push(value);
                input = rest;
            }
            Step::Rejected(rest) => {
                input = rest;
            }
            Step::NeedMore => {
                return found;
            }
        }
    }
}
