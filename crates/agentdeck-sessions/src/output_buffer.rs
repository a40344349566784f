use agentdeck_types::OUTPUT_BUFFER_LIMIT;

/// Trailing window over a session's output
///
/// Holds at most `limit` bytes; older output is dropped from the front. The
/// cut always lands on a character boundary, so the retained text can be a few
/// bytes shorter than the limit.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    content: String,
    limit: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_limit(OUTPUT_BUFFER_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            content: String::new(),
            limit,
        }
    }

    pub fn append(&mut self, chunk: &str) {
        if chunk.len() >= self.limit {
            self.content.clear();
            self.content.push_str(&chunk[tail_start(chunk, self.limit)..]);
            return;
        }

        self.content.push_str(chunk);
        if self.content.len() > self.limit {
            let start = tail_start(&self.content, self.limit);
            self.content.drain(..start);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offset where the last `limit` bytes of `text` begin, rounded up to a char boundary
fn tail_start(text: &str, limit: usize) -> usize {
    let mut start = text.len().saturating_sub(limit);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    start
}
