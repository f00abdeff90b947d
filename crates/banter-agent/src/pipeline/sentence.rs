/// Characters that close a sentence for TTS grouping.
pub const SENTENCE_DELIMITERS: [char; 7] = ['.', '!', '?', '。', '！', '？', '\n'];

/// Accumulates streamed text and yields complete sentences.
///
/// Extraction slices through the *last* delimiter currently in the
/// buffer — abbreviations like "U.S.A." therefore split naïvely, which
/// is accepted (smarter splitting needs a test corpus we don't have).
#[derive(Default)]
pub struct SentenceBuffer {
    buf: String,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append streamed text to the buffer.
    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    /// Remove and return one complete sentence, if the buffer holds a
    /// delimiter. Whitespace-only slices are dropped (returns `None`).
    pub fn extract_sentence(&mut self) -> Option<String> {
        let pos = self.find_last_delimiter()?;
        let end = pos + self.buf[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
        let sentence = self.buf[..end].trim().to_string();
        self.buf.drain(..end);
        if sentence.is_empty() {
            None
        } else {
            Some(sentence)
        }
    }

    /// Drain every complete sentence currently buffered.
    pub fn drain_sentences(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while self.find_last_delimiter().is_some() {
            if let Some(s) = self.extract_sentence() {
                out.push(s);
            }
        }
        out
    }

    /// Return any non-empty residue and reset the buffer. Called at
    /// stream end.
    pub fn flush(&mut self) -> Option<String> {
        let remaining = self.buf.trim().to_string();
        self.buf.clear();
        if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        }
    }

    fn find_last_delimiter(&self) -> Option<usize> {
        self.buf
            .char_indices()
            .filter(|(_, c)| SENTENCE_DELIMITERS.contains(c))
            .map(|(i, _)| i)
            .last()
    }
}
