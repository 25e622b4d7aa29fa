use encoding_rs::Encoding;

/// Reassembles complete lines from arbitrarily-chunked runner output.
///
/// Lines end at `\n`, with an optional preceding `\r`. Text is only decoded once a line is
/// complete, so characters split across chunk boundaries survive.
pub struct LineBuffer {
    pending: Vec<u8>,
    encoding: &'static Encoding,
}

impl LineBuffer {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            pending: Vec::new(),
            encoding,
        }
    }

    /// Appends `chunk` and returns every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Only the new bytes can contain a terminator we haven't seen yet.
        let search_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut line_start = 0;
        let mut cursor = search_from;
        while let Some(offset) = find_newline(&self.pending[cursor..]) {
            let line_end = cursor + offset;
            lines.push(self.decode(&self.pending[line_start..line_end]));
            line_start = line_end + 1;
            cursor = line_start;
        }
        self.pending.drain(..line_start);
        lines
    }

    /// Takes whatever partial line is left, treating it as complete.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(self.decode(&rest))
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn decode(&self, mut line: &[u8]) -> String {
        if let [rest @ .., b'\r'] = line {
            line = rest;
        }
        let (text, had_errors) = self.encoding.decode_without_bom_handling(line);
        if had_errors {
            tracing::debug!(
                encoding = self.encoding.name(),
                "replaced malformed bytes in runner output"
            );
        }
        text.into_owned()
    }
}

fn find_newline(haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == b'\n')
}
