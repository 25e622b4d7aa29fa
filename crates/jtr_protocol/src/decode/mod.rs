//! Decoders for the line-oriented status protocols spoken by test runners.
//!
//! Every dialect shares the same shape: raw bytes arrive in arbitrary chunks, are split into
//! complete lines by a [LineBuffer](buffer::LineBuffer), and each line is handed to a
//! dialect-specific [LineParser] that records what it learned in a [ResultTable]. At the end of
//! a run, the table is finalized into one result per requested test.

mod buffer;
mod line_prefix;
mod table;
mod tagged;

pub use buffer::LineBuffer;
pub use line_prefix::LinePrefixParser;
pub use table::ResultTable;
pub use tagged::TaggedParser;

use encoding_rs::Encoding;

use crate::model::{ProgressSender, TestIdentity, TestResult};

/// Consumes the streamed output of one runner and produces its final results.
pub trait Decoder: Send {
    /// Feeds the next chunk of the runner's status stream. Chunks may split lines, or
    /// multi-byte characters, anywhere.
    fn feed(&mut self, chunk: &[u8]);

    /// Feeds a chunk of the runner's diagnostic side channel. Never affects results.
    fn feed_error(&mut self, chunk: &[u8]) {
        tracing::debug!(target: "jtr::runner_stderr", "{}", String::from_utf8_lossy(chunk));
    }

    /// Flushes any trailing partial line and produces the result set.
    ///
    /// A cancelled decoder that never processed a line yields no results at all.
    fn finalize(self: Box<Self>, was_cancelled: bool) -> Vec<TestResult>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed runner event {line:?}: {source}")]
    MalformedEvent {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The wire formats runners report in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `@@<TestRunner-({..})-TestRunner>` events, with tests keyed relative to the open suite.
    Tagged,
    /// Tagged events carrying JUnit Platform unique ids and statuses.
    TaggedJUnit5,
    /// Tagged events keyed directly by the reported name.
    Legacy,
    /// `%TESTS`/`%TESTE`/`%TRACES`.. token lines.
    LinePrefix,
}

pub struct DecoderOptions {
    pub project: String,
    /// The identities the run is expected to report on, in request order.
    pub requested: Vec<TestIdentity>,
    /// Text encoding of the runner's output. Must be ASCII-compatible.
    pub encoding: &'static Encoding,
    pub progress: Option<ProgressSender>,
}

impl DecoderOptions {
    pub fn new(project: impl Into<String>, requested: Vec<TestIdentity>) -> Self {
        Self {
            project: project.into(),
            requested,
            encoding: encoding_rs::UTF_8,
            progress: None,
        }
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl Dialect {
    pub fn decoder(self, options: DecoderOptions) -> Box<dyn Decoder> {
        match self {
            Dialect::Tagged => Box::new(StreamDecoder::new(options, TaggedParser::suite())),
            Dialect::TaggedJUnit5 => Box::new(StreamDecoder::new(options, TaggedParser::junit5())),
            Dialect::Legacy => Box::new(StreamDecoder::new(options, TaggedParser::legacy())),
            Dialect::LinePrefix => {
                Box::new(StreamDecoder::new(options, LinePrefixParser::default()))
            }
        }
    }
}

/// Interprets one complete, non-empty line of a dialect.
pub trait LineParser: Send {
    fn parse_line(&mut self, line: &str, table: &mut ResultTable) -> Result<(), DecodeError>;
}

struct StreamDecoder<P> {
    buffer: LineBuffer,
    table: ResultTable,
    parser: P,
    lines_processed: usize,
}

impl<P: LineParser> StreamDecoder<P> {
    fn new(options: DecoderOptions, parser: P) -> Self {
        let DecoderOptions {
            project,
            requested,
            encoding,
            progress,
        } = options;
        Self {
            buffer: LineBuffer::new(encoding),
            table: ResultTable::new(project, requested, progress),
            parser,
            lines_processed: 0,
        }
    }

    fn process_line(&mut self, line: String) {
        if line.is_empty() {
            return;
        }
        self.lines_processed += 1;
        if let Err(error) = self.parser.parse_line(&line, &mut self.table) {
            tracing::debug!(%error, "skipping undecodable runner line");
        }
    }
}

impl<P: LineParser> Decoder for StreamDecoder<P> {
    fn feed(&mut self, chunk: &[u8]) {
        for line in self.buffer.push(chunk) {
            self.process_line(line);
        }
    }

    fn finalize(mut self: Box<Self>, was_cancelled: bool) -> Vec<TestResult> {
        if let Some(rest) = self.buffer.finish() {
            self.process_line(rest);
        }
        let processed_any = self.lines_processed > 0;
        self.table.finalize(was_cancelled, processed_any)
    }
}

#[cfg(test)]
mod test {
    use super::{Decoder, DecoderOptions, Dialect};
    use crate::model::{ResultStatus, TestIdentity, TestResult};

    pub(crate) fn decode_whole(
        dialect: Dialect,
        requested: &[TestIdentity],
        input: &str,
    ) -> Vec<TestResult> {
        let mut decoder = dialect.decoder(DecoderOptions::new("p", requested.to_vec()));
        decoder.feed(input.as_bytes());
        decoder.finalize(false)
    }

    pub(crate) fn decode_chunked(
        dialect: Dialect,
        requested: &[TestIdentity],
        input: &str,
        chunk_size: usize,
    ) -> Vec<TestResult> {
        let mut decoder = dialect.decoder(DecoderOptions::new("p", requested.to_vec()));
        for chunk in input.as_bytes().chunks(chunk_size) {
            decoder.feed(chunk);
        }
        decoder.finalize(false)
    }

    #[test]
    fn cancel_before_any_line_yields_nothing() {
        for dialect in [
            Dialect::Tagged,
            Dialect::TaggedJUnit5,
            Dialect::Legacy,
            Dialect::LinePrefix,
        ] {
            let requested = vec![TestIdentity::new("p", "a.B", "m")];
            let decoder = dialect.decoder(DecoderOptions::new("p", requested));
            assert!(decoder.finalize(true).is_empty(), "{dialect:?}");
        }
    }

    #[test]
    fn cancel_after_output_yields_partial_results_and_skips() {
        let requested = vec![
            TestIdentity::new("p", "a.B", "one"),
            TestIdentity::new("p", "a.B", "two"),
        ];
        let mut decoder = Dialect::Legacy.decoder(DecoderOptions::new("p", requested));
        decoder.feed(
            br#"@@<TestRunner-({"name":"testStarted","attributes":{"name":"a.B#one"}})-TestRunner>
@@<TestRunner-({"name":"testFinished","attributes":{"name":"a.B#one","duration":"3"}})-TestRunner>
@@<TestRunner-({"name":"testStarted","attributes":{"name":"a.B#two"}})-TestRunner>
"#,
        );
        let results = decoder.finalize(true);

        let statuses: Vec<_> = results
            .iter()
            .map(|r| (r.identity.method.as_str(), r.detail.status))
            .collect();
        assert_eq!(
            statuses,
            vec![("one", ResultStatus::Pass), ("two", ResultStatus::Skipped)]
        );
    }

    #[test]
    fn no_output_skips_everything_requested() {
        let requested = vec![
            TestIdentity::new("p", "a.B", "one"),
            TestIdentity::new("p", "a.B", "two"),
            TestIdentity::new("p", "a.B", "one"),
        ];
        let results = decode_whole(Dialect::Tagged, &requested, "");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.detail.status == ResultStatus::Skipped));
    }

    #[test]
    fn stderr_never_affects_results() {
        let requested = vec![TestIdentity::new("p", "a.B", "one")];
        let line = r#"@@<TestRunner-({"name":"testStarted","attributes":{"name":"a.B#one"}})-TestRunner>
@@<TestRunner-({"name":"testFinished","attributes":{"name":"a.B#one"}})-TestRunner>
"#;
        let mut decoder = Dialect::Legacy.decoder(DecoderOptions::new("p", requested));
        decoder.feed_error(line.as_bytes());
        decoder.feed_error(b"%TESTS  1,one(a.B)\n%FAILED 1,one(a.B)\n");
        let results = decoder.finalize(false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].detail.status, ResultStatus::Skipped);
    }
}
