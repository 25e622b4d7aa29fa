//! Runners that report with `%TOKEN` prefixed lines over a socket.
//!
//! ```text
//! %TESTS  3,testFoo(com.acme.BarTest)
//! %FAILED 3,testFoo(com.acme.BarTest)
//! %TRACES
//! java.lang.AssertionError: expected:<1> but was:<2>
//!     at com.acme.BarTest.testFoo(BarTest.java:12)
//! %TRACEE
//! %TESTE  3,testFoo(com.acme.BarTest)
//! ```

use std::sync::OnceLock;

use regex::Regex;

use super::{DecodeError, LineParser, ResultTable};
use crate::model::{ResultStatus, TestIdentity};

const TEST_START: &str = "%TESTS";
const TEST_END: &str = "%TESTE";
const TEST_FAILED: &str = "%FAILED";
const TEST_ERROR: &str = "%ERROR";
const TRACE_START: &str = "%TRACES";
const TRACE_END: &str = "%TRACEE";

const IGNORE_PREFIX: &str = "@Ignore: ";
const ASSUMPTION_FAILURE_PREFIX: &str = "@AssumptionFailure: ";

/// Method name given to failures the runner reports against a whole class.
pub const CLASS_ERROR_METHOD: &str = "<TestError>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Ignored,
    AssumptionFailure,
}

#[derive(Default)]
pub struct LinePrefixParser {
    current: Option<TestIdentity>,
    /// Whether `current` recorded a trace since it started.
    current_traced: bool,
    trace: Option<Vec<String>>,
}

impl LinePrefixParser {
    fn start(&mut self, identity: TestIdentity, marker: Option<Marker>, table: &mut ResultTable) {
        table.start(&identity);
        if marker == Some(Marker::Ignored) {
            table.entry(&identity).status = ResultStatus::Skipped;
        }
        self.current = Some(identity);
        self.current_traced = false;
    }

    fn end(&mut self, identity: TestIdentity, table: &mut ResultTable) {
        let traced = self.current.as_ref() == Some(&identity) && self.current_traced;
        let detail = table.entry(&identity);
        match detail.status {
            ResultStatus::Skipped | ResultStatus::Fail => {}
            ResultStatus::Running | ResultStatus::Pass if traced => {
                detail.status = ResultStatus::Fail
            }
            ResultStatus::Running | ResultStatus::Pass => detail.status = ResultStatus::Pass,
        }
        table.finished(&identity);
    }

    fn failed(&mut self, identity: TestIdentity, marker: Option<Marker>, table: &mut ResultTable) {
        table.entry(&identity).status = match marker {
            Some(Marker::AssumptionFailure) => ResultStatus::Skipped,
            _ => ResultStatus::Fail,
        };
        if self.current.as_ref() != Some(&identity) {
            self.current = Some(identity);
            self.current_traced = false;
        }
    }

    fn end_trace(&mut self, table: &mut ResultTable) {
        let Some(lines) = self.trace.take() else {
            return;
        };
        let Some(identity) = self.current.clone() else {
            tracing::debug!("trace reported outside of any test");
            return;
        };
        self.current_traced = true;

        let trace = lines.join("\n");
        let detail = table.entry(&identity);
        if detail.message.is_none() {
            detail.message = lines.first().cloned();
        }
        if detail.status != ResultStatus::Skipped {
            detail.status = ResultStatus::Fail;
        }
        detail.trace = Some(trace.clone());
        table.failure(&identity, trace);
    }
}

impl LineParser for LinePrefixParser {
    fn parse_line(&mut self, line: &str, table: &mut ResultTable) -> Result<(), DecodeError> {
        if let Some(trace) = &mut self.trace {
            if line.starts_with(TRACE_END) {
                self.end_trace(table);
            } else {
                trace.push(line.to_owned());
            }
            return Ok(());
        }

        let (token, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match token {
            TEST_START | TEST_END | TEST_FAILED | TEST_ERROR => {
                let Some((identity, marker)) = parse_test_id(table, rest.trim_start()) else {
                    tracing::debug!(line, "runner line names no test");
                    return Ok(());
                };
                match token {
                    TEST_START => self.start(identity, marker, table),
                    TEST_END => self.end(identity, table),
                    _ => self.failed(identity, marker, table),
                }
            }
            TRACE_START => self.trace = Some(Vec::new()),
            _ => tracing::trace!(line, "ignoring runner line"),
        }
        Ok(())
    }
}

fn test_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d+,(@AssumptionFailure: |@Ignore: )?(.*?)(?:\[\d+\])?\(([^)]*)\)[^(]*$")
            .expect("test id pattern is valid")
    })
}

/// Parses `<index>,[marker]<method>[[param index]](<class>)`. Class-level reports carry no
/// parenthesised class; everything after the last comma is the class then.
fn parse_test_id(table: &ResultTable, id: &str) -> Option<(TestIdentity, Option<Marker>)> {
    if let Some(captures) = test_id_regex().captures(id) {
        let marker = captures.get(1).map(|m| marker_of(m.as_str()));
        let method = captures.get(2).map_or("", |m| m.as_str());
        let class = captures.get(3).map_or("", |m| m.as_str());
        return Some((table.identity(class, method), marker));
    }

    let (_, class) = id.rsplit_once(',')?;
    let (class, marker) = if let Some(class) = class.strip_prefix(IGNORE_PREFIX) {
        (class, Some(Marker::Ignored))
    } else if let Some(class) = class.strip_prefix(ASSUMPTION_FAILURE_PREFIX) {
        (class, Some(Marker::AssumptionFailure))
    } else {
        (class, None)
    };
    Some((table.identity(class, CLASS_ERROR_METHOD), marker))
}

fn marker_of(prefix: &str) -> Marker {
    if prefix == IGNORE_PREFIX {
        Marker::Ignored
    } else {
        Marker::AssumptionFailure
    }
}

#[cfg(test)]
mod test {
    use indoc::indoc;

    use super::{parse_test_id, Marker, CLASS_ERROR_METHOD};
    use crate::decode::table::ResultTable;
    use crate::decode::test::{decode_chunked, decode_whole};
    use crate::decode::Dialect;
    use crate::model::{ResultStatus, TestIdentity};

    fn parse(id: &str) -> (String, Option<Marker>) {
        let table = ResultTable::new("project", vec![], None);
        let (identity, marker) = parse_test_id(&table, id).unwrap();
        (identity.qualified_name(), marker)
    }

    #[test]
    fn test_ids() {
        assert_eq!(
            parse("3,testFoo(com.acme.BarTest)"),
            ("project@com.acme.BarTest#testFoo".to_owned(), None)
        );
        assert_eq!(
            parse("3,@Ignore: testFoo(com.acme.BarTest)"),
            (
                "project@com.acme.BarTest#testFoo".to_owned(),
                Some(Marker::Ignored)
            )
        );
        assert_eq!(
            parse("3,@AssumptionFailure: testFoo(com.acme.BarTest)"),
            (
                "project@com.acme.BarTest#testFoo".to_owned(),
                Some(Marker::AssumptionFailure)
            )
        );
        assert_eq!(
            parse("2,a.class.FullyQualifiedName"),
            (
                format!("project@a.class.FullyQualifiedName#{CLASS_ERROR_METHOD}"),
                None
            )
        );
    }

    #[test]
    fn parameterized_and_odd_names() {
        assert_eq!(
            parse("7,testAdd[3](com.acme.CalcTest)").0,
            "project@com.acme.CalcTest#testAdd"
        );
        // The class is in the last pair of parentheses.
        assert_eq!(
            parse("8,should work (fast)(com.acme.SpecTest)").0,
            "project@com.acme.SpecTest#should work (fast)"
        );
        assert_eq!(parse("9,no_parens").0, "project@no_parens#<TestError>");
    }

    const PASS_AND_FAIL: &str = indoc! {"
        %TESTC  0 v2
        %TSTTREE1,com.acme.BarTest,true,2,false,-1,com.acme.BarTest,,
        %TESTS  2,testOk(com.acme.BarTest)
        %TESTE  2,testOk(com.acme.BarTest)
        %TESTS  3,testBad(com.acme.BarTest)
        %FAILED 3,testBad(com.acme.BarTest)
        %TRACES
        java.lang.AssertionError: expected:<1> but was:<2>
        %TESTE  looks like a token but is trace text
        \tat com.acme.BarTest.testBad(BarTest.java:12)
        %TRACEE
        %TESTE  3,testBad(com.acme.BarTest)
        %RUNTIME120
    "};

    #[test]
    fn pass_and_fail() {
        let requested = [
            TestIdentity::new("p", "com.acme.BarTest", "testOk"),
            TestIdentity::new("p", "com.acme.BarTest", "testBad")
                .with_source_uri("file:///src/BarTest.java"),
        ];
        let results = decode_whole(Dialect::LinePrefix, &requested, PASS_AND_FAIL);

        insta::assert_debug_snapshot!(results, @r###"
        [
            TestResult {
                identity: TestIdentity {
                    project: "p",
                    container: "com.acme.BarTest",
                    method: "testOk",
                    source_uri: "",
                },
                detail: ResultDetail {
                    status: Pass,
                    message: None,
                    trace: None,
                    duration: None,
                    summary: None,
                },
            },
            TestResult {
                identity: TestIdentity {
                    project: "p",
                    container: "com.acme.BarTest",
                    method: "testBad",
                    source_uri: "file:///src/BarTest.java",
                },
                detail: ResultDetail {
                    status: Fail,
                    message: Some(
                        "java.lang.AssertionError: expected:<1> but was:<2>",
                    ),
                    trace: Some(
                        "java.lang.AssertionError: expected:<1> but was:<2>\n%TESTE  looks like a token but is trace text\n\tat com.acme.BarTest.testBad(BarTest.java:12)",
                    ),
                    duration: None,
                    summary: None,
                },
            },
        ]
        "###);
    }

    #[test]
    fn chunking_does_not_change_results() {
        let stream = PASS_AND_FAIL.replace('\n', "\r\n");
        let whole = decode_whole(Dialect::LinePrefix, &[], &stream);
        for chunk_size in [1, 2, 5, 13, 4096] {
            assert_eq!(
                decode_chunked(Dialect::LinePrefix, &[], &stream, chunk_size),
                whole,
                "chunk size {chunk_size}"
            );
        }
    }

    #[test]
    fn ignored_test_stays_skipped() {
        let stream = indoc! {"
            %TESTS  3,@Ignore: testFoo(com.acme.BarTest)
            %TESTE  3,@Ignore: testFoo(com.acme.BarTest)
        "};
        let results = decode_whole(Dialect::LinePrefix, &[], stream);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity.qualified_name(), "p@com.acme.BarTest#testFoo");
        assert_eq!(results[0].detail.status, ResultStatus::Skipped);

        let results = decode_whole(
            Dialect::LinePrefix,
            &[],
            "%TESTS  3,@Ignore: testFoo(com.acme.BarTest)\n",
        );
        assert_eq!(results[0].detail.status, ResultStatus::Skipped);
    }

    #[test]
    fn assumption_failures_are_skipped() {
        let stream = indoc! {"
            %TESTS  4,testAssumes(com.acme.BarTest)
            %FAILED 4,@AssumptionFailure: testAssumes(com.acme.BarTest)
            %TRACES
            org.junit.AssumptionViolatedException: got: <false>
            %TRACEE
            %TESTE  4,testAssumes(com.acme.BarTest)
        "};
        let results = decode_whole(Dialect::LinePrefix, &[], stream);
        assert_eq!(results[0].detail.status, ResultStatus::Skipped);
        assert!(results[0].detail.trace.is_some());
    }

    #[test]
    fn class_level_error() {
        let stream = indoc! {"
            %ERROR  2,com.acme.BrokenTest
            %TRACES
            java.lang.Exception: No runnable methods
            %TRACEE
        "};
        let requested = [TestIdentity::new("p", "com.acme.BrokenTest", "")];
        let results = decode_whole(Dialect::LinePrefix, &requested, stream);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity.method, CLASS_ERROR_METHOD);
        assert_eq!(results[0].detail.status, ResultStatus::Fail);
        assert_eq!(
            results[0].detail.message.as_deref(),
            Some("java.lang.Exception: No runnable methods")
        );
    }

    #[test]
    fn unterminated_trace_attaches_nothing() {
        let stream = indoc! {"
            %TESTS  2,testOk(com.acme.BarTest)
            %TRACES
            dangling
        "};
        let results = decode_whole(Dialect::LinePrefix, &[], stream);
        assert_eq!(results[0].detail.status, ResultStatus::Skipped);
        assert_eq!(results[0].detail.trace, None);
    }
}
