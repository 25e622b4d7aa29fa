//! Runners that wrap each event as `@@<TestRunner-({json})-TestRunner>`. The parentheses are
//! optional; some runner builds omit them.

use std::sync::OnceLock;

use regex::Regex;
use serde_derive::Deserialize;
use serde_json::{Map, Value};

use super::{DecodeError, LineParser, ResultTable};
use crate::model::{ResultStatus, TestIdentity};

const SUITE_STARTED: &str = "testSuiteStarted";
const SUITE_FINISHED: &str = "testSuiteFinished";
const TEST_STARTED: &str = "testStarted";
const TEST_FAILED: &str = "testFailed";
const TEST_FINISHED: &str = "testFinished";
const TEST_IGNORED: &str = "testIgnored";

/// How a flavor of the tagged protocol names its tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    /// Tests are named relative to the innermost open suite.
    Suite,
    /// Tests carry a JUnit Platform unique id, and a status on `testFinished`.
    JUnit5,
    /// Tests are named by their full name.
    Legacy,
}

#[derive(Deserialize)]
struct Event {
    name: String,
    #[serde(default)]
    attributes: Map<String, Value>,
}

impl Event {
    /// Attributes are usually strings, but some runners emit numbers (e.g. durations).
    fn attr(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn attr_decoded(&self, key: &str) -> Option<String> {
        self.attr(key).map(|s| unescape(&s))
    }
}

pub struct TaggedParser {
    flavor: Flavor,
    suites: Vec<String>,
}

impl TaggedParser {
    pub fn suite() -> Self {
        Self::new(Flavor::Suite)
    }

    pub fn junit5() -> Self {
        Self::new(Flavor::JUnit5)
    }

    pub fn legacy() -> Self {
        Self::new(Flavor::Legacy)
    }

    fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            suites: Vec::new(),
        }
    }

    fn test_identity(&self, event: &Event, table: &ResultTable) -> Option<TestIdentity> {
        match self.flavor {
            Flavor::Suite => {
                let name = event.attr("name")?;
                Some(match self.suites.last() {
                    Some(suite) => table.identity(suite, &name),
                    None => table.identity_from_full_name(&name),
                })
            }
            Flavor::Legacy => Some(table.identity_from_full_name(&event.attr("name")?)),
            Flavor::JUnit5 => {
                let id = event.attr("id")?;
                let (class, method) = parse_unique_id(&id)?;
                Some(table.identity(class, method))
            }
        }
    }

    fn apply(&mut self, event: Event, table: &mut ResultTable) {
        if self.flavor == Flavor::JUnit5 && event.attr("type").as_deref() != Some("TEST") {
            return;
        }

        match event.name.as_str() {
            SUITE_STARTED if self.flavor == Flavor::Suite => {
                if let Some(name) = event.attr("name") {
                    self.suites.push(name);
                }
                return;
            }
            SUITE_FINISHED if self.flavor == Flavor::Suite => {
                self.suites.pop();
                return;
            }
            _ => {}
        }

        let Some(identity) = self.test_identity(&event, table) else {
            tracing::debug!(event = %event.name, "runner event names no test");
            return;
        };

        match event.name.as_str() {
            TEST_STARTED => table.start(&identity),
            TEST_FAILED => {
                let message = event.attr_decoded("message");
                let detail = table.entry(&identity);
                detail.status = ResultStatus::Fail;
                detail.message = message.clone();
                detail.trace = event.attr_decoded("details");
                table.failure(&identity, message.unwrap_or_default());
            }
            TEST_FINISHED => {
                let reported_status = match self.flavor {
                    Flavor::JUnit5 => event.attr("status").as_deref().and_then(junit5_status),
                    _ => None,
                };
                let detail = table.entry(&identity);
                if let Some(status) = reported_status {
                    detail.status = status;
                    if let Some(trace) = event.attr_decoded("details") {
                        detail.trace = Some(trace);
                    }
                    if let Some(message) = event.attr_decoded("message") {
                        detail.message = Some(message);
                    }
                } else if !detail.status.is_terminal() {
                    detail.status = ResultStatus::Pass;
                }
                detail.duration = event.attr("duration");
                let failed = detail.status == ResultStatus::Fail && reported_status.is_some();
                let message = detail.message.clone();
                if failed {
                    table.failure(&identity, message.unwrap_or_default());
                }
                table.finished(&identity);
            }
            TEST_IGNORED => {
                let detail = table.entry(&identity);
                detail.status = ResultStatus::Skipped;
                if let Some(trace) = event.attr_decoded("details") {
                    detail.trace = Some(trace);
                }
                table.finished(&identity);
            }
            other => tracing::trace!(event = other, "ignoring runner event"),
        }
    }
}

impl LineParser for TaggedParser {
    /// Applies every well-formed event on the line; a malformed one doesn't stop its neighbours
    /// and is reported once the rest are applied.
    fn parse_line(&mut self, line: &str, table: &mut ResultTable) -> Result<(), DecodeError> {
        let mut first_error = None;
        for captures in event_regex().captures_iter(line) {
            match serde_json::from_str::<Event>(&captures[1]) {
                Ok(event) => self.apply(event, table),
                Err(source) => {
                    first_error.get_or_insert(DecodeError::MalformedEvent {
                        line: line.to_owned(),
                        source,
                    });
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn event_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"@@<TestRunner-\(?(\{.*?\})\)?-TestRunner>").expect("event pattern is valid")
    })
}

fn unique_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[class:(.*?)\](?:/\[method:(.*)\])?").expect("unique id pattern is valid")
    })
}

/// Reverses the runner's escaping of `@`, which would otherwise collide with the event framing.
fn unescape(s: &str) -> String {
    s.replace("&#x40;", "@")
}

/// Splits `[engine:..]/[class:a.B]/[method:m(int)]` into `("a.B", "m")`; a class-only id gives
/// an empty method.
fn parse_unique_id(id: &str) -> Option<(&str, &str)> {
    let captures = unique_id_regex().captures(id)?;
    let class = captures.get(1)?.as_str();
    let method = match captures.get(2) {
        Some(method) => {
            let method = method.as_str();
            method.split_once('(').map_or(method, |(name, _params)| name)
        }
        None => "",
    };
    Some((class, method))
}

fn junit5_status(status: &str) -> Option<ResultStatus> {
    match status {
        "SUCCESSFUL" => Some(ResultStatus::Pass),
        "FAILED" => Some(ResultStatus::Fail),
        "ABORTED" => Some(ResultStatus::Skipped),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use indoc::indoc;

    use super::{parse_unique_id, unescape};
    use crate::decode::test::{decode_chunked, decode_whole};
    use crate::decode::Dialect;
    use crate::model::{ResultStatus, TestIdentity};

    fn event(name: &str, attributes: &str) -> String {
        format!("@@<TestRunner-({{\"name\":\"{name}\",\"attributes\":{attributes}}})-TestRunner>\n")
    }

    #[test]
    fn unescapes_at_signs() {
        assert_eq!(unescape("foo"), "foo");
        assert_eq!(unescape("foo&#x40;bar"), "foo@bar");
        assert_eq!(unescape("&#x40;a&#x40;&#x40;b&#x40;"), "@a@@b@");
    }

    #[test]
    fn suite_scoped_pass() {
        let stream = [
            event("testSuiteStarted", r#"{"name":"FooTest"}"#),
            event("testStarted", r#"{"name":"bar"}"#),
            event("testFinished", r#"{"name":"bar","duration":"12"}"#),
            event("testSuiteFinished", r#"{"name":"FooTest"}"#),
        ]
        .concat();
        let requested = [TestIdentity::new("p", "FooTest", "bar")];

        let results = decode_whole(Dialect::Tagged, &requested, &stream);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity, requested[0]);
        assert_eq!(results[0].detail.status, ResultStatus::Pass);
        assert_eq!(results[0].detail.duration.as_deref(), Some("12"));
    }

    #[test]
    fn nested_suites_key_by_innermost() {
        let stream = [
            event("testSuiteStarted", r#"{"name":"Outer"}"#),
            event("testSuiteStarted", r#"{"name":"Inner"}"#),
            event("testStarted", r#"{"name":"a"}"#),
            event("testFinished", r#"{"name":"a"}"#),
            event("testSuiteFinished", r#"{"name":"Inner"}"#),
            event("testStarted", r#"{"name":"b"}"#),
            event("testFinished", r#"{"name":"b"}"#),
            event("testSuiteFinished", r#"{"name":"Outer"}"#),
            event("testStarted", r#"{"name":"Loose#c"}"#),
            event("testFinished", r#"{"name":"Loose#c"}"#),
        ]
        .concat();

        let results = decode_whole(Dialect::Tagged, &[], &stream);
        let names: Vec<_> = results.iter().map(|r| r.identity.full_name()).collect();
        assert_eq!(names, vec!["Inner#a", "Outer#b", "Loose#c"]);
    }

    #[test]
    fn failure_keeps_fail_status_through_finish() {
        let stream = [
            event("testStarted", r#"{"name":"a.B#m"}"#),
            event(
                "testFailed",
                r#"{"name":"a.B#m","message":"expected x&#x40;y","details":"at a.B.m(B.java:3)"}"#,
            ),
            event("testFinished", r#"{"name":"a.B#m","duration":5}"#),
        ]
        .concat();
        let requested = [TestIdentity::new("p", "a.B", "m")];

        let results = decode_whole(Dialect::Legacy, &requested, &stream);
        let detail = &results[0].detail;
        assert_eq!(detail.status, ResultStatus::Fail);
        assert_eq!(detail.message.as_deref(), Some("expected x@y"));
        assert_eq!(detail.trace.as_deref(), Some("at a.B.m(B.java:3)"));
        assert_eq!(detail.duration.as_deref(), Some("5"));
    }

    #[test]
    fn ignored_tests_are_skipped() {
        let stream = event("testIgnored", r#"{"name":"a.B#m"}"#);
        let results = decode_whole(Dialect::Legacy, &[TestIdentity::new("p", "a.B", "m")], &stream);
        assert_eq!(results[0].detail.status, ResultStatus::Skipped);
    }

    #[test]
    fn malformed_events_are_skipped() {
        let stream = [
            "@@<TestRunner-({\"name\":\"testStarted\",})-TestRunner>\n".to_owned(),
            "plain runner chatter\n".to_owned(),
            event("testStarted", r#"{"name":"a.B#m"}"#),
            event("testFinished", r#"{"name":"a.B#m"}"#),
        ]
        .concat();
        let results = decode_whole(Dialect::Legacy, &[], &stream);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].detail.status, ResultStatus::Pass);
    }

    #[test]
    fn all_reported_means_nothing_skipped() {
        let stream = indoc! {r#"
            @@<TestRunner-({"name":"testStarted","attributes":{"name":"a.B#one"}})-TestRunner>
            @@<TestRunner-({"name":"testFinished","attributes":{"name":"a.B#one"}})-TestRunner>
            @@<TestRunner-({"name":"testStarted","attributes":{"name":"a.B#two"}})-TestRunner>
            @@<TestRunner-({"name":"testFailed","attributes":{"name":"a.B#two","message":"no"}})-TestRunner>
            @@<TestRunner-({"name":"testFinished","attributes":{"name":"a.B#two"}})-TestRunner>
        "#};
        let requested = [
            TestIdentity::new("p", "a.B", "one"),
            TestIdentity::new("p", "a.B", "two"),
        ];
        let results = decode_whole(Dialect::Legacy, &requested, stream);
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| r.detail.status != ResultStatus::Skipped));
    }

    #[test]
    fn missing_tests_skipped_exactly_once() {
        let stream = event("testStarted", r#"{"name":"a.B#one"}"#)
            + &event("testFinished", r#"{"name":"a.B#one"}"#);
        let requested = [
            TestIdentity::new("p", "a.B", "one"),
            TestIdentity::new("p", "a.B", "two"),
            TestIdentity::new("p", "a.B", "three"),
            TestIdentity::new("p", "a.B", "two"),
        ];
        let results = decode_whole(Dialect::Legacy, &requested, &stream);
        let summary: Vec<_> = results
            .iter()
            .map(|r| (r.identity.method.as_str(), r.detail.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("one", ResultStatus::Pass),
                ("two", ResultStatus::Skipped),
                ("three", ResultStatus::Skipped),
            ]
        );
    }

    #[test]
    fn chunking_does_not_change_results() {
        let stream = [
            event("testSuiteStarted", r#"{"name":"a.CaféTest"}"#),
            event("testStarted", r#"{"name":"mé"}"#),
            event("testFailed", r#"{"name":"mé","message":"é &#x40; é","details":"trace"}"#),
            event("testFinished", r#"{"name":"mé","duration":"1"}"#),
            event("testStarted", r#"{"name":"ok"}"#),
            event("testFinished", r#"{"name":"ok"}"#),
            event("testSuiteFinished", r#"{"name":"a.CaféTest"}"#),
        ]
        .concat()
        .replace('\n', "\r\n");
        let requested = [TestIdentity::new("p", "a.Caf\u{e9}Test", "ok")];

        let whole = decode_whole(Dialect::Tagged, &requested, &stream);
        assert_eq!(whole.len(), 2);
        assert_eq!(whole[1].detail.message.as_deref(), Some("\u{e9} @ \u{e9}"));
        for chunk_size in [1, 2, 3, 7, 64, 1000] {
            assert_eq!(
                decode_chunked(Dialect::Tagged, &requested, &stream, chunk_size),
                whole,
                "chunk size {chunk_size}"
            );
        }
    }

    #[test]
    fn malformed_event_does_not_hide_the_rest_of_its_line() {
        let line = [
            "@@<TestRunner-({\"name\":\"testStarted\",})-TestRunner>".to_owned(),
            event("testStarted", r#"{"name":"a.B#m"}"#).trim_end().to_owned(),
            event("testFinished", r#"{"name":"a.B#m"}"#),
        ]
        .concat();
        let requested = [TestIdentity::new("p", "a.B", "m")];
        let results = decode_whole(Dialect::Legacy, &requested, &line);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].detail.status, ResultStatus::Pass);
    }

    #[test]
    fn framing_without_parentheses() {
        let stream = indoc! {r#"
            @@<TestRunner-{"name":"testStarted","attributes":{"name":"a.B#m"}}-TestRunner>
            @@<TestRunner-{"name":"testFinished","attributes":{"name":"a.B#m"}}-TestRunner>
        "#};
        let results = decode_whole(Dialect::Legacy, &[], stream);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].detail.status, ResultStatus::Pass);
    }

    #[test]
    fn unterminated_last_line_is_decoded() {
        let stream = event("testStarted", r#"{"name":"a.B#m"}"#)
            + event("testFinished", r#"{"name":"a.B#m"}"#).trim_end();
        let results = decode_whole(Dialect::Legacy, &[], &stream);
        assert_eq!(results[0].detail.status, ResultStatus::Pass);
    }

    #[test]
    fn junit5_unique_ids() {
        assert_eq!(
            parse_unique_id("[engine:junit-jupiter]/[class:a.B]/[method:m(int, java.lang.String)]"),
            Some(("a.B", "m"))
        );
        assert_eq!(
            parse_unique_id("[engine:junit-jupiter]/[class:a.B]/[method:m()]"),
            Some(("a.B", "m"))
        );
        assert_eq!(
            parse_unique_id("[engine:junit-jupiter]/[class:a.B]"),
            Some(("a.B", ""))
        );
        assert_eq!(parse_unique_id("[engine:junit-jupiter]"), None);
    }

    #[test]
    fn junit5_statuses() {
        let id = |m: &str| format!("[engine:junit-jupiter]/[class:a.B]/[method:{m}()]");
        let stream = [
            event(
                "testStarted",
                r#"{"id":"[engine:junit-jupiter]/[class:a.B]","type":"CONTAINER"}"#,
            ),
            event("testStarted", &format!(r#"{{"id":"{}","type":"TEST"}}"#, id("ok"))),
            event(
                "testFinished",
                &format!(
                    r#"{{"id":"{}","type":"TEST","status":"SUCCESSFUL","duration":"4"}}"#,
                    id("ok")
                ),
            ),
            event("testStarted", &format!(r#"{{"id":"{}","type":"TEST"}}"#, id("bad"))),
            event(
                "testFinished",
                &format!(
                    r#"{{"id":"{}","type":"TEST","status":"FAILED","message":"boom","details":"org.opentest4j.AssertionFailedError&#x40;1"}}"#,
                    id("bad")
                ),
            ),
            event("testStarted", &format!(r#"{{"id":"{}","type":"TEST"}}"#, id("assumed"))),
            event(
                "testFinished",
                &format!(r#"{{"id":"{}","type":"TEST","status":"ABORTED"}}"#, id("assumed")),
            ),
            event("testIgnored", &format!(r#"{{"id":"{}","type":"TEST"}}"#, id("disabled"))),
            event(
                "testFinished",
                &format!(r#"{{"id":"{}","type":"CONTAINER","status":"SUCCESSFUL"}}"#, "[engine:junit-jupiter]/[class:a.B]"),
            ),
        ]
        .concat();

        let results = decode_whole(Dialect::TaggedJUnit5, &[], &stream);
        let summary: Vec<_> = results
            .iter()
            .map(|r| (r.identity.full_name(), r.detail.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a.B#ok".to_owned(), ResultStatus::Pass),
                ("a.B#bad".to_owned(), ResultStatus::Fail),
                ("a.B#assumed".to_owned(), ResultStatus::Skipped),
                ("a.B#disabled".to_owned(), ResultStatus::Skipped),
            ]
        );
        assert_eq!(results[0].detail.duration.as_deref(), Some("4"));
        assert_eq!(
            results[1].detail.trace.as_deref(),
            Some("org.opentest4j.AssertionFailedError@1")
        );
        assert_eq!(results[1].detail.message.as_deref(), Some("boom"));
    }
}
