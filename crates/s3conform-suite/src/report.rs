//! Run reports: console summary, JSON and JUnit XML.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use s3conform_core::{ConformanceOutcome, QuirkSet, Scenario};

/// The outcome of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    /// Scenario name
    pub name: String,
    /// Suite the scenario belongs to
    pub suite: String,
    /// Classified outcome
    pub outcome: ConformanceOutcome,
    /// Wall-clock time spent, including session setup and teardown
    pub duration: Duration,
}

impl CaseReport {
    /// Records `outcome` for `scenario`.
    pub fn new(scenario: &Scenario, outcome: ConformanceOutcome, duration: Duration) -> Self {
        Self {
            name: scenario.name.to_string(),
            suite: scenario.suite.to_string(),
            outcome,
            duration,
        }
    }

    /// `suite.name`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.suite, self.name)
    }

    /// The console line for this case.
    pub fn line(&self) -> String {
        format!("{} {} ({})", self.outcome.marker(), self.full_name(), self.outcome)
    }
}

/// The report of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Target the run was executed against
    pub target: String,
    /// Quirks declared for the target
    pub quirks: QuirkSet,
    /// Start of the run
    pub started_at: DateTime<Utc>,
    /// Total run time
    pub duration: Duration,
    /// Per-scenario results in execution order
    pub cases: Vec<CaseReport>,
}

impl RunReport {
    /// An empty report for `target`.
    pub fn new(target: &str, quirks: QuirkSet) -> Self {
        Self {
            target: target.to_string(),
            quirks,
            started_at: Utc::now(),
            duration: Duration::default(),
            cases: vec![],
        }
    }

    /// Appends a case result.
    pub fn add_case(&mut self, case: CaseReport) {
        self.cases.push(case);
    }

    /// Number of passed cases.
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.outcome.is_passed()).count()
    }

    /// Number of failed cases.
    pub fn failed(&self) -> usize {
        self.cases.iter().filter(|c| c.outcome.is_failed()).count()
    }

    /// Number of skipped cases.
    pub fn skipped(&self) -> usize {
        self.cases.iter().filter(|c| c.outcome.is_skipped()).count()
    }

    /// Number of cases run.
    pub fn total(&self) -> usize {
        self.cases.len()
    }

    /// True when no scenario failed.
    pub fn is_passing(&self) -> bool {
        self.failed() == 0
    }

    /// Cases that failed, in execution order.
    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| c.outcome.is_failed())
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a report written by [`RunReport::to_json`].
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// JUnit XML, one `testsuite` per run.
    pub fn to_junit_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuite name=\"s3conform\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" errors=\"0\" time=\"{}\" timestamp=\"{}\">\n",
            self.total(),
            self.failed(),
            self.skipped(),
            self.duration.as_secs_f64(),
            self.started_at.to_rfc3339()
        ));
        xml.push_str(&format!(
            "  <properties>\n    <property name=\"target\" value=\"{}\" />\n",
            escape_xml(&self.target)
        ));
        for quirk in self.quirks.iter() {
            xml.push_str(&format!(
                "    <property name=\"quirk\" value=\"{}\" />\n",
                quirk.name()
            ));
        }
        xml.push_str("  </properties>\n");

        for case in &self.cases {
            xml.push_str(&format!(
                "  <testcase name=\"{}\" classname=\"{}\" time=\"{}\">\n",
                escape_xml(&case.name),
                escape_xml(&case.suite),
                case.duration.as_secs_f64()
            ));
            match &case.outcome {
                ConformanceOutcome::Passed => {}
                ConformanceOutcome::Failed(reason) => {
                    let message = escape_xml(&reason.to_string());
                    xml.push_str(&format!(
                        "    <failure message=\"{}\">{}</failure>\n",
                        message, message
                    ));
                }
                ConformanceOutcome::Skipped(quirk) => {
                    xml.push_str(&format!(
                        "    <skipped message=\"{}\" />\n",
                        quirk.name()
                    ));
                }
            }
            xml.push_str("  </testcase>\n");
        }

        xml.push_str("</testsuite>\n");
        xml
    }

    /// `passed/failed/skipped of total` in one line.
    pub fn summary_line(&self) -> String {
        let total = self.total();
        let passed = self.passed();
        let failed = self.failed();
        let skipped = self.skipped();
        let time = self.duration.as_secs_f64();

        if failed > 0 {
            format!(
                "FAIL {}/{} ({} failed, {} skipped) in {:.2}s",
                passed, total, failed, skipped, time
            )
        } else if skipped > 0 {
            format!(
                "PASS {}/{} ({} skipped) in {:.2}s",
                passed, total, skipped, time
            )
        } else {
            format!("PASS {}/{} in {:.2}s", passed, total, time)
        }
    }
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            // not representable in XML 1.0
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {
                escaped.push_str(&format!("\\x{:02x}", c as u32))
            }
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use s3conform_core::{FailureReason, Quirk};

    fn case(name: &str, outcome: ConformanceOutcome) -> CaseReport {
        CaseReport {
            name: name.to_string(),
            suite: "get_object".to_string(),
            outcome,
            duration: Duration::from_millis(10),
        }
    }

    fn mismatch() -> ConformanceOutcome {
        ConformanceOutcome::Failed(FailureReason::Mismatch {
            operation: "GetObject body".to_string(),
            expected: "\"<a>\"".to_string(),
            observed: "\"b\\0\"".to_string(),
        })
    }

    fn report() -> RunReport {
        let mut report = RunReport::new("memory://", QuirkSet::aws());
        report.add_case(case("full_object", ConformanceOutcome::Passed));
        report.add_case(case("missing_key", mismatch()));
        report.add_case(case(
            "if_none_match_etag",
            ConformanceOutcome::Skipped(Quirk::PutObjectIfNoneMatchEtagNotSupported),
        ));
        report
    }

    #[test]
    fn test_counts() {
        let report = report();
        assert_eq!(report.total(), 3);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(!report.is_passing());
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_empty_report_is_passing() {
        let report = RunReport::new("memory://", QuirkSet::empty());
        assert!(report.is_passing());
        assert_eq!(report.summary_line(), "PASS 0/0 in 0.00s");
    }

    #[test]
    fn test_to_json_from_json_roundtrip() {
        let report = report();
        let json = report.to_json().unwrap();
        let parsed = RunReport::from_json(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_to_junit_xml() {
        let xml = report().to_junit_xml();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("tests=\"3\""));
        assert!(xml.contains("failures=\"1\""));
        assert!(xml.contains("skipped=\"1\""));
        assert!(xml.contains("<testcase name=\"full_object\" classname=\"get_object\""));
        assert!(xml.contains("&quot;&lt;a&gt;&quot;"));
        assert!(xml.contains("<skipped message=\"PUT_OBJECT_IF_NONE_MATCH_ETAG_NOT_SUPPORTED\" />"));
        assert!(xml.contains("<property name=\"quirk\" value=\"PUT_OBJECT_IF_NONE_MATCH_ETAG_NOT_SUPPORTED\" />"));
    }

    #[test]
    fn test_escape_xml_control_characters() {
        assert_eq!(escape_xml("a\u{0}b"), "a\\x00b");
        assert_eq!(escape_xml("tab\there"), "tab\there");
    }

    #[test]
    fn test_summary_line_failing() {
        let mut report = report();
        report.duration = Duration::from_millis(1500);
        assert_eq!(report.summary_line(), "FAIL 1/3 (1 failed, 1 skipped) in 1.50s");
    }

    #[test]
    fn test_case_line() {
        let line = case("full_object", ConformanceOutcome::Passed).line();
        assert_eq!(line, "✅ get_object.full_object (passed)");
    }
}
