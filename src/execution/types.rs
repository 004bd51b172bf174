//! Types shared by the execution stage: test definitions, artifacts and raw
//! per-test results.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A candidate test case as produced by generation/ranking.
///
/// Upstream producers are loosely typed (LLM output, hand-written JSON), so
/// everything except `steps` and `expected_result` is optional here and
/// resolved with defaults by [`TestCase::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub expected_result: String,
}

impl TestCase {
    /// Creates a test case with an id and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Sets the target URL.
    pub fn with_target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    /// Sets the ordered steps.
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the expected result.
    pub fn with_expected_result(mut self, expected: impl Into<String>) -> Self {
        self.expected_result = expected.into();
        self
    }

    /// Fills in defaults for the optional identity fields.
    ///
    /// A missing id becomes a generated placeholder, a missing name becomes
    /// `test_<id>`, and a missing URL becomes `fallback_url`.
    pub fn resolve(&self, fallback_url: &str) -> ResolvedTest {
        let id = non_blank(self.id.as_deref())
            .map(str::to_string)
            .unwrap_or_else(placeholder_id);
        let name = non_blank(self.name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("test_{}", id));
        let target_url = non_blank(self.target_url.as_deref())
            .unwrap_or(fallback_url)
            .to_string();

        ResolvedTest {
            id,
            name,
            target_url,
        }
    }
}

/// A test case with every identity field resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTest {
    pub id: String,
    pub name: String,
    pub target_url: String,
}

/// Generates a placeholder identifier for a test that arrived without one.
pub fn placeholder_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("placeholder_{}", &uuid[..8])
}

/// Generates a new run identifier of the form `run_<8 hex>`.
pub fn new_run_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("run_{}", &uuid[..8])
}

/// Checks that a run identifier is non-empty and usable as a path segment.
pub fn validate_run_id(run_id: &str) -> Result<(), String> {
    if run_id.trim().is_empty() {
        return Err("run_id must not be empty".to_string());
    }
    if let Some(c) = run_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(format!(
            "run_id '{}' contains invalid character '{}'",
            run_id, c
        ));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts string or numeric identifiers; anything else is treated as absent.
pub(crate) fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Known artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Screenshot,
    DomSnapshot,
    Logs,
    Error,
}

impl ArtifactKind {
    /// Key used for this kind inside an `ArtifactSet`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::DomSnapshot => "dom_snapshot",
            ArtifactKind::Logs => "logs",
            ArtifactKind::Error => "error",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact kind → location (or diagnostic, for `error`).
///
/// Built once by a capture backend; there are no mutating methods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet(BTreeMap<String, String>);

impl ArtifactSet {
    /// An empty artifact set.
    pub fn new() -> Self {
        Self::default()
    }

    /// An artifact set carrying only a capture failure diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new().with(ArtifactKind::Error, message)
    }

    /// Returns the set extended with one entry.
    pub fn with(mut self, kind: ArtifactKind, location: impl Into<String>) -> Self {
        self.0.insert(kind.as_str().to_string(), location.into());
        self
    }

    /// Looks up a known artifact kind.
    pub fn get(&self, kind: ArtifactKind) -> Option<&str> {
        self.0.get(kind.as_str()).map(String::as_str)
    }

    /// Looks up an arbitrary key, including ones written by other backends.
    pub fn get_key(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Location of the console log artifact, if captured.
    pub fn logs(&self) -> Option<&str> {
        self.get(ArtifactKind::Logs)
    }

    /// Capture failure diagnostic, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.get(ArtifactKind::Error)
    }

    /// True when the capture backend reported a failure.
    pub fn has_error(&self) -> bool {
        self.0.contains_key(ArtifactKind::Error.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of running a test, independent of its verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    #[default]
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Pass/fail classification of a test.
///
/// Raw results are always `Pending`; the analyzer resolves them. Unknown
/// strings deserialize as `Pending` so they go through resolution again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    Flaky,
    #[default]
    #[serde(other)]
    Pending,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pending => "pending",
            Verdict::Passed => "passed",
            Verdict::Failed => "failed",
            Verdict::Flaky => "flaky",
        }
    }

    /// Parses a resolved verdict, accepting common spellings.
    ///
    /// Returns `None` for anything that is not a final verdict.
    pub fn parse_resolved(s: &str) -> Option<Verdict> {
        match s.trim().to_lowercase().as_str() {
            "passed" | "pass" | "success" => Some(Verdict::Passed),
            "failed" | "fail" | "failure" => Some(Verdict::Failed),
            "flaky" => Some(Verdict::Flaky),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing one test, before verdict analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    /// Absent only when the result came from an external producer.
    #[serde(default, deserialize_with = "lenient_id")]
    pub test_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub verdict: Verdict,
    #[serde(default)]
    pub artifacts: ArtifactSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

impl RawResult {
    /// Builds the provisional result for a captured test.
    ///
    /// Status is `failed` when the artifact set carries an `error` entry.
    pub fn from_capture(test: &ResolvedTest, artifacts: ArtifactSet) -> Self {
        let status = if artifacts.has_error() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };

        Self {
            test_id: Some(test.id.clone()),
            name: Some(test.name.clone()),
            status,
            verdict: Verdict::Pending,
            artifacts,
            target_url: Some(test.target_url.clone()),
        }
    }

    /// Builds a failed result for a test whose execution did not finish.
    pub fn crashed(test: &ResolvedTest, reason: impl Into<String>) -> Self {
        Self::from_capture(test, ArtifactSet::error(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let test = TestCase::default();
        let resolved = test.resolve("http://localhost:8000");

        assert!(resolved.id.starts_with("placeholder_"));
        assert_eq!(resolved.id.len(), "placeholder_".len() + 8);
        assert_eq!(resolved.name, format!("test_{}", resolved.id));
        assert_eq!(resolved.target_url, "http://localhost:8000");
    }

    #[test]
    fn test_resolve_keeps_provided_fields() {
        let test = TestCase::new("login", "Login flow").with_target_url("https://example.com");
        let resolved = test.resolve("http://localhost:8000");

        assert_eq!(resolved.id, "login");
        assert_eq!(resolved.name, "Login flow");
        assert_eq!(resolved.target_url, "https://example.com");
    }

    #[test]
    fn test_blank_fields_are_defaulted() {
        let test = TestCase {
            id: Some("  ".to_string()),
            target_url: Some(String::new()),
            ..Default::default()
        };
        let resolved = test.resolve("http://fallback");
        assert!(resolved.id.starts_with("placeholder_"));
        assert_eq!(resolved.target_url, "http://fallback");
    }

    #[test]
    fn test_testcase_accepts_numeric_id() {
        let test: TestCase =
            serde_json::from_str(r#"{"id": 7, "description": "d", "steps": ["a"], "expected_result": "ok"}"#)
                .expect("should parse");
        assert_eq!(test.id.as_deref(), Some("7"));
        assert_eq!(test.steps, vec!["a".to_string()]);
    }

    #[test]
    fn test_validate_run_id() {
        assert!(validate_run_id("run_1a2b3c4d").is_ok());
        assert!(validate_run_id("").is_err());
        assert!(validate_run_id("   ").is_err());
        assert!(validate_run_id("../etc").is_err());
        assert!(validate_run_id("run 1").is_err());
    }

    #[test]
    fn test_new_run_id_format() {
        let id = new_run_id();
        assert!(id.starts_with("run_"));
        assert_eq!(id.len(), 12);
        assert!(validate_run_id(&id).is_ok());
    }

    #[test]
    fn test_artifact_set_accessors() {
        let set = ArtifactSet::new()
            .with(ArtifactKind::Screenshot, "a.png")
            .with(ArtifactKind::Logs, "a_logs.txt");

        assert_eq!(set.logs(), Some("a_logs.txt"));
        assert!(!set.has_error());
        assert_eq!(set.len(), 2);

        let json = serde_json::to_string(&set).expect("serialize");
        assert_eq!(json, r#"{"logs":"a_logs.txt","screenshot":"a.png"}"#);

        let failed = ArtifactSet::error("boom");
        assert!(failed.has_error());
        assert_eq!(failed.error_message(), Some("boom"));
    }

    #[test]
    fn test_raw_result_status_from_capture() {
        let test = TestCase::new("t1", "T1").resolve("http://localhost:8000");

        let ok = RawResult::from_capture(&test, ArtifactSet::new().with(ArtifactKind::Logs, "l"));
        assert_eq!(ok.status, ExecutionStatus::Completed);
        assert_eq!(ok.verdict, Verdict::Pending);

        let failed = RawResult::crashed(&test, "panic");
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.test_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_raw_result_lenient_deserialization() {
        let raw: RawResult =
            serde_json::from_str(r#"{"status": "completed", "verdict": "unknown", "artifacts": {}}"#)
                .expect("should parse");
        assert_eq!(raw.test_id, None);
        assert_eq!(raw.verdict, Verdict::Pending);
        assert_eq!(raw.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_verdict_serde() {
        let unknown: Verdict = serde_json::from_str(r#""unknown""#).expect("should parse");
        assert_eq!(unknown, Verdict::Pending);

        let flaky: Verdict = serde_json::from_str(r#""flaky""#).expect("should parse");
        assert_eq!(flaky, Verdict::Flaky);
        assert_eq!(
            serde_json::to_string(&Verdict::Pending).expect("serialize"),
            r#""pending""#
        );
        assert_eq!(Verdict::default(), Verdict::Pending);
    }

    #[test]
    fn test_verdict_parse_resolved() {
        assert_eq!(Verdict::parse_resolved("PASSED"), Some(Verdict::Passed));
        assert_eq!(Verdict::parse_resolved("fail"), Some(Verdict::Failed));
        assert_eq!(Verdict::parse_resolved("flaky"), Some(Verdict::Flaky));
        assert_eq!(Verdict::parse_resolved("pending"), None);
        assert_eq!(Verdict::parse_resolved("maybe"), None);
    }
}
