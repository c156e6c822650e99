//! Domain models for kwcluster.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::Error;

// =============================================================================
// JOB TYPES
// =============================================================================

/// Status of a research job.
///
/// `pending → running → {completed | failed}`; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::InvalidInput(format!("Unknown job status: {}", other))),
        }
    }
}

/// One keyword research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub status: JobStatus,
    /// Stored upload the pipeline parses when the job starts.
    pub input_path: String,
    pub ai_analysis_enabled: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Human-readable run time from submission to completion, e.g. `"3m 12s"`.
    ///
    /// Returns `"-"` while the job has not finished.
    pub fn duration(&self) -> String {
        match self.completed_at {
            Some(done) => {
                let secs = (done - self.created_at).num_seconds().max(0);
                format!("{}m {}s", secs / 60, secs % 60)
            }
            None => "-".to_string(),
        }
    }
}

/// Request to create a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub input_path: String,
    #[serde(default)]
    pub ai_analysis_enabled: bool,
}

impl CreateJobRequest {
    /// Build a request, deriving the display name from the description or file name.
    pub fn new(
        owner: impl Into<String>,
        file_name: &str,
        description: Option<String>,
        input_path: impl Into<String>,
        ai_analysis_enabled: bool,
    ) -> Self {
        let description = description.filter(|d| !d.trim().is_empty());
        let name = derive_job_name(description.as_deref(), file_name);
        Self {
            owner: owner.into(),
            name,
            description,
            input_path: input_path.into(),
            ai_analysis_enabled,
        }
    }
}

/// First three words of the description followed by `...`, or the file name.
pub fn derive_job_name(description: Option<&str>, file_name: &str) -> String {
    match description.map(str::trim).filter(|d| !d.is_empty()) {
        Some(desc) => {
            let words: Vec<&str> = desc.split_whitespace().take(3).collect();
            format!("{}...", words.join(" "))
        }
        None => file_name.to_string(),
    }
}

/// Status query result for one owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStatusSummary {
    pub running: Vec<Job>,
    /// Most recent completed/failed jobs, newest first.
    pub recent: Vec<Job>,
}

/// Notification emitted on every terminal job transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub owner: String,
    pub status: JobStatus,
    pub message: Option<String>,
}

impl JobEvent {
    pub fn completed(job: &Job) -> Self {
        Self {
            job_id: job.id,
            owner: job.owner.clone(),
            status: JobStatus::Completed,
            message: None,
        }
    }

    pub fn failed(job: &Job, message: impl Into<String>) -> Self {
        Self {
            job_id: job.id,
            owner: job.owner.clone(),
            status: JobStatus::Failed,
            message: Some(message.into()),
        }
    }
}

// =============================================================================
// KEYWORD TYPES
// =============================================================================

/// Similarity classification of a keyword record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    #[default]
    Unclassified,
    /// Representative of a similarity cluster (PKW).
    Primary,
    /// Absorbed into a primary (AKW); never re-examined.
    Auxiliary,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Unclassified => "unclassified",
            Classification::Primary => "primary",
            Classification::Auxiliary => "auxiliary",
        }
    }
}

impl FromStr for Classification {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unclassified" => Ok(Classification::Unclassified),
            "primary" => Ok(Classification::Primary),
            "auxiliary" => Ok(Classification::Auxiliary),
            other => Err(Error::InvalidInput(format!(
                "Unknown classification: {}",
                other
            ))),
        }
    }
}

/// Per-keyword result of the fetch phase.
///
/// Anything other than `Success` leaves the record with the no-result sentinel,
/// which similarity scoring treats as an empty link set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// Full result page received.
    Success,
    /// No rate-limiter ticket within the acquire timeout.
    RateLimited,
    /// Retries used up on 429s or transient errors.
    Exhausted,
    /// Provider answered with fewer results than required.
    Insufficient,
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchOutcome::Success => "success",
            FetchOutcome::RateLimited => "rate_limited",
            FetchOutcome::Exhausted => "exhausted",
            FetchOutcome::Insufficient => "insufficient",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success)
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchOutcome {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(FetchOutcome::Success),
            "rate_limited" => Ok(FetchOutcome::RateLimited),
            "exhausted" => Ok(FetchOutcome::Exhausted),
            "insufficient" => Ok(FetchOutcome::Insufficient),
            other => Err(Error::InvalidInput(format!(
                "Unknown fetch outcome: {}",
                other
            ))),
        }
    }
}

/// A keyword absorbed into a primary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedKeyword {
    pub keyword: String,
    pub original_search_volume: i64,
}

impl fmt::Display for MergedKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.keyword, self.original_search_volume)
    }
}

/// One parsed input row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordInput {
    pub keyword: String,
    pub search_volume: i64,
    pub word_count: Option<i32>,
}

/// One row per input keyword, owned by exactly one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    /// Input row order; the classification tie-break.
    pub sequence_index: i32,
    pub keyword: String,
    /// Mutated during merges.
    pub search_volume: i64,
    pub original_search_volume: i64,
    pub word_count: Option<i32>,
    /// `None` until the fetch phase writes a result.
    pub fetch_outcome: Option<FetchOutcome>,
    pub result_links: Vec<String>,
    pub result_titles: Vec<String>,
    pub classification: Classification,
    pub merged_keywords: Vec<MergedKeyword>,
    pub search_intent: Option<String>,
    pub intent_type: Option<String>,
}

impl KeywordRecord {
    pub fn new(job_id: Uuid, sequence_index: i32, input: KeywordInput) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            sequence_index,
            keyword: input.keyword,
            search_volume: input.search_volume,
            original_search_volume: input.search_volume,
            word_count: input.word_count,
            fetch_outcome: None,
            result_links: Vec::new(),
            result_titles: Vec::new(),
            classification: Classification::Unclassified,
            merged_keywords: Vec::new(),
            search_intent: None,
            intent_type: None,
        }
    }

    /// Links used for similarity scoring; empty unless the fetch succeeded.
    pub fn link_set(&self) -> HashSet<&str> {
        match self.fetch_outcome {
            Some(FetchOutcome::Success) => self.result_links.iter().map(String::as_str).collect(),
            _ => HashSet::new(),
        }
    }

    /// Write back a fetch result. Non-success outcomes store the sentinel (no links).
    pub fn apply_fetch(&mut self, result: FetchResult) {
        self.fetch_outcome = Some(result.outcome);
        if result.outcome.is_success() {
            self.result_links = result.links;
            self.result_titles = result.titles;
        } else {
            self.result_links.clear();
            self.result_titles.clear();
        }
    }

    pub fn is_primary(&self) -> bool {
        self.classification == Classification::Primary
    }

    /// Sum of the original volumes of everything merged into this record.
    pub fn merged_volume(&self) -> i64 {
        self.merged_keywords
            .iter()
            .fold(0i64, |acc, m| acc.saturating_add(m.original_search_volume))
    }
}

// =============================================================================
// SERP TYPES
// =============================================================================

/// Locale parameters sent with each search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLocale {
    /// Country code (`gl`).
    pub gl: String,
    /// Interface language (`hl`).
    pub hl: String,
    pub location: Option<String>,
    /// Results requested per query.
    pub num: usize,
}

impl Default for SearchLocale {
    fn default() -> Self {
        Self {
            gl: defaults::SERP_GL.to_string(),
            hl: defaults::SERP_HL.to_string(),
            location: None,
            num: defaults::SERP_RESULT_COUNT,
        }
    }
}

impl SearchLocale {
    /// Read `SERP_GL`, `SERP_HL`, `SERP_LOCATION` and `SERP_RESULT_COUNT`.
    pub fn from_env() -> Self {
        let mut locale = Self::default();
        if let Ok(gl) = std::env::var("SERP_GL") {
            locale.gl = gl;
        }
        if let Ok(hl) = std::env::var("SERP_HL") {
            locale.hl = hl;
        }
        locale.location = std::env::var("SERP_LOCATION")
            .ok()
            .filter(|l| !l.trim().is_empty());
        if let Some(num) = std::env::var("SERP_RESULT_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            locale = locale.with_result_count(num);
        }
        locale
    }

    /// Results requested per query; at least one.
    pub fn with_result_count(mut self, num: usize) -> Self {
        self.num = num.max(1);
        self
    }
}

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerpHit {
    pub url: String,
    pub title: String,
}

/// Normalized fetch result for one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub links: Vec<String>,
    pub titles: Vec<String>,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    pub fn success(hits: Vec<SerpHit>) -> Self {
        let (links, titles) = hits.into_iter().map(|h| (h.url, h.title)).unzip();
        Self {
            links,
            titles,
            outcome: FetchOutcome::Success,
        }
    }

    /// Sentinel result carrying no links.
    pub fn no_result(outcome: FetchOutcome) -> Self {
        Self {
            links: Vec::new(),
            titles: Vec::new(),
            outcome,
        }
    }
}

// =============================================================================
// INTENT TYPES
// =============================================================================

/// Labels returned by the intent classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentLabels {
    pub intent: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl IntentLabels {
    pub fn new(intent: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            kind: kind.into(),
        }
    }

    pub fn not_applicable() -> Self {
        Self::new(defaults::NOT_APPLICABLE, defaults::NOT_APPLICABLE)
    }

    pub fn is_not_applicable(&self) -> bool {
        self.intent == defaults::NOT_APPLICABLE && self.kind == defaults::NOT_APPLICABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_job() -> Job {
        Job {
            id: Uuid::nil(),
            owner: "alice".to_string(),
            name: "test".to_string(),
            description: None,
            status: JobStatus::Pending,
            input_path: "/tmp/in.csv".to_string(),
            ai_analysis_enabled: false,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn input(keyword: &str, volume: i64) -> KeywordInput {
        KeywordInput {
            keyword: keyword.to_string(),
            search_volume: volume,
            word_count: None,
        }
    }

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_job_status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    #[test]
    fn test_job_duration_formats_minutes_and_seconds() {
        let mut job = sample_job();
        assert_eq!(job.duration(), "-");
        job.completed_at = Some(job.created_at + Duration::seconds(192));
        assert_eq!(job.duration(), "3m 12s");
    }

    #[test]
    fn test_derive_job_name_from_description() {
        assert_eq!(
            derive_job_name(Some("  seo plan for spring sale  "), "kw.csv"),
            "seo plan for..."
        );
        assert_eq!(derive_job_name(Some("short"), "kw.csv"), "short...");
    }

    #[test]
    fn test_derive_job_name_falls_back_to_file_name() {
        assert_eq!(derive_job_name(None, "kw.csv"), "kw.csv");
        assert_eq!(derive_job_name(Some("   "), "kw.csv"), "kw.csv");
    }

    #[test]
    fn test_create_job_request_drops_blank_description() {
        let req = CreateJobRequest::new("bob", "kw.csv", Some(" ".into()), "/u/x.csv", true);
        assert_eq!(req.description, None);
        assert_eq!(req.name, "kw.csv");
        assert!(req.ai_analysis_enabled);
    }

    #[test]
    fn test_keyword_record_new_copies_volume() {
        let rec = KeywordRecord::new(Uuid::nil(), 3, input("shoes", 500));
        assert_eq!(rec.search_volume, 500);
        assert_eq!(rec.original_search_volume, 500);
        assert_eq!(rec.sequence_index, 3);
        assert_eq!(rec.classification, Classification::Unclassified);
        assert!(rec.fetch_outcome.is_none());
    }

    #[test]
    fn test_link_set_empty_for_non_success() {
        let mut rec = KeywordRecord::new(Uuid::nil(), 0, input("shoes", 1));
        rec.result_links = vec!["https://a".into()];
        rec.fetch_outcome = Some(FetchOutcome::Insufficient);
        assert!(rec.link_set().is_empty());

        rec.fetch_outcome = Some(FetchOutcome::Success);
        assert_eq!(rec.link_set().len(), 1);
    }

    #[test]
    fn test_apply_fetch_failure_stores_sentinel() {
        let mut rec = KeywordRecord::new(Uuid::nil(), 0, input("shoes", 1));
        rec.result_links = vec!["https://stale".into()];
        rec.apply_fetch(FetchResult::no_result(FetchOutcome::Exhausted));
        assert_eq!(rec.fetch_outcome, Some(FetchOutcome::Exhausted));
        assert!(rec.result_links.is_empty());
    }

    #[test]
    fn test_fetch_result_success_splits_hits() {
        let result = FetchResult::success(vec![
            SerpHit {
                url: "https://a".into(),
                title: "A".into(),
            },
            SerpHit {
                url: "https://b".into(),
                title: "B".into(),
            },
        ]);
        assert_eq!(result.links, vec!["https://a", "https://b"]);
        assert_eq!(result.titles, vec!["A", "B"]);
        assert!(result.outcome.is_success());
    }

    #[test]
    fn test_fetch_outcome_roundtrip() {
        for outcome in [
            FetchOutcome::Success,
            FetchOutcome::RateLimited,
            FetchOutcome::Exhausted,
            FetchOutcome::Insufficient,
        ] {
            assert_eq!(outcome.as_str().parse::<FetchOutcome>().unwrap(), outcome);
        }
    }

    #[test]
    fn test_merged_keyword_display() {
        let m = MergedKeyword {
            keyword: "red shoes".into(),
            original_search_volume: 300,
        };
        assert_eq!(m.to_string(), "red shoes:300");
    }

    #[test]
    fn test_intent_labels_not_applicable() {
        let labels = IntentLabels::not_applicable();
        assert!(labels.is_not_applicable());
        assert!(!IntentLabels::new("commercial", "product").is_not_applicable());
    }

    #[test]
    fn test_intent_labels_serde_uses_type_key() {
        let labels: IntentLabels =
            serde_json::from_str(r#"{"intent":"informational","type":"blog"}"#).unwrap();
        assert_eq!(labels.kind, "blog");
    }

    #[test]
    fn test_search_locale_default() {
        let locale = SearchLocale::default();
        assert_eq!(locale.gl, "ir");
        assert_eq!(locale.hl, "fa");
        assert_eq!(locale.num, 10);
    }

    #[test]
    fn test_search_locale_result_count_at_least_one() {
        assert_eq!(SearchLocale::default().with_result_count(0).num, 1);
        assert_eq!(SearchLocale::default().with_result_count(20).num, 20);
    }
}
