//! Submission records: the validated report fields handed to the writer.
//!
//! Records are built from raw form fields against a resolved [`Theme`]. Only
//! fields the theme accepts are taken; the rest are left empty. A record is
//! never mutated after construction.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CoreError;
use crate::theme::Theme;

/// Raw form fields keyed by form name.
pub type FormFields = BTreeMap<String, String>;

/// User-story value that marks a dry-run submission.
pub const DEBUG_USER_STORY: &str = "DEBUG";

/// Form name of the combined `"<release>,<environment>"` field.
pub const REL_ENV_FIELD: &str = "rel_env";

/// Longest accepted value for any single field.
pub const MAX_FIELD_LENGTH: usize = 1024;

/// A report field that can appear on a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Tester,
    TestName,
    Result,
    Jira,
    UserStory,
    Domain,
    Tags,
    ReleaseName,
    Lab,
    Build,
    Project,
    BoardName,
    Barcode,
    Bsp,
    ConfigLabel,
    Environment,
}

impl Field {
    pub const ALL: [Field; 16] = [
        Field::Tester,
        Field::TestName,
        Field::Result,
        Field::Jira,
        Field::UserStory,
        Field::Domain,
        Field::Tags,
        Field::ReleaseName,
        Field::Lab,
        Field::Build,
        Field::Project,
        Field::BoardName,
        Field::Barcode,
        Field::Bsp,
        Field::ConfigLabel,
        Field::Environment,
    ];

    /// Name of the field on the submission form.
    pub fn form_name(self) -> &'static str {
        match self {
            Field::Tester => "tester",
            Field::TestName => "testname",
            Field::Result => "passfail",
            Field::Jira => "jira",
            Field::UserStory => "userstory",
            Field::Domain => "domain",
            Field::Tags => "tag",
            Field::ReleaseName => "release_name",
            Field::Lab => "lab",
            Field::Build => "build",
            Field::Project => "project",
            Field::BoardName => "board_name",
            Field::Barcode => "bar_code",
            Field::Bsp => "bsp",
            Field::ConfigLabel => "config_label",
            Field::Environment => "env_name",
        }
    }
}

/// Outcome of a manual test run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestResult {
    #[default]
    Pass,
    Fail,
    Na,
}

impl TestResult {
    pub fn as_str(self) -> &'static str {
        match self {
            TestResult::Pass => "PASS",
            TestResult::Fail => "FAIL",
            TestResult::Na => "NA",
        }
    }
}

impl FromStr for TestResult {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Ok(TestResult::Pass),
            "FAIL" => Ok(TestResult::Fail),
            "NA" => Ok(TestResult::Na),
            other => Err(CoreError::Validation(format!(
                "Invalid test result '{other}'. Must be one of: PASS, FAIL, NA"
            ))),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The validated report fields for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    pub tester: String,
    pub test_name: String,
    pub result: TestResult,
    pub jira: String,
    pub user_story: String,
    pub domain: String,
    pub tags: String,
    pub release_name: String,
    pub lab: String,
    pub build: String,
    pub project: String,
    pub board_name: String,
    pub barcode: String,
    pub bsp: String,
    pub config_label: String,
    pub environment: String,
}

impl SubmissionRecord {
    /// Build and validate a record for `theme` from raw form fields.
    ///
    /// Fields the theme does not accept are ignored. A blank domain falls
    /// back to the theme's default domain. Values are trimmed except the
    /// user story, which is kept verbatim so only an exact `DEBUG` marks a
    /// dry run.
    pub fn from_form(theme: Theme, form: &FormFields) -> Result<Self, CoreError> {
        let mut record = SubmissionRecord::default();
        let mut missing = Vec::new();
        let mut result = None;

        for field in Field::ALL {
            if !theme.accepts(field) {
                continue;
            }
            let raw = form.get(field.form_name()).map(String::as_str).unwrap_or_default();
            let value = if field == Field::UserStory {
                raw
            } else {
                raw.trim()
            };
            check_value(field, value)?;

            if value.is_empty() {
                if theme.is_required(field) {
                    missing.push(field.form_name());
                }
                continue;
            }

            if field == Field::Result {
                result = Some(value.parse::<TestResult>()?);
            } else if let Some(slot) = record.text_slot(field) {
                *slot = value.to_string();
            }
        }

        if !missing.is_empty() {
            return Err(CoreError::Validation(format!(
                "Missing required field(s): {}",
                missing.join(", ")
            )));
        }

        if let Some(result) = result {
            record.result = result;
        }

        if theme.accepts(Field::Environment) {
            if let Some(combined) = form.get(REL_ENV_FIELD).map(|v| v.trim()) {
                if !combined.is_empty() {
                    check_value(Field::ReleaseName, combined)?;
                    // Only the first two comma-separated parts are used.
                    let mut parts = combined.split(',');
                    record.release_name = parts.next().unwrap_or_default().trim().to_string();
                    record.environment = parts.next().unwrap_or_default().trim().to_string();
                }
            }
        }

        if record.domain.is_empty() {
            record.domain = theme.profile().default_domain.to_string();
        }

        Ok(record)
    }

    /// The value carried for `field`.
    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Tester => &self.tester,
            Field::TestName => &self.test_name,
            Field::Result => self.result.as_str(),
            Field::Jira => &self.jira,
            Field::UserStory => &self.user_story,
            Field::Domain => &self.domain,
            Field::Tags => &self.tags,
            Field::ReleaseName => &self.release_name,
            Field::Lab => &self.lab,
            Field::Build => &self.build,
            Field::Project => &self.project,
            Field::BoardName => &self.board_name,
            Field::Barcode => &self.barcode,
            Field::Bsp => &self.bsp,
            Field::ConfigLabel => &self.config_label,
            Field::Environment => &self.environment,
        }
    }

    /// Dry-run submissions are written but never forwarded.
    pub fn is_debug(&self) -> bool {
        self.user_story == DEBUG_USER_STORY
    }

    fn text_slot(&mut self, field: Field) -> Option<&mut String> {
        let slot = match field {
            Field::Result => return None,
            Field::Tester => &mut self.tester,
            Field::TestName => &mut self.test_name,
            Field::Jira => &mut self.jira,
            Field::UserStory => &mut self.user_story,
            Field::Domain => &mut self.domain,
            Field::Tags => &mut self.tags,
            Field::ReleaseName => &mut self.release_name,
            Field::Lab => &mut self.lab,
            Field::Build => &mut self.build,
            Field::Project => &mut self.project,
            Field::BoardName => &mut self.board_name,
            Field::Barcode => &mut self.barcode,
            Field::Bsp => &mut self.bsp,
            Field::ConfigLabel => &mut self.config_label,
            Field::Environment => &mut self.environment,
        };
        Some(slot)
    }
}

/// Reject values that cannot be passed as a single process argument.
fn check_value(field: Field, value: &str) -> Result<(), CoreError> {
    if value.len() > MAX_FIELD_LENGTH {
        return Err(CoreError::Validation(format!(
            "Field '{}' exceeds {MAX_FIELD_LENGTH} bytes",
            field.form_name()
        )));
    }
    if value.contains('\0') {
        return Err(CoreError::Validation(format!(
            "Field '{}' contains a NUL byte",
            field.form_name()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
