//! Parser for opportunity submissions made through the issue form.
//!
//! A body is a run of `### Label` sections; each value is the text up to the
//! next heading. The form writes `_No response_` for optional fields left blank.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use eos_core::RawRecord;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const NO_RESPONSE: &str = "_No response_";
pub const COMMUNITY_SOURCE: &str = "community";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error("submission has no title")]
    MissingTitle,
    #[error("submission needs a claim URL or an info URL")]
    MissingUrl,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueForm {
    sections: BTreeMap<String, String>,
}

impl IssueForm {
    pub fn parse(body: &str) -> Self {
        let mut sections = BTreeMap::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in body.lines() {
            if let Some(label) = section_label(line) {
                if let Some((label, lines)) = current.take() {
                    sections.insert(label, lines.join("\n").trim().to_string());
                }
                current = Some((label.to_lowercase(), Vec::new()));
            } else if let Some((_, lines)) = current.as_mut() {
                lines.push(line);
            }
        }
        if let Some((label, lines)) = current {
            sections.insert(label, lines.join("\n").trim().to_string());
        }

        Self { sections }
    }

    /// Value of the first label that has a real answer.
    pub fn field(&self, labels: &[&str]) -> Option<&str> {
        labels
            .iter()
            .filter_map(|label| self.sections.get(&label.to_lowercase()))
            .map(|value| value.trim())
            .find(|value| !value.is_empty() && *value != NO_RESPONSE)
    }

    pub fn text(&self, labels: &[&str]) -> String {
        self.field(labels).unwrap_or_default().to_string()
    }

    /// A checkbox group counts as ticked when any box shows `[x]`.
    pub fn checked(&self, labels: &[&str]) -> bool {
        self.field(labels)
            .is_some_and(|value| value.to_lowercase().contains("[x]"))
    }

    pub fn submission(&self) -> IssueSubmission {
        IssueSubmission {
            title: self.text(&["Title", "Opportunity title", "Name"]),
            description: self.text(&["Description", "Summary"]),
            category: self.text(&["Category"]),
            amount: self.text(&["Amount", "Payout"]),
            deadline: self.text(&["Deadline", "Claim deadline"]),
            state: self.text(&["State", "Location"]),
            difficulty: self.text(&["Difficulty"]),
            apply_url: self.text(&["Claim URL", "Apply URL", "Claim link"]),
            info_url: self.text(&["Info URL", "Details URL", "More info"]),
            agency: self.text(&["Agency", "Company", "Defendant"]),
            proof_required: self.text(&["Proof required", "Proof"]),
            money_speed: self.text(&["Money speed", "Speed"]),
            featured: self.checked(&["Featured"]),
        }
    }
}

/// `### Label` opens a section; `####` and `###Label` do not.
fn section_label(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("###")?;
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}

/// A parsed submission prior to id assignment and enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueSubmission {
    pub title: String,
    pub description: String,
    pub category: String,
    pub amount: String,
    pub deadline: String,
    pub state: String,
    pub difficulty: String,
    pub apply_url: String,
    pub info_url: String,
    pub agency: String,
    pub proof_required: String,
    pub money_speed: String,
    pub featured: bool,
}

impl IssueSubmission {
    pub fn validate(&self) -> Result<(), IssueError> {
        if self.title.trim().is_empty() {
            return Err(IssueError::MissingTitle);
        }
        if self.primary_url().is_none() {
            return Err(IssueError::MissingUrl);
        }
        Ok(())
    }

    pub fn primary_url(&self) -> Option<&str> {
        [self.apply_url.as_str(), self.info_url.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|url| !url.is_empty())
    }

    /// Dataset entry for this submission. Blank optional fields are left out
    /// so the listing applies its defaults.
    pub fn into_record(self, id: String, date_found: NaiveDate) -> RawRecord {
        let mut record = RawRecord::new();
        record.insert("id", id);
        record.insert("title", self.title.trim());
        let optional = [
            ("description", self.description),
            ("category", self.category),
            ("amount", self.amount),
            ("deadline", self.deadline),
            ("state", self.state),
            ("difficulty", self.difficulty),
            ("apply_url", self.apply_url),
            ("details_url", self.info_url),
            ("agency", self.agency),
            ("proof_required", self.proof_required),
            ("money_speed", self.money_speed),
        ];
        for (key, value) in optional {
            let value = value.trim();
            if !value.is_empty() {
                record.insert(key, value);
            }
        }
        record.insert("featured", Value::Bool(self.featured));
        record.insert("source", COMMUNITY_SOURCE);
        record.insert("date_found", date_found.format("%Y-%m-%d").to_string());
        record
    }
}
