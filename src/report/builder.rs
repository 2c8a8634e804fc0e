use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::db::applications::ApplicationRow;
use crate::db::documents::{DocumentRow, parse_json_column};
use crate::db::emails::EmailRow;
use crate::db::forms::FormRow;
use crate::pipeline::fields::mismatched_fields;
use crate::status::{document, human_doc_label, npi_is_valid};

#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub provider_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_steps: usize,
    pub total_llm_interactions: usize,
    pub total_decisions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub specialty: Option<String>,
    pub experience_years: i64,
    pub education: Option<String>,
    pub license_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessStep {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub status: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
    pub subject: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub id: i64,
    #[serde(rename = "type")]
    pub file_type: String,
    pub label: String,
    pub filename: String,
    pub status: String,
    pub ocr: Value,
    pub pdf_match: Value,
    pub json_match: Value,
    pub matches: usize,
    pub mismatched_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailSummary {
    pub id: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub recipient: String,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataPoints {
    pub uploads: Vec<UploadSummary>,
    pub emails: Vec<EmailSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalResult {
    pub compliance_status: String,
    pub score: u8,
    pub hard_regulations: BTreeMap<String, String>,
    pub soft_regulations: BTreeMap<String, u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmInteraction {
    #[serde(rename = "type")]
    pub kind: String,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub session_metadata: SessionMetadata,
    pub provider_info: ProviderInfo,
    pub process_steps: Vec<ProcessStep>,
    pub decisions: Vec<Decision>,
    pub data_points: DataPoints,
    pub final_result: FinalResult,
    pub llm_reasoning: Vec<LlmInteraction>,
}

impl ReportData {
    pub fn record_llm_interaction(&mut self, kind: &str, model: &str) {
        self.llm_reasoning.push(LlmInteraction {
            kind: kind.to_string(),
            model: model.to_string(),
            timestamp: Utc::now(),
        });
        self.session_metadata.total_llm_interactions = self.llm_reasoning.len();
    }

    pub fn approved_count(&self) -> usize {
        self.data_points
            .uploads
            .iter()
            .filter(|u| document::is_verified(Some(u.status.as_str())))
            .count()
    }

    pub fn in_progress_count(&self) -> usize {
        self.data_points
            .uploads
            .iter()
            .filter(|u| document::is_pending(Some(u.status.as_str())))
            .count()
    }
}

/// Completeness score 1..=5 from the share of approved or verified uploads.
pub fn infer_score(statuses: &[&str]) -> u8 {
    let total = statuses.len().max(1) as f64;
    let approved = statuses
        .iter()
        .filter(|&&s| document::is_verified(Some(s)))
        .count() as f64;
    let ratio = approved / total;

    if ratio >= 0.9 {
        5
    } else if ratio >= 0.75 {
        4
    } else if ratio >= 0.5 {
        3
    } else if ratio >= 0.25 {
        2
    } else {
        1
    }
}

fn summarize_upload(doc: &DocumentRow) -> UploadSummary {
    let json_match = parse_json_column(doc.json_match.as_deref());
    let mismatched = mismatched_fields(&json_match);
    let total_fields = json_match.as_object().map(|m| m.len()).unwrap_or(0);

    UploadSummary {
        id: doc.id,
        file_type: doc.file_type.clone(),
        label: human_doc_label(Some(doc.file_type.as_str())),
        filename: doc.filename.clone(),
        status: doc.status.clone(),
        ocr: parse_json_column(doc.ocr_output.as_deref()),
        pdf_match: parse_json_column(doc.pdf_match.as_deref()),
        matches: total_fields - mismatched.len(),
        mismatched_fields: mismatched,
        json_match,
    }
}

fn build_steps(uploads: &[UploadSummary], emails: &[EmailRow]) -> Vec<ProcessStep> {
    let documents = uploads.iter().map(|u| ProcessStep {
        kind: "Document".to_string(),
        name: u.label.clone(),
        status: if u.status.is_empty() {
            "Unknown".to_string()
        } else {
            u.status.clone()
        },
        timestamp: None,
        details: json!({
            "filename": u.filename,
            "file_type": u.file_type,
            "matches": u.matches,
            "mismatches": u.mismatched_fields.len(),
        }),
    });

    let communications = emails.iter().map(|e| ProcessStep {
        kind: "Communication".to_string(),
        name: "Email".to_string(),
        status: if e.status.is_empty() {
            "Unknown".to_string()
        } else {
            e.status.clone()
        },
        timestamp: Some(e.sent_at),
        details: json!({
            "recipient": e.recipient_email,
            "subject": e.subject,
        }),
    });

    documents.chain(communications).collect()
}

fn build_decisions(uploads: &[UploadSummary], emails: &[EmailRow]) -> Vec<Decision> {
    let mut decisions = Vec::new();

    for u in uploads {
        if document::is_verified(Some(u.status.as_str())) {
            decisions.push(Decision {
                kind: "DocumentApproval".to_string(),
                action: "Accept".to_string(),
                subject: u.label.clone(),
                reason: format!("{} {}.", u.label, u.status),
            });
        }
        if !u.mismatched_fields.is_empty() {
            decisions.push(Decision {
                kind: "DataMismatch".to_string(),
                action: "FollowUp".to_string(),
                subject: u.label.clone(),
                reason: format!(
                    "Field mismatch detected: {}",
                    u.mismatched_fields.join(", ")
                ),
            });
        }
    }

    let sent = emails
        .iter()
        .filter(|e| e.status.eq_ignore_ascii_case("SENT"))
        .count();
    if sent > 0 {
        decisions.push(Decision {
            kind: "Communication".to_string(),
            action: "Notify".to_string(),
            subject: format!("{sent} email(s) sent"),
            reason: "Applicant has been contacted with next steps.".to_string(),
        });
    }

    decisions
}

fn hard_regulations(form: &FormRow, uploads: &[UploadSummary]) -> BTreeMap<String, String> {
    let on_file = |file_type: &str| {
        if uploads.iter().any(|u| u.file_type.eq_ignore_ascii_case(file_type)) {
            "On file"
        } else {
            "Missing"
        }
    };

    let npi = match form.npi.as_deref() {
        Some(npi) if npi_is_valid(npi) => "Pass",
        Some(_) => "Fail",
        None => "Missing",
    };
    let license = match form.ml_number.as_deref().map(str::trim) {
        Some(n) if !n.is_empty() => "Provided",
        _ => "Missing",
    };

    BTreeMap::from([
        ("Driver License".to_string(), on_file("dl").to_string()),
        ("Medical License Number".to_string(), license.to_string()),
        ("NPI Format".to_string(), npi.to_string()),
    ])
}

/// Assembles the report structure from the current state of an application.
pub fn build_report_data(
    application: &ApplicationRow,
    form: &FormRow,
    uploads: &[DocumentRow],
    emails: &[EmailRow],
) -> ReportData {
    let uploads: Vec<UploadSummary> = uploads.iter().map(summarize_upload).collect();
    let process_steps = build_steps(&uploads, emails);
    let decisions = build_decisions(&uploads, emails);

    let statuses: Vec<&str> = uploads.iter().map(|u| u.status.as_str()).collect();
    let score = infer_score(&statuses);

    let name = application
        .name
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let experience_years = form
        .experience
        .as_deref()
        .and_then(|e| e.trim().parse::<i64>().ok())
        .unwrap_or(0);

    let final_result = FinalResult {
        compliance_status: application.psv_status.clone(),
        score,
        hard_regulations: hard_regulations(form, &uploads),
        soft_regulations: BTreeMap::from([("Document Completeness".to_string(), score)]),
    };

    ReportData {
        session_metadata: SessionMetadata {
            session_id: application.id.clone(),
            provider_id: form
                .provider_id
                .clone()
                .or_else(|| application.provider_id.clone()),
            start_time: application.create_dt,
            end_time: application.last_updt_dt,
            total_steps: process_steps.len(),
            total_llm_interactions: 0,
            total_decisions: decisions.len(),
        },
        provider_info: ProviderInfo {
            name,
            specialty: application.specialty.clone(),
            experience_years,
            education: form.university.clone(),
            license_number: form.ml_number.clone(),
        },
        process_steps,
        decisions,
        data_points: DataPoints {
            uploads,
            emails: emails
                .iter()
                .map(|e| EmailSummary {
                    id: e.id.clone(),
                    status: e.status.clone(),
                    sent_at: e.sent_at,
                    recipient: e.recipient_email.clone(),
                    subject: e.subject.clone(),
                })
                .collect(),
        },
        final_result,
        llm_reasoning: Vec::new(),
    }
}
