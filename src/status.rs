//! Status vocabulary shared by applications and uploaded documents, plus the
//! progress heuristics the dashboard renders.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary source verification phase of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PsvStatus {
    New,
    InProgress,
    Completed,
    #[serde(alias = "IN_COMMITTE_REVIEW")]
    InCommitteeReview,
    Approved,
    Denied,
    Sanctioned,
}

impl PsvStatus {
    pub const ALL: [PsvStatus; 7] = [
        PsvStatus::New,
        PsvStatus::InProgress,
        PsvStatus::Completed,
        PsvStatus::InCommitteeReview,
        PsvStatus::Approved,
        PsvStatus::Denied,
        PsvStatus::Sanctioned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PsvStatus::New => "NEW",
            PsvStatus::InProgress => "IN_PROGRESS",
            PsvStatus::Completed => "COMPLETED",
            PsvStatus::InCommitteeReview => "IN_COMMITTEE_REVIEW",
            PsvStatus::Approved => "APPROVED",
            PsvStatus::Denied => "DENIED",
            PsvStatus::Sanctioned => "SANCTIONED",
        }
    }

    /// Accepts the stored spelling as well as loose variants typed by hand
    /// ("in progress", "InProgress", the legacy "IN_COMMITTE_REVIEW").
    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "NEW" => Some(PsvStatus::New),
            "IN_PROGRESS" | "INPROGRESS" => Some(PsvStatus::InProgress),
            "COMPLETED" => Some(PsvStatus::Completed),
            "IN_COMMITTEE_REVIEW" | "IN_COMMITTE_REVIEW" => Some(PsvStatus::InCommitteeReview),
            "APPROVED" => Some(PsvStatus::Approved),
            "DENIED" => Some(PsvStatus::Denied),
            "SANCTIONED" => Some(PsvStatus::Sanctioned),
            _ => None,
        }
    }

    /// Executive-summary bucket this status is counted under.
    pub fn bucket(&self) -> &'static str {
        match self {
            PsvStatus::New => "notStarted",
            PsvStatus::InProgress => "inProgress",
            PsvStatus::Completed => "completed",
            PsvStatus::InCommitteeReview => "commiteeReview",
            PsvStatus::Approved => "approved",
            PsvStatus::Denied => "denied",
            PsvStatus::Sanctioned => "needsFurtherReview",
        }
    }

    pub fn impact_weight(&self) -> u8 {
        match self {
            PsvStatus::Approved | PsvStatus::Completed | PsvStatus::Denied => 1,
            PsvStatus::InProgress | PsvStatus::New => 2,
            PsvStatus::InCommitteeReview => 3,
            PsvStatus::Sanctioned => 1,
        }
    }

    /// Terminal outcomes used for time-to-credential.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            PsvStatus::Completed | PsvStatus::Approved | PsvStatus::Denied
        )
    }
}

impl fmt::Display for PsvStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentialing committee phase of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitteeStatus {
    NotStarted,
    InReview,
    Decided,
}

impl CommitteeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitteeStatus::NotStarted => "NOT_STARTED",
            CommitteeStatus::InReview => "IN_REVIEW",
            CommitteeStatus::Decided => "DECIDED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match normalize_token(raw).as_str() {
            "NOT_STARTED" | "NOTSTARTED" => Some(CommitteeStatus::NotStarted),
            "IN_REVIEW" | "INREVIEW" => Some(CommitteeStatus::InReview),
            "DECIDED" => Some(CommitteeStatus::Decided),
            _ => None,
        }
    }
}

impl fmt::Display for CommitteeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn impact_category(weight: u8) -> &'static str {
    if weight >= 3 {
        "highImpact"
    } else if weight == 2 {
        "mediumImpact"
    } else {
        "lowImpact"
    }
}

fn normalize_token(raw: &str) -> String {
    raw.trim().to_uppercase().replace(' ', "_")
}

/// Overall application progress, 0..=100, from the two review phases.
pub fn compute_progress(psv_status: Option<&str>, committee_status: Option<&str>) -> i64 {
    fn norm(value: &str) -> String {
        let token = normalize_token(value);
        match token.as_str() {
            "INPROGRESS" => "IN_PROGRESS".to_string(),
            "APPROVED" => "COMPLETED".to_string(),
            _ => token,
        }
    }

    let psv = norm(psv_status.filter(|s| !s.trim().is_empty()).unwrap_or("NEW"));
    let committee = norm(
        committee_status
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("NOT_STARTED"),
    );

    let base = match psv.as_str() {
        "SANCTIONED" => 10,
        "NEW" => 5,
        "IN_PROGRESS" => 35,
        "COMPLETED" => 70,
        _ => 20,
    };
    let increment = match committee.as_str() {
        "IN_REVIEW" => 15,
        "DECIDED" => 30,
        _ => 0,
    };

    let value = if psv == "COMPLETED" && committee == "DECIDED" {
        100
    } else {
        base + increment
    };
    value.clamp(0, 100)
}

/// Document status strings as stored in `uploaded_documents.status`.
pub mod document {
    pub const NEW: &str = "New";
    pub const IN_PROGRESS: &str = "In Progress";
    pub const PROCESSED: &str = "Processed";
    pub const ERROR: &str = "Error";
    pub const REPLACED: &str = "Replaced";
    pub const APPROVED: &str = "Approved";

    /// Legacy rows use upper-case APPROVED/VERIFIED; compare loosely.
    pub fn is_verified(status: Option<&str>) -> bool {
        matches!(
            status.map(|s| s.trim().to_uppercase()).as_deref(),
            Some("APPROVED") | Some("VERIFIED")
        )
    }

    pub fn is_pending(status: Option<&str>) -> bool {
        matches!(
            status.map(|s| s.trim().to_uppercase()).as_deref(),
            Some("NEW") | Some("IN PROGRESS")
        )
    }
}

/// Tile progress for one uploaded document.
pub fn document_progress(file_type: &str, status: Option<&str>) -> i64 {
    match status {
        Some(document::APPROVED) => return 100,
        Some(document::IN_PROGRESS) => return 50,
        _ => {}
    }
    match file_type {
        "npi" => 100,
        "malpractice_insurance" => 70,
        "dl" => 90,
        "degree" => 75,
        "cv" | "cv/resume" | "MEDICAL_TRAINING_CERTIFICATE" => 60,
        "board_certification" => 85,
        "license_board" => 80,
        "DEA" | "COI" | "CV" => 60,
        _ => 45,
    }
}

/// Maps the many spellings of provider-submitted types onto the keys the
/// upload dashboard expects.
pub fn normalize_provider_type(file_type: &str) -> String {
    let value = file_type.trim();
    if value.is_empty() {
        return String::new();
    }
    match value.to_lowercase().as_str() {
        "degree" | "medical_training_certificate" | "medical_training_cert" | "mtc"
        | "med_training" => "MEDICAL_TRAINING_CERTIFICATE".to_string(),
        "cv" | "cv/resume" | "resume" => "CV".to_string(),
        "dea" => "DEA".to_string(),
        "coi" => "COI".to_string(),
        "malpractice_insurance" => "malpractice_insurance".to_string(),
        _ => value.to_uppercase(),
    }
}

pub fn human_doc_label(file_type: Option<&str>) -> String {
    let raw = file_type.unwrap_or("");
    let label = match raw.trim().to_lowercase().as_str() {
        "driving_license" | "driver_license" | "dl" => "Driving License",
        "npi" => "NPI",
        "degree" => "Degree",
        "cv/resume" => "CV/Resume",
        "ml" => "Medical License",
        "malpractice" => "Malpractice Insurance",
        "other" => "Other",
        _ if raw.is_empty() => "Document",
        _ => return raw.to_string(),
    };
    label.to_string()
}

pub fn display_name(file_type: &str) -> String {
    let name = match file_type {
        "COI" => "Certificate of Insurance",
        "CV" => "CV/Resume",
        "MEDICAL_TRAINING_CERTIFICATE" => "Medical Training Certificate",
        "DRIVING_LICENSE" | "DL" => "Driver License",
        "board_certification" => "Board Certification",
        "license_board" => "License / Board Status",
        "sanctions" => "Sanctions Report",
        "DEA" => "DEA/CDS Certificate",
        _ => return title_case(&file_type.replace('_', " ")),
    };
    name.to_string()
}

fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for c in value.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// NPI check: ten digits whose last digit is the Luhn check digit computed
/// over the `80840` card-issuer prefix.
pub fn npi_is_valid(npi: &str) -> bool {
    let npi = npi.trim();
    if npi.len() != 10 || !npi.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = format!("80840{npi}")
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}
