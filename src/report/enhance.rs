use serde_json::{Value, json};

use crate::llm::{GenerateRequest, LlmClient};

use super::builder::ReportData;

const SYSTEM_PROMPT: &str = "You are a senior medical credentialing analyst. Write clear, factual, \
and actionable markdown. Only use the provided data; if something is missing, explicitly mark it \
as Unknown. Be concise but thorough. Avoid duplication from the summary; focus on deeper analysis.";

const INSTRUCTIONS: &str = "Using the JSON below, generate detailed report sections. Do NOT invent \
data. Return ONLY markdown with these top-level sections (in order):

### Detailed Findings
- Summarize key findings across all documents, approvals, and communications.

### Document-by-Document Analysis
- For each document, list status, detected issues, and what was verified.

### Discrepancies & Root Causes
- Enumerate mismatches with likely causes and what evidence is needed.

### Risk & Mitigation Plan
- Classify risks (Low/Medium/High) and give concrete mitigations.

### Verification Plan
- Exact external checks to run (e.g., NPI, state license).

### Timeline & Ownership
- Short plan with owners (Applicant/Staff) and expected dates.

### Compliance Checklist
- Checklist with [ ]/ [x] based on what is known.

### Next Actions
- 3-6 prioritized, specific next actions.";

/// The subset of the report the model sees.
pub fn compact_payload(data: &ReportData) -> Value {
    let meta = &data.session_metadata;
    let provider = &data.provider_info;

    let documents: Vec<Value> = data
        .data_points
        .uploads
        .iter()
        .map(|u| {
            json!({
                "label": u.label,
                "type": u.file_type,
                "status": u.status,
                "filename": u.filename,
                "mismatched_fields": u.mismatched_fields,
                "matches": u.matches,
                "mismatches": u.mismatched_fields.len(),
            })
        })
        .collect();

    json!({
        "session": {
            "id": meta.session_id,
            "steps": meta.total_steps,
            "decisions": meta.total_decisions,
            "status": data.final_result.compliance_status,
            "score": data.final_result.score,
            "start_time": meta.start_time,
            "end_time": meta.end_time,
        },
        "provider": {
            "name": provider.name,
            "specialty": provider.specialty,
            "experience_years": provider.experience_years,
            "education": provider.education,
            "license_number": provider.license_number,
        },
        "documents": documents,
        "emails": data.data_points.emails.iter().map(|e| json!({
            "status": e.status,
            "sent_at": e.sent_at,
            "recipient": e.recipient,
            "subject": e.subject,
        })).collect::<Vec<_>>(),
        "decisions": data.decisions,
    })
}

/// Asks the model for the detailed analysis sections. Failures are logged
/// and yield `None` so the report still renders.
#[tracing::instrument(name = "report_stage enhance", skip(llm_client, data), fields(report.session_id = %data.session_metadata.session_id))]
pub async fn detailed_sections(
    llm_client: &LlmClient,
    model: &str,
    data: &ReportData,
) -> Option<String> {
    let prompt = format!("{INSTRUCTIONS}\n\nJSON:\n{}", compact_payload(data));

    let resp = llm_client
        .generate(&GenerateRequest {
            model: model.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            images: Vec::new(),
            temperature: 0.2,
            max_tokens: 1200,
            stage: "report_enhancement".to_string(),
        })
        .await;

    match resp {
        Ok(r) if !r.content.trim().is_empty() => Some(r.content),
        Ok(_) => {
            tracing::warn!("Report enhancement returned empty content");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Report enhancement failed, continuing without it");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::builder::build_report_data;
    use crate::report::builder::fixtures::*;

    #[test]
    fn test_compact_payload_shape() {
        let uploads = vec![upload(
            7,
            "npi",
            "Processed",
            Some(r#"{"npi": {"match": false}, "fn": {"match": true}}"#),
        )];
        let data = build_report_data(&application(), &form(), &uploads, &[email("SENT")]);
        let payload = compact_payload(&data);

        assert_eq!(payload["session"]["id"], "APP-001");
        assert_eq!(payload["provider"]["name"], "Jane Doe");
        assert_eq!(payload["documents"][0]["label"], "NPI");
        assert_eq!(payload["documents"][0]["mismatched_fields"], json!(["npi"]));
        assert_eq!(payload["documents"][0]["matches"], 1);
        assert_eq!(payload["emails"][0]["status"], "SENT");
        assert_eq!(payload["decisions"][0]["type"], "DataMismatch");
    }
}
