use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use crate::AppState;
use crate::db::applications::{self, ApplicationRow};
use crate::db::documents::{self, DocumentRow, parse_json_column};
use crate::db::forms::{self, FormRow};
use crate::error::{AppError, AppResult};
use crate::status::display_name;

const PROVIDER_SUBMITTED: [&str; 6] = [
    "MEDICAL_TRAINING_CERTIFICATE",
    "CV",
    "COI",
    "DEA",
    "DRIVING_LICENSE",
    "DL",
];
const PSV_FETCHED: [&str; 3] = ["board_certification", "license_board", "sanctions"];
const EXCLUDED: [&str; 3] = ["hospital_privileges", "npdb", "npi"];

fn document_item(doc: &DocumentRow) -> Value {
    let verification = match doc.verification_data.as_deref() {
        Some(raw) if !raw.trim().is_empty() => parse_json_column(Some(raw)),
        _ => json!([]),
    };
    json!({
        "id": doc.id,
        "type": doc.file_type,
        "displayName": display_name(&doc.file_type),
        "status": doc.status,
        "ocrOutput": parse_json_column(doc.ocr_output.as_deref()),
        "verification": verification,
        "jsonMatch": parse_json_column(doc.json_match.as_deref()),
    })
}

fn provider_block(app: &ApplicationRow, form: Option<&FormRow>) -> Value {
    match form {
        Some(form) => json!({
            "name": form.provider_name,
            "lastName": form.provider_last_name,
            "npi": form.npi,
            "specialty": form.specialty,
            "address": form.address,
            "market": app.market,
        }),
        None => json!({
            "name": app.name,
            "lastName": app.last_name,
            "npi": app.npi,
            "specialty": app.specialty,
            "address": app.address,
            "market": app.market,
        }),
    }
}

/// Splits live documents into provider-submitted and PSV-fetched groups.
pub fn psv_info(app: &ApplicationRow, form: Option<&FormRow>, docs: &[DocumentRow]) -> Value {
    let form_id = app.form_id.as_deref().unwrap_or_default();
    let mut provider_docs = Vec::new();
    let mut psv_docs = Vec::new();
    let mut verified = 0;
    let mut in_progress = 0;

    for doc in docs {
        let lower = doc.file_type.to_lowercase();
        if EXCLUDED.contains(&lower.as_str()) {
            continue;
        }

        let mut item = document_item(doc);
        if PROVIDER_SUBMITTED.contains(&doc.file_type.to_uppercase().as_str()) {
            provider_docs.push(item);
        } else if PSV_FETCHED.contains(&lower.as_str()) {
            if lower == "sanctions" {
                item["documentLink"] = json!(format!("/uploads/sanctions_{form_id}.pdf"));
            }
            psv_docs.push(item);
        } else {
            continue;
        }

        match doc.status.to_lowercase().as_str() {
            "approved" | "verified" => verified += 1,
            "rejected" => {}
            _ => in_progress += 1,
        }
    }

    json!({
        "applicationId": app.id,
        "provider": provider_block(app, form),
        "stats": {
            "totalDocuments": provider_docs.len() + psv_docs.len(),
            "verifiedDocuments": verified,
            "inProgressDocuments": in_progress,
        },
        "providerSubmitted": provider_docs,
        "psvFetched": psv_docs,
    })
}

pub async fn get_psv_info(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
) -> AppResult<Json<Value>> {
    let app = applications::get_application(&state.pool, &application_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".to_string()))?;

    let form_id = app.form_id.clone().unwrap_or_default();
    let form = forms::get_form(&state.pool, &form_id).await?;
    let docs = documents::list_active_for_form(&state.pool, &form_id).await?;

    Ok(Json(psv_info(&app, form.as_ref(), &docs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::builder::fixtures;

    #[test]
    fn test_groups_and_stats() {
        let mut sanctions = fixtures::upload(4, "sanctions", "Processed", None);
        sanctions.verification_data = Some(r#"{"npi": "1234567893"}"#.to_string());
        let docs = vec![
            fixtures::upload(1, "CV", "Approved", None),
            fixtures::upload(2, "dea", "New", None),
            fixtures::upload(3, "npi", "Approved", None),
            sanctions,
            fixtures::upload(5, "license_board", "Rejected", None),
            fixtures::upload(6, "misc", "New", None),
        ];
        let info = psv_info(&fixtures::application(), Some(&fixtures::form()), &docs);

        let provider = info["providerSubmitted"].as_array().unwrap();
        assert_eq!(provider.len(), 2);
        assert_eq!(provider[0]["displayName"], "CV/Resume");
        assert_eq!(provider[0]["verification"], json!([]));

        let fetched = info["psvFetched"].as_array().unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0]["documentLink"], "/uploads/sanctions_form-1.pdf");
        assert_eq!(fetched[0]["verification"]["npi"], "1234567893");
        assert_eq!(fetched[1]["displayName"], "License / Board Status");

        assert_eq!(info["stats"]["totalDocuments"], 4);
        assert_eq!(info["stats"]["verifiedDocuments"], 1);
        assert_eq!(info["stats"]["inProgressDocuments"], 2);
        assert_eq!(info["provider"]["name"], "Jane");
    }

    #[test]
    fn test_provider_falls_back_to_application() {
        let info = psv_info(&fixtures::application(), None, &[]);
        assert_eq!(info["provider"]["lastName"], "Doe");
        assert_eq!(info["provider"]["npi"], "1234567893");
        assert_eq!(info["stats"]["totalDocuments"], 0);
    }
}
