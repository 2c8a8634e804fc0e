//! HTTP-level tests driving the router with `oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use tower::util::ServiceExt;

use common::{ScriptedProvider, spawn_app, spawn_app_with};

#[tokio::test]
async fn test_health_and_ready() {
    let app = spawn_app().await;

    let (status, body) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "credentialing-service");

    let (status, body) = app.get("/api/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn test_responses_carry_request_id_and_cors() {
    let app = spawn_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header(header::ORIGIN, "http://localhost:9002")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:9002"
    );
}

#[tokio::test]
async fn test_form_create_save_and_fetch() {
    let app = spawn_app().await;
    app.seed_form("F-100").await;

    let (status, body) = app
        .post_json("/api/forms/create-form", json!({ "formId": "F-100" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Form already exists");

    let (status, body) = app.get("/api/forms?formId=F-100").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["providerName"], "Jane");
    assert_eq!(body["providerLastName"], "Doe");
    assert_eq!(body["npi"], "1234567893");

    let (status, _) = app
        .post_json(
            "/api/forms/submit-form",
            json!({ "formId": "F-100", "data": { "providerName": "Janet" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get("/api/forms/?formId=F-100").await;
    assert_eq!(body["providerName"], "Janet");
}

#[tokio::test]
async fn test_form_lookup_errors() {
    let app = spawn_app().await;

    let (status, _) = app.get("/api/forms").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/api/forms?appId=APP-999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Application not found");

    let (status, body) = app.get("/api/forms?formId=missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Form not found");

    let (status, _) = app
        .post_json("/api/forms/submit-form", json!({ "formId": "missing", "data": {} }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post_json(
            "/api/forms/save-form",
            json!({ "formId": "F-1", "data": { "dob": "04/02/1980" } }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_form_lookup_by_application() {
    let app = spawn_app().await;
    app.seed_form("F-200").await;
    let app_id = app.seed_application("F-200").await;

    let (status, body) = app.get(&format!("/api/forms?appId={app_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["providerName"], "Jane");
}

#[tokio::test]
async fn test_upload_replaces_previous_document() {
    let app = spawn_app().await;
    app.seed_form("F-300").await;

    let (status, first) = app.upload("F-300", "cv", "resume.pdf", b"%PDF-1 first").await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["message"], "File uploaded successfully");

    let (status, second) = app.upload("F-300", "cv", "resume.pdf", b"%PDF-1 second").await;
    assert_eq!(status, StatusCode::OK);
    assert!(second["fileId"].as_i64() > first["fileId"].as_i64());

    let stored = app.state.config.upload_dir.join("resume__F-300.pdf");
    assert_eq!(std::fs::read(stored).unwrap(), b"%PDF-1 second");

    let (status, info) = app.get("/api/forms/upload-info?formId=F-300").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["formId"], "F-300");
    assert_eq!(info["files"]["CV"]["fileId"], second["fileId"]);
    assert_eq!(info["files"]["CV"]["status"], "New");
    assert_eq!(info["files"]["CV"]["fileExtension"], "pdf");
    assert_eq!(info["files"]["DEA"]["fileId"], json!(null));
    assert_eq!(
        info["files"]["malpractice_insurance"]["verification"],
        "Insurance Policy Verification"
    );
    assert_eq!(info["comments"], json!([]));

    let (_, form) = app.get("/api/forms?formId=F-300").await;
    assert_eq!(form["cv-upload-id"], second["fileId"]);
}

#[tokio::test]
async fn test_upload_requires_fields() {
    let app = spawn_app().await;

    let (status, body) = app.upload("", "cv", "resume.pdf", b"x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "formId is required");

    let (status, body) = app.upload("F-1", "", "resume.pdf", b"x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "fileType is required");
}

#[tokio::test]
async fn test_upload_keeps_files_inside_upload_dir() {
    let app = spawn_app().await;
    app.seed_form("F-1").await;

    let (status, body) = app.upload("F-1", "cv", "../../escaped.pdf", b"owned").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["filename"], "escaped.pdf");

    let stored = app.state.config.upload_dir.join("escaped__F-1.pdf");
    assert_eq!(std::fs::read(&stored).unwrap(), b"owned");
    assert!(!app.dir.path().join("escaped__F-1.pdf").exists());
    assert!(!app.dir.path().parent().unwrap().join("escaped__F-1.pdf").exists());

    let (status, _) = app.upload("../F-1", "cv", "cv.pdf", b"x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.upload("F-1", "cv", "..", b"x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_info_without_form_is_empty() {
    let app = spawn_app().await;

    let (status, body) = app.get("/api/forms/upload-info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "formId": null, "files": {}, "comments": [] }));
}

#[tokio::test]
async fn test_upload_info_psv_has_every_verification_tile() {
    let app = spawn_app().await;
    app.seed_form("F-350").await;
    app.upload("F-350", "npi", "npi.pdf", b"%PDF").await;

    let (status, body) = app.get("/api/forms/upload-info-psv?formId=F-350").await;
    assert_eq!(status, StatusCode::OK);
    let files = body["files"].as_object().unwrap();
    assert_eq!(files.len(), 4);
    assert_eq!(files["npi"]["verification"], "NPPES Verification");
    assert!(files["npi"]["fileId"].is_i64());
    assert_eq!(files["board_certification"]["fileId"], json!(null));
    assert_eq!(files["sanctions"]["verification"], json!(null));
}

#[tokio::test]
async fn test_upload_status_update_records_review() {
    let app = spawn_app().await;
    app.seed_form("F-400").await;
    let app_id = app.seed_application("F-400").await;
    app.upload("F-400", "dea", "dea.pdf", b"%PDF").await;

    let (status, body) = app
        .post_json(
            "/api/forms/upload-status-update?formId=F-400&fileType=dea&statusUpdate=Accepted",
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["files"]["DEA"]["status"], "Approved");
    assert_eq!(body["files"]["DEA"]["progress"], 100);

    let (_, events) = app
        .get(&format!("/api/applications/{app_id}/events"))
        .await;
    assert_eq!(events[0]["event_type"], "DOCUMENT_REVIEW");
    assert!(events[0]["message"].as_str().unwrap().contains("accepted by reviewer"));

    let (_, info) = app
        .get(&format!("/api/forms/upload-info?appId={app_id}"))
        .await;
    assert_eq!(info["comments"][0]["type"], "DOCUMENT_REVIEW");

    let (status, body) = app
        .post_json(
            "/api/forms/upload-status-update?formId=F-400&fileType=dea&statusUpdate=Rejected",
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["files"]["DEA"]["status"], "In Progress");
}

#[tokio::test]
async fn test_upload_status_update_errors() {
    let app = spawn_app().await;

    let (status, _) = app
        .post_json(
            "/api/forms/upload-status-update?formId=F-1&fileType=dea&statusUpdate=Maybe",
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json("/api/forms/upload-status-update?formId=F-1&fileType=dea", json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json(
            "/api/forms/upload-status-update?formId=F-1&fileType=dea&statusUpdate=Accepted",
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_application_ids_and_upsert() {
    let app = spawn_app().await;

    let (status, body) = app.get("/api/applications").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No applications found");

    let first = app.seed_application("F-500").await;
    let second = app.seed_application("F-501").await;
    assert_eq!(first, "APP-001");
    assert_eq!(second, "APP-002");

    let (_, body) = app.get(&format!("/api/applications/{first}")).await;
    assert_eq!(body["psvStatus"], "NEW");
    assert_eq!(body["status"], "NEW");
    assert_eq!(body["committeeStatus"], "NOT_STARTED");
    assert_eq!(body["progress"], 5);

    let (status, body) = app
        .post_json(
            "/api/applications",
            json!({ "formId": "F-500", "status": "In Progress", "assignee": "sam" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], first);
    assert_eq!(body["psvStatus"], "IN_PROGRESS");
    assert_eq!(body["psvOriginalLabel"], "In Progress");
    assert_eq!(body["progress"], 35);

    let (_, list) = app.get("/api/applications/").await;
    assert_eq!(list.as_array().unwrap().len(), 2);

    let (status, _) = app
        .post_json("/api/applications", json!({ "formId": "F-502", "psvStatus": "LOST" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.post_json("/api/applications", json!({ "name": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get("/api/applications/APP-404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_change_logs_event() {
    let app = spawn_app().await;
    let app_id = app.seed_application("F-600").await;

    let (status, body) = app
        .send_json(
            "PATCH",
            &format!("/api/applications/{app_id}/status"),
            json!({ "psvStatus": "COMPLETED", "committeeStatus": "IN_REVIEW", "note": "Ready." }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["psvStatus"], "COMPLETED");
    assert_eq!(body["committeeStatus"], "IN_REVIEW");
    assert_eq!(body["progress"], 85);

    let (_, events) = app
        .get(&format!("/api/applications/{app_id}/events?limit=1"))
        .await;
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["event_type"], "STATUS_CHANGE");
    assert!(events[0]["message"].as_str().unwrap().ends_with("Ready."));

    let (status, _) = app
        .send_json("PATCH", &format!("/api/applications/{app_id}/status"), json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_comments() {
    let app = spawn_app().await;
    let app_id = app.seed_application("F-650").await;

    let (status, event) = app
        .post_json(
            &format!("/api/applications/{app_id}/events"),
            json!({ "message": "Called the provider." }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["event_type"], "COMMENT");

    let (status, _) = app
        .post_json(&format!("/api/applications/{app_id}/events"), json!({ "message": " " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json("/api/applications/APP-404/events", json!({ "message": "hi" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_process_document_endpoint_reports_matches() {
    let app = spawn_app().await;
    app.seed_form("F-700").await;
    let app_id = app.seed_application("F-700").await;
    let (_, uploaded) = app.upload("F-700", "npi", "npi card.pdf", b"%PDF").await;
    let file_id = uploaded["fileId"].as_i64().unwrap();

    let (status, tile) = app
        .post_json(&format!("/api/documents/{file_id}/process"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{tile}");
    assert_eq!(tile["status"], "Processed");
    assert_eq!(tile["jsonMatch"]["npi"]["match"], true);
    assert_eq!(tile["jsonMatch"]["fn"]["provided"], "jane");
    assert_eq!(tile["pdfMatch"]["match"], true);

    let (_, application) = app.get(&format!("/api/applications/{app_id}")).await;
    assert_eq!(application["psvStatus"], "IN_PROGRESS");

    let (_, issues) = app.get(&format!("/api/applications/aiissues/{app_id}")).await;
    assert_eq!(issues["issues"], json!([]));

    app.upload("F-700", "npi", "npi card.pdf", b"%PDF v2").await;
    let (status, _) = app
        .post_json(&format!("/api/documents/{file_id}/process"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app.post_json("/api/documents/9999/process", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_process_leaves_approved_documents_alone() {
    let app = spawn_app().await;
    app.seed_form("F-705").await;
    let (_, uploaded) = app.upload("F-705", "npi", "npi.pdf", b"%PDF").await;
    let file_id = uploaded["fileId"].as_i64().unwrap();

    let (status, body) = app
        .post_json(
            "/api/forms/upload-status-update?formId=F-705&fileType=npi&statusUpdate=Accepted",
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = app
        .post_json(&format!("/api/documents/{file_id}/process"), json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, info) = app.get("/api/forms/upload-info?formId=F-705").await;
    assert_eq!(info["files"]["NPI"]["status"], "Approved");
    assert!(app.provider.stages().is_empty());
}

#[tokio::test]
async fn test_process_rejects_unverifiable_type() {
    let app = spawn_app().await;
    let (_, uploaded) = app.upload("F-710", "cv", "cv.pdf", b"%PDF").await;

    let (status, _) = app
        .post_json(
            &format!("/api/documents/{}/process", uploaded["fileId"]),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_document_download() {
    let app = spawn_app().await;
    app.seed_form("F-800").await;
    let app_id = app.seed_application("F-800").await;
    app.upload("F-800", "dl", "license.png", b"png-bytes").await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/documents/download?id={app_id}&type=dl"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"license.png\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"png-bytes");

    let (status, _) = app
        .get(&format!("/api/documents/download?id={app_id}&type=npi"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/api/documents/download?id=APP-404&type=dl").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_emails_and_summary() {
    let app = spawn_app().await;
    app.seed_form("F-900").await;
    let app_id = app.seed_application("F-900").await;
    app.upload("F-900", "dea", "dea.pdf", b"%PDF").await;
    app.upload("F-900", "cv", "cv.pdf", b"%PDF").await;
    app.post_json(
        "/api/forms/upload-status-update?formId=F-900&fileType=dea&statusUpdate=Accepted",
        json!({}),
    )
    .await;

    for status in ["sent", "DRAFT"] {
        let (code, body) = app
            .post_json(
                "/api/emails/save",
                json!({
                    "application_id": app_id,
                    "recipient_email": "jane@example.com",
                    "subject": "Missing documents",
                    "body": "Please upload your DEA certificate.",
                    "status": status,
                }),
            )
            .await;
        assert_eq!(code, StatusCode::OK, "{body}");
        assert_eq!(body["message"], "Email saved successfully");
    }

    let (status, _) = app
        .post_json(
            "/api/emails/save",
            json!({
                "application_id": app_id,
                "recipient_email": "jane@example.com",
                "subject": "s",
                "body": "b",
                "status": "LOST",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, emails) = app.get(&format!("/api/emails?applicationId={app_id}")).await;
    assert_eq!(emails.as_array().unwrap().len(), 2);
    assert!(emails.as_array().unwrap().iter().any(|e| e["status"] == "SENT"));

    let (status, summary) = app.get(&format!("/api/applications/summary/{app_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["providerName"], "Jane");
    assert_eq!(summary["docsSummary"], "2/2 (1 approved, 1 in progress)");
    assert_eq!(summary["emailSummary"], "1 sent, 1 draft, 0 pending");
    assert_eq!(summary["nextActions"][0], "Verify 0 remaining docs");
}

#[tokio::test]
async fn test_executive_summary() {
    let app = spawn_app().await;
    app.seed_application("F-1000").await;
    app.post_json(
        "/api/applications",
        json!({ "formId": "F-1001", "psvStatus": "COMPLETED", "specialty": "Cardiology" }),
    )
    .await;
    app.post_json(
        "/api/applications",
        json!({ "formId": "F-1002", "psvStatus": "SANCTIONED", "specialty": "Dermatology" }),
    )
    .await;

    let (status, body) = app.get("/api/executive-summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalApplications"], 3);
    assert_eq!(body["completed"], 1);
    assert_eq!(body["notStarted"], 1);
    assert_eq!(body["needsFurtherReview"], 1);
    assert_eq!(body["topSpecialities"][0]["specialty"], "Cardiology");
    assert_eq!(body["topSpecialities"][0]["count"], 2);
    assert_eq!(body["avgTimeToCredential"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_psv_info_groups_documents() {
    let app = spawn_app().await;
    app.seed_form("F-1100").await;
    let app_id = app.seed_application("F-1100").await;
    app.upload("F-1100", "DEA", "dea.pdf", b"%PDF").await;
    app.upload("F-1100", "sanctions", "sanctions.pdf", b"%PDF").await;
    app.upload("F-1100", "npi", "npi.pdf", b"%PDF").await;

    let (status, body) = app.get(&format!("/api/psv-info/{app_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"]["name"], "Jane");
    assert_eq!(body["stats"]["totalDocuments"], 2);
    assert_eq!(body["providerSubmitted"][0]["type"], "DEA");
    assert_eq!(
        body["psvFetched"][0]["documentLink"],
        "/uploads/sanctions_F-1100.pdf"
    );

    let (status, _) = app.get("/api/psv-info/APP-404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reports_are_persisted() {
    let app = spawn_app().await;
    app.seed_form("F-1200").await;
    let app_id = app.seed_application("F-1200").await;
    app.upload("F-1200", "npi", "npi.pdf", b"%PDF").await;

    let (status, body) = app.get(&format!("/api/applications/report/{app_id}")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["llmEnhanced"], false);
    assert!(body["report"].as_str().unwrap().contains("Provider: Jane"));
    assert_eq!(body["meta"]["session_id"], app_id);

    let (status, body) = app
        .get(&format!("/api/applications/summary-report/{app_id}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["report"].is_string());

    let (_, history) = app
        .get(&format!("/api/applications/report-history/{app_id}"))
        .await;
    let kinds: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&"detailed"));
    assert!(kinds.contains(&"summary"));

    let (status, _) = app.get("/api/applications/report/APP-404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_report_enhancement_appends_model_analysis() {
    let app = spawn_app_with(ScriptedProvider::new(), |config| {
        config.report_llm_enabled = true;
    })
    .await;
    app.seed_form("F-1300").await;
    let app_id = app.seed_application("F-1300").await;

    let (status, body) = app.get(&format!("/api/applications/report/{app_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["llmEnhanced"], true);
    let report = body["report"].as_str().unwrap();
    assert!(report.contains("## AI-Generated Detailed Analysis"));
    assert!(report.contains("All submitted documents were reviewed."));
    assert_eq!(app.provider.stages(), vec!["report_enhancement"]);
}

#[tokio::test]
async fn test_report_survives_enhancement_failure() {
    let app = spawn_app_with(ScriptedProvider::failing(), |config| {
        config.report_llm_enabled = true;
    })
    .await;
    app.seed_form("F-1400").await;
    let app_id = app.seed_application("F-1400").await;

    let (status, body) = app.get(&format!("/api/applications/report/{app_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["llmEnhanced"], false);
    assert!(!body["report"].as_str().unwrap().contains("AI-Generated"));
}
