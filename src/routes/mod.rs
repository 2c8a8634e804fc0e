pub mod applications;
pub mod documents;
pub mod emails;
pub mod executive_summary;
pub mod forms;
pub mod health;
pub mod psv_info;
pub mod uploads;

mod payload;

use crate::AppState;
use crate::db::applications::{self as application_db, ApplicationRow};
use crate::error::AppResult;

/// Outcome of looking up a form by `formId` and/or `appId`.
pub struct ResolvedForm {
    pub application: Option<ApplicationRow>,
    pub form_id: Option<String>,
}

/// An application's form wins over an explicit `formId`. An unknown
/// `appId` leaves `application` empty and falls back to `formId`; callers
/// decide whether that is an error.
pub async fn resolve_form(
    state: &AppState,
    form_id: Option<&str>,
    app_id: Option<&str>,
) -> AppResult<ResolvedForm> {
    let application = match app_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => application_db::get_application(&state.pool, id.trim()).await?,
        None => None,
    };

    let form_id = application
        .as_ref()
        .and_then(|app| app.form_id.clone())
        .or_else(|| form_id.map(str::trim).filter(|id| !id.is_empty()).map(String::from));

    Ok(ResolvedForm {
        application,
        form_id,
    })
}
