use std::collections::HashMap;

use axum::{Json, extract::State};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde_json::{Value, json};

use crate::AppState;
use crate::db::applications::{self, ApplicationRow};
use crate::error::AppResult;
use crate::status::{PsvStatus, impact_category};

const TOP_SPECIALTIES: usize = 5;
const TREND_MONTHS: u32 = 6;

const BUCKETS: [&str; 7] = [
    "completed",
    "inProgress",
    "notStarted",
    "needsFurtherReview",
    "denied",
    "approved",
    "commiteeReview",
];

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Up to five most common specialties; ties are broken by name.
fn top_specialties(apps: &[ApplicationRow]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for app in apps {
        let specialty = app
            .specialty
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown");
        *counts.entry(specialty.to_string()).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_SPECIALTIES);
    ranked
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Mean days from creation to a final decision, per calendar month of the
/// decision, for the last six months including the current one.
fn time_to_credential(apps: &[ApplicationRow], now: DateTime<Utc>) -> Vec<Value> {
    let current = month_start(now.date_naive());

    (0..TREND_MONTHS)
        .rev()
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .map(|start| {
            let durations: Vec<f64> = apps
                .iter()
                .filter(|a| PsvStatus::parse(&a.psv_status).is_some_and(|s| s.is_final()))
                .filter(|a| month_start(a.last_updt_dt.date_naive()) == start)
                .map(|a| (a.last_updt_dt - a.create_dt).num_seconds() as f64 / 86_400.0)
                .collect();
            let days = if durations.is_empty() {
                0.0
            } else {
                round1(durations.iter().sum::<f64>() / durations.len() as f64)
            };
            json!({ "month": start.format("%b").to_string(), "days": days })
        })
        .collect()
}

fn notes(total: usize, buckets: &HashMap<&str, usize>, top: &[(String, usize)]) -> Vec<String> {
    let count = |key: &str| buckets.get(key).copied().unwrap_or(0);
    let mut notes = vec![format!("{total} total applications on file")];

    if total > 0 {
        let finished = count("completed") + count("approved");
        notes.push(format!(
            "{}% of applications completed or approved",
            round1(finished as f64 * 100.0 / total as f64)
        ));
    }
    notes.push(format!(
        "{} application(s) waiting on committee review",
        count("commiteeReview")
    ));
    let review = count("needsFurtherReview");
    if review > 0 {
        notes.push(format!("{review} application(s) need further review"));
    }
    if let Some((specialty, n)) = top.first() {
        notes.push(format!("Top specialty: {specialty} ({n})"));
    }
    notes
}

/// Portfolio-level dashboard numbers over all applications.
pub fn summarize(apps: &[ApplicationRow], now: DateTime<Utc>) -> Value {
    let total = apps.len();
    let mut buckets: HashMap<&str, usize> = BUCKETS.iter().map(|b| (*b, 0)).collect();
    let mut impact: HashMap<&str, usize> = HashMap::new();

    for app in apps {
        let status = PsvStatus::parse(&app.psv_status);
        if let Some(status) = status {
            *buckets.entry(status.bucket()).or_default() += 1;
        }
        let weight = status.map_or(1, |s| s.impact_weight());
        *impact.entry(impact_category(weight)).or_default() += 1;
    }

    let top = top_specialties(apps);
    let top_json: Vec<Value> = top
        .iter()
        .map(|(specialty, count)| {
            json!({
                "specialty": specialty,
                "count": count,
                "percent": round1(*count as f64 * 100.0 / total as f64),
            })
        })
        .collect();

    let impact_count = |key: &str| impact.get(key).copied().unwrap_or(0);
    let bucket_count = |key: &str| buckets.get(key).copied().unwrap_or(0);

    json!({
        "totalApplications": total,
        "completed": bucket_count("completed"),
        "inProgress": bucket_count("inProgress"),
        "notStarted": bucket_count("notStarted"),
        "needsFurtherReview": bucket_count("needsFurtherReview"),
        "denied": bucket_count("denied"),
        "approved": bucket_count("approved"),
        "commiteeReview": bucket_count("commiteeReview"),
        "highImpact": impact_count("highImpact"),
        "mediumImpact": impact_count("mediumImpact"),
        "lowImpact": impact_count("lowImpact"),
        "topSpecialities": top_json,
        "avgTimeToCredential": time_to_credential(apps, now),
        "notes": notes(total, &buckets, &top),
    })
}

pub async fn executive_summary(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let apps = applications::list_applications(&state.pool).await?;
    Ok(Json(summarize(&apps, Utc::now())))
}
