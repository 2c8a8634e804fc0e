use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use super::builder::ReportData;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn or_unknown(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "Unknown",
    }
}

fn regulations_list<V: std::fmt::Display>(regs: &BTreeMap<String, V>, scored: bool) -> String {
    if regs.is_empty() {
        return "- No items".to_string();
    }
    regs.iter()
        .map(|(k, v)| {
            if scored {
                format!("- {k}: score {v}")
            } else {
                format!("- {k}: {v}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Counts by kind, in first-seen order.
fn count_by_kind<'a>(kinds: impl Iterator<Item = &'a str>, empty: &str) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for kind in kinds {
        match counts.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, n)) => *n += 1,
            None => counts.push((kind, 1)),
        }
    }
    if counts.is_empty() {
        return empty.to_string();
    }
    counts
        .iter()
        .map(|(k, n)| format!("- {k}: {n}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn data_mapping_quality(data: &ReportData) -> String {
    let (matched, total) = data
        .data_points
        .uploads
        .iter()
        .fold((0usize, 0usize), |(m, t), u| {
            (m + u.matches, t + u.matches + u.mismatched_fields.len())
        });
    if total == 0 {
        "Unknown".to_string()
    } else {
        format!("{:.0}% of compared fields matched", matched as f64 * 100.0 / total as f64)
    }
}

fn risk_lines(data: &ReportData) -> String {
    let flagged: Vec<&str> = data
        .data_points
        .uploads
        .iter()
        .filter(|u| !u.mismatched_fields.is_empty())
        .map(|u| u.label.as_str())
        .collect();
    let pending = data.in_progress_count();

    let mut lines = Vec::new();
    if !flagged.is_empty() {
        lines.push(format!(
            "- Field mismatches on {} document(s): {}.",
            flagged.len(),
            flagged.join(", ")
        ));
    }
    if pending > 0 {
        lines.push(format!("- {pending} document(s) still awaiting verification."));
    }
    if lines.is_empty() {
        lines.push("- Not enough structured data to compute detailed risks.".to_string());
    }
    lines.join("\n")
}

fn header(data: &ReportData, generated_at: DateTime<Utc>) -> String {
    let meta = &data.session_metadata;
    let name = if data.provider_info.name.is_empty() {
        "Unknown"
    } else {
        data.provider_info.name.as_str()
    };

    format!(
        "# Comprehensive Credentialing Report\n\n\
         Provider: {name}  \n\
         Session ID: {session}  \n\
         Generated: {generated}  \n\
         Report ID: RPT_{session}  \n\
         Process Steps: {steps}  \n\
         AI Analysis: {llm} interactions  \n\
         Automated Decisions: {decisions}\n\n---\n\n",
        session = meta.session_id,
        generated = generated_at.format(TIMESTAMP_FORMAT),
        steps = meta.total_steps,
        llm = meta.total_llm_interactions,
        decisions = meta.total_decisions,
    )
}

pub fn render_report_markdown(data: &ReportData, generated_at: DateTime<Utc>) -> String {
    let meta = &data.session_metadata;
    let provider = &data.provider_info;
    let result = &data.final_result;
    let status = &result.compliance_status;
    let score = result.score;

    let mut md = header(data, generated_at);
    let display_name = if provider.name.is_empty() {
        "The provider"
    } else {
        provider.name.as_str()
    };

    let _ = write!(
        md,
        "## Executive Summary\n\n\
         {display_name} has completed the credentialing process with a status of **{status}** \
         and an overall score of **{score}/5**. The process involved {steps} steps with {llm} \
         AI-powered analyses.\n\n",
        steps = meta.total_steps,
        llm = meta.total_llm_interactions,
    );

    let _ = write!(
        md,
        "## Provider Assessment\n\n\
         - Name: {name}\n\
         - Specialty: {specialty}\n\
         - Experience: {years} years\n\
         - Education: {education}\n\
         - License Number: {license}\n\n",
        name = or_unknown(Some(provider.name.as_str())),
        specialty = or_unknown(provider.specialty.as_deref()),
        years = provider.experience_years,
        education = or_unknown(provider.education.as_deref()),
        license = or_unknown(provider.license_number.as_deref()),
    );

    let processing_days = (meta.end_time - meta.start_time).num_days();
    let _ = write!(
        md,
        "## Compliance Analysis\n\n\
         - Compliance Status: {status}\n\
         - Overall Score: {score}/5\n\
         - Time In Process: {processing_days} days\n\n\
         ### Hard Regulations Compliance\n{hard}\n\n\
         ### Soft Regulations Scoring\n{soft}\n\n",
        hard = regulations_list(&result.hard_regulations, false),
        soft = regulations_list(&result.soft_regulations, true),
    );

    let _ = write!(
        md,
        "## Process Transparency\n\n\
         ### Credentialing Process Steps\n{steps}\n\n\
         ### Automated Decision Summary\n{decisions}\n\n\
         ### AI Analysis Insights\n\
         - Total LLM Interactions: {llm}\n\
         - Data Mapping Quality: {quality}\n\n",
        steps = count_by_kind(
            data.process_steps.iter().map(|s| s.kind.as_str()),
            "- No steps recorded"
        ),
        decisions = count_by_kind(
            data.decisions.iter().map(|d| d.kind.as_str()),
            "- No decisions recorded"
        ),
        llm = meta.total_llm_interactions,
        quality = data_mapping_quality(data),
    );

    let _ = write!(md, "## Risk Assessment\n\n{}\n\n", risk_lines(data));

    md.push_str(
        "## Recommendations\n\n\
         - Review any pending or in-progress documents.\n\
         - Verify license numbers and NPI against registries.\n\
         - Ensure malpractice insurance documentation is current.\n\n",
    );

    let first_step = if status.eq_ignore_ascii_case("COMPLIANT") {
        "✅ Proceed with onboarding process"
    } else {
        "❌ Address compliance issues before proceeding"
    };
    let _ = write!(
        md,
        "## Next Steps\n\n\
         1. {first_step}\n\
         2. Schedule follow-up review in 6 months\n\
         3. Monitor upcoming license/certification renewals\n"
    );

    md
}

pub fn render_short_summary(data: &ReportData) -> String {
    let provider = &data.provider_info;
    let result = &data.final_result;
    let uploads = &data.data_points.uploads;
    let emails = &data.data_points.emails;

    let approved = data.approved_count();
    let in_progress = data.in_progress_count();
    let total = uploads.len();

    let mut labels: Vec<&str> = uploads
        .iter()
        .map(|u| u.label.as_str())
        .filter(|l| !l.is_empty())
        .collect();
    labels.sort_unstable();
    labels.dedup();

    let sent = emails
        .iter()
        .filter(|e| e.status.eq_ignore_ascii_case("SENT"))
        .count();
    let drafts = emails
        .iter()
        .filter(|e| e.status.eq_ignore_ascii_case("DRAFT"))
        .count();

    let name = if provider.name.is_empty() {
        None
    } else {
        Some(provider.name.as_str())
    };
    let documents = if labels.is_empty() {
        String::new()
    } else {
        format!(" ({})", labels.join(", "))
    };

    let overview = format!(
        "Credentialing overview: {who} is currently {status}. We have {total} document(s) on \
         file{documents} with {approved} approved/verified and {in_progress} in progress. \
         The overall completeness score is {score}/5.",
        who = name.unwrap_or("This provider"),
        status = result.compliance_status,
        score = result.score,
    );
    let communication = format!(
        "Communication: {sent} email(s) sent and {drafts} draft(s) recorded. \
         We will proceed to validate any pending documents and follow up as needed."
    );

    format!(
        "# Credentialing Summary\n\n\
         Provider: {provider_name}\n\n\
         Status: {status} | Score: {score}/5\n\n\
         Docs: {done}/{total} ({approved} approved, {in_progress} in progress)\n\n\
         Last Updated: {updated}\n\n\
         {overview}\n\n{communication}\n",
        provider_name = name.unwrap_or("Unknown"),
        status = result.compliance_status,
        score = result.score,
        done = approved + in_progress,
        updated = data.session_metadata.end_time.format(TIMESTAMP_FORMAT),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::builder::build_report_data;
    use crate::report::builder::fixtures::*;

    #[test]
    fn test_report_sections_present() {
        let data = build_report_data(&application(), &form(), &[], &[]);
        let md = render_report_markdown(&data, Utc::now());

        assert!(md.starts_with("# Comprehensive Credentialing Report\n"));
        assert!(md.contains("Report ID: RPT_APP-001"));
        for heading in [
            "## Executive Summary",
            "## Provider Assessment",
            "## Compliance Analysis",
            "### Hard Regulations Compliance",
            "### Soft Regulations Scoring",
            "## Process Transparency",
            "### AI Analysis Insights",
            "## Risk Assessment",
            "## Recommendations",
            "## Next Steps",
        ] {
            assert!(md.contains(heading), "missing {heading}");
        }
        assert!(md.contains("- No steps recorded"));
        assert!(md.contains("- No decisions recorded"));
        assert!(md.contains("1. ❌ Address compliance issues before proceeding"));
    }

    #[test]
    fn test_compliant_status_proceeds() {
        let mut app = application();
        app.psv_status = "compliant".to_string();
        let data = build_report_data(&app, &form(), &[], &[]);
        let md = render_report_markdown(&data, Utc::now());
        assert!(md.contains("1. ✅ Proceed with onboarding process"));
    }

    #[test]
    fn test_step_counts_by_kind() {
        let uploads = vec![
            upload(1, "dl", "Approved", None),
            upload(2, "npi", "New", None),
        ];
        let data = build_report_data(&application(), &form(), &uploads, &[email("SENT")]);
        let md = render_report_markdown(&data, Utc::now());
        assert!(md.contains("### Credentialing Process Steps\n- Document: 2\n- Communication: 1"));
        assert!(md.contains("- 1 document(s) still awaiting verification."));
    }

    #[test]
    fn test_short_summary() {
        let uploads = vec![
            upload(1, "npi", "Approved", None),
            upload(2, "dl", "In Progress", None),
            upload(3, "cv", "Error", None),
        ];
        let emails = vec![email("SENT"), email("DRAFT"), email("draft")];
        let data = build_report_data(&application(), &form(), &uploads, &emails);
        let md = render_short_summary(&data);

        assert!(md.starts_with("# Credentialing Summary\n\nProvider: Jane Doe\n"));
        assert!(md.contains("Status: IN_PROGRESS | Score: 2/5"));
        assert!(md.contains("Docs: 2/3 (1 approved, 1 in progress)"));
        assert!(md.contains("(Driving License, NPI, cv)"));
        assert!(md.contains("Communication: 1 email(s) sent and 2 draft(s) recorded."));
    }
}
