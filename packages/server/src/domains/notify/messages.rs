//! HTML message text for the Telegram notifier.

use chrono::{DateTime, Local};

use super::Notice;

const NOT_AVAILABLE: &str = "N/A";

pub fn render(notice: &Notice, now: DateTime<Local>) -> String {
    let stamp = now.format("%Y-%m-%d %H:%M:%S");
    match notice {
        Notice::LeadCreated {
            lead_id,
            name,
            last_name,
            phone,
            email,
            title,
        } => format!(
            "✅ <b>New lead created</b>\n\n\
             🆔 Lead ID: {}\n\
             👤 First name: {}\n\
             👤 Last name: {}\n\
             📞 Phone: {}\n\
             📧 Email: {}\n\
             💼 Position: {}\n\n\
             🕐 Time: {}\n\
             🔗 Source: HeadHunter.uz",
            escape(lead_id),
            escape(or_na(name)),
            escape(or_na(last_name)),
            escape(phone.as_deref().unwrap_or(NOT_AVAILABLE)),
            escape(email.as_deref().unwrap_or(NOT_AVAILABLE)),
            escape(or_na(title)),
            stamp,
        ),
        Notice::Error {
            name,
            last_name,
            reason,
        } => format!(
            "❌ <b>Error</b>\n\n\
             👤 First name: {}\n\
             👤 Last name: {}\n\
             🚫 Reason: {}\n\n\
             🕐 Time: {}",
            escape(name.as_deref().unwrap_or(NOT_AVAILABLE)),
            escape(last_name.as_deref().unwrap_or(NOT_AVAILABLE)),
            escape(reason),
            stamp,
        ),
        Notice::Log(message) => format!(
            "📗 <b>System log</b>\n\n{}\n\n🕐 Time: {}",
            escape(message),
            stamp
        ),
        Notice::Summary(report) => format!(
            "📊 <b>Processing report</b>\n\n\
             📥 Processed: {}\n\
             ✅ Succeeded: {}\n\
             ❌ Failed: {}",
            report.attempted, report.succeeded, report.failed,
        ),
        Notice::Started { interval_minutes } => format!(
            "🚀 <b>HeadHunter-Bitrix24 sync started</b>\n\n\
             ⏰ Check interval: every {} minutes\n\
             📅 Started at: {}",
            interval_minutes, stamp,
        ),
        Notice::Stopped => "🛑 Sync stopped".to_string(),
    }
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        NOT_AVAILABLE
    } else {
        value
    }
}

/// Telegram's HTML mode only needs these three escaped.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::sync::CycleReport;
    use chrono::TimeZone;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_summary_counts() {
        let text = render(
            &Notice::Summary(CycleReport {
                attempted: 2,
                succeeded: 1,
                failed: 1,
            }),
            noon(),
        );
        assert!(text.contains("Processed: 2"));
        assert!(text.contains("Succeeded: 1"));
        assert!(text.contains("Failed: 1"));
    }

    #[test]
    fn test_error_escapes_markup() {
        let text = render(&Notice::error("bad <tag> & more"), noon());
        assert!(text.contains("bad &lt;tag&gt; &amp; more"));
        assert!(text.contains("2026-03-01 12:00:00"));
    }

    #[test]
    fn test_lead_created_fills_missing_contacts() {
        let text = render(
            &Notice::LeadCreated {
                lead_id: "77".into(),
                name: "Aziz".into(),
                last_name: String::new(),
                phone: None,
                email: Some("a@example.com".into()),
                title: "Backend developer".into(),
            },
            noon(),
        );
        assert!(text.contains("Lead ID: 77"));
        assert!(text.contains("Last name: N/A"));
        assert!(text.contains("Phone: N/A"));
        assert!(text.contains("Email: a@example.com"));
    }
}
