//! Application event to CRM lead fields.

use serde::Serialize;

use crate::domains::source::types::{Negotiation, Resume, Salary};
use crate::domains::source::ApplicationEvent;

const DEFAULT_CURRENCY: &str = "UZS";

/// Multi-value contact field (`EMAIL`, `PHONE`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MultiField {
    pub value: String,
    pub value_type: String,
}

impl MultiField {
    fn work(value: String) -> Self {
        Self {
            value,
            value_type: "WORK".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LeadFields {
    pub name: String,
    pub last_name: String,
    pub email: Vec<MultiField>,
    pub phone: Vec<MultiField>,
    pub title: String,
    pub comments: String,
    pub source_id: String,
    pub source_description: String,
    pub assigned_by_id: u32,
}

impl LeadFields {
    pub fn from_event(event: &ApplicationEvent) -> Self {
        let negotiation = event.negotiation();
        let resume = negotiation.resume.clone().unwrap_or_default();

        let mut email = None;
        let mut phone = None;
        for contact in &resume.contact {
            match contact.kind_id() {
                Some("email") => email = contact.text().or(email),
                Some("cell") | Some("phone") => phone = contact.text().or(phone),
                _ => {}
            }
        }

        Self {
            name: resume.first_name.clone().unwrap_or_default(),
            last_name: resume.last_name.clone().unwrap_or_default(),
            email: email.map(MultiField::work).into_iter().collect(),
            phone: phone.map(MultiField::work).into_iter().collect(),
            title: event.vacancy_title.clone(),
            comments: comments(&negotiation, &resume),
            source_id: "OTHER".to_string(),
            source_description: "HeadHunter.uz".to_string(),
            assigned_by_id: 1,
        }
    }

    pub fn first_email(&self) -> Option<String> {
        self.email.first().map(|f| f.value.clone())
    }

    pub fn first_phone(&self) -> Option<String> {
        self.phone.first().map(|f| f.value.clone())
    }

    /// Request body for `crm.lead.add`.
    pub fn to_request_body(&self) -> serde_json::Value {
        serde_json::json!({ "fields": self })
    }
}

fn comments(negotiation: &Negotiation, resume: &Resume) -> String {
    let mut lines = Vec::new();

    if let Some(url) = non_empty(&resume.alternate_url) {
        lines.push(format!("CV: {url}"));
    }
    if let Some(created) = non_empty(&negotiation.created_at) {
        lines.push(format!("Applied at: {created}"));
    }
    if let Some(title) = non_empty(&resume.title) {
        lines.push(format!("Profession: {title}"));
    }
    if let Some(age) = resume.age.filter(|a| *a > 0) {
        lines.push(format!("Age: {age}"));
    }
    if let Some(area) = resume.area.as_ref().and_then(|a| non_empty(&a.name)) {
        lines.push(format!("Location: {area}"));
    }
    if let Some(salary) = resume.salary.as_ref().and_then(salary_line) {
        lines.push(salary);
    }

    lines.join("\n")
}

fn salary_line(salary: &Salary) -> Option<String> {
    let currency = non_empty(&salary.currency).unwrap_or(DEFAULT_CURRENCY);
    let from = salary.from.filter(|v| *v > 0);
    let to = salary.to.filter(|v| *v > 0);
    let range = match (from, to) {
        (Some(from), Some(to)) => format!("{from}-{to}"),
        (Some(from), None) => format!("from {from}"),
        (None, Some(to)) => format!("up to {to}"),
        (None, None) => return None,
    };
    Some(format!("Salary: {range} {currency}"))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(raw: serde_json::Value) -> ApplicationEvent {
        ApplicationEvent {
            id: "n1".into(),
            vacancy_title: "Backend developer".into(),
            raw,
        }
    }

    #[test]
    fn test_full_mapping() {
        let fields = LeadFields::from_event(&event(json!({
            "id": "n1",
            "created_at": "2026-10-01T09:30:00+0500",
            "resume": {
                "first_name": "Aziz",
                "last_name": "Karimov",
                "title": "Rust engineer",
                "age": 29,
                "alternate_url": "https://hh.uz/resume/abc",
                "area": { "name": "Tashkent" },
                "salary": { "from": 1000, "to": 2000, "currency": "USD" },
                "contact": [
                    { "type": { "id": "email" }, "value": "aziz@example.com" },
                    { "type": { "id": "cell" }, "value": { "formatted": "+998 90 000-00-00" } }
                ]
            }
        })));

        assert_eq!(fields.name, "Aziz");
        assert_eq!(fields.last_name, "Karimov");
        assert_eq!(fields.first_email().as_deref(), Some("aziz@example.com"));
        assert_eq!(fields.first_phone().as_deref(), Some("+998 90 000-00-00"));
        assert_eq!(fields.title, "Backend developer");
        assert_eq!(
            fields.comments,
            "CV: https://hh.uz/resume/abc\n\
             Applied at: 2026-10-01T09:30:00+0500\n\
             Profession: Rust engineer\n\
             Age: 29\n\
             Location: Tashkent\n\
             Salary: 1000-2000 USD"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let fields = LeadFields::from_event(&event(json!({
            "resume": {
                "first_name": "Dilnoza",
                "contact": [{ "type": { "id": "phone" }, "value": "+998711234567" }]
            }
        })));

        let body = fields.to_request_body();
        assert_eq!(body["fields"]["NAME"], "Dilnoza");
        assert_eq!(body["fields"]["LAST_NAME"], "");
        assert_eq!(body["fields"]["EMAIL"], json!([]));
        assert_eq!(
            body["fields"]["PHONE"],
            json!([{ "VALUE": "+998711234567", "VALUE_TYPE": "WORK" }])
        );
        assert_eq!(body["fields"]["SOURCE_ID"], "OTHER");
        assert_eq!(body["fields"]["SOURCE_DESCRIPTION"], "HeadHunter.uz");
        assert_eq!(body["fields"]["ASSIGNED_BY_ID"], 1);
    }

    #[test]
    fn test_salary_variants() {
        let only_from = Salary {
            from: Some(500),
            to: None,
            currency: None,
        };
        assert_eq!(salary_line(&only_from).as_deref(), Some("Salary: from 500 UZS"));

        let only_to = Salary {
            from: None,
            to: Some(900),
            currency: Some("RUR".into()),
        };
        assert_eq!(salary_line(&only_to).as_deref(), Some("Salary: up to 900 RUR"));

        assert_eq!(salary_line(&Salary::default()), None);
    }

    #[test]
    fn test_missing_resume_yields_empty_fields() {
        let fields = LeadFields::from_event(&event(json!({ "id": "n1" })));
        assert_eq!(fields.name, "");
        assert!(fields.email.is_empty());
        assert_eq!(fields.comments, "");
        assert_eq!(fields.title, "Backend developer");
    }
}
