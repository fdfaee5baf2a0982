use std::collections::HashSet;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::types::{AccountInfo, ApplicationEvent, Me, PageEnvelope, Posting};
use crate::domains::auth::TokenManager;
use crate::error::SourceError;
use crate::kernel::http::{HttpRequest, HttpResponse};
use crate::kernel::ledger::DedupLedger;
use crate::kernel::transport::ThrottledTransport;

pub type Result<T> = std::result::Result<T, SourceError>;

pub const PAGE_SIZE: u32 = 100;

/// Upper bound on pages read from one listing, in case the API never
/// returns a short page.
const MAX_PAGES: u32 = 100;

/// Read side of the sync: the recruitment platform's REST API.
pub struct SourceGateway {
    transport: Arc<ThrottledTransport>,
    tokens: TokenManager,
    api_base: String,
    page_size: u32,
}

impl SourceGateway {
    pub fn new(transport: Arc<ThrottledTransport>, tokens: TokenManager, api_base: impl Into<String>) -> Self {
        Self {
            transport,
            tokens,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenManager {
        &mut self.tokens
    }

    /// One lightweight authenticated call confirming the token works and
    /// belongs to an employer account.
    pub async fn verify_access(&mut self) -> Result<AccountInfo> {
        let response = self.authorized_get("profile", "/me", Vec::new()).await?;

        match response.status {
            StatusCode::OK => {
                let me: Me = response.json().map_err(|source| SourceError::Decode {
                    what: "profile".into(),
                    source,
                })?;
                let email = me.email.clone().unwrap_or_else(|| "N/A".to_string());
                if !me.is_employer {
                    return Err(SourceError::NotEmployer { email });
                }
                let id = me.account_id().ok_or(SourceError::MissingAccountId)?;
                info!(account_id = %id, %email, "employer account verified");
                Ok(AccountInfo {
                    id,
                    email,
                    is_employer: true,
                })
            }
            StatusCode::FORBIDDEN => {
                let body: Value = response.json().unwrap_or(Value::Null);
                let field = |name: &str| {
                    body.get(name)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                let description = match field("description") {
                    d if d.is_empty() => format!("check the token scope: {}", response.body),
                    d => d,
                };
                Err(SourceError::Forbidden {
                    description,
                    oauth_error: field("oauth_error"),
                })
            }
            StatusCode::NOT_FOUND => Err(SourceError::Status {
                what: "profile endpoint (check HH_API_BASE)".into(),
                status: response.status,
                body: response.body,
            }),
            status => Err(SourceError::Status {
                what: "profile".into(),
                status,
                body: response.body,
            }),
        }
    }

    /// Enumerate negotiations on `account`'s postings that the ledger has
    /// not seen, in posting order then page order.
    ///
    /// Failing to list postings aborts the fetch. A
    /// failure on one posting's negotiations skips that posting, unless it is
    /// an authorization failure.
    pub async fn fetch_new_events(
        &mut self,
        account: &AccountInfo,
        ledger: &DedupLedger,
    ) -> Result<Vec<ApplicationEvent>> {
        let postings = self
            .paginate("postings", "/vacancies", vec![("employer_id", account.id.clone())])
            .await?;
        info!(count = postings.len(), "postings listed");

        let mut events = Vec::new();
        let mut seen = HashSet::new();

        for item in postings {
            let posting: Posting = match serde_json::from_value(item) {
                Ok(posting) => posting,
                Err(e) => {
                    warn!(error = %e, "skipping malformed posting");
                    continue;
                }
            };
            let Some(posting_id) = posting.id.clone() else {
                warn!("skipping posting without id");
                continue;
            };

            let negotiations = match self
                .paginate(
                    "negotiations",
                    "/negotiations",
                    vec![("vacancy_id", posting_id.clone())],
                )
                .await
            {
                Ok(items) => items,
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    warn!(posting_id = %posting_id, error = %e, "skipping posting, negotiations unavailable");
                    continue;
                }
            };

            let mut fresh = 0usize;
            for raw in negotiations {
                let Some(id) = negotiation_id(&raw) else {
                    warn!(posting_id = %posting_id, "skipping negotiation without id");
                    continue;
                };
                if ledger.contains(&id) || !seen.insert(id.clone()) {
                    continue;
                }
                fresh += 1;
                events.push(ApplicationEvent {
                    id,
                    vacancy_title: posting.title().to_string(),
                    raw,
                });
            }
            debug!(posting_id = %posting_id, fresh, "negotiations scanned");
        }

        info!(count = events.len(), "new applications fetched");
        Ok(events)
    }

    /// Read every page of a listing.
    async fn paginate(
        &mut self,
        what: &str,
        path: &str,
        filter: Vec<(&'static str, String)>,
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();

        for page in 0..MAX_PAGES {
            let mut query = filter.clone();
            query.push(("per_page", self.page_size.to_string()));
            query.push(("page", page.to_string()));

            let response = self.authorized_get(what, path, query).await?;
            if !response.is_success() {
                return Err(SourceError::Status {
                    what: what.to_string(),
                    status: response.status,
                    body: response.body,
                });
            }
            let envelope: PageEnvelope = response.json().map_err(|source| SourceError::Decode {
                what: what.to_string(),
                source,
            })?;

            let received = envelope.items.len();
            items.extend(envelope.items);

            let last_by_count = received < self.page_size as usize;
            let last_by_total = envelope.pages.is_some_and(|pages| page + 1 >= pages);
            if last_by_count || last_by_total {
                return Ok(items);
            }
        }

        warn!(what, max_pages = MAX_PAGES, "page limit reached, listing truncated");
        Ok(items)
    }

    /// GET with bearer headers. A 401 triggers one refresh and one retry;
    /// a second 401 is returned as [`SourceError::Unauthorized`].
    async fn authorized_get(
        &mut self,
        what: &str,
        path: &str,
        query: Vec<(&'static str, String)>,
    ) -> Result<HttpResponse> {
        let url = format!("{}{}", self.api_base, path);
        let mut refreshed = false;

        loop {
            let headers = self.tokens.auth_headers().await?;
            let mut request = HttpRequest::get(url.as_str()).with_headers(headers);
            for (key, value) in &query {
                request = request.with_query(*key, value);
            }

            let response = self
                .transport
                .send(request)
                .await
                .ok_or_else(|| SourceError::Unreachable {
                    what: what.to_string(),
                })?;

            if response.status != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }
            if refreshed {
                return Err(SourceError::Unauthorized {
                    what: what.to_string(),
                });
            }
            self.tokens.handle_unauthorized().await?;
            refreshed = true;
        }
    }
}

fn negotiation_id(raw: &Value) -> Option<String> {
    match raw.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
