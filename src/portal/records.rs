//! Case and view-log rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::storage::{Row, StorageError, Table};

/// Area of law a case belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Civil
    Civil,
    /// Criminal
    Criminal,
    /// Labor
    Labor,
    /// Tax
    Tax,
    /// Family
    Family,
    /// Corporate
    Corporate,
}

impl ActionType {
    /// Every action type, in display order.
    pub const ALL: [ActionType; 6] = [
        ActionType::Civil,
        ActionType::Criminal,
        ActionType::Labor,
        ActionType::Tax,
        ActionType::Family,
        ActionType::Corporate,
    ];
}

/// Progress of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// Still being worked on
    #[default]
    InProgress,
    /// Decided
    Concluded,
    /// Closed and archived
    Archived,
}

/// Group name for cases with a blank title.
pub const NO_CLIENT: &str = "No client";

/// Client contact details, kept on every case of that client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Email
    pub email: Option<String>,
    /// Phone
    pub phone: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Notes
    pub notes: Option<String>,
}

impl ClientInfo {
    /// Build from form text; blank fields are stored as absent.
    pub fn from_form(email: &str, phone: &str, address: &str, notes: &str) -> Self {
        let field = |value: &str| (!value.trim().is_empty()).then(|| value.trim().to_string());
        Self {
            email: field(email),
            phone: field(phone),
            address: field(address),
            notes: field(notes),
        }
    }
}

/// One published case: a stamped document plus its explanatory video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Row id
    pub id: String,
    /// Short code in the landing URL
    pub slug: String,
    /// Court case number
    pub case_number: String,
    /// Document title; the client name in practice
    pub title: String,
    /// Public URL of the explanatory video
    pub video_url: String,
    /// Public URL of the stamped document
    pub pdf_url: String,
    /// Password the client must enter on the landing page
    pub access_password: Option<String>,
    /// Area of law
    pub action_type: Option<ActionType>,
    /// Case progress
    pub status: CaseStatus,
    /// Counted landing-page views
    pub views: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Client contact email
    #[serde(default)]
    pub client_email: Option<String>,
    /// Client phone
    #[serde(default)]
    pub client_phone: Option<String>,
    /// Client postal address
    #[serde(default)]
    pub client_address: Option<String>,
    /// Free-form notes about the client
    #[serde(default)]
    pub client_notes: Option<String>,
}

impl CaseRecord {
    /// Create a record with a fresh id, no views, and the current time.
    pub fn new(slug: impl Into<String>, case_number: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            slug: slug.into(),
            case_number: case_number.into(),
            title: title.into(),
            video_url: String::new(),
            pdf_url: String::new(),
            access_password: None,
            action_type: None,
            status: CaseStatus::default(),
            views: 0,
            created_at: Utc::now(),
            client_email: None,
            client_phone: None,
            client_address: None,
            client_notes: None,
        }
    }

    /// Whether the landing page asks for a password.
    pub fn is_protected(&self) -> bool {
        self.access_password.is_some()
    }

    /// Client this case is filed under: the trimmed title, or
    /// [`NO_CLIENT`] when the title is blank.
    pub fn client_name(&self) -> &str {
        match self.title.trim() {
            "" => NO_CLIENT,
            title => title,
        }
    }

    /// Contact details stored on this row.
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            email: self.client_email.clone(),
            phone: self.client_phone.clone(),
            address: self.client_address.clone(),
            notes: self.client_notes.clone(),
        }
    }

    fn matches_search(&self, needle: &str) -> bool {
        self.case_number.to_lowercase().contains(needle) || self.title.to_lowercase().contains(needle)
    }
}

impl Row for CaseRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// One counted landing-page visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewLog {
    /// Row id
    pub id: String,
    /// Slug of the viewed case
    pub video_slug: String,
    /// Visitor IP, when it could be looked up
    pub ip: Option<String>,
    /// "City, Region" or a placeholder
    pub location: String,
    /// Visitor user agent
    pub device: Option<String>,
    /// Visit time
    pub created_at: DateTime<Utc>,
}

impl ViewLog {
    /// Create a log entry for `video_slug` at the current time.
    pub fn new(video_slug: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            video_slug: video_slug.into(),
            ip: None,
            location: location.into(),
            device: None,
            created_at: Utc::now(),
        }
    }
}

impl Row for ViewLog {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Dashboard listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseQuery {
    /// Case-insensitive match on case number or title
    pub search: Option<String>,
    /// 1-based page number
    pub page: usize,
    /// Rows per page
    pub per_page: usize,
}

impl Default for CaseQuery {
    fn default() -> Self {
        Self {
            search: None,
            page: 1,
            per_page: 9,
        }
    }
}

impl CaseQuery {
    /// First page, default size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search text. Blank text means no filter.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = (!search.trim().is_empty()).then(|| search.trim().to_lowercase());
        self
    }

    /// Set the page number.
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page.max(1);
        self
    }
}

/// One page of cases plus the total match count.
#[derive(Debug, Clone, PartialEq)]
pub struct CasePage {
    /// Rows on this page, newest first
    pub items: Vec<CaseRecord>,
    /// Matching rows across all pages
    pub total: usize,
}

impl CasePage {
    /// Number of pages for the query that produced this page.
    pub fn page_count(&self, per_page: usize) -> usize {
        self.total.div_ceil(per_page.max(1))
    }
}

/// List cases for the dashboard, newest first.
pub fn list_cases(
    cases: &dyn Table<CaseRecord>,
    query: &CaseQuery,
) -> std::result::Result<CasePage, StorageError> {
    let mut rows = match &query.search {
        Some(needle) => cases.query(&|row: &CaseRecord| row.matches_search(needle))?,
        None => cases.query(&|_: &CaseRecord| true)?,
    };
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = rows.len();
    let per_page = query.per_page.max(1);
    let items = rows
        .into_iter()
        .skip((query.page.max(1) - 1) * per_page)
        .take(per_page)
        .collect();
    Ok(CasePage { items, total })
}

/// Find the case a landing URL points at.
pub fn find_by_slug(
    cases: &dyn Table<CaseRecord>,
    slug: &str,
) -> std::result::Result<Option<CaseRecord>, StorageError> {
    Ok(cases.query(&|row: &CaseRecord| row.slug == slug)?.into_iter().next())
}

/// Remove a case from the dashboard.
pub fn delete_case(cases: &dyn Table<CaseRecord>, id: &str) -> std::result::Result<(), StorageError> {
    cases.delete(id)?;
    log::info!("Deleted case {}", id);
    Ok(())
}

/// Store `info` on every case filed under `client` and return the updated rows.
///
/// `client` is a group name as produced by [`CaseRecord::client_name`].
pub fn update_client_info(
    cases: &dyn Table<CaseRecord>,
    client: &str,
    info: &ClientInfo,
) -> std::result::Result<Vec<CaseRecord>, StorageError> {
    let rows = cases.query(&|row: &CaseRecord| row.client_name() == client)?;
    let mut updated = Vec::with_capacity(rows.len());
    for row in rows {
        updated.push(cases.update(&row.id, &mut |r: &mut CaseRecord| {
            r.client_email = info.email.clone();
            r.client_phone = info.phone.clone();
            r.client_address = info.address.clone();
            r.client_notes = info.notes.clone();
        })?);
    }
    log::debug!("Updated contact details on {} case(s) of {}", updated.len(), client);
    Ok(updated)
}
