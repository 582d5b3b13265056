//! Landing-page views: unlocking, counting, and summarising.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::records::{CaseRecord, ViewLog};
use super::storage::{StorageError, Table};

/// Location recorded when the visitor's city is unknown.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Device class derived from a user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceType {
    /// Phone
    Mobile,
    /// Tablet
    Tablet,
    /// Anything else with a user agent
    Desktop,
    /// No user agent
    Unknown,
}

/// Classify a user agent.
///
/// ```
/// use qr_stamp::portal::analytics::{device_type, DeviceType};
///
/// assert_eq!(device_type(Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)")), DeviceType::Mobile);
/// assert_eq!(device_type(None), DeviceType::Unknown);
/// ```
pub fn device_type(user_agent: Option<&str>) -> DeviceType {
    let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) else {
        return DeviceType::Unknown;
    };
    let ua = ua.to_lowercase();
    if ["mobile", "android", "iphone"].iter().any(|k| ua.contains(k)) {
        DeviceType::Mobile
    } else if ["tablet", "ipad"].iter().any(|k| ua.contains(k)) {
        DeviceType::Tablet
    } else {
        DeviceType::Desktop
    }
}

/// "City, Region", just the city, or [`UNKNOWN_LOCATION`].
pub fn format_location(city: Option<&str>, region: Option<&str>) -> String {
    match (city.filter(|c| !c.is_empty()), region.filter(|r| !r.is_empty())) {
        (Some(city), Some(region)) => format!("{}, {}", city, region),
        (Some(city), None) => city.to_string(),
        _ => UNKNOWN_LOCATION.to_string(),
    }
}

/// Who opened a landing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visitor {
    /// Public IP, when the lookup succeeded
    pub ip: Option<String>,
    /// City, when known
    pub city: Option<String>,
    /// Region, when known
    pub region: Option<String>,
    /// Browser user agent
    pub user_agent: Option<String>,
}

/// Compare a password typed on the landing page with the case's password.
///
/// Unprotected cases are always unlocked.
pub fn unlock_landing(record: &CaseRecord, input: &str) -> bool {
    match &record.access_password {
        Some(password) => password == input,
        None => true,
    }
}

/// Per-browser-session state of the landing page.
#[derive(Debug, Clone, Default)]
pub struct VisitorSession {
    counted: HashSet<String>,
    unlocked: HashSet<String>,
}

impl VisitorSession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a view of `slug` was already counted.
    pub fn has_counted(&self, slug: &str) -> bool {
        self.counted.contains(slug)
    }

    /// Whether the visitor may see `record`.
    pub fn is_unlocked(&self, record: &CaseRecord) -> bool {
        !record.is_protected() || self.unlocked.contains(&record.slug)
    }

    /// Try `input` as the password for `record`; remembers success.
    pub fn unlock(&mut self, record: &CaseRecord, input: &str) -> bool {
        let ok = unlock_landing(record, input);
        if ok {
            self.unlocked.insert(record.slug.clone());
        }
        ok
    }
}

/// Count a landing-page view.
///
/// Nothing happens while the page is still locked or when this session
/// already counted the case. Otherwise the case's `views` goes up by one,
/// the session remembers the case, a [`ViewLog`] is appended, and the updated
/// record is returned.
///
/// A failed increment writes nothing, so the call can be retried. A failed
/// log insert after a successful increment is logged and does not undo the
/// count.
pub fn record_view(
    cases: &dyn Table<CaseRecord>,
    logs: &dyn Table<ViewLog>,
    record: &CaseRecord,
    visitor: &Visitor,
    session: &mut VisitorSession,
) -> Result<Option<CaseRecord>, StorageError> {
    if !session.is_unlocked(record) || session.has_counted(&record.slug) {
        return Ok(None);
    }

    let updated = cases.update(&record.id, &mut |row: &mut CaseRecord| row.views += 1)?;
    session.counted.insert(record.slug.clone());

    let mut log = ViewLog::new(
        record.slug.clone(),
        format_location(visitor.city.as_deref(), visitor.region.as_deref()),
    );
    log.ip = visitor.ip.clone();
    log.device = visitor.user_agent.clone();
    if let Err(e) = logs.insert(log) {
        log::warn!("View of {} counted but its log was not stored: {}", updated.slug, e);
    }

    log::debug!("Counted view {} of {}", updated.views, updated.slug);
    Ok(Some(updated))
}

/// Views across all cases.
pub fn total_views(records: &[CaseRecord]) -> u64 {
    records.iter().map(|r| r.views).sum()
}

/// The latest `limit` logs for `slug`, newest first.
pub fn recent_logs(
    logs: &dyn Table<ViewLog>,
    slug: &str,
    limit: usize,
) -> Result<Vec<ViewLog>, StorageError> {
    let mut rows = logs.query(&|log: &ViewLog| log.video_slug == slug)?;
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows.truncate(limit);
    Ok(rows)
}

/// Dashboard summary of a case's views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsSummary {
    /// Number of logs
    pub total: usize,
    /// Logs from phones
    pub mobile: usize,
    /// Logs from desktops
    pub desktop: usize,
    /// Up to three most frequent locations with their counts
    pub top_regions: Vec<(String, usize)>,
}

impl AnalyticsSummary {
    /// Summarise `logs`.
    pub fn from_logs(logs: &[ViewLog]) -> Self {
        let mut regions: HashMap<&str, usize> = HashMap::new();
        let (mut mobile, mut desktop) = (0, 0);
        for log in logs {
            match device_type(log.device.as_deref()) {
                DeviceType::Mobile => mobile += 1,
                DeviceType::Desktop => desktop += 1,
                _ => {},
            }
            let location = if log.location.is_empty() {
                UNKNOWN_LOCATION
            } else {
                log.location.as_str()
            };
            *regions.entry(location).or_default() += 1;
        }

        let mut top_regions: Vec<(String, usize)> =
            regions.into_iter().map(|(name, count)| (name.to_string(), count)).collect();
        top_regions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_regions.truncate(3);

        Self {
            total: logs.len(),
            mobile,
            desktop,
            top_regions,
        }
    }
}

/// Cases grouped by client (their title), for the client view.
pub fn group_by_client(records: &[CaseRecord]) -> BTreeMap<String, Vec<CaseRecord>> {
    let mut groups: BTreeMap<String, Vec<CaseRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.client_name().to_string())
            .or_default()
            .push(record.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::storage::InMemoryTable;
    use chrono::{Duration, Utc};

    fn setup(password: Option<&str>) -> (InMemoryTable<CaseRecord>, InMemoryTable<ViewLog>, CaseRecord) {
        let cases = InMemoryTable::new();
        let mut record = CaseRecord::new("AB12CD", "123", "Client");
        record.access_password = password.map(str::to_string);
        let record = cases.insert(record).unwrap();
        (cases, InMemoryTable::new(), record)
    }

    fn visitor() -> Visitor {
        Visitor {
            ip: Some("203.0.113.9".into()),
            city: Some("Recife".into()),
            region: Some("PE".into()),
            user_agent: Some("Mozilla/5.0 (Linux; Android 14) Mobile".into()),
        }
    }

    #[test]
    fn test_device_type() {
        assert_eq!(device_type(Some("Mozilla/5.0 (iPad; CPU OS 17_0)")), DeviceType::Tablet);
        assert_eq!(device_type(Some("Mozilla/5.0 (Windows NT 10.0)")), DeviceType::Desktop);
        assert_eq!(device_type(Some("")), DeviceType::Unknown);
    }

    #[test]
    fn test_format_location() {
        assert_eq!(format_location(Some("Recife"), Some("PE")), "Recife, PE");
        assert_eq!(format_location(Some("Recife"), None), "Recife");
        assert_eq!(format_location(None, Some("PE")), UNKNOWN_LOCATION);
    }

    #[test]
    fn test_view_counted_once_per_session() {
        let (cases, logs, record) = setup(None);
        let mut session = VisitorSession::new();

        let updated = record_view(&cases, &logs, &record, &visitor(), &mut session).unwrap();
        assert_eq!(updated.unwrap().views, 1);
        assert!(record_view(&cases, &logs, &record, &visitor(), &mut session).unwrap().is_none());

        assert_eq!(logs.len(), 1);
        let log = &recent_logs(&logs, "AB12CD", 10).unwrap()[0];
        assert_eq!(log.location, "Recife, PE");
        assert_eq!(log.ip.as_deref(), Some("203.0.113.9"));

        let mut other_session = VisitorSession::new();
        record_view(&cases, &logs, &record, &Visitor::default(), &mut other_session).unwrap();
        assert_eq!(cases.get(&record.id).unwrap().views, 2);
    }

    /// Case table whose updates fail until `healthy` is set.
    struct FlakyCases {
        inner: InMemoryTable<CaseRecord>,
        healthy: std::cell::Cell<bool>,
    }

    impl Table<CaseRecord> for FlakyCases {
        fn query(&self, filter: &dyn Fn(&CaseRecord) -> bool) -> Result<Vec<CaseRecord>, StorageError> {
            self.inner.query(filter)
        }

        fn insert(&self, row: CaseRecord) -> Result<CaseRecord, StorageError> {
            self.inner.insert(row)
        }

        fn update(
            &self,
            key: &str,
            change: &mut dyn FnMut(&mut CaseRecord),
        ) -> Result<CaseRecord, StorageError> {
            if !self.healthy.get() {
                return Err(StorageError::Transport("connection reset".into()));
            }
            self.inner.update(key, change)
        }

        fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key)
        }
    }

    #[test]
    fn test_failed_increment_writes_nothing_and_can_retry() {
        let (inner, logs, record) = setup(None);
        let cases = FlakyCases {
            inner,
            healthy: std::cell::Cell::new(false),
        };
        let mut session = VisitorSession::new();

        assert!(record_view(&cases, &logs, &record, &visitor(), &mut session).is_err());
        assert!(logs.is_empty());
        assert!(!session.has_counted("AB12CD"));

        cases.healthy.set(true);
        let updated = record_view(&cases, &logs, &record, &visitor(), &mut session).unwrap();
        assert_eq!(updated.unwrap().views, 1);
        assert_eq!(logs.len(), 1);
        assert!(session.has_counted("AB12CD"));
    }

    #[test]
    fn test_locked_page_is_not_counted() {
        let (cases, logs, record) = setup(Some("s3cret"));
        let mut session = VisitorSession::new();

        assert!(record_view(&cases, &logs, &record, &visitor(), &mut session).unwrap().is_none());
        assert!(!session.unlock(&record, "wrong"));
        assert!(logs.is_empty());

        assert!(session.unlock(&record, "s3cret"));
        assert!(record_view(&cases, &logs, &record, &visitor(), &mut session).unwrap().is_some());
    }

    #[test]
    fn test_unlock_landing() {
        let (_, _, record) = setup(None);
        assert!(unlock_landing(&record, ""));
        let (_, _, protected) = setup(Some("pw"));
        assert!(!unlock_landing(&protected, "PW"));
        assert!(unlock_landing(&protected, "pw"));
    }

    #[test]
    fn test_recent_logs_order_and_limit() {
        let logs = InMemoryTable::new();
        let now = Utc::now();
        for i in 0..5 {
            let mut log = ViewLog::new("AB12CD", UNKNOWN_LOCATION);
            log.created_at = now + Duration::seconds(i);
            logs.insert(log).unwrap();
        }
        logs.insert(ViewLog::new("OTHER1", UNKNOWN_LOCATION)).unwrap();

        let recent = recent_logs(&logs, "AB12CD", 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].created_at > recent[1].created_at);
        assert_eq!(recent[0].created_at, now + Duration::seconds(4));
    }

    #[test]
    fn test_summary() {
        let mut logs = Vec::new();
        for (location, ua) in [
            ("Recife, PE", Some("Android Mobile")),
            ("Recife, PE", Some("Windows NT")),
            ("Olinda, PE", Some("iPhone")),
            ("", None),
            ("Natal, RN", Some("Macintosh")),
        ] {
            let mut log = ViewLog::new("AB12CD", location);
            log.device = ua.map(str::to_string);
            logs.push(log);
        }

        let summary = AnalyticsSummary::from_logs(&logs);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.mobile, 2);
        assert_eq!(summary.desktop, 2);
        assert_eq!(summary.top_regions.len(), 3);
        assert_eq!(summary.top_regions[0], ("Recife, PE".to_string(), 2));
    }

    #[test]
    fn test_totals_and_groups() {
        let mut a = CaseRecord::new("A", "1", "Client");
        a.views = 3;
        let mut b = CaseRecord::new("B", "2", "Client");
        b.views = 4;
        let c = CaseRecord::new("C", "3", " ");
        let records = vec![a, b, c];

        assert_eq!(total_views(&records), 7);
        let groups = group_by_client(&records);
        assert_eq!(groups["Client"].len(), 2);
        assert_eq!(groups["No client"].len(), 1);
    }
}
