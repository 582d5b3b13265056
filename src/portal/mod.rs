//! The publishing portal around the stamper.
//!
//! - [`links`]: slugs, landing URLs, object paths, routing
//! - [`storage`]: object store, table and auth seams with in-memory backends
//! - [`records`]: case and view-log rows, dashboard listing and client edits
//! - [`workflow`]: the upload → position → stamp state machine
//! - [`analytics`]: landing-page unlock and view counting

pub mod analytics;
pub mod links;
pub mod records;
pub mod storage;
pub mod workflow;

pub use analytics::{record_view, unlock_landing, AnalyticsSummary, DeviceType, Visitor, VisitorSession};
pub use links::{display_url, generate_slug, landing_url, resolve_route, Route};
pub use records::{
    delete_case, update_client_info, ActionType, CaseQuery, CaseRecord, CaseStatus, ClientInfo, ViewLog,
};
pub use storage::{
    AuthSession, InMemoryAuth, InMemoryObjectStore, InMemoryTable, ObjectStore, RobustUploader, Row, Session,
    StorageError, Table,
};
pub use workflow::{transition, CaseForm, PublishingSession, UploadFile, WorkflowEvent, WorkflowState};
