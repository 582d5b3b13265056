//! The publishing flow: upload a video, place the QR marker, stamp, record.
//!
//! The flow is one explicit state machine. [`transition`] is the only place
//! that decides which event is legal in which state; [`PublishingSession`]
//! performs the side effects around each transition.
//!
//! ```text
//! Idle ──submit──▶ Uploading ──uploaded──▶ EditingPosition ──confirm──▶ Stamping ──stamped──▶ Done
//!                  Uploading, Stamping ──fail──▶ Failed
//!                  EditingPosition ──cancel──▶ Idle
//!                  Failed ──retry──▶ EditingPosition
//!                  Done, Failed ──reset──▶ Idle
//! ```

use chrono::Utc;

use super::links::{document_object_path, generate_slug, landing_url, video_object_path};
use super::records::{ActionType, CaseRecord, CaseStatus};
use super::storage::{AuthSession, ObjectStore, Table};
use crate::config::PortalConfig;
use crate::encryption::PasswordPrompt;
use crate::error::{Error, FailureCategory, Result};
use crate::geometry::Point;
use crate::mapper::{
    centered_marker, clamp_marker, marker_from_pointer, CoordinateMapper, MarkerPosition, RenderedPage,
};
use crate::writer::barcode::BarcodeGenerator;
use crate::writer::stamp::{DocumentStamper, StampRequest};

/// Where the publishing flow is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// Waiting for the form
    Idle,
    /// Uploading the video and generating the QR code
    Uploading,
    /// The user is placing the marker on page 1
    EditingPosition,
    /// Stamping and uploading the document
    Stamping,
    /// The case is published
    Done,
    /// A step failed; see [`PublishingSession::failure`]
    Failed,
}

impl WorkflowState {
    /// Name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Uploading => "uploading",
            WorkflowState::EditingPosition => "editing_position",
            WorkflowState::Stamping => "stamping",
            WorkflowState::Done => "done",
            WorkflowState::Failed => "failed",
        }
    }
}

/// Something that moves the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    /// Form submitted
    Submit,
    /// Video uploaded and QR code ready
    Uploaded,
    /// Marker position confirmed
    Confirm,
    /// Document stamped, uploaded and recorded
    Stamped,
    /// The current step failed
    Fail,
    /// Editor closed without confirming
    Cancel,
    /// Go back to the editor after a failed stamp
    Retry,
    /// Start over
    Reset,
}

impl WorkflowEvent {
    /// Name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::Submit => "submit",
            WorkflowEvent::Uploaded => "uploaded",
            WorkflowEvent::Confirm => "confirm",
            WorkflowEvent::Stamped => "stamped",
            WorkflowEvent::Fail => "fail",
            WorkflowEvent::Cancel => "cancel",
            WorkflowEvent::Retry => "retry",
            WorkflowEvent::Reset => "reset",
        }
    }
}

/// The transition function.
pub fn transition(state: WorkflowState, event: WorkflowEvent) -> Result<WorkflowState> {
    use WorkflowEvent as E;
    use WorkflowState as S;

    let next = match (state, event) {
        (S::Idle, E::Submit) => S::Uploading,
        (S::Uploading, E::Uploaded) => S::EditingPosition,
        (S::EditingPosition, E::Confirm) => S::Stamping,
        (S::EditingPosition, E::Cancel) => S::Idle,
        (S::Stamping, E::Stamped) => S::Done,
        (S::Uploading | S::Stamping, E::Fail) => S::Failed,
        (S::Failed, E::Retry) => S::EditingPosition,
        (S::Done | S::Failed, E::Reset) => S::Idle,
        _ => {
            return Err(Error::InvalidTransition {
                state: state.name(),
                event: event.name(),
            })
        },
    };
    log::debug!("Workflow {} --{}--> {}", state.name(), event.name(), next.name());
    Ok(next)
}

/// A file picked in the upload form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Original file name
    pub name: String,
    /// MIME type
    pub content_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Create a file.
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// The case fields of the upload form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseForm {
    /// Court case number (required)
    pub case_number: String,
    /// Client name; the configured default title when blank
    pub title: String,
    /// Landing-page password; none when blank
    pub access_password: String,
    /// Area of law
    pub action_type: Option<ActionType>,
    /// Case progress
    pub status: CaseStatus,
}

impl CaseForm {
    /// Create a form for `case_number`.
    pub fn new(case_number: impl Into<String>) -> Self {
        Self {
            case_number: case_number.into(),
            ..Default::default()
        }
    }
}

/// What a failed step left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Error class, for choosing a message
    pub category: FailureCategory,
    /// Error text
    pub message: String,
}

/// Data carried from a successful upload to confirmation.
#[derive(Debug, Clone)]
pub struct Draft {
    /// Generated slug
    pub slug: String,
    /// Landing URL encoded in the QR code
    pub landing_url: String,
    /// Public URL of the uploaded video
    pub video_url: String,
    /// QR code PNG
    pub qr_png: Vec<u8>,
    /// Page 1 as shown in the editor, once rendered
    pub page: Option<RenderedPage>,
    /// Marker position in render space
    pub marker: Option<MarkerPosition>,
    form: CaseForm,
    pdf: UploadFile,
}

/// Drives one publish from form submission to a stored record.
pub struct PublishingSession<'a> {
    config: PortalConfig,
    store: &'a dyn ObjectStore,
    cases: &'a dyn Table<CaseRecord>,
    auth: &'a dyn AuthSession,
    stamper: DocumentStamper,
    mapper: CoordinateMapper,
    state: WorkflowState,
    draft: Option<Draft>,
    failure: Option<Failure>,
    record: Option<CaseRecord>,
}

impl<'a> PublishingSession<'a> {
    /// Create an idle session over the given backend.
    pub fn new(
        config: PortalConfig,
        store: &'a dyn ObjectStore,
        cases: &'a dyn Table<CaseRecord>,
        auth: &'a dyn AuthSession,
    ) -> Self {
        let stamper = DocumentStamper::new(config.stamp.clone());
        let mapper = CoordinateMapper::from_config(&config.stamp);
        Self {
            config,
            store,
            cases,
            auth,
            stamper,
            mapper,
            state: WorkflowState::Idle,
            draft: None,
            failure: None,
            record: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Upload data, while editing or after a failed stamp.
    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    /// Why the session is in [`WorkflowState::Failed`].
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// The published record, once [`WorkflowState::Done`].
    pub fn record(&self) -> Option<&CaseRecord> {
        self.record.as_ref()
    }

    fn apply(&mut self, event: WorkflowEvent) -> Result<()> {
        self.state = transition(self.state, event)?;
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Error {
        log::warn!("Publishing failed while {}: {}", self.state.name(), err);
        if let Ok(next) = transition(self.state, WorkflowEvent::Fail) {
            self.state = next;
        }
        self.failure = Some(Failure {
            category: err.category(),
            message: err.to_string(),
        });
        err
    }

    /// Validate the form, upload the video, and prepare the QR code.
    ///
    /// Validation problems leave the session idle. Once the upload starts,
    /// any error moves the session to [`WorkflowState::Failed`].
    pub fn begin(&mut self, form: CaseForm, pdf: UploadFile, video: UploadFile) -> Result<&Draft> {
        if self.state != WorkflowState::Idle {
            return Err(Error::InvalidTransition {
                state: self.state.name(),
                event: WorkflowEvent::Submit.name(),
            });
        }
        if self.auth.current().is_none() {
            return Err(Error::Unauthenticated);
        }
        if form.case_number.trim().is_empty() {
            return Err(Error::MissingField("case_number"));
        }
        if pdf.bytes.is_empty() {
            return Err(Error::MissingField("pdf"));
        }
        if video.bytes.is_empty() {
            return Err(Error::MissingField("video"));
        }
        if video.size() > self.config.max_video_bytes {
            return Err(Error::FileTooLarge {
                size: video.size(),
                limit: self.config.max_video_bytes,
            });
        }

        self.apply(WorkflowEvent::Submit)?;
        self.failure = None;

        match self.upload_video(&video) {
            Ok((slug, video_url, qr_png)) => {
                let landing = landing_url(&self.config.origin, &slug);
                log::info!("Video for case {} uploaded, landing URL {}", form.case_number, landing);
                self.draft = Some(Draft {
                    slug,
                    landing_url: landing,
                    video_url,
                    qr_png,
                    page: None,
                    marker: None,
                    form,
                    pdf,
                });
                self.apply(WorkflowEvent::Uploaded)?;
                self.draft.as_ref().ok_or(Error::MissingField("draft"))
            },
            Err(err) => Err(self.fail(err)),
        }
    }

    fn upload_video(&self, video: &UploadFile) -> Result<(String, String, Vec<u8>)> {
        let slug = generate_slug();
        let path = video_object_path(&slug, &video.name, Utc::now().timestamp_millis());
        self.store
            .put(&self.config.video_bucket, &path, &video.bytes, &video.content_type)?;
        let video_url = self.store.public_url(&self.config.video_bucket, &path);

        let qr_png = BarcodeGenerator::generate_portal_qr(
            &landing_url(&self.config.origin, &slug),
            self.config.qr_pixel_size,
        )?;
        Ok((slug, video_url, qr_png))
    }

    fn editing_draft(&mut self, action: &'static str) -> Result<&mut Draft> {
        if self.state != WorkflowState::EditingPosition {
            return Err(Error::InvalidTransition {
                state: self.state.name(),
                event: action,
            });
        }
        self.draft.as_mut().ok_or(Error::MissingField("draft"))
    }

    /// Record how page 1 is displayed. The first call centres the marker;
    /// later calls (a resize) keep it on the page.
    pub fn page_rendered(&mut self, page: RenderedPage) -> Result<MarkerPosition> {
        let size = self.mapper.stamp_size();
        let draft = self.editing_draft("page_rendered")?;
        let marker = match draft.marker {
            Some(marker) => clamp_marker(&page, marker, size),
            None => centered_marker(&page, size),
        };
        draft.page = Some(page);
        draft.marker = Some(marker);
        Ok(marker)
    }

    /// Move the marker so it is centred on `pointer` (render space).
    pub fn move_marker(&mut self, pointer: Point) -> Result<MarkerPosition> {
        let size = self.mapper.stamp_size();
        let draft = self.editing_draft("move_marker")?;
        let page = draft.page.ok_or(Error::MissingField("rendered_page"))?;
        let marker = marker_from_pointer(&page, pointer, size);
        draft.marker = Some(marker);
        Ok(marker)
    }

    /// Close the editor without publishing.
    pub fn cancel(&mut self) -> Result<()> {
        self.apply(WorkflowEvent::Cancel)?;
        self.draft = None;
        log::info!("Publishing cancelled");
        Ok(())
    }

    /// Return to the editor after a failed stamp, keeping the upload.
    pub fn retry(&mut self) -> Result<()> {
        if self.draft.is_none() {
            return Err(Error::InvalidTransition {
                state: self.state.name(),
                event: WorkflowEvent::Retry.name(),
            });
        }
        self.apply(WorkflowEvent::Retry)?;
        self.failure = None;
        Ok(())
    }

    /// Start over after [`WorkflowState::Done`] or [`WorkflowState::Failed`].
    pub fn reset(&mut self) -> Result<()> {
        self.apply(WorkflowEvent::Reset)?;
        self.draft = None;
        self.failure = None;
        self.record = None;
        Ok(())
    }

    /// Stamp the document at the marker, upload it, and store the record.
    pub fn confirm(&mut self, prompt: &mut dyn PasswordPrompt) -> Result<&CaseRecord> {
        let (page, marker) = {
            let draft = self.editing_draft(WorkflowEvent::Confirm.name())?;
            let page = draft.page.ok_or(Error::MissingField("rendered_page"))?;
            let marker = draft.marker.ok_or(Error::MissingField("marker"))?;
            (page, marker)
        };
        self.apply(WorkflowEvent::Confirm)?;

        match self.publish(&page, marker, prompt) {
            Ok(record) => {
                log::info!("Published case {} as {}", record.case_number, record.slug);
                self.record = Some(record);
                self.apply(WorkflowEvent::Stamped)?;
                self.record.as_ref().ok_or(Error::MissingField("record"))
            },
            Err(err) => Err(self.fail(err)),
        }
    }

    fn publish(
        &self,
        page: &RenderedPage,
        marker: MarkerPosition,
        prompt: &mut dyn PasswordPrompt,
    ) -> Result<CaseRecord> {
        let draft = self.draft.as_ref().ok_or(Error::MissingField("draft"))?;
        let coordinate = self.mapper.map(page, marker);
        let request = StampRequest::new(draft.qr_png.clone(), draft.landing_url.clone(), coordinate);
        let stamped = self.stamper.stamp(&draft.pdf.bytes, &request, prompt)?;

        let path = document_object_path(&draft.slug);
        self.store
            .put(&self.config.document_bucket, &path, &stamped, "application/pdf")?;
        let pdf_url = self.store.public_url(&self.config.document_bucket, &path);

        let form = &draft.form;
        let title = match form.title.trim() {
            "" => self.config.default_title.clone(),
            title => title.to_string(),
        };
        let mut record = CaseRecord::new(draft.slug.clone(), form.case_number.trim(), title);
        record.video_url = draft.video_url.clone();
        record.pdf_url = pdf_url;
        record.access_password = Some(form.access_password.clone()).filter(|p| !p.is_empty());
        record.action_type = form.action_type;
        record.status = form.status;

        Ok(self.cases.insert(record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowEvent as E;
    use WorkflowState as S;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = S::Idle;
        for event in [E::Submit, E::Uploaded, E::Confirm, E::Stamped, E::Reset] {
            state = transition(state, event).unwrap();
        }
        assert_eq!(state, S::Idle);
    }

    #[test]
    fn test_failures_and_recovery() {
        assert_eq!(transition(S::Uploading, E::Fail).unwrap(), S::Failed);
        assert_eq!(transition(S::Stamping, E::Fail).unwrap(), S::Failed);
        assert_eq!(transition(S::Failed, E::Retry).unwrap(), S::EditingPosition);
        assert_eq!(transition(S::Failed, E::Reset).unwrap(), S::Idle);
        assert_eq!(transition(S::EditingPosition, E::Cancel).unwrap(), S::Idle);
    }

    #[test]
    fn test_illegal_transitions() {
        let err = transition(S::Idle, E::Confirm).unwrap_err();
        match err {
            Error::InvalidTransition { state, event } => {
                assert_eq!(state, "idle");
                assert_eq!(event, "confirm");
            },
            other => panic!("unexpected {:?}", other),
        }
        assert!(transition(S::Done, E::Submit).is_err());
        assert!(transition(S::Stamping, E::Cancel).is_err());
        assert!(transition(S::Idle, E::Fail).is_err());
    }

    #[test]
    fn test_form_defaults() {
        let form = CaseForm::new("123");
        assert_eq!(form.status, CaseStatus::InProgress);
        assert!(form.title.is_empty());
    }
}
