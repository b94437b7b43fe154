//! Learning sessions turn one sample file into one learned template.
//!
//! A session starts in `extracting` while the sample is analysed on a background task, moves to
//! `mapping` so a human can review the suggested field mapping, and is `confirmed` once the
//! mapping is accepted. Finalizing a confirmed session creates the template and ends the session.
//! Sessions never share state; each one is driven by its own id.

mod state;

pub use state::{Event, SessionState, Status, TransitionError, CANCELLED_MESSAGE};

use crate::db::TemplateStore;
use crate::extract::extract;
use crate::model::{
    DetectionPatterns, ExtractionResult, FieldMapping, FileKind, LearnedTemplate, MappingError,
    NewTemplate, SystemField,
};
use crate::pdf::PdfExtractor;
use crate::reader::read_table;
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors returned by the session API.
#[derive(Debug)]
pub enum SessionError {
    UnknownSession(Uuid),
    InvalidState {
        status: Status,
        operation: &'static str,
    },
    /// The mapping was refused. The session is still in `mapping` and can be corrected.
    Mapping(MappingError),
    /// The template could not be stored. The session is still `confirmed`.
    Store(anyhow::Error),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::UnknownSession(id) => write!(f, "There is no learning session {id}"),
            SessionError::InvalidState { status, operation } => {
                write!(f, "Cannot {operation} while the session is {status}")
            }
            SessionError::Mapping(e) => Display::fmt(e, f),
            SessionError::Store(e) => write!(f, "Unable to store the template: {e:#}"),
        }
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SessionError::Mapping(e) => Some(e),
            SessionError::Store(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<TransitionError> for SessionError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::InvalidState { status, operation } => {
                SessionError::InvalidState { status, operation }
            }
            TransitionError::Mapping(e) => SessionError::Mapping(e),
        }
    }
}

/// What a caller sees when it polls a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub status: Status,
    pub source_file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_kind: Option<FileKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_result: Option<ExtractionResult>,
    /// The working mapping while in `mapping`, the accepted one once `confirmed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<FieldMapping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The details a human supplies when a confirmed session becomes a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateDetails {
    pub name: String,
    pub institution: String,
    pub statement_type: String,
    /// Replaces the detected patterns when given.
    pub detection_patterns: Option<DetectionPatterns>,
}

struct Session {
    source_file: PathBuf,
    file_kind: Option<FileKind>,
    state: SessionState,
    status_tx: watch::Sender<Status>,
    task: Option<AbortHandle>,
}

impl Session {
    fn snapshot(&self, id: Uuid) -> SessionSnapshot {
        SessionSnapshot {
            id,
            status: self.state.status(),
            source_file: self.source_file.clone(),
            file_kind: self.file_kind,
            extraction_result: self.state.extraction().cloned(),
            mapping: self.state.mapping().cloned(),
            error: self.state.error().map(str::to_string),
        }
    }

    /// Applies `event`, publishing the new status. On error the state is unchanged.
    fn apply(&mut self, id: Uuid, event: Event) -> Result<(), TransitionError> {
        let before = self.state.status();
        self.state = self.state.transition(event)?;
        let after = self.state.status();
        if before != after {
            info!("Learning session {id}: {before} -> {after}");
            self.status_tx.send_replace(after);
        }
        if after != Status::Extracting {
            self.task = None;
        }
        Ok(())
    }
}

type Sessions = Arc<Mutex<HashMap<Uuid, Session>>>;

/// Drives the learning sessions of one owner.
#[derive(Clone)]
pub struct SessionController {
    owner: String,
    store: Arc<dyn TemplateStore>,
    pdf: Arc<dyn PdfExtractor>,
    sessions: Sessions,
}

impl SessionController {
    pub fn new(
        owner: impl Into<String>,
        store: Arc<dyn TemplateStore>,
        pdf: Arc<dyn PdfExtractor>,
    ) -> Self {
        Self {
            owner: owner.into(),
            store,
            pdf,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts a session for the sample at `path` and begins extraction in the background.
    /// Problems with the file itself are reported through the session, which moves to `failed`.
    pub async fn start_session(&self, path: impl Into<PathBuf>, password: Option<String>) -> Uuid {
        let path = path.into();
        let id = Uuid::new_v4();
        let file_kind = FileKind::from_path(&path);
        let (status_tx, _) = watch::channel(Status::Extracting);
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(id).or_insert(Session {
            source_file: path.clone(),
            file_kind,
            state: SessionState::Extracting,
            status_tx,
            task: None,
        });
        info!("Learning session {id} started for {}", path.display());

        let Some(kind) = file_kind else {
            let message = format!("Unsupported file type '{}'", path.display());
            if let Err(e) = session.apply(id, Event::ExtractionFailed(message)) {
                warn!("Learning session {id}: {e}");
            }
            return id;
        };

        // The task cannot observe the session until this lock is released, so the abort handle is
        // always in place before the task can finish.
        let pdf = self.pdf.clone();
        let task_sessions = self.sessions.clone();
        let handle = tokio::spawn(async move {
            let event = match extract_sample(kind, &path, password.as_deref(), pdf.as_ref()).await {
                Ok(extraction) => Event::Extracted(extraction),
                Err(message) => Event::ExtractionFailed(message),
            };
            let mut sessions = task_sessions.lock().await;
            match sessions.get_mut(&id) {
                Some(session) => {
                    if let Err(e) = session.apply(id, event) {
                        debug!("Learning session {id}: extraction result ignored: {e}");
                    }
                }
                None => debug!("Learning session {id} ended before extraction finished"),
            }
        });
        session.task = Some(handle.abort_handle());
        id
    }

    /// The current state of a session. Cheap and idempotent.
    pub async fn poll_session(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(&id).ok_or(SessionError::UnknownSession(id))?;
        Ok(session.snapshot(id))
    }

    /// Resolves once the session has left `extracting`.
    pub async fn wait_session(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let mut rx = {
            let sessions = self.sessions.lock().await;
            let session = sessions.get(&id).ok_or(SessionError::UnknownSession(id))?;
            session.status_tx.subscribe()
        };
        // A closed channel means the session was removed; polling reports that.
        let _ = rx.wait_for(|status| *status != Status::Extracting).await;
        self.poll_session(id).await
    }

    /// Aborts an in-flight extraction and fails the session with [`CANCELLED_MESSAGE`]. Sessions
    /// that are no longer extracting are left as they are.
    pub async fn cancel_session(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        if let Some(task) = session.task.take() {
            task.abort();
        }
        session.apply(id, Event::Cancelled)?;
        Ok(session.snapshot(id))
    }

    /// Maps `field` to `column` in the working mapping. Any other field using that column loses
    /// it.
    pub async fn assign_field(
        &self,
        id: Uuid,
        field: SystemField,
        column: usize,
    ) -> Result<SessionSnapshot, SessionError> {
        self.update(id, Event::Assign { field, column }).await
    }

    pub async fn unassign_field(
        &self,
        id: Uuid,
        field: SystemField,
    ) -> Result<SessionSnapshot, SessionError> {
        self.update(id, Event::Unassign(field)).await
    }

    /// Accepts `mapping`, or the working mapping when `None`. A mapping without a date, a
    /// description and an amount-bearing field is refused with [`SessionError::Mapping`] and the
    /// session stays in `mapping`.
    pub async fn confirm_mapping(
        &self,
        id: Uuid,
        mapping: Option<FieldMapping>,
    ) -> Result<SessionSnapshot, SessionError> {
        self.update(id, Event::Confirm(mapping)).await
    }

    /// Creates the template of a confirmed session and ends the session. Exactly one template is
    /// created per session: the session leaves the map before the template is stored, so a second
    /// call finds no session. Other sessions are not held up while the store works. If storing
    /// fails the session is put back, still `confirmed`, and finalizing can be retried.
    pub async fn finalize_template(
        &self,
        id: Uuid,
        details: TemplateDetails,
    ) -> Result<LearnedTemplate, SessionError> {
        let (session, new) = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions.get(&id).ok_or(SessionError::UnknownSession(id))?;
            let (SessionState::Confirmed {
                extraction,
                mapping,
            }, Some(file_kind)) = (&session.state, session.file_kind)
            else {
                return Err(SessionError::InvalidState {
                    status: session.state.status(),
                    operation: "finalize the template",
                });
            };
            let new = NewTemplate {
                name: details.name,
                institution: details.institution,
                statement_type: details.statement_type,
                file_kind,
                field_mapping: mapping.clone(),
                detection_patterns: details
                    .detection_patterns
                    .unwrap_or_else(|| extraction.detection_patterns.clone()),
                sample_headers: extraction.headers.clone(),
                sample_rows: extraction.sample_rows.clone(),
            };
            let session = sessions
                .remove(&id)
                .ok_or(SessionError::UnknownSession(id))?;
            (session, new)
        };

        match self.store.create(&self.owner, new).await {
            Ok(template) => {
                info!(
                    "Learning session {id} created template {} '{}'",
                    template.id, template.name
                );
                Ok(template)
            }
            Err(e) => {
                warn!("Learning session {id}: the template was not stored: {e:#}");
                self.sessions.lock().await.insert(id, session);
                Err(SessionError::Store(e))
            }
        }
    }

    /// Discards a session in any state.
    pub async fn abandon_session(&self, id: Uuid) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .remove(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        if let Some(task) = session.task {
            task.abort();
        }
        debug!("Learning session {id} abandoned");
        Ok(())
    }

    async fn update(&self, id: Uuid, event: Event) -> Result<SessionSnapshot, SessionError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        session.apply(id, event)?;
        Ok(session.snapshot(id))
    }
}

/// Analyses a sample. Tables are read and analysed on the blocking pool, PDFs are handed to the
/// collaborator. Errors are returned as the message stored in the failed session.
async fn extract_sample(
    kind: FileKind,
    path: &Path,
    password: Option<&str>,
    pdf: &dyn PdfExtractor,
) -> Result<ExtractionResult, String> {
    match kind {
        FileKind::Pdf => pdf
            .extract_structure(path, password)
            .await
            .map_err(|e| e.to_string())?
            .into_extraction()
            .map_err(|e| e.to_string()),
        FileKind::Spreadsheet | FileKind::DelimitedText => {
            let path = path.to_path_buf();
            let joined = tokio::task::spawn_blocking(move || {
                let table = read_table(&path)?;
                Ok::<_, anyhow::Error>(extract(&table)?)
            })
            .await;
            match joined {
                Ok(Ok(extraction)) => Ok(extraction),
                Ok(Err(e)) => Err(format!("{e:#}")),
                Err(e) => Err(format!("Extraction did not complete: {e}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{PdfExtractionError, PdfStructure, PASSWORD_MESSAGE};
    use crate::test::{TestEnv, TestPdfExtractor};
    use crate::db::Db;
    use crate::model::ValueType;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    const STATEMENT: &str = "HDFC BANK LTD\n,,,,\nDate,Narration,Withdrawal Amt,Deposit Amt,Closing Balance\n\
        12/05/2024,UPI/SWIGGY/123,450.00,,\"10,000.00\"\n\
        13/05/2024,SALARY MAY,,\"50,000.00\",\"60,000.00\"\n";

    async fn controller(env: &TestEnv, pdf: TestPdfExtractor) -> SessionController {
        SessionController::new(
            env.config().owner(),
            Arc::new(env.config().db().clone()),
            Arc::new(pdf),
        )
    }

    fn details(name: &str) -> TemplateDetails {
        TemplateDetails {
            name: name.to_string(),
            institution: "HDFC Bank".to_string(),
            statement_type: "savings".to_string(),
            detection_patterns: None,
        }
    }

    #[tokio::test]
    async fn test_learn_from_csv() {
        let env = TestEnv::new().await;
        let path = env.write_file("hdfc.csv", STATEMENT).await;
        let sessions = controller(&env, TestPdfExtractor::default()).await;

        let id = sessions.start_session(&path, None).await;
        let snapshot = sessions.wait_session(id).await.unwrap();
        assert_eq!(snapshot.status, Status::Mapping, "{snapshot:?}");
        let extraction = snapshot.extraction_result.unwrap();
        assert_eq!(extraction.header_row_index, 2);
        assert_eq!(extraction.row_count, 2);
        assert!(extraction.detection_patterns.text_patterns.contains("hdfc bank"));
        let mapping = snapshot.mapping.unwrap();
        assert!(mapping.contains(SystemField::Withdrawal));
        assert!(mapping.contains(SystemField::Deposit));

        // Finalizing before confirmation is refused.
        let err = sessions.finalize_template(id, details("x")).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                status: Status::Mapping,
                ..
            }
        ));

        let confirmed = sessions.confirm_mapping(id, None).await.unwrap();
        assert_eq!(confirmed.status, Status::Confirmed);

        let template = sessions
            .finalize_template(id, details("HDFC savings"))
            .await
            .unwrap();
        assert_eq!(template.file_kind, FileKind::DelimitedText);
        assert_eq!(template.field_mapping, mapping);
        assert_eq!(template.sample_headers[1], "Narration");
        assert!(template.is_active);

        // The session is gone, so a second finalize cannot create a duplicate.
        assert!(matches!(
            sessions.finalize_template(id, details("again")).await,
            Err(SessionError::UnknownSession(_))
        ));
        let stored = env.config().db().list(env.config().owner()).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_refused_mapping_is_retryable() {
        let env = TestEnv::new().await;
        let path = env.write_file("hdfc.csv", STATEMENT).await;
        let sessions = controller(&env, TestPdfExtractor::default()).await;
        let id = sessions.start_session(&path, None).await;
        sessions.wait_session(id).await.unwrap();

        sessions.unassign_field(id, SystemField::Date).await.unwrap();
        let err = sessions.confirm_mapping(id, None).await.unwrap_err();
        assert!(matches!(err, SessionError::Mapping(_)));
        assert_eq!(
            sessions.poll_session(id).await.unwrap().status,
            Status::Mapping
        );

        let snapshot = sessions.assign_field(id, SystemField::Date, 0).await.unwrap();
        let date = snapshot.mapping.unwrap().get(SystemField::Date).cloned().unwrap();
        assert_eq!(date.format.as_deref(), Some("DD/MM/YYYY"));
        let confirmed = sessions.confirm_mapping(id, None).await.unwrap();
        assert_eq!(confirmed.status, Status::Confirmed);
    }

    #[tokio::test]
    async fn test_input_errors_fail_the_session() {
        let env = TestEnv::new().await;
        let sessions = controller(&env, TestPdfExtractor::default()).await;

        let empty = env.write_file("empty.csv", "").await;
        let id = sessions.start_session(&empty, None).await;
        let snapshot = sessions.wait_session(id).await.unwrap();
        assert_eq!(snapshot.status, Status::Failed);
        assert_eq!(snapshot.error.as_deref(), Some("The file contains no rows"));

        let header_only = env.write_file("header.csv", "Date,Narration,Amount\n").await;
        let id = sessions.start_session(&header_only, None).await;
        let snapshot = sessions.wait_session(id).await.unwrap();
        assert_eq!(
            snapshot.error.as_deref(),
            Some("No data rows were found after the header row")
        );

        let id = sessions.start_session("statement.docx", None).await;
        let snapshot = sessions.poll_session(id).await.unwrap();
        assert_eq!(snapshot.status, Status::Failed);
        assert!(snapshot.error.unwrap().contains("Unsupported file type"));

        // Failed is terminal.
        assert!(sessions.confirm_mapping(id, None).await.is_err());
    }

    #[tokio::test]
    async fn test_pdf_session() {
        let env = TestEnv::new().await;
        let pdf = TestPdfExtractor::with_structure(PdfStructure {
            headers: vec!["Date".into(), "Description".into(), "Amount".into()],
            column_types: vec![ValueType::Date, ValueType::Text, ValueType::Amount],
            sample_rows: vec![vec!["12/05/2024".into(), "AMAZON".into(), "1,299.00".into()]],
            row_count: 14,
            header_row_index: 0,
            text_patterns: vec!["icici bank".into(), "credit card".into()],
        });
        let sessions = controller(&env, pdf).await;
        let id = sessions
            .start_session(env.root().join("card.pdf"), Some("secret".into()))
            .await;
        let snapshot = sessions.wait_session(id).await.unwrap();
        assert_eq!(snapshot.status, Status::Mapping);
        assert_eq!(snapshot.file_kind, Some(FileKind::Pdf));
        sessions.confirm_mapping(id, None).await.unwrap();
        let template = sessions.finalize_template(id, details("card")).await.unwrap();
        assert_eq!(template.file_kind, FileKind::Pdf);
        assert!(template
            .detection_patterns
            .text_patterns
            .contains("credit card"));
    }

    #[tokio::test]
    async fn test_pdf_failure_is_reported() {
        let env = TestEnv::new().await;
        let pdf = TestPdfExtractor::with_error(PdfExtractionError::new("file is encrypted"));
        let sessions = controller(&env, pdf).await;
        let id = sessions.start_session("locked.pdf", None).await;
        let snapshot = sessions.wait_session(id).await.unwrap();
        assert_eq!(snapshot.status, Status::Failed);
        assert_eq!(snapshot.error.as_deref(), Some(PASSWORD_MESSAGE));
    }

    #[tokio::test]
    async fn test_cancel_in_flight_extraction() {
        let env = TestEnv::new().await;
        let pdf = TestPdfExtractor::default().delayed(Duration::from_secs(60));
        let sessions = controller(&env, pdf).await;
        let id = sessions.start_session("slow.pdf", None).await;
        assert_eq!(
            sessions.poll_session(id).await.unwrap().status,
            Status::Extracting
        );

        let snapshot = sessions.cancel_session(id).await.unwrap();
        assert_eq!(snapshot.status, Status::Failed);
        assert_eq!(snapshot.error.as_deref(), Some(CANCELLED_MESSAGE));
        let waited = tokio::time::timeout(Duration::from_secs(5), sessions.wait_session(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(waited.error.as_deref(), Some(CANCELLED_MESSAGE));

        // Cancelling again changes nothing.
        let again = sessions.cancel_session(id).await.unwrap();
        assert_eq!(again, snapshot);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let env = TestEnv::new().await;
        let path = env.write_file("hdfc.csv", STATEMENT).await;
        let sessions = controller(&env, TestPdfExtractor::default()).await;
        let a = sessions.start_session(&path, None).await;
        let b = sessions.start_session(&path, None).await;
        assert_ne!(a, b);
        sessions.wait_session(a).await.unwrap();
        sessions.wait_session(b).await.unwrap();

        sessions.unassign_field(a, SystemField::Narration).await.unwrap();
        let b_snapshot = sessions.poll_session(b).await.unwrap();
        assert!(b_snapshot.mapping.unwrap().contains(SystemField::Narration));

        sessions.abandon_session(a).await.unwrap();
        assert!(matches!(
            sessions.poll_session(a).await,
            Err(SessionError::UnknownSession(_))
        ));
        assert!(sessions.poll_session(b).await.is_ok());
    }

    /// Stores templates only once released, and can be told to fail instead.
    struct HeldStore {
        inner: Db,
        entered: Notify,
        release: Notify,
        fail: AtomicBool,
    }

    impl HeldStore {
        fn new(env: &TestEnv) -> Arc<Self> {
            Arc::new(Self {
                inner: env.config().db().clone(),
                entered: Notify::new(),
                release: Notify::new(),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait::async_trait]
    impl TemplateStore for HeldStore {
        async fn create(
            &self,
            owner: &str,
            template: NewTemplate,
        ) -> anyhow::Result<LearnedTemplate> {
            self.entered.notify_one();
            self.release.notified().await;
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.create(owner, template).await
        }

        async fn get(&self, owner: &str, id: i64) -> anyhow::Result<Option<LearnedTemplate>> {
            self.inner.get(owner, id).await
        }

        async fn list(&self, owner: &str) -> anyhow::Result<Vec<LearnedTemplate>> {
            self.inner.list(owner).await
        }

        async fn list_active(&self, owner: &str) -> anyhow::Result<Vec<LearnedTemplate>> {
            self.inner.list_active(owner).await
        }

        async fn record_usage(&self, owner: &str, id: i64) -> anyhow::Result<()> {
            self.inner.record_usage(owner, id).await
        }

        async fn set_active(&self, owner: &str, id: i64, active: bool) -> anyhow::Result<()> {
            self.inner.set_active(owner, id, active).await
        }

        async fn update_patterns(
            &self,
            owner: &str,
            id: i64,
            patterns: DetectionPatterns,
        ) -> anyhow::Result<()> {
            self.inner.update_patterns(owner, id, patterns).await
        }
    }

    #[tokio::test]
    async fn test_finalize_does_not_block_other_sessions() {
        let env = TestEnv::new().await;
        let path = env.write_file("hdfc.csv", STATEMENT).await;
        let store = HeldStore::new(&env);
        let sessions = SessionController::new(
            env.config().owner(),
            store.clone(),
            Arc::new(TestPdfExtractor::default()),
        );
        let a = sessions.start_session(&path, None).await;
        let b = sessions.start_session(&path, None).await;
        sessions.wait_session(a).await.unwrap();
        sessions.wait_session(b).await.unwrap();
        sessions.confirm_mapping(a, None).await.unwrap();

        let finalizing = tokio::spawn({
            let sessions = sessions.clone();
            async move { sessions.finalize_template(a, details("a")).await }
        });
        store.entered.notified().await;

        let limit = Duration::from_secs(5);
        let b_snapshot = tokio::time::timeout(limit, sessions.poll_session(b))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b_snapshot.status, Status::Mapping);
        tokio::time::timeout(limit, sessions.unassign_field(b, SystemField::Balance))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            sessions.finalize_template(a, details("again")).await,
            Err(SessionError::UnknownSession(_))
        ));

        store.release.notify_one();
        let template = finalizing.await.unwrap().unwrap();
        assert_eq!(template.name, "a");
        let stored = env.config().db().list(env.config().owner()).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_store_keeps_session_confirmed() {
        let env = TestEnv::new().await;
        let path = env.write_file("hdfc.csv", STATEMENT).await;
        let store = HeldStore::new(&env);
        store.fail.store(true, Ordering::SeqCst);
        let sessions = SessionController::new(
            env.config().owner(),
            store.clone(),
            Arc::new(TestPdfExtractor::default()),
        );
        let id = sessions.start_session(&path, None).await;
        sessions.wait_session(id).await.unwrap();
        sessions.confirm_mapping(id, None).await.unwrap();

        store.release.notify_one();
        let err = sessions.finalize_template(id, details("x")).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
        assert!(err.to_string().contains("disk full"));
        let snapshot = sessions.poll_session(id).await.unwrap();
        assert_eq!(snapshot.status, Status::Confirmed);

        store.fail.store(false, Ordering::SeqCst);
        store.release.notify_one();
        let template = sessions.finalize_template(id, details("x")).await.unwrap();
        assert_eq!(template.name, "x");
    }
}
