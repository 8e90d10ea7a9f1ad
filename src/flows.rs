//! The upload and chat flows.
//!
//! Both flows write into one shared [`AnswerSlot`] from their response
//! handlers. Responses are applied in the order they resolve, so with the
//! default policy a slow earlier request can overwrite a newer answer.
//! There is no cancellation and no retry.

use crate::analysis_api::AnalysisBackend;
use crate::display::AnswerSlot;
use crate::error::{ApiError, FlowError};
use crate::input::{InputController, SelectedFile};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowKind {
    Upload,
    Chat,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Chat => f.write_str("chat"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlowPhase {
    #[default]
    Idle,
    Requesting,
    Succeeded,
    Failed,
}

#[derive(Debug, Default)]
struct TrackerState {
    in_flight: usize,
    last_outcome: FlowPhase,
    last_error: Option<String>,
}

/// Phase of one flow. Concurrent requests of the same flow are counted;
/// the flow reads as `Requesting` while any is outstanding.
#[derive(Clone, Debug, Default)]
pub struct FlowTracker {
    inner: Arc<Mutex<TrackerState>>,
}

impl FlowTracker {
    pub fn phase(&self) -> FlowPhase {
        let state = self.lock();
        if state.in_flight > 0 {
            FlowPhase::Requesting
        } else {
            state.last_outcome
        }
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Error of the most recent request, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub(crate) fn begin(&self) {
        self.lock().in_flight += 1;
    }

    pub(crate) fn finish(&self, error: Option<&ApiError>) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        match error {
            Some(err) => {
                state.last_outcome = FlowPhase::Failed;
                state.last_error = Some(if err.is_connection_refused() {
                    format!("analysis service unreachable: {err}")
                } else {
                    err.to_string()
                });
            }
            None => {
                state.last_outcome = FlowPhase::Succeeded;
                state.last_error = None;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Flows<B: ?Sized> {
    backend: Arc<B>,
    answer: AnswerSlot,
    upload: FlowTracker,
    chat: FlowTracker,
    next_seq: Arc<AtomicU64>,
}

impl<B: ?Sized> Clone for Flows<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            answer: self.answer.clone(),
            upload: self.upload.clone(),
            chat: self.chat.clone(),
            next_seq: Arc::clone(&self.next_seq),
        }
    }
}

impl<B: AnalysisBackend + ?Sized> Flows<B> {
    pub fn new(backend: Arc<B>, answer: AnswerSlot) -> Self {
        Self {
            backend,
            answer,
            upload: FlowTracker::default(),
            chat: FlowTracker::default(),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn answer(&self) -> &AnswerSlot {
        &self.answer
    }

    pub fn tracker(&self, kind: FlowKind) -> &FlowTracker {
        match kind {
            FlowKind::Upload => &self.upload,
            FlowKind::Chat => &self.chat,
        }
    }

    /// Uploads the currently selected file with the current instruction.
    pub async fn submit_upload(&self, input: &InputController) -> Result<String, FlowError> {
        self.upload(input.file().cloned(), input.instruction().to_string())
            .await
    }

    /// Sends the current chat query.
    pub async fn submit_chat(&self, input: &InputController) -> Result<String, FlowError> {
        self.chat(input.chat_query().to_string()).await
    }

    /// Upload from a snapshot taken at trigger time.
    pub async fn upload(
        &self,
        file: Option<SelectedFile>,
        instruction: String,
    ) -> Result<String, FlowError> {
        let Some(file) = file else {
            tracing::error!("No file selected");
            return Err(FlowError::MissingFile);
        };

        let seq = self.begin(FlowKind::Upload);
        tracing::info!(flow = %FlowKind::Upload, seq, file = %file.file_name, "request sent");
        let result = self.backend.upload(&file, &instruction).await;
        self.resolve(FlowKind::Upload, seq, result)
            .map_err(FlowError::UploadRequest)
    }

    /// Chat from a snapshot taken at trigger time. Empty queries are sent.
    pub async fn chat(&self, query: String) -> Result<String, FlowError> {
        let seq = self.begin(FlowKind::Chat);
        tracing::info!(flow = %FlowKind::Chat, seq, "request sent");
        let result = self.backend.chat(&query).await;
        self.resolve(FlowKind::Chat, seq, result)
            .map_err(FlowError::ChatRequest)
    }

    fn begin(&self, kind: FlowKind) -> u64 {
        self.tracker(kind).begin();
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn resolve(
        &self,
        kind: FlowKind,
        seq: u64,
        result: Result<String, ApiError>,
    ) -> Result<String, ApiError> {
        let tracker = self.tracker(kind);
        match result {
            Ok(answer) => {
                tracker.finish(None);
                if self.answer.publish(seq, answer.clone()) {
                    tracing::info!(flow = %kind, seq, "answer displayed");
                } else {
                    tracing::info!(flow = %kind, seq, "stale answer dropped");
                }
                Ok(answer)
            }
            Err(err) => {
                tracker.finish(Some(&err));
                tracing::error!(flow = %kind, seq, "Error in {kind} request: {err}");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnswerPolicy;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use tokio::sync::{mpsc, oneshot};

    struct PendingCall {
        kind: FlowKind,
        query: String,
        file: Option<SelectedFile>,
        reply: oneshot::Sender<Result<String, ApiError>>,
    }

    /// Each call parks until the test answers it through `PendingCall::reply`.
    struct ScriptedBackend {
        calls: mpsc::UnboundedSender<PendingCall>,
    }

    impl ScriptedBackend {
        async fn park(
            &self,
            kind: FlowKind,
            query: &str,
            file: Option<SelectedFile>,
        ) -> Result<String, ApiError> {
            let (reply, rx) = oneshot::channel();
            self.calls
                .send(PendingCall {
                    kind,
                    query: query.to_string(),
                    file,
                    reply,
                })
                .map_err(|_| ApiError::Decode("test receiver dropped".to_string()))?;
            rx.await
                .map_err(|_| ApiError::Decode("reply dropped".to_string()))?
        }
    }

    #[async_trait]
    impl AnalysisBackend for ScriptedBackend {
        async fn upload(&self, file: &SelectedFile, query: &str) -> Result<String, ApiError> {
            self.park(FlowKind::Upload, query, Some(file.clone())).await
        }

        async fn chat(&self, query: &str) -> Result<String, ApiError> {
            self.park(FlowKind::Chat, query, None).await
        }
    }

    fn scripted(
        policy: AnswerPolicy,
    ) -> (Flows<ScriptedBackend>, mpsc::UnboundedReceiver<PendingCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let flows = Flows::new(
            Arc::new(ScriptedBackend { calls: tx }),
            AnswerSlot::new(policy),
        );
        (flows, rx)
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "Failed to chat with AI".to_string(),
        }
    }

    #[tokio::test]
    async fn missing_file_sends_nothing_and_keeps_answer() {
        let (flows, mut calls) = scripted(AnswerPolicy::LastResolved);
        flows.answer().publish(0, "previous".to_string());
        let mut input = InputController::new();
        input.set_instruction("summarize");

        let err = flows.submit_upload(&input).await.unwrap_err();

        assert!(matches!(err, FlowError::MissingFile));
        assert!(calls.try_recv().is_err());
        assert_eq!(flows.answer().current(), "previous");
        assert_eq!(flows.tracker(FlowKind::Upload).phase(), FlowPhase::Idle);
    }

    #[tokio::test]
    async fn upload_passes_file_and_instruction_and_displays_answer() {
        let (flows, mut calls) = scripted(AnswerPolicy::LastResolved);
        flows.answer().publish(0, "old".to_string());
        let mut input = InputController::new();
        input.set_file(Some(SelectedFile::from_path("report.csv")));
        input.set_instruction("summarize");

        let task = tokio::spawn({
            let flows = flows.clone();
            async move { flows.submit_upload(&input).await }
        });
        let call = calls.recv().await.unwrap();
        assert_eq!(call.kind, FlowKind::Upload);
        assert_eq!(call.query, "summarize");
        assert_eq!(call.file.unwrap().file_name, "report.csv");
        assert_eq!(flows.tracker(FlowKind::Upload).phase(), FlowPhase::Requesting);

        call.reply.send(Ok("3 rows found".to_string())).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), "3 rows found");
        assert_eq!(flows.answer().current(), "3 rows found");
        assert_eq!(flows.tracker(FlowKind::Upload).phase(), FlowPhase::Succeeded);
    }

    #[tokio::test]
    async fn failed_chat_leaves_answer_untouched() {
        let (flows, mut calls) = scripted(AnswerPolicy::LastResolved);
        flows.answer().publish(0, "kept".to_string());
        let revision = flows.answer().revision();

        let task = tokio::spawn({
            let flows = flows.clone();
            async move { flows.chat("what is the total?".to_string()).await }
        });
        calls.recv().await.unwrap().reply.send(Err(server_error())).unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, FlowError::ChatRequest(ApiError::Status { .. })));
        assert_eq!(flows.answer().current(), "kept");
        assert_eq!(flows.answer().revision(), revision);
        let tracker = flows.tracker(FlowKind::Chat);
        assert_eq!(tracker.phase(), FlowPhase::Failed);
        assert!(tracker.last_error().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn success_after_failure_clears_last_error() {
        let (flows, mut calls) = scripted(AnswerPolicy::LastResolved);

        for reply in [Err(server_error()), Ok("42".to_string())] {
            let task = tokio::spawn({
                let flows = flows.clone();
                async move { flows.chat("again".to_string()).await }
            });
            calls.recv().await.unwrap().reply.send(reply).unwrap();
            let _ = task.await.unwrap();
        }

        let tracker = flows.tracker(FlowKind::Chat);
        assert_eq!(tracker.phase(), FlowPhase::Succeeded);
        assert!(tracker.last_error().is_none());
    }

    #[tokio::test]
    async fn empty_chat_query_is_sent_as_is() {
        let (flows, mut calls) = scripted(AnswerPolicy::LastResolved);
        let task = tokio::spawn({
            let flows = flows.clone();
            async move { flows.submit_chat(&InputController::new()).await }
        });

        let call = calls.recv().await.unwrap();
        assert_eq!(call.query, "");
        call.reply.send(Ok(String::new())).unwrap();
        task.await.unwrap().unwrap();
        assert!(calls.try_recv().is_err());
    }

    async fn send_two_then_resolve_second_first(
        policy: AnswerPolicy,
    ) -> Flows<ScriptedBackend> {
        let (flows, mut calls) = scripted(policy);
        let mut input = InputController::new();
        input.set_file(Some(SelectedFile::from_path("report.csv")));

        let first = tokio::spawn({
            let flows = flows.clone();
            let input = input.clone();
            async move { flows.submit_upload(&input).await }
        });
        let call_a = calls.recv().await.unwrap();

        let second = tokio::spawn({
            let flows = flows.clone();
            async move { flows.chat("later".to_string()).await }
        });
        let call_b = calls.recv().await.unwrap();
        assert_eq!(flows.tracker(FlowKind::Upload).in_flight(), 1);
        assert_eq!(flows.tracker(FlowKind::Chat).in_flight(), 1);

        call_b.reply.send(Ok("B".to_string())).unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(flows.answer().current(), "B");

        call_a.reply.send(Ok("A".to_string())).unwrap();
        first.await.unwrap().unwrap();
        flows
    }

    #[tokio::test]
    async fn last_resolved_response_wins_even_if_sent_first() {
        let flows = send_two_then_resolve_second_first(AnswerPolicy::LastResolved).await;
        assert_eq!(flows.answer().current(), "A");
    }

    #[tokio::test]
    async fn latest_sent_policy_discards_the_older_response() {
        let flows = send_two_then_resolve_second_first(AnswerPolicy::LatestSent).await;
        assert_eq!(flows.answer().current(), "B");
    }

    #[tokio::test]
    async fn repeated_trigger_issues_concurrent_requests() {
        let (flows, mut calls) = scripted(AnswerPolicy::LastResolved);
        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let flows = flows.clone();
                tokio::spawn(async move { flows.chat("again".to_string()).await })
            })
            .collect();

        let one = calls.recv().await.unwrap();
        let two = calls.recv().await.unwrap();
        assert_eq!(flows.tracker(FlowKind::Chat).in_flight(), 2);

        one.reply.send(Ok("1".to_string())).unwrap();
        two.reply.send(Ok("2".to_string())).unwrap();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(flows.tracker(FlowKind::Chat).phase(), FlowPhase::Succeeded);
    }
}
