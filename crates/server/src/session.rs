//! Session management
//!
//! One `Session` per WebSocket connection. The session owns the cancel
//! token, the brain, the playback queue handle, and the single outbound
//! frame channel; it enforces that at most one reply turn runs at a time
//! and that an interrupt cancels both reasoning and synthesis.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use voxchat_brain::{Brain, TurnOutcome};
use voxchat_core::{
    protocol::Outbound, BrainUpdate, CancelToken, Language, ServerFrame, Signal,
};
use voxchat_pipeline::{AudioEgress, PlaybackQueue};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Ready,
    Idle,
    Processing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Idle => "idle",
            SessionState::Processing => "processing",
            SessionState::Closed => "closed",
        }
    }
}

/// Per-connection session state
pub struct Session {
    pub id: String,
    brain: Arc<Brain>,
    token: CancelToken,
    playback: PlaybackQueue,
    egress: AudioEgress,
    out_tx: mpsc::Sender<Outbound>,
    updates_tx: mpsc::Sender<BrainUpdate>,
    turn_task: Mutex<Option<JoinHandle<()>>>,
    state: RwLock<SessionState>,
    created_at: Instant,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        brain: Arc<Brain>,
        playback: PlaybackQueue,
        egress: AudioEgress,
        out_tx: mpsc::Sender<Outbound>,
        updates_tx: mpsc::Sender<BrainUpdate>,
    ) -> Self {
        Self {
            id: id.into(),
            brain,
            token: CancelToken::new(),
            playback,
            egress,
            out_tx,
            updates_tx,
            turn_task: Mutex::new(None),
            state: RwLock::new(SessionState::Connecting),
            created_at: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// "Speaking" is the sub-state where egress wrote audio recently.
    pub fn is_speaking(&self) -> bool {
        self.egress.is_busy()
    }

    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn history_len(&self) -> usize {
        self.brain.history_len()
    }

    /// Emit `signal:ready` and become idle.
    pub async fn mark_ready(&self) {
        self.set_state(SessionState::Ready);
        self.send_signal(Signal::Ready).await;
        self.set_state(SessionState::Idle);
    }

    async fn send_signal(&self, signal: Signal) {
        let frame = Outbound::Frame(ServerFrame::signal(signal));
        if self.out_tx.send(frame).await.is_err() {
            tracing::debug!(session = %self.id, "outbound channel closed");
        }
    }

    /// Cancel the current reply (brain and synthesis). Idempotent; keeps
    /// the connection and the history.
    pub fn interrupt(&self) {
        tracing::debug!(session = %self.id, "interrupt");
        self.token.cancel();
    }

    /// Interrupt only while a reply is being produced or spoken.
    ///
    /// Speech onset routes here: a user talking while the assistant is
    /// silent is just a new utterance, not an interruption.
    pub fn interrupt_if_active(&self) {
        if self.state() == SessionState::Processing || self.is_speaking() {
            self.interrupt();
        }
    }

    /// Begin a new reply turn, displacing any turn still in flight.
    pub async fn start_turn(self: &Arc<Self>, text: String, language: Language) {
        // A turn arriving mid-reply is an implicit interrupt.
        self.token.cancel();

        let mut slot = self.turn_task.lock().await;
        if let Some(previous) = slot.take() {
            let abort = previous.abort_handle();
            // The displaced turn unwinds at its next suspension point.
            if tokio::time::timeout(Duration::from_secs(2), previous)
                .await
                .is_err()
            {
                tracing::warn!(session = %self.id, "previous turn did not unwind in time; aborting");
                abort.abort();
            }
        }

        let guard = self.token.arm();
        let session = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            session.run_turn(text, language, guard).await;
        }));
    }

    async fn run_turn(
        self: Arc<Self>,
        text: String,
        language: Language,
        guard: voxchat_core::CancelGuard,
    ) {
        self.set_state(SessionState::Processing);
        self.send_signal(Signal::ProcessingStarted).await;

        let outcome = self
            .brain
            .run_turn(&text, language, guard, self.updates_tx.clone(), &self.playback)
            .await;

        // Wait for the playback worker to hand everything ahead of the
        // marker to egress. Per-chunk timeouts inside the worker bound its
        // progress; after a cancel this resolves as soon as the worker has
        // observed the cancel and discarded the queue.
        if let Ok(ack) = self.playback.flush().await {
            if ack.await.is_err() {
                tracing::warn!(session = %self.id, "playback worker gone before flush ack");
            }
        }

        if outcome == TurnOutcome::Cancelled {
            tracing::debug!(session = %self.id, "turn cancelled");
        }
        self.send_signal(Signal::ProcessingEnded).await;
        self.set_state(SessionState::Idle);
    }

    /// Tear down on transport close.
    pub async fn close(&self) {
        self.token.cancel();
        self.set_state(SessionState::Closed);
        if let Some(task) = self.turn_task.lock().await.take() {
            task.abort();
        }
    }
}

/// Registry of live sessions (readiness and introspection)
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions
            .write()
            .insert(session.id.clone(), session);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        if self.sessions.write().remove(id).is_some() {
            tracing::info!(session = %id, "session removed");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> (Arc<Session>, mpsc::Receiver<Outbound>) {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (updates_tx, _updates_rx) = mpsc::channel(64);
        let (playback, _playback_rx) = PlaybackQueue::new(8);
        let egress = AudioEgress::new(out_tx.clone());

        let llm = test_support::silent_llm();
        let tools = Arc::new(voxchat_tools::ToolRegistry::new());
        let brain = Arc::new(Brain::new(llm, tools, voxchat_brain::BrainOptions::default()));

        let session = Arc::new(Session::new(
            "s-test", brain, playback, egress, out_tx, updates_tx,
        ));
        (session, out_rx)
    }

    mod test_support {
        use async_trait::async_trait;
        use std::sync::Arc;
        use voxchat_core::{EventStream, LanguageModel, LlmEvent, Message, ToolDefinition};

        struct SilentLlm;

        #[async_trait]
        impl LanguageModel for SilentLlm {
            fn stream(&self, _m: Vec<Message>, _t: Vec<ToolDefinition>) -> EventStream {
                Box::pin(futures::stream::iter(vec![Ok(LlmEvent::Done)]))
            }
            async fn is_available(&self) -> bool {
                true
            }
            fn model_name(&self) -> &str {
                "silent"
            }
        }

        pub fn silent_llm() -> Arc<dyn LanguageModel> {
            Arc::new(SilentLlm)
        }
    }

    #[tokio::test]
    async fn test_ready_signal_and_state() {
        let (session, mut out_rx) = make_session();
        assert_eq!(session.state(), SessionState::Connecting);

        session.mark_ready().await;
        assert_eq!(session.state(), SessionState::Idle);

        match out_rx.recv().await.unwrap() {
            Outbound::Frame(frame) => {
                assert_eq!(frame.frame_type, "signal");
                assert_eq!(frame.content, "ready");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_turn_emits_paired_signals() {
        let (session, mut out_rx) = make_session();
        session.mark_ready().await;

        session.start_turn("hello".into(), Language::English).await;
        // Wait for the spawned turn to finish.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut signals = Vec::new();
        while let Ok(out) = out_rx.try_recv() {
            if let Outbound::Frame(f) = out {
                if f.frame_type == "signal" {
                    signals.push(f.content);
                }
            }
        }
        assert_eq!(
            signals,
            vec!["ready", "processing_started", "processing_ended"]
        );
    }

    #[tokio::test]
    async fn test_double_interrupt_is_idempotent() {
        let (session, _out_rx) = make_session();
        session.interrupt();
        session.interrupt();
        // A turn started after the interrupts runs normally.
        session.start_turn("hi".into(), Language::English).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_onset_interrupt_ignored_while_idle() {
        let (session, _out_rx) = make_session();
        session.mark_ready().await;
        // Nothing processing or speaking: the onset is not an interrupt.
        session.interrupt_if_active();
        let fresh = session.token.arm();
        assert!(!fresh.is_cancelled());
    }

    #[test]
    fn test_manager_insert_remove() {
        let manager = SessionManager::new();
        let (session, _rx) = {
            // Build inside a runtime because PlaybackQueue uses tokio types.
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async { make_session() })
        };
        manager.insert(session.clone());
        assert_eq!(manager.count(), 1);
        assert!(manager.get("s-test").is_some());
        manager.remove("s-test");
        assert_eq!(manager.count(), 0);
    }
}
