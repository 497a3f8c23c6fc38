//! WebSocket session transport
//!
//! Owns the per-connection task set:
//! - writer: sole consumer of the outbound channel, preserving frame order
//! - segmenter: audio frames → utterances + onset interrupts
//! - ASR: utterances → transcript frames + reply turns
//! - update forwarder: brain updates → wire frames
//! - playback worker: TTS queue → egress
//!
//! The reader loop itself routes inbound frames: binary PCM to ingest,
//! `input` to the brain, `interrupt` to the cancel token. Unknown frame
//! types are logged and dropped without closing the connection.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use voxchat_brain::{Brain, BrainOptions};
use voxchat_core::{protocol::Outbound, ClientFrame, Language, ServerFrame};
use voxchat_pipeline::{
    AudioEgress, AudioIngest, PlaybackQueue, PlaybackWorker, Segmenter,
};

use crate::state::AppState;

/// Outbound channel depth; writers block (not drop) when the socket stalls
const OUTBOUND_CAPACITY: usize = 256;

pub struct WebSocketHandler;

impl WebSocketHandler {
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
        Path(session_id): Path<String>,
    ) -> impl IntoResponse {
        ws.on_upgrade(move |socket| Self::run(socket, state, session_id))
    }

    async fn run(socket: WebSocket, state: AppState, session_id: String) {
        tracing::info!(session = %session_id, "session connected");
        metrics::counter!("voxchat_sessions_opened").increment(1);

        let settings = state.settings.clone();
        let (mut ws_tx, mut ws_rx) = socket.split();

        // Single outbound channel: every producer goes through here.
        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);

        let writer = tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                let message = match outbound {
                    Outbound::Frame(frame) => Message::Text(frame.to_json()),
                    Outbound::Audio(bytes) => Message::Binary(bytes),
                };
                if ws_tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        // Playback pipeline.
        let egress = AudioEgress::new(out_tx.clone());
        let (playback, playback_rx) = PlaybackQueue::new(64);
        let playback_worker = tokio::spawn(
            PlaybackWorker::new(
                state.tts.clone(),
                egress.clone(),
                settings.audio.sample_rate_out,
                settings.tts.chunk_timeout_s,
            )
            .run(playback_rx),
        );

        // Audio ingestion and segmentation.
        let (mut ingest, frames_rx) = AudioIngest::new(
            settings.audio.sample_rate_in,
            settings.audio.frame_ms,
            settings.audio.max_frames_queue,
        );
        let (utterance_tx, mut utterance_rx) = mpsc::channel(8);
        let (onset_tx, mut onset_rx) = mpsc::channel(8);
        let segmenter = tokio::spawn(
            Segmenter::new(settings.segmenter.clone(), (state.vad_factory)())
                .run(frames_rx, utterance_tx, onset_tx),
        );

        // Brain with the session's tool registry.
        let tools = Arc::new(voxchat_tools::create_default_registry(
            settings.tools.serper_api_key.as_deref(),
        ));
        let brain = Arc::new(Brain::new(
            state.llm.clone(),
            tools,
            BrainOptions::from_settings(&settings),
        ));

        // Brain updates → wire frames.
        let (updates_tx, mut updates_rx) = mpsc::channel(64);
        let forwarder = {
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                while let Some(update) = updates_rx.recv().await {
                    let frame = Outbound::Frame(ServerFrame::from_update(&update));
                    if out_tx.send(frame).await.is_err() {
                        break;
                    }
                }
            })
        };

        let session = Arc::new(crate::session::Session::new(
            session_id.clone(),
            brain,
            playback,
            egress,
            out_tx.clone(),
            updates_tx,
        ));
        state.sessions.insert(session.clone());
        session.mark_ready().await;

        // ASR consumer: transcripts out, reply turns in.
        let (turn_tx, mut turn_rx) = mpsc::channel::<(String, Language)>(4);
        let asr_task = {
            let asr = state.asr.clone();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                while let Some(utterance) = utterance_rx.recv().await {
                    let started = std::time::Instant::now();
                    match asr.transcribe(&utterance).await {
                        Ok(transcript) => {
                            metrics::histogram!("voxchat_asr_seconds")
                                .record(started.elapsed().as_secs_f64());
                            let frame =
                                Outbound::Frame(ServerFrame::transcript(&transcript));
                            if out_tx.send(frame).await.is_err() {
                                break;
                            }
                            if transcript.has_speech()
                                && turn_tx
                                    .send((transcript.text.clone(), transcript.language))
                                    .await
                                    .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "transcription failed");
                            let frame =
                                Outbound::Frame(ServerFrame::transcript_error(e.kind()));
                            if out_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            })
        };

        // Reader loop.
        loop {
            tokio::select! {
                message = ws_rx.next() => {
                    match message {
                        Some(Ok(Message::Binary(bytes))) => {
                            ingest.push_bytes(&bytes);
                        }
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_text(&session, &text).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(session = %session_id, "client closed");
                            break;
                        }
                        Some(Ok(_)) => {} // ping/pong handled by axum
                        Some(Err(e)) => {
                            tracing::warn!(session = %session_id, error = %e, "transport error");
                            break;
                        }
                    }
                }
                Some(()) = onset_rx.recv() => {
                    // Speech onset interrupts a reply in flight; a new turn
                    // starts only when the utterance finalizes.
                    session.interrupt_if_active();
                }
                Some((text, language)) = turn_rx.recv() => {
                    session.start_turn(text, language).await;
                }
            }
        }

        // Teardown: cancel everything, release tasks.
        session.close().await;
        state.sessions.remove(&session_id);
        segmenter.abort();
        asr_task.abort();
        forwarder.abort();
        playback_worker.abort();
        writer.abort();
        metrics::counter!("voxchat_sessions_closed").increment(1);
        tracing::info!(session = %session_id, "session closed");
    }

    async fn handle_text(session: &Arc<crate::session::Session>, text: &str) {
        match ClientFrame::decode(text) {
            Ok(ClientFrame::Input { content }) => {
                if !content.trim().is_empty() {
                    // Typed input carries no reliable language signal; the
                    // brain falls back to the configured default for voice.
                    session.start_turn(content, Language::Unknown).await;
                }
            }
            Ok(ClientFrame::Interrupt) => {
                session.interrupt();
            }
            Ok(ClientFrame::Unknown { frame_type }) => {
                tracing::warn!(frame_type = %frame_type, "unknown frame type dropped");
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame dropped");
            }
        }
    }
}
