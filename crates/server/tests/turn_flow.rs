//! Session turn flow: frame ordering, signal pairing, interruption.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use voxchat_brain::{Brain, BrainOptions};
use voxchat_core::{
    protocol::Outbound, AudioChunk, AudioStream, EventStream, Language, LanguageModel, LlmEvent,
    Message, ServerFrame, TextToSpeech, ToolDefinition, WireFrame,
};
use voxchat_pipeline::{AudioEgress, PlaybackQueue, PlaybackWorker};
use voxchat_server::Session;

/// Replies with a fixed text on every request.
struct FixedLlm {
    reply: String,
}

#[async_trait]
impl LanguageModel for FixedLlm {
    fn stream(&self, _m: Vec<Message>, _t: Vec<ToolDefinition>) -> EventStream {
        let reply = self.reply.clone();
        Box::pin(futures::stream::iter(vec![
            Ok(LlmEvent::TextDelta(reply)),
            Ok(LlmEvent::Done),
        ]))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "fixed"
    }
}

/// Emits `chunks` chunks of 100 ms each with a delay between them.
struct PacedTts {
    chunks: usize,
    delay_ms: u64,
}

impl TextToSpeech for PacedTts {
    fn synthesize(&self, _text: &str, _voice: &str) -> AudioStream {
        let chunks = self.chunks;
        let delay = Duration::from_millis(self.delay_ms);
        Box::pin(async_stream::stream! {
            for _ in 0..chunks {
                tokio::time::sleep(delay).await;
                yield Ok(AudioChunk::new(vec![500i16; 2400], 24000));
            }
        })
    }

    fn engine_name(&self) -> &str {
        "paced"
    }
}

struct Harness {
    session: Arc<Session>,
    out_rx: mpsc::Receiver<Outbound>,
}

fn harness(llm: Arc<dyn LanguageModel>, tts: Arc<dyn TextToSpeech>) -> Harness {
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(1024);

    let egress = AudioEgress::new(out_tx.clone());
    let (playback, playback_rx) = PlaybackQueue::new(64);
    tokio::spawn(PlaybackWorker::new(tts, egress.clone(), 24000, 15).run(playback_rx));

    let tools = Arc::new(voxchat_tools::create_default_registry(None));
    let options = BrainOptions {
        min_chunk_chars: 2,
        ..Default::default()
    };
    let brain = Arc::new(Brain::new(llm, tools, options));

    let (updates_tx, mut updates_rx) = mpsc::channel(64);
    {
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            while let Some(update) = updates_rx.recv().await {
                if out_tx
                    .send(Outbound::Frame(ServerFrame::from_update(&update)))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    let session = Arc::new(Session::new(
        "s-flow", brain, playback, egress, out_tx, updates_tx,
    ));
    Harness { session, out_rx }
}

enum Seen {
    Signal(String),
    Text(WireFrame),
    Audio,
}

async fn collect(out_rx: &mut mpsc::Receiver<Outbound>, quiet_ms: u64) -> Vec<Seen> {
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_millis(quiet_ms), out_rx.recv()).await {
            Ok(Some(Outbound::Frame(frame))) => {
                if frame.frame_type == "signal" {
                    seen.push(Seen::Signal(frame.content.clone()));
                } else {
                    seen.push(Seen::Text(frame));
                }
            }
            Ok(Some(Outbound::Audio(_))) => seen.push(Seen::Audio),
            Ok(None) | Err(_) => break,
        }
    }
    seen
}

#[tokio::test]
async fn typed_hello_produces_ordered_reply() {
    let mut h = harness(
        Arc::new(FixedLlm {
            reply: "Hi!".into(),
        }),
        Arc::new(PacedTts {
            chunks: 2,
            delay_ms: 1,
        }),
    );

    h.session.mark_ready().await;
    h.session.start_turn("hello".into(), Language::English).await;

    let seen = collect(&mut h.out_rx, 300).await;

    let signals: Vec<&str> = seen
        .iter()
        .filter_map(|s| match s {
            Seen::Signal(s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        signals,
        vec!["ready", "processing_started", "processing_ended"]
    );

    // Concatenated text content is the reply, final flag on the last frame.
    let texts: Vec<&WireFrame> = seen
        .iter()
        .filter_map(|s| match s {
            Seen::Text(f) if f.frame_type == "text" => Some(f),
            _ => None,
        })
        .collect();
    let content: String = texts.iter().map(|f| f.content.as_str()).collect();
    assert_eq!(content, "Hi!");
    assert_eq!(texts.last().unwrap().is_final, Some(true));

    // At least one binary frame, and no audio before the first text frame.
    let first_text = seen
        .iter()
        .position(|s| matches!(s, Seen::Text(f) if f.frame_type == "text"))
        .unwrap();
    let first_audio = seen
        .iter()
        .position(|s| matches!(s, Seen::Audio))
        .expect("reply must be spoken");
    assert!(first_text < first_audio);

    // processing_ended is the last thing on the wire.
    assert!(matches!(seen.last(), Some(Seen::Signal(s)) if s == "processing_ended"));
}

#[tokio::test]
async fn interrupt_stops_audio_and_pairs_signals() {
    let mut h = harness(
        Arc::new(FixedLlm {
            reply: "A long reply. It keeps going on and on.".into(),
        }),
        // 60 chunks * 50 ms = 3 s of synthesis if uninterrupted.
        Arc::new(PacedTts {
            chunks: 60,
            delay_ms: 50,
        }),
    );

    h.session.mark_ready().await;
    h.session
        .start_turn("tell me everything".into(), Language::English)
        .await;

    // Let some audio flow, then interrupt twice (idempotent).
    tokio::time::sleep(Duration::from_millis(300)).await;
    h.session.interrupt();
    h.session.interrupt();

    let seen = collect(&mut h.out_rx, 400).await;

    let audio_frames = seen.iter().filter(|s| matches!(s, Seen::Audio)).count();
    assert!(
        audio_frames < 60,
        "interrupt must stop synthesis, saw {audio_frames} frames"
    );

    let signals: Vec<&str> = seen
        .iter()
        .filter_map(|s| match s {
            Seen::Signal(s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    // Every processing_started has exactly one processing_ended.
    assert_eq!(
        signals,
        vec!["ready", "processing_started", "processing_ended"]
    );

    // The session recovers: a new turn runs to completion.
    h.session.start_turn("again".into(), Language::English).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.session.interrupt();
    let seen = collect(&mut h.out_rx, 400).await;
    let signals: Vec<&str> = seen
        .iter()
        .filter_map(|s| match s {
            Seen::Signal(s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(signals, vec!["processing_started", "processing_ended"]);
}

#[tokio::test]
async fn equivalent_inputs_produce_equivalently_shaped_streams() {
    let mut h = harness(
        Arc::new(FixedLlm {
            reply: "Same shape.".into(),
        }),
        Arc::new(PacedTts {
            chunks: 1,
            delay_ms: 1,
        }),
    );

    h.session.mark_ready().await;
    let _ = collect(&mut h.out_rx, 100).await;

    let mut shapes = Vec::new();
    for _ in 0..2 {
        h.session.start_turn("hello".into(), Language::English).await;
        let seen = collect(&mut h.out_rx, 300).await;
        let shape: Vec<&'static str> = seen
            .iter()
            .map(|s| match s {
                Seen::Signal(_) => "signal",
                Seen::Text(_) => "text",
                Seen::Audio => "audio",
            })
            .collect();
        shapes.push(shape);
    }
    assert_eq!(shapes[0], shapes[1]);
}
