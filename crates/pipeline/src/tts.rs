//! HTTP speech synthesis adapter
//!
//! Reference `TextToSpeech` implementation against an OpenAI-compatible
//! `/v1/audio/speech` endpoint with `response_format: "pcm"`: the response
//! body streams raw Int16LE mono PCM which is re-chunked into fixed-length
//! `AudioChunk`s as bytes arrive. Dropping the returned stream aborts the
//! request, which is how cancellation reaches the engine.

use serde_json::json;

use voxchat_core::{AudioChunk, AudioStream, TextToSpeech};

/// Samples per emitted chunk (~100 ms at 24 kHz)
const CHUNK_SAMPLES: usize = 2400;

/// Streaming speech endpoint client
pub struct HttpSpeechTts {
    client: reqwest::Client,
    endpoint: String,
    sample_rate: u32,
}

impl HttpSpeechTts {
    pub fn new(endpoint: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            sample_rate,
        }
    }
}

impl TextToSpeech for HttpSpeechTts {
    fn synthesize(&self, text: &str, voice: &str) -> AudioStream {
        use futures::StreamExt;

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let sample_rate = self.sample_rate;
        let body = json!({
            "input": text,
            "voice": voice,
            "response_format": "pcm",
            "sample_rate": sample_rate,
        });

        Box::pin(async_stream::stream! {
            let response = match client.post(&endpoint).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(voxchat_core::Error::Tts(e.to_string()));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                yield Err(voxchat_core::Error::Tts(format!("{status}: {detail}")));
                return;
            }

            let mut bytes = response.bytes_stream();
            // Byte carry-over: chunks may split a sample or a frame.
            let mut pending: Vec<u8> = Vec::new();

            while let Some(piece) = bytes.next().await {
                let piece = match piece {
                    Ok(p) => p,
                    Err(e) => {
                        yield Err(voxchat_core::Error::Tts(e.to_string()));
                        return;
                    }
                };
                pending.extend_from_slice(&piece);

                while pending.len() >= CHUNK_SAMPLES * 2 {
                    let rest = pending.split_off(CHUNK_SAMPLES * 2);
                    let ready = std::mem::replace(&mut pending, rest);
                    let pcm: Vec<i16> = ready
                        .chunks_exact(2)
                        .map(|b| i16::from_le_bytes([b[0], b[1]]))
                        .collect();
                    yield Ok(AudioChunk::new(pcm, sample_rate));
                }
            }

            // Flush whole samples left at end of stream.
            if pending.len() >= 2 {
                let pcm: Vec<i16> = pending
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect();
                yield Ok(AudioChunk::new(pcm, sample_rate));
            }
        })
    }

    fn engine_name(&self) -> &str {
        "http-speech"
    }
}
