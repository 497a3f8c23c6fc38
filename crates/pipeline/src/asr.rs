//! HTTP whisper ASR adapter
//!
//! Reference `SpeechToText` implementation: posts the utterance as a WAV
//! file to a whisper-server inference endpoint and maps the JSON response
//! to a `Transcript`. The engine process owns the model and its threading;
//! this adapter is safe to share across sessions.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use voxchat_core::{Language, SpeechToText, Transcript, TranscriptError, Utterance};

/// Whisper-server client
pub struct HttpWhisperAsr {
    client: reqwest::Client,
    endpoint: String,
    model_size: String,
}

impl HttpWhisperAsr {
    pub fn new(endpoint: impl Into<String>, model_size: impl Into<String>) -> Result<Self, TranscriptError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TranscriptError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model_size: model_size.into(),
        })
    }
}

/// Subset of the whisper-server response this adapter reads
#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Encode mono f32 samples as a 16-bit WAV byte buffer.
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, TranscriptError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| TranscriptError::Inference(e.to_string()))?;
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer
                .write_sample(value)
                .map_err(|e| TranscriptError::Inference(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| TranscriptError::Inference(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

#[async_trait]
impl SpeechToText for HttpWhisperAsr {
    async fn transcribe(&self, utterance: &Utterance) -> Result<Transcript, TranscriptError> {
        if utterance.samples.is_empty() {
            return Err(TranscriptError::TooShort);
        }

        let wav = encode_wav(&utterance.samples, utterance.sample_rate)?;

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscriptError::Inference(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("response_format", "json");

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptError::Inference(format!("{status}: {body}")));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| TranscriptError::Inference(e.to_string()))?;

        let language = parsed
            .language
            .as_deref()
            .map(Language::from_code)
            .unwrap_or(Language::Unknown);

        tracing::debug!(
            engine = %self.engine_name(),
            language = %language,
            chars = parsed.text.len(),
            "transcription complete"
        );

        Ok(Transcript {
            text: parsed.text.trim().to_string(),
            language,
            confidence: parsed.confidence.unwrap_or(1.0).clamp(0.0, 1.0),
            is_final: true,
        })
    }

    fn engine_name(&self) -> &str {
        &self.model_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wav_header() {
        let wav = encode_wav(&[0.0, 0.5, -0.5], 16000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header + 3 samples * 2 bytes.
        assert_eq!(wav.len(), 44 + 6);
    }

    #[test]
    fn test_response_parse_tolerates_missing_fields() {
        let parsed: InferenceResponse = serde_json::from_str(r#"{"text":"现在几点"}"#).unwrap();
        assert_eq!(parsed.text, "现在几点");
        assert!(parsed.language.is_none());

        let parsed: InferenceResponse =
            serde_json::from_str(r#"{"text":"hi","language":"en","confidence":0.93,"extra":1}"#)
                .unwrap();
        assert_eq!(parsed.language.as_deref(), Some("en"));
        assert_eq!(parsed.confidence, Some(0.93));
    }

    #[tokio::test]
    async fn test_empty_utterance_rejected() {
        let asr = HttpWhisperAsr::new("http://127.0.0.1:1/inference", "base").unwrap();
        let utterance = Utterance {
            samples: vec![],
            sample_rate: 16000,
            t_start: 0.0,
            t_end: 0.0,
            pre_roll_ms: 0,
        };
        assert_eq!(
            asr.transcribe(&utterance).await.unwrap_err(),
            TranscriptError::TooShort
        );
    }
}
