use crate::audio::{AudioClip, AudioFormat};
use crate::tts::{SpeechAudio, SpeechSynthesizer, SynthesisError, TtsRequest};
use bytes::BytesMut;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;

const DEFAULT_BASE_URL: &str = "https://translate.google.com/translate_tts";
const MAX_CHUNK_CHARS: usize = 100;
const LOG_TARGET: &str = "tts::google";

/// Speech from the public translate endpoint, the same service gTTS uses.
/// Requests are capped at 100 characters, so long replies are split and the
/// MP3 pieces concatenated (MP3 frames are independently decodable).
#[derive(Clone)]
pub struct GoogleTranslateTts {
    client: Client,
    base_url: String,
}

impl GoogleTranslateTts {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    fn chunk_url(&self, chunk: &str, lang: &str, idx: usize, total: usize) -> String {
        format!(
            "{}?ie=UTF-8&client=tw-ob&q={}&tl={}&total={}&idx={}&textlen={}",
            self.base_url,
            urlencoding::encode(chunk),
            urlencoding::encode(lang),
            total,
            idx,
            chunk.chars().count()
        )
    }
}

impl Default for GoogleTranslateTts {
    fn default() -> Self {
        Self::new()
    }
}

fn is_break(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '.' | ',' | '!' | '?' | ';' | ':' | '。' | '，' | '！' | '？' | '；' | '：' | '、'
        )
}

/// Splits text into pieces of at most `max_chars` characters, preferring to
/// cut after whitespace or punctuation. Text without any break point (long
/// runs of CJK characters, say) is cut hard at the limit.
pub fn split_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut out = Vec::new();
    let mut rest: Vec<char> = text.trim().chars().collect();

    while rest.len() > max_chars {
        let cut = rest[..max_chars]
            .iter()
            .rposition(|&c| is_break(c))
            .map(|i| i + 1)
            .unwrap_or(max_chars);
        let piece: String = rest.drain(..cut).collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            out.push(piece.to_owned());
        }
    }

    let tail: String = rest.into_iter().collect();
    let tail = tail.trim();
    if !tail.is_empty() {
        out.push(tail.to_owned());
    }
    out
}

impl SpeechSynthesizer for GoogleTranslateTts {
    fn synthesize(&self, request: TtsRequest) -> BoxFuture<'_, Result<SpeechAudio, SynthesisError>> {
        let this = self.clone();
        async move {
            let chunks = split_for_tts(&request.text, MAX_CHUNK_CHARS);
            if chunks.is_empty() {
                return Err(SynthesisError::EmptyText);
            }
            tracing::debug!(target: LOG_TARGET, chunks = chunks.len(), lang = %request.lang, "synthesizing");

            let total = chunks.len();
            let mut mp3 = BytesMut::new();
            for (idx, chunk) in chunks.iter().enumerate() {
                let response = this
                    .client
                    .get(this.chunk_url(chunk, request.lang.as_str(), idx, total))
                    .header("Referer", "http://translate.google.com/")
                    .header("User-Agent", "Mozilla/5.0")
                    .send()
                    .await
                    .map_err(|e| SynthesisError::Network(e.to_string()))?;

                let status = response.status();
                if status.as_u16() == 429 {
                    return Err(SynthesisError::QuotaExhausted);
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(SynthesisError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| SynthesisError::Network(e.to_string()))?;
                mp3.extend_from_slice(&bytes);
            }

            if mp3.is_empty() {
                return Err(SynthesisError::Other("tts returned no audio".to_owned()));
            }
            Ok(AudioClip::new(AudioFormat::Mp3, mp3.freeze()))
        }
        .boxed()
    }
}
