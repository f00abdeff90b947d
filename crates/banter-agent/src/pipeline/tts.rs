use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use banter_core::config::MIN_AUDIO_CHUNK_BYTES;
use banter_core::types::TurnId;

use crate::provider::{ProviderError, TtsClient};
use crate::turn::{AudioFrame, TurnEvent};

/// Remove characters in the Unicode pictographic blocks TTS providers
/// mispronounce. Applied to the synthesis input only — the text stream
/// keeps them.
pub fn strip_pictographs(text: &str) -> String {
    text.chars().filter(|c| !is_pictograph(*c)).collect()
}

fn is_pictograph(c: char) -> bool {
    matches!(u32::from(c),
        0x1F600..=0x1F64F   // emoticons
        | 0x1F300..=0x1F5FF // symbols & pictographs
        | 0x1F680..=0x1F6FF // transport & map
        | 0x1F700..=0x1F77F // alchemical
        | 0x1F780..=0x1F7FF // geometric shapes extended
        | 0x1F800..=0x1F8FF // supplemental arrows-c
        | 0x1F900..=0x1F9FF // supplemental symbols
        | 0x1FA00..=0x1FA6F // chess symbols
        | 0x1FA70..=0x1FAFF // symbols and pictographs extended-a
        | 0x2702..=0x27B0   // dingbats
        | 0x1F1E0..=0x1F1FF // flags
    )
}

/// What the worker produced, reported back to the pipeline producer.
#[derive(Debug, Default)]
pub struct TtsWorkerReport {
    /// Content frames emitted (the final empty marker is not counted).
    pub frames_emitted: u64,
    /// Set when the provider failed and audio ended early.
    pub errored: bool,
}

/// Single TTS worker task: dequeues sentences, streams provider audio
/// into a coalescing buffer, and emits ordered [`AudioFrame`]s.
///
/// Frames are held back until the buffer reaches
/// [`MIN_AUDIO_CHUNK_BYTES`]; the residue is flushed when the sentinel
/// arrives, followed by an empty `is_final` marker at `last + 1`.
///
/// A provider error ends the audio modality: the worker emits one
/// `AudioError` event and then drains (discards) the rest of the queue
/// so the producer is never blocked on a full channel.
pub async fn run_tts_worker(
    tts: Arc<dyn TtsClient>,
    voice_id: String,
    turn_id: TurnId,
    mut sentences: mpsc::Receiver<Option<String>>,
    events: mpsc::Sender<TurnEvent>,
    cancel: CancellationToken,
) -> TtsWorkerReport {
    let mut report = TtsWorkerReport::default();
    let mut coalesce: Vec<u8> = Vec::new();
    let mut next_index: u64 = 1;

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => return report,
            item = sentences.recv() => item,
        };

        let sentence = match item {
            // Channel closed without a sentinel — hard stop (cancellation
            // path); no final marker.
            None => return report,
            // Sentinel: graceful end of stream.
            Some(None) => break,
            Some(Some(s)) => s,
        };

        let cleaned = strip_pictographs(&sentence);
        if cleaned.trim().is_empty() {
            continue;
        }

        match synthesize_sentence(
            &tts,
            &voice_id,
            &cleaned,
            &turn_id,
            &mut coalesce,
            &mut next_index,
            &mut report,
            &events,
            &cancel,
        )
        .await
        {
            Ok(()) => {}
            Err(ProviderError::Cancelled) => return report,
            Err(e) => {
                warn!(error = %e, "TTS synthesis failed, ending audio stream");
                report.errored = true;
                let _ = events
                    .send(TurnEvent::AudioError {
                        message: e.to_string(),
                    })
                    .await;
                // Keep draining so the producer never blocks on the queue.
                while let Some(item) = sentences.recv().await {
                    if item.is_none() {
                        break;
                    }
                }
                return report;
            }
        }
    }

    // Flush the residue, then the terminal empty marker at last + 1.
    if !coalesce.is_empty() {
        let frame = AudioFrame {
            turn_id: turn_id.clone(),
            sequence_index: next_index,
            payload: std::mem::take(&mut coalesce),
            is_final: false,
        };
        next_index += 1;
        report.frames_emitted += 1;
        if events.send(TurnEvent::Audio(frame)).await.is_err() {
            return report;
        }
    }
    let _ = events
        .send(TurnEvent::Audio(AudioFrame {
            turn_id,
            sequence_index: next_index,
            payload: Vec::new(),
            is_final: true,
        }))
        .await;
    report
}

/// Stream one sentence through the provider, coalescing bytes into
/// minimum-size frames.
#[allow(clippy::too_many_arguments)]
async fn synthesize_sentence(
    tts: &Arc<dyn TtsClient>,
    voice_id: &str,
    text: &str,
    turn_id: &TurnId,
    coalesce: &mut Vec<u8>,
    next_index: &mut u64,
    report: &mut TtsWorkerReport,
    events: &mpsc::Sender<TurnEvent>,
    cancel: &CancellationToken,
) -> Result<(), ProviderError> {
    debug!(chars = text.len(), "TTS processing sentence");

    let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(16);
    let provider = Arc::clone(tts);
    let provider_voice = voice_id.to_string();
    let provider_text = text.to_string();
    let provider_cancel = cancel.clone();
    let call = tokio::spawn(async move {
        provider
            .stream(&provider_text, &provider_voice, audio_tx, &provider_cancel)
            .await
    });

    while let Some(bytes) = audio_rx.recv().await {
        coalesce.extend_from_slice(&bytes);
        while coalesce.len() >= MIN_AUDIO_CHUNK_BYTES {
            let payload = std::mem::take(coalesce);
            let frame = AudioFrame {
                turn_id: turn_id.clone(),
                sequence_index: *next_index,
                payload,
                is_final: false,
            };
            if !crate::pipeline::send_or_cancel(events, cancel, TurnEvent::Audio(frame)).await {
                return Err(ProviderError::Cancelled);
            }
            *next_index += 1;
            report.frames_emitted += 1;
        }
        tokio::task::yield_now().await;
    }

    match call.await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Unavailable("TTS task panicked".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTts;

    #[test]
    fn strips_emoji_but_keeps_text() {
        assert_eq!(strip_pictographs("hello 😀🚀 world"), "hello  world");
        assert_eq!(strip_pictographs("flags 🇺🇸 gone"), "flags  gone");
        assert_eq!(strip_pictographs("dingbat ✂ gone"), "dingbat  gone");
        assert_eq!(strip_pictographs("plain text"), "plain text");
        assert_eq!(strip_pictographs("日本語はそのまま"), "日本語はそのまま");
    }

    async fn collect_frames(
        chunk_size: usize,
        chunks_per_sentence: usize,
        sentences_in: &[&str],
    ) -> Vec<AudioFrame> {
        let tts = Arc::new(MockTts::new(chunk_size, chunks_per_sentence));
        let (sent_tx, sent_rx) = mpsc::channel(8);
        let (ev_tx, mut ev_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        for s in sentences_in {
            sent_tx.send(Some(s.to_string())).await.unwrap();
        }
        sent_tx.send(None).await.unwrap();

        let report = run_tts_worker(
            tts,
            "voice".to_string(),
            TurnId::new(),
            sent_rx,
            ev_tx,
            cancel,
        )
        .await;
        assert!(!report.errored);

        let mut frames = Vec::new();
        while let Ok(ev) = ev_rx.try_recv() {
            if let TurnEvent::Audio(f) = ev {
                frames.push(f);
            }
        }
        frames
    }

    #[tokio::test]
    async fn frames_respect_min_size_and_ordering() {
        // 600-byte chunks, 4 per sentence → 2400 bytes per sentence.
        let frames = collect_frames(600, 4, &["one.", "two."]).await;
        assert!(!frames.is_empty());

        // Strictly increasing from 1, exactly one final marker, last.
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(f.sequence_index, (i + 1) as u64);
        }
        let finals: Vec<_> = frames.iter().filter(|f| f.is_final).collect();
        assert_eq!(finals.len(), 1);
        assert!(frames.last().unwrap().is_final);
        assert!(frames.last().unwrap().payload.is_empty());

        // Every frame except the flush (second-to-last) and the final
        // marker meets the minimum size.
        for f in &frames[..frames.len().saturating_sub(2)] {
            assert!(f.payload.len() >= MIN_AUDIO_CHUNK_BYTES);
        }
    }

    #[tokio::test]
    async fn sentinel_with_no_audio_emits_bare_final_marker() {
        let frames = collect_frames(512, 0, &[]).await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_final);
        assert_eq!(frames[0].sequence_index, 1);
        assert_eq!(frames[0].payload.len(), 0);
    }

    #[tokio::test]
    async fn emoji_only_sentence_is_skipped() {
        let frames = collect_frames(512, 3, &["😀🚀"]).await;
        // Nothing to synthesize — only the final marker appears.
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_final);
    }
}
