//! Incremental decoding of `data:`-framed streaming responses.
//!
//! Network chunks split lines at arbitrary byte offsets, so the decoder
//! buffers the trailing partial line between feeds and only parses lines it
//! has seen in full.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::tui::AppEvent;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct StreamPayload {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// One decoded event from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A content fragment to append to the reply.
    Delta(String),
    /// The server's end-of-stream sentinel.
    Done,
}

/// Line decoder for one streaming response. Feed it raw chunks as they
/// arrive; it yields the events contained in every line completed so far.
///
/// The carry-over buffer holds raw bytes, not text: chunk boundaries fall
/// anywhere, including inside a multibyte character, so only complete lines
/// are ever decoded as UTF-8.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every complete line in `chunk` plus whatever was buffered.
    ///
    /// A malformed payload line is an error, but events decoded from
    /// earlier lines of the same response remain valid; the caller keeps
    /// what it has already applied.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = Self::decode_line(String::from_utf8_lossy(&line).trim())? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decode anything left in the buffer after the connection closes.
    pub fn finish(&mut self) -> Result<Option<SseEvent>> {
        let line = std::mem::take(&mut self.buffer);
        Self::decode_line(String::from_utf8_lossy(&line).trim())
    }

    fn decode_line(line: &str) -> Result<Option<SseEvent>> {
        if line.is_empty() {
            return Ok(None);
        }
        // SSE comment lines carry keep-alives, not data
        if line.starts_with(':') {
            return Ok(None);
        }
        let Some(data) = line.strip_prefix("data: ") else {
            return Err(anyhow!("unexpected stream line: {line}"));
        };
        if data == DONE_SENTINEL {
            return Ok(Some(SseEvent::Done));
        }
        let payload: StreamPayload = serde_json::from_str(data)
            .map_err(|e| anyhow!("malformed stream payload: {e}"))?;
        let delta = payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .unwrap_or_default();
        if delta.is_empty() {
            return Ok(None);
        }
        Ok(Some(SseEvent::Delta(delta)))
    }
}

/// Drive a byte stream to completion, forwarding decoded events to the UI.
///
/// Cancellation is checked before every read and before every decoded event,
/// so a stop request takes effect at the next chunk boundary. Exactly one
/// terminal event is sent: `Done`, `Interrupted`, or `StreamError`.
pub async fn pump<S, E>(
    mut stream: S,
    cancel: CancellationToken,
    tx: tokio::sync::mpsc::UnboundedSender<AppEvent>,
) where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut decoder = SseDecoder::new();

    loop {
        if cancel.is_cancelled() {
            let _ = tx.send(AppEvent::Interrupted);
            return;
        }
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tx.send(AppEvent::Interrupted);
                return;
            }
            chunk = stream.next() => chunk,
        };
        let chunk = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                let _ = tx.send(AppEvent::StreamError(e.to_string()));
                return;
            }
            None => break,
        };
        let events = match decoder.feed(&chunk) {
            Ok(events) => events,
            Err(e) => {
                let _ = tx.send(AppEvent::StreamError(e.to_string()));
                return;
            }
        };
        for event in events {
            if cancel.is_cancelled() {
                let _ = tx.send(AppEvent::Interrupted);
                return;
            }
            match event {
                SseEvent::Delta(delta) => {
                    let _ = tx.send(AppEvent::Delta(delta));
                }
                SseEvent::Done => {
                    let _ = tx.send(AppEvent::Done);
                    return;
                }
            }
        }
    }

    // stream ended without the sentinel; flush the tail and finish anyway
    match decoder.finish() {
        Ok(Some(SseEvent::Delta(delta))) => {
            let _ = tx.send(AppEvent::Delta(delta));
            let _ = tx.send(AppEvent::Done);
        }
        Ok(_) => {
            let _ = tx.send(AppEvent::Done);
        }
        Err(e) => {
            let _ = tx.send(AppEvent::StreamError(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::convert::Infallible;
    use tokio::sync::mpsc;

    fn chunks(parts: &[&str]) -> Vec<std::result::Result<Bytes, Infallible>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    async fn collect_events(
        parts: &[&str],
        cancel: CancellationToken,
    ) -> Vec<AppEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        pump(stream::iter(chunks(parts)), cancel, tx).await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn data_line(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{content}\"}}}}]}}\n"
        )
    }

    #[test]
    fn decoder_yields_deltas_in_order() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}{}data: [DONE]\n", data_line("Hel"), data_line("lo"));
        let events = decoder.feed(input.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hel".to_string()),
                SseEvent::Delta("lo".to_string()),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn decoder_buffers_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let line = data_line("whole");
        let (a, b) = line.split_at(17);
        assert!(decoder.feed(a.as_bytes()).unwrap().is_empty());
        let events = decoder.feed(b.as_bytes()).unwrap();
        assert_eq!(events, vec![SseEvent::Delta("whole".to_string())]);
    }

    #[test]
    fn decoder_keeps_multibyte_character_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let line = data_line("数学");
        let bytes = line.as_bytes();
        // cut one byte into the first 3-byte character
        let split = line.find('数').unwrap() + 1;
        assert!(decoder.feed(&bytes[..split]).unwrap().is_empty());
        let events = decoder.feed(&bytes[split..]).unwrap();
        assert_eq!(events, vec![SseEvent::Delta("数学".to_string())]);
    }

    #[test]
    fn decoder_skips_blank_and_comment_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"\n: keep-alive\n\n").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn line_without_data_prefix_is_an_error() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: noise\n").is_err());
    }

    #[test]
    fn absent_content_field_is_not_a_delta() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .feed(b"data: {\"choices\":[{\"delta\":{}}]}\n")
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn malformed_line_is_an_error_after_valid_prefix() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(data_line("kept").as_bytes()).unwrap();
        assert_eq!(events, vec![SseEvent::Delta("kept".to_string())]);
        assert!(decoder.feed(b"data: {not json\n").is_err());
    }

    #[tokio::test]
    async fn pump_concatenates_deltas_and_finishes() {
        let parts = [
            data_line("Hello"),
            data_line(", "),
            data_line("world"),
            "data: [DONE]\n".to_string(),
        ];
        let refs: Vec<&str> = parts.iter().map(|s| s.as_str()).collect();
        let events = collect_events(&refs, CancellationToken::new()).await;

        let mut reply = String::new();
        for event in &events {
            if let AppEvent::Delta(d) = event {
                reply.push_str(d);
            }
        }
        assert_eq!(reply, "Hello, world");
        assert_eq!(events.last(), Some(&AppEvent::Done));
    }

    #[tokio::test]
    async fn pump_stops_before_first_read_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let line = data_line("never");
        let events = collect_events(&[line.as_str()], cancel).await;
        assert_eq!(events, vec![AppEvent::Interrupted]);
    }

    #[tokio::test]
    async fn pump_reports_malformed_payload_keeping_prior_deltas() {
        let good = data_line("applied");
        let events =
            collect_events(&[good.as_str(), "data: {broken\n"], CancellationToken::new())
                .await;
        assert_eq!(events[0], AppEvent::Delta("applied".to_string()));
        assert!(matches!(events[1], AppEvent::StreamError(_)));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn pump_finishes_when_stream_ends_without_sentinel() {
        let line = data_line("tail");
        let events = collect_events(&[line.as_str()], CancellationToken::new()).await;
        assert_eq!(
            events,
            vec![AppEvent::Delta("tail".to_string()), AppEvent::Done]
        );
    }
}
