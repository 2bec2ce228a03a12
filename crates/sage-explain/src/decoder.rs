//! Event Stream Decoding
//!
//! Splits a byte stream of `data: ...` lines into explanation chunks.
//! Only complete, newline-terminated lines are ever parsed.

use futures::{Stream, StreamExt, stream};
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;

use crate::error::{ExplainError, Result};

/// Prefix marking a payload line
pub const DATA_PREFIX: &str = "data: ";

/// Payload that terminates the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Boxed stream of explanation chunks
pub type ExplanationStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// One item of an explanation stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamChunk {
    /// A fragment of explanation text
    Text(String),

    /// Terminal sentinel; nothing follows it
    Done,
}

impl StreamChunk {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Done => DONE_SENTINEL,
        }
    }

    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for StreamChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
struct ContentFrame {
    #[serde(default)]
    content: Option<String>,
}

/// Parse one trimmed line. Lines without the data prefix, frames without
/// content and malformed JSON all produce nothing.
pub fn parse_line(line: &str) -> Option<StreamChunk> {
    let data = line.strip_prefix(DATA_PREFIX)?;
    if data == DONE_SENTINEL {
        return Some(StreamChunk::Done);
    }

    match serde_json::from_str::<ContentFrame>(data) {
        Ok(frame) => frame
            .content
            .filter(|content| !content.is_empty())
            .map(StreamChunk::Text),
        Err(e) => {
            let err = ExplainError::Decode(e.to_string());
            tracing::warn!(error = %err, line = %data, "Skipping malformed stream line");
            None
        }
    }
}

/// Accumulates raw bytes and emits chunks for every complete line
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and drain every complete line, stopping at the sentinel.
    ///
    /// Splitting on `\n` never cuts a multi-byte UTF-8 sequence, so each
    /// extracted line decodes on its own.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.buffer.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            let chunk = parse_line(String::from_utf8_lossy(&self.buffer[start..end]).trim());
            self.scanned = end + 1;
            start = self.scanned;

            if let Some(chunk) = chunk {
                let done = chunk.is_done();
                chunks.push(chunk);
                if done {
                    self.buffer.clear();
                    self.scanned = 0;
                    return chunks;
                }
            }
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        chunks
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

struct ParseState<S> {
    source: Pin<Box<S>>,
    decoder: LineDecoder,
    ready: VecDeque<StreamChunk>,
    finished: bool,
}

/// Turn a stream of byte chunks into a lazy stream of explanation chunks.
///
/// The returned stream suspends only while waiting on `source`. It ends
/// after yielding [`StreamChunk::Done`], after a source error, or when the
/// source runs dry. Dropping it drops `source`.
pub fn parse_event_stream<S, B, E>(source: S) -> ExplanationStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
{
    let state = ParseState {
        source: Box::pin(source),
        decoder: LineDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.ready.pop_front() {
                if chunk.is_done() {
                    state.finished = true;
                    state.ready.clear();
                }
                return Some((Ok(chunk), state));
            }

            if state.finished {
                return None;
            }

            match state.source.next().await {
                Some(Ok(bytes)) => {
                    let chunks = state.decoder.push(bytes.as_ref());
                    state.ready.extend(chunks);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(ExplainError::Transport(e.to_string())), state));
                }
                None => {
                    if state.decoder.pending() > 0 {
                        tracing::debug!(
                            bytes = state.decoder.pending(),
                            "Discarding unterminated trailing line"
                        );
                    }
                    return None;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    type Chunk = std::result::Result<Vec<u8>, String>;

    fn source(parts: &[&str]) -> impl Stream<Item = Chunk> + Send + 'static {
        let parts: Vec<Chunk> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(parts)
    }

    async fn collect(parts: &[&str]) -> Vec<StreamChunk> {
        parse_event_stream(source(parts))
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line(r#"data: {"content":"x"}"#),
            Some(StreamChunk::Text("x".into()))
        );
        assert_eq!(parse_line("data: [DONE]"), Some(StreamChunk::Done));
        assert_eq!(parse_line(r#"data: {"content":""}"#), None);
        assert_eq!(parse_line(r#"data: {"role":"assistant"}"#), None);
        assert_eq!(parse_line("event: message"), None);
        assert_eq!(parse_line(""), None);
    }

    #[test]
    fn test_decoder_holds_partial_lines() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(br#"data: {"content":"#).is_empty());
        assert!(decoder.pending() > 0);

        let chunks = decoder.push(b"\"hi\"}\n");
        assert_eq!(chunks, vec![StreamChunk::Text("hi".into())]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_long_line_fed_in_small_pieces() {
        let mut decoder = LineDecoder::new();
        let body = "x".repeat(4096);
        let line = format!("data: {{\"content\":\"{body}\"}}");

        for piece in line.as_bytes().chunks(7) {
            assert!(decoder.push(piece).is_empty());
        }
        assert_eq!(decoder.pending(), line.len());

        let chunks = decoder.push(b"\ndata: {\"content\":\"y\"}\ndata: {\"con");
        assert_eq!(
            chunks,
            vec![StreamChunk::Text(body), StreamChunk::Text("y".into())]
        );
        assert_eq!(decoder.pending(), "data: {\"con".len());

        let chunks = decoder.push(b"tent\":\"z\"}\ndata: [DONE]\nleftover");
        assert_eq!(chunks, vec![StreamChunk::Text("z".into()), StreamChunk::Done]);
        assert_eq!(decoder.pending(), 0);
    }

    #[tokio::test]
    async fn test_content_then_done() {
        let chunks = collect(&["data: {\"content\":\"ab\"}\n", "data: [DONE]\n"]).await;
        assert_eq!(chunks, vec![StreamChunk::Text("ab".into()), StreamChunk::Done]);
        assert_eq!(chunks[1].to_string(), "[DONE]");
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let chunks = collect(&[
            "data: not-json\n",
            "data: {\"content\":\"still here\"}\n",
            "data: [DONE]\n",
        ])
        .await;
        assert_eq!(
            chunks,
            vec![StreamChunk::Text("still here".into()), StreamChunk::Done]
        );
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let text = "data: {\"content\":\"héllo\"}\n\ndata: {\"content\":\" wörld\"}\r\n";
        let bytes = text.as_bytes();
        // Split inside the two-byte 'é'.
        let split = text.find('é').unwrap() + 1;
        let parts: Vec<Chunk> = vec![
            Ok(bytes[..split].to_vec()),
            Ok(bytes[split..split + 3].to_vec()),
            Ok(bytes[split + 3..].to_vec()),
        ];

        let chunks: Vec<StreamChunk> = parse_event_stream(stream::iter(parts))
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text("héllo".into()),
                StreamChunk::Text(" wörld".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_stops_at_done() {
        let chunks = collect(&[
            "data: {\"content\":\"a\"}\ndata: [DONE]\ndata: {\"content\":\"late\"}\n",
            "data: {\"content\":\"later\"}\n",
        ])
        .await;
        assert_eq!(chunks, vec![StreamChunk::Text("a".into()), StreamChunk::Done]);
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_not_yielded() {
        let chunks = collect(&["data: {\"content\":\"a\"}\n", "data: {\"content\":\"b\"}"]).await;
        assert_eq!(chunks, vec![StreamChunk::Text("a".into())]);
    }

    #[tokio::test]
    async fn test_source_error_ends_stream() {
        let parts: Vec<Chunk> = vec![
            Ok(b"data: {\"content\":\"a\"}\n".to_vec()),
            Err("connection reset".into()),
            Ok(b"data: {\"content\":\"b\"}\n".to_vec()),
        ];

        let items: Vec<Result<StreamChunk>> = parse_event_stream(stream::iter(parts)).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &StreamChunk::Text("a".into()));
        assert!(matches!(items[1], Err(ExplainError::Transport(ref m)) if m == "connection reset"));
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_source() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(released.clone());

        let parts = source(&["data: {\"content\":\"a\"}\n"])
            .chain(stream::pending())
            .map(move |item| {
                let _held = &flag;
                item
            });

        let mut chunks = parse_event_stream(parts);
        assert_eq!(
            chunks.next().await.unwrap().unwrap(),
            StreamChunk::Text("a".into())
        );
        assert!(!released.load(Ordering::SeqCst));

        drop(chunks);
        assert!(released.load(Ordering::SeqCst));
    }
}
