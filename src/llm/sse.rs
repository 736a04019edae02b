//! Incremental parser for the `data:`-line streaming protocol.
//!
//! Network reads hand over byte chunks with no alignment guarantees, so
//! the parser keeps its own line buffer and only acts on complete
//! lines. Malformed events are skipped; the stream only ends on the
//! literal `data: [DONE]` sentinel or EOF.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Content fragment from `choices[0].delta.content`.
    Delta(String),
    /// The `[DONE]` sentinel line.
    Done,
}

#[derive(Debug, Default)]
pub struct SseParser {
    /// Raw bytes; a chunk boundary can fall inside a multi-byte code
    /// point, so decoding waits until a full line is assembled.
    line_buf: Vec<u8>,
    done: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk and returns every event completed by it.
    /// Events after `Done` are discarded.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        self.line_buf.extend_from_slice(bytes);

        while let Some(newline) = self.line_buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.line_buf.drain(..=newline).collect();
            if let Some(event) = Self::parse_line_bytes(&line) {
                let is_done = event == SseEvent::Done;
                events.push(event);
                if is_done {
                    self.done = true;
                    return events;
                }
            }
        }

        events
    }

    /// Flushes a trailing unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.done {
            return None;
        }
        let line = std::mem::take(&mut self.line_buf);
        let event = Self::parse_line_bytes(&line);
        if matches!(event, Some(SseEvent::Done)) {
            self.done = true;
        }
        event
    }

    fn parse_line_bytes(line: &[u8]) -> Option<SseEvent> {
        // A complete line that still fails to decode is corrupt on the
        // wire, not split; skip it like any other malformed event.
        let line = std::str::from_utf8(line).ok()?;
        Self::parse_line(line.trim())
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn parse_line(line: &str) -> Option<SseEvent> {
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            return Some(SseEvent::Done);
        }

        // Unparseable payloads are skipped, never fatal.
        let json: Value = serde_json::from_str(data).ok()?;
        let content = json["choices"][0]["delta"]["content"].as_str()?;
        if content.is_empty() {
            return None;
        }
        Some(SseEvent::Delta(content.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n",
            serde_json::to_string(content).unwrap()
        )
    }

    fn collect(parser: &mut SseParser, input: &str) -> Vec<SseEvent> {
        parser.push(input.as_bytes())
    }

    #[test]
    fn parses_delta_and_done() {
        let mut parser = SseParser::new();
        let mut events = collect(&mut parser, &delta_line("Hello"));
        events.extend(collect(&mut parser, "data: [DONE]\n"));

        assert_eq!(
            events,
            vec![SseEvent::Delta("Hello".to_string()), SseEvent::Done]
        );
        assert!(parser.is_done());
    }

    #[test]
    fn handles_lines_split_across_chunks() {
        let line = delta_line("split me");
        let mut parser = SseParser::new();

        for boundary in 1..line.len() - 1 {
            let mut p = SseParser::new();
            let mut events = p.push(line[..boundary].as_bytes());
            events.extend(p.push(line[boundary..].as_bytes()));
            assert_eq!(events, vec![SseEvent::Delta("split me".to_string())]);
        }
        // Whole line in one chunk too.
        assert_eq!(
            parser.push(line.as_bytes()),
            vec![SseEvent::Delta("split me".to_string())]
        );
    }

    #[test]
    fn reassembles_multibyte_content_split_anywhere() {
        // "日本語です" is 3 bytes per character; every byte boundary
        // must reassemble to the exact original text.
        let line = delta_line("日本語です");
        let bytes = line.as_bytes();

        for boundary in 1..bytes.len() - 1 {
            let mut p = SseParser::new();
            let mut events = p.push(&bytes[..boundary]);
            events.extend(p.push(&bytes[boundary..]));
            assert_eq!(
                events,
                vec![SseEvent::Delta("日本語です".to_string())],
                "split at byte {}",
                boundary
            );
        }
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let chunk = format!("{}{}\n{}", delta_line("a"), "", delta_line("b"));
        let mut parser = SseParser::new();
        let events = parser.push(chunk.as_bytes());
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("a".to_string()),
                SseEvent::Delta("b".to_string())
            ]
        );
    }

    #[test]
    fn malformed_json_is_skipped() {
        let mut parser = SseParser::new();
        let mut events = collect(&mut parser, "data: {not json}\n");
        events.extend(collect(&mut parser, &delta_line("still alive")));

        assert_eq!(events, vec![SseEvent::Delta("still alive".to_string())]);
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut parser = SseParser::new();
        let events = collect(&mut parser, ": keepalive\n\nevent: ping\n");
        assert!(events.is_empty());
        assert!(!parser.is_done());
    }

    #[test]
    fn nothing_after_done() {
        let mut parser = SseParser::new();
        let chunk = format!("data: [DONE]\n{}", delta_line("late"));
        let events = parser.push(chunk.as_bytes());
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(parser.push(delta_line("later").as_bytes()).is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut parser = SseParser::new();
        let line = delta_line("tail");
        let line = line.trim_end();
        assert!(parser.push(line.as_bytes()).is_empty());
        assert_eq!(parser.finish(), Some(SseEvent::Delta("tail".to_string())));
    }
}
