use futures_util::StreamExt;

/// One parsed SSE frame: `id`/`event` fields plus the joined `data` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

/// Reads frames out of a streaming `text/event-stream` response body,
/// buffering partial reads across chunk boundaries.
pub struct SseClient {
    response: reqwest::Response,
    buffer: String,
}

impl SseClient {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Returns the next complete frame, pulling more bytes off the
    /// underlying response as needed. Returns `None` if the stream ends
    /// before another full frame arrives.
    pub async fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            if let Some(pos) = self.buffer.find("\n\n") {
                let raw = self.buffer[..pos].to_owned();
                self.buffer.drain(..pos + 2);
                return Some(parse_frame(&raw));
            }

            let chunk = self.response.chunk().await.ok()??;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

fn parse_frame(raw: &str) -> SseFrame {
    let mut frame = SseFrame::default();
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("id:") {
            frame.id = Some(value.trim_start().to_owned());
        } else if let Some(value) = line.strip_prefix("event:") {
            frame.event = Some(value.trim_start().to_owned());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start().to_owned());
        }
    }
    frame.data = data_lines.join("\n");
    frame
}
