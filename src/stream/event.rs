//! Rendering bus messages as server-sent events.

use axum::response::sse::Event;

use crate::bus::BusMessage;

/// Render `message` as one SSE event.
///
/// The event name is the message subject and the data is the payload as
/// UTF-8 (invalid sequences replaced). Multi-line payloads become several
/// `data:` lines, which clients join back with `\n`.
pub fn render(message: &BusMessage) -> Event {
    let data = String::from_utf8_lossy(&message.payload);
    Event::default()
        .event(single_line(&message.subject))
        .data(normalize_newlines(&data))
}

/// Fold CRLF and lone CR into LF. SSE treats all three as line breaks.
fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Event names must fit on one line.
fn single_line(name: &str) -> String {
    name.replace(['\r', '\n'], " ")
}
