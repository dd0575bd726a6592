//! Wire messages exchanged with the terminal daemon.
//!
//! Every message is a JSON document framed by [`frame::write_frame`]. Requests
//! get exactly one [`Response`]; [`Event`]s are pushed to connections that
//! attached to a session and may be interleaved with responses.

pub mod frame;

use serde::{Deserialize, Serialize};

use crate::model::{GridDiff, GridSnapshot};

pub use frame::{FrameError, read_frame, write_frame};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    ReadRichGrid {
        session_id: String,
    },
    ReadRichGridDiff {
        session_id: String,
    },
    SetScrollback {
        session_id: String,
        offset: usize,
    },
    Resize {
        session_id: String,
        rows: u16,
        cols: u16,
    },
    Write {
        session_id: String,
        data: Vec<u8>,
    },
    Attach {
        session_id: String,
    },
    ReadGridText {
        session_id: String,
        start_row: u16,
        start_col: u16,
        end_row: u16,
        end_col: u16,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::ReadRichGrid { .. } => "read_rich_grid",
            Request::ReadRichGridDiff { .. } => "read_rich_grid_diff",
            Request::SetScrollback { .. } => "set_scrollback",
            Request::Resize { .. } => "resize",
            Request::Write { .. } => "write",
            Request::Attach { .. } => "attach",
            Request::ReadGridText { .. } => "read_grid_text",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Error { message: String },
    RichGrid { grid: GridSnapshot },
    RichGridDiff { diff: GridDiff },
    GridText { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    Output { session_id: String },
    GridDiff { session_id: String, diff: GridDiff },
    SessionClosed { session_id: String },
}

impl Event {
    pub fn session_id(&self) -> &str {
        match self {
            Event::Output { session_id }
            | Event::GridDiff { session_id, .. }
            | Event::SessionClosed { session_id } => session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DaemonMessage {
    Response(Response),
    Event(Event),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_are_tagged_by_type() {
        let request = Request::SetScrollback {
            session_id: "abc".into(),
            offset: 12,
        };
        let value = serde_json::to_value(&request).expect("encode");
        assert_eq!(value, json!({"type": "SetScrollback", "session_id": "abc", "offset": 12}));
        assert_eq!(request.name(), "set_scrollback");
    }

    #[test]
    fn daemon_messages_nest_kind_and_type() {
        let raw = json!({"kind": "Event", "type": "SessionClosed", "session_id": "abc"});
        let message: DaemonMessage = serde_json::from_value(raw).expect("decode");
        match message {
            DaemonMessage::Event(event) => {
                assert!(matches!(event, Event::SessionClosed { .. }));
                assert_eq!(event.session_id(), "abc");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn error_response_carries_message() {
        let raw = json!({"kind": "Response", "type": "Error", "message": "unknown request"});
        let message: DaemonMessage = serde_json::from_value(raw).expect("decode");
        assert!(matches!(
            message,
            DaemonMessage::Response(Response::Error { ref message }) if message == "unknown request"
        ));
    }
}
