//! In-process engine replaying canned replies, for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{PreparedRequest, TransportCode, TransportEngine, TransportHandle, TransportStatus};

/// One canned reply
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub lines: Vec<String>,
    pub chunks: Vec<Vec<u8>>,
    pub status: TransportStatus,
}

impl Reply {
    pub fn http(status: u16, headers: &[(&str, &str)], body: &[u8]) -> Self {
        let mut lines = vec![format!("HTTP/1.1 {status} Scripted\r\n")];
        lines.extend(headers.iter().map(|(n, v)| format!("{n}: {v}\r\n")));
        lines.push("\r\n".to_string());
        Self {
            lines,
            chunks: vec![body.to_vec()],
            status: TransportStatus::ok(),
        }
    }

    pub fn failure(code: TransportCode) -> Self {
        Self {
            lines: Vec::new(),
            chunks: Vec::new(),
            status: TransportStatus::failed(code, "scripted failure"),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    replies: VecDeque<Reply>,
    requests: Vec<PreparedRequest>,
    acquired: usize,
    released: usize,
}

/// Engine handing out handles that replay [`Reply`]s in order
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedEngine {
    state: Arc<Mutex<State>>,
}

impl ScriptedEngine {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                replies: replies.into(),
                ..Default::default()
            })),
        }
    }

    pub fn push(&self, reply: Reply) {
        self.state.lock().replies.push_back(reply);
    }

    /// Requests configured so far, in order
    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    pub fn released(&self) -> usize {
        self.state.lock().released
    }

    pub fn shared(&self) -> Arc<dyn TransportEngine> {
        Arc::new(self.clone())
    }
}

impl TransportEngine for ScriptedEngine {
    fn acquire(&self) -> Result<Box<dyn TransportHandle>, TransportStatus> {
        self.state.lock().acquired += 1;
        Ok(Box::new(ScriptedHandle {
            state: self.state.clone(),
            reply: None,
            released: false,
        }))
    }
}

struct ScriptedHandle {
    state: Arc<Mutex<State>>,
    reply: Option<Reply>,
    released: bool,
}

impl TransportHandle for ScriptedHandle {
    fn configure(&mut self, request: &PreparedRequest) -> Result<(), TransportStatus> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        self.reply = state.replies.pop_front();
        Ok(())
    }

    fn perform(
        &mut self,
        on_header_line: &mut dyn FnMut(&str),
        on_body_chunk: &mut dyn FnMut(&[u8]),
    ) -> TransportStatus {
        let Some(reply) = self.reply.take() else {
            return TransportStatus::failed(
                TransportCode::COULDNT_CONNECT,
                "no scripted reply",
            );
        };
        for line in &reply.lines {
            on_header_line(line);
        }
        for chunk in &reply.chunks {
            on_body_chunk(chunk);
        }
        reply.status
    }

    fn release(&mut self) {
        assert!(!self.released, "transport handle released twice");
        self.released = true;
        self.state.lock().released += 1;
    }
}
