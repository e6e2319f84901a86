//! Session bookkeeping (§4.3 joins against `RoomTable`). `SessionSink` is
//! the transport seam: wire framing is out of scope for this core, so a
//! session's outbound channel is just "something you can hand a
//! `ServerEnvelope` to and it gets delivered or logged as failed" —
//! analogous to the teacher's `MessageSender<T>` handle but without any
//! assumption of UDP/Lightyear underneath.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ids::SessionId;
use crate::protocol::ServerEnvelope;

pub trait SessionSink: Send + Sync {
    fn send(&self, envelope: &ServerEnvelope);
}

pub struct Session {
    pub id: SessionId,
    pub sink: Arc<dyn SessionSink>,
}

impl Session {
    pub fn new(id: SessionId, sink: Arc<dyn SessionSink>) -> Self {
        Self { id, sink }
    }

    pub fn send(&self, envelope: &ServerEnvelope) {
        self.sink.send(envelope);
    }
}

#[derive(Default)]
pub struct SessionTable {
    sessions: HashMap<SessionId, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self { sessions: HashMap::new() }
    }

    pub fn register(&mut self, id: SessionId, sink: Arc<dyn SessionSink>) {
        self.sessions.insert(id.clone(), Session::new(id, sink));
    }

    pub fn unregister(&mut self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn send_to(&self, id: &SessionId, envelope: &ServerEnvelope) -> bool {
        match self.sessions.get(id) {
            Some(s) => {
                s.send(envelope);
                true
            }
            None => {
                tracing::warn!(session = %id, "send_to: unknown session");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<ServerEnvelope>>,
    }

    impl SessionSink for RecordingSink {
        fn send(&self, envelope: &ServerEnvelope) {
            self.sent.lock().unwrap().push(envelope.clone());
        }
    }
}
