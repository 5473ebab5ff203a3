use flowscope_core::{FlowSnapshot, Snapshot};

#[derive(Debug, Clone)]
pub struct Incoming {
    pub stream: String,
    pub kind: IncomingKind,
}

#[derive(Debug, Clone)]
pub enum IncomingKind {
    Connected,
    Disconnected,
    Hello { version: String, host: String },
    Frame { topology: Snapshot, flows: FlowSnapshot },
    Pong,
    Error(String),
}

impl Incoming {
    pub fn connected(stream: String) -> Self {
        Self {
            stream,
            kind: IncomingKind::Connected,
        }
    }

    pub fn disconnected(stream: String) -> Self {
        Self {
            stream,
            kind: IncomingKind::Disconnected,
        }
    }

    pub fn hello(stream: String, version: String, host: String) -> Self {
        Self {
            stream,
            kind: IncomingKind::Hello { version, host },
        }
    }

    pub fn frame(stream: String, topology: Snapshot, flows: FlowSnapshot) -> Self {
        Self {
            stream,
            kind: IncomingKind::Frame { topology, flows },
        }
    }

    pub fn pong(stream: String) -> Self {
        Self {
            stream,
            kind: IncomingKind::Pong,
        }
    }

    pub fn error(stream: String, msg: String) -> Self {
        Self {
            stream,
            kind: IncomingKind::Error(msg),
        }
    }
}
