pub mod align;
pub mod assign;
pub mod identity;
pub mod model;
pub mod path;
pub mod pipeline;
pub mod resolve;
pub mod store;
pub mod topk;

pub use align::{AlignmentState, Frame, FramePosition, TimeAlignmentEngine};
pub use assign::{connection, AssignStats, Connection, LinkFlowAssigner, FALLBACK_FLOW_CAP};
pub use identity::{stable_u32, FlowIdentityStore, FlowKey};
pub use model::{
    Address, FlowRecord, FlowSnapshot, LinkKey, LinkRecord, NodeRecord, Snapshot, Timestamp,
    Timestamped,
};
pub use path::{Decomposition, PathDecomposer, Segment};
pub use pipeline::{process, process_frame, ProcessedFrame};
pub use resolve::{AddressOrigin, DeviceTable, NodeIdentifier, NodeIdentityResolver, ResolveError};
pub use store::{
    open_recording, IndexEntry, JsonlStore, JsonlWriter, MemoryStore, StoreError,
    TimeIndexedStore,
};
pub use topk::{TopKSelector, VisibilitySet};

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Agent <-> viewer wire message, one per length-delimited frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Msg {
    Hello { version: String, host: String },
    Frame { topology: Snapshot, flows: FlowSnapshot },
    Ping,
    Pong,
}
