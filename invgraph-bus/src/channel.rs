//! Transport-agnostic seam for the bidirectional channel protocol (events
//! channel and worker task channel). The concrete websocket/HTTP transport
//! is out of scope; `invgraph-mock` proves this trait against an in-memory
//! test double.

use crate::events::Message;
use crate::tasks::Task;

/// What the server side of a channel needs: a place to push outstanding
/// messages and a way to read back client acknowledgements.
pub trait ChannelSession: Send {
    /// Push a message to the client (queued `Message`s for an events
    /// channel, or outstanding `Task`s for a worker channel — callers pick
    /// which by only ever calling the matching `send_*`).
    fn send_message(&mut self, message: &Message) -> Result<(), ChannelError>;

    fn send_task(&mut self, task: &Task) -> Result<(), ChannelError>;

    /// Non-blocking check for a client reply. `Ok(None)` means no reply is
    /// waiting yet.
    fn try_recv(&mut self) -> Result<Option<ClientReply>, ChannelError>;

    /// Release the subscriber/worker slot this session holds.
    fn close(&mut self);
}

/// What a client may send back over either channel kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientReply {
    ActionDone { task_id: String, step: String },
    ActionError { task_id: String, step: String, error: String },
    WorkerTaskResult {
        task_id: String,
        result: WorkerResult,
        data: Option<serde_json::Value>,
        error: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerResult {
    Done,
    Error,
}

#[derive(Debug, Fail)]
pub enum ChannelError {
    #[fail(display = "channel closed")]
    Closed,
    #[fail(display = "another channel is already active for this subscriber/worker id")]
    AlreadyActive,
}
