//! In-memory double for [`invgraph_bus::channel::ChannelSession`], the way
//! `graph-mock`'s `MockBlockStream` stands in for a real chain connection:
//! no socket, just queues a test can push to and drain.

use std::collections::VecDeque;

use invgraph_bus::channel::{ChannelError, ChannelSession, ClientReply};
use invgraph_bus::events::Message;
use invgraph_bus::tasks::Task;

/// Records everything sent to the client and lets a test hand back replies
/// as if the client had sent them.
pub struct MockChannelSession {
    pub sent_messages: Vec<Message>,
    pub sent_tasks: Vec<Task>,
    pending_replies: VecDeque<ClientReply>,
    closed: bool,
}

impl MockChannelSession {
    pub fn new() -> Self {
        MockChannelSession {
            sent_messages: Vec::new(),
            sent_tasks: Vec::new(),
            pending_replies: VecDeque::new(),
            closed: false,
        }
    }

    /// Queue a reply as if the client had just sent it over the wire.
    pub fn push_client_reply(&mut self, reply: ClientReply) {
        self.pending_replies.push_back(reply);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for MockChannelSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSession for MockChannelSession {
    fn send_message(&mut self, message: &Message) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.sent_messages.push(message.clone());
        Ok(())
    }

    fn send_task(&mut self, task: &Task) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.sent_tasks.push(task.clone());
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<ClientReply>, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        Ok(self.pending_replies.pop_front())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invgraph_bus::channel::WorkerResult;
    use invgraph_bus::events::Message;

    #[test]
    fn sent_messages_are_recorded_in_order() {
        let mut session = MockChannelSession::new();
        session
            .send_message(&Message::Event {
                message_type: "graph_merged".to_owned(),
                data: serde_json::json!({"graph": "aws"}),
            })
            .unwrap();
        assert_eq!(session.sent_messages.len(), 1);
        assert_eq!(session.sent_messages[0].message_type(), "graph_merged");
    }

    #[test]
    fn queued_client_replies_are_returned_in_fifo_order() {
        let mut session = MockChannelSession::new();
        session.push_client_reply(ClientReply::WorkerTaskResult {
            task_id: "t1".to_owned(),
            result: WorkerResult::Done,
            data: None,
            error: None,
        });
        let reply = session.try_recv().unwrap();
        assert!(matches!(reply, Some(ClientReply::WorkerTaskResult { .. })));
        assert!(session.try_recv().unwrap().is_none());
    }

    #[test]
    fn closed_session_rejects_further_sends() {
        let mut session = MockChannelSession::new();
        session.close();
        let err = session
            .send_message(&Message::Event {
                message_type: "x".to_owned(),
                data: serde_json::Value::Null,
            })
            .unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
    }
}
