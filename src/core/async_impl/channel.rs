use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::core::progress::{ProgressEvent, ProgressSink};

/// Sends every progress event into an unbounded channel.
///
/// Events sent after the receiver is dropped are discarded.
#[derive(Clone)]
pub struct ChannelProgress {
    sender: UnboundedSender<ProgressEvent>,
}

impl ProgressSink for ChannelProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        if self.sender.unbounded_send(event.clone()).is_err() {
            log::trace!("progress receiver gone, dropping event from {}", event.source);
        }
    }
}

/// A sink for an [`ExecutionContext`](crate::ExecutionContext) and the stream it feeds.
pub fn progress_channel() -> (ChannelProgress, UnboundedReceiver<ProgressEvent>) {
    let (sender, receiver) = mpsc::unbounded();
    (ChannelProgress { sender }, receiver)
}
