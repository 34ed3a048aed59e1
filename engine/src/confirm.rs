//! Yes/no questions for the operator.
//!
//! Worker threads must not assume anything about the UI's threading model, so
//! a question is sent as a [`ConfirmRequest`] over a channel to whoever owns
//! user interaction, and the asking thread blocks until the answer arrives.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

pub trait Confirm: Send + Sync {
    /// Ask `prompt`; `true` means yes.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers every question the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

/// A pending question.
#[derive(Debug)]
pub struct ConfirmRequest {
    pub prompt: String,
    reply: Sender<bool>,
}

impl ConfirmRequest {
    pub fn answer(self, yes: bool) {
        // The asker may have given up; nothing to do then.
        let _ = self.reply.send(yes);
    }
}

/// Sends questions over a channel and waits for the reply.
#[derive(Debug, Clone)]
pub struct ChannelConfirm {
    requests: Sender<ConfirmRequest>,
}

impl ChannelConfirm {
    /// Create the asking side and the receiver the UI side should drain.
    pub fn channel() -> (Self, Receiver<ConfirmRequest>) {
        let (tx, rx) = unbounded();
        (ChannelConfirm { requests: tx }, rx)
    }
}

impl Confirm for ChannelConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let (reply, answer) = bounded(1);
        let request = ConfirmRequest {
            prompt: prompt.to_string(),
            reply,
        };
        if self.requests.send(request).is_err() {
            tracing::warn!("no one is listening for confirmations; treating as no");
            return false;
        }
        answer.recv().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_channel_round_trip() {
        let (confirm, requests) = ChannelConfirm::channel();
        let ui = thread::spawn(move || {
            let request = requests.recv().expect("expected a request");
            assert_eq!(request.prompt, "Remove moved files?");
            request.answer(true);
        });

        assert!(confirm.confirm("Remove moved files?"));
        ui.join().expect("ui thread panicked");
    }

    #[test]
    fn test_dropped_request_means_no() {
        let (confirm, requests) = ChannelConfirm::channel();
        let ui = thread::spawn(move || {
            let request = requests.recv().expect("expected a request");
            drop(request);
        });

        assert!(!confirm.confirm("Remove moved files?"));
        ui.join().expect("ui thread panicked");
    }

    #[test]
    fn test_no_listener_means_no() {
        let (confirm, requests) = ChannelConfirm::channel();
        drop(requests);
        assert!(!confirm.confirm("anything"));
    }
}
