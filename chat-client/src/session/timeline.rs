//! Message timeline for the open chat, with optimistic-send reconciliation.

use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::models::{Author, Message};

/// Outcome of folding one inbound message into the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// A pending local entry was confirmed in place.
    Confirmed(Uuid),
    /// Same text and author already shown within the duplicate window.
    Duplicate,
    Appended(Uuid),
}

/// A message as it arrives from the relay
#[derive(Debug, Clone)]
pub struct Incoming {
    pub chat_id: String,
    pub sender_id: String,
    pub author: Author,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    messages: Vec<Message>,
    duplicate_window: TimeDelta,
}

impl Timeline {
    pub fn new(duplicate_window: std::time::Duration) -> Self {
        Self {
            messages: Vec::new(),
            duplicate_window: TimeDelta::from_std(duplicate_window)
                .unwrap_or_else(|_| TimeDelta::seconds(2)),
        }
    }

    /// Replace the contents with store history, oldest first
    pub fn load(&mut self, history: Vec<Message>) {
        self.messages = history;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.pending).count()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn push_pending(&mut self, message: Message) -> Uuid {
        let id = message.local_id;
        self.messages.push(message);
        id
    }

    /// Fold an inbound message in. Order matters: a pending match wins over
    /// the duplicate check, which wins over appending.
    pub fn reconcile(&mut self, incoming: Incoming) -> Reconciliation {
        if let Some(entry) = self
            .messages
            .iter_mut()
            .find(|m| m.pending && m.content == incoming.content && m.author == incoming.author)
        {
            entry.pending = false;
            entry.created_at = Some(incoming.timestamp);
            entry.sender_id = incoming.sender_id;
            return Reconciliation::Confirmed(entry.local_id);
        }

        let window = self.duplicate_window;
        let duplicate = self.messages.iter().any(|m| {
            !m.pending
                && m.content == incoming.content
                && m.author == incoming.author
                && m.created_at
                    .map(|ts| (ts - incoming.timestamp).abs() <= window)
                    .unwrap_or(false)
        });
        if duplicate {
            return Reconciliation::Duplicate;
        }

        let message = Message::confirmed(
            &incoming.chat_id,
            &incoming.sender_id,
            incoming.author,
            &incoming.content,
            incoming.timestamp,
        );
        let id = message.local_id;
        self.messages.push(message);
        Reconciliation::Appended(id)
    }

    /// Remove and return entries that never got confirmed
    pub fn take_pending(&mut self) -> Vec<Message> {
        let (pending, confirmed): (Vec<Message>, Vec<Message>) =
            self.messages.drain(..).partition(|m| m.pending);
        self.messages = confirmed;
        pending
    }

    /// Merge sends that were still pending when the chat was last closed.
    ///
    /// A pending entry whose text shows up among our own stored messages
    /// sent no earlier than it was queued is considered delivered and
    /// dropped. The rest go back on the end, still pending. Returns how many
    /// were kept.
    pub fn merge_pending(&mut self, outbox: Vec<Message>) -> usize {
        let window = self.duplicate_window;
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut kept = 0;

        for entry in outbox {
            let delivered = self.messages.iter().enumerate().find_map(|(idx, m)| {
                let matches = !claimed.contains(&idx)
                    && !m.pending
                    && m.author == Author::Me
                    && m.content == entry.content
                    && match (m.created_at, entry.sent_at) {
                        (Some(stored), Some(queued)) => stored >= queued - window,
                        _ => true,
                    };
                matches.then_some(idx)
            });

            match delivered {
                Some(idx) => {
                    claimed.insert(idx);
                }
                None => {
                    self.messages.push(entry);
                    kept += 1;
                }
            }
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timeline() -> Timeline {
        Timeline::new(Duration::from_secs(2))
    }

    fn incoming(sender: &str, author: Author, text: &str, ts: DateTime<Utc>) -> Incoming {
        Incoming {
            chat_id: "chat1".to_string(),
            sender_id: sender.to_string(),
            author,
            content: text.to_string(),
            timestamp: ts,
        }
    }

    #[test]
    fn test_self_echo_confirms_pending_in_place() {
        let mut tl = timeline();
        let id = tl.push_pending(Message::pending("chat1", "U1", "hi"));

        let ts = Utc::now();
        let outcome = tl.reconcile(incoming("U1", Author::Me, "hi", ts));

        assert_eq!(outcome, Reconciliation::Confirmed(id));
        assert_eq!(tl.len(), 1);
        assert!(!tl.messages()[0].pending);
        assert_eq!(tl.messages()[0].created_at, Some(ts));
    }

    #[test]
    fn test_pending_match_requires_same_author() {
        let mut tl = timeline();
        tl.push_pending(Message::pending("chat1", "U1", "ok"));

        let outcome = tl.reconcile(incoming("U2", Author::Other, "ok", Utc::now()));

        assert!(matches!(outcome, Reconciliation::Appended(_)));
        assert_eq!(tl.len(), 2);
        assert_eq!(tl.pending_count(), 1);
    }

    #[test]
    fn test_duplicate_within_window_dropped() {
        let mut tl = timeline();
        let t0 = Utc::now();
        tl.reconcile(incoming("U2", Author::Other, "hello", t0));

        let outcome = tl.reconcile(incoming(
            "U2",
            Author::Other,
            "hello",
            t0 + TimeDelta::milliseconds(500),
        ));

        assert_eq!(outcome, Reconciliation::Duplicate);
        assert_eq!(tl.len(), 1);
    }

    #[test]
    fn test_same_text_outside_window_appended() {
        let mut tl = timeline();
        let t0 = Utc::now();
        tl.reconcile(incoming("U2", Author::Other, "hello", t0));

        let outcome = tl.reconcile(incoming(
            "U2",
            Author::Other,
            "hello",
            t0 + TimeDelta::seconds(3),
        ));

        assert!(matches!(outcome, Reconciliation::Appended(_)));
        assert_eq!(tl.len(), 2);
    }

    #[test]
    fn test_two_identical_sends_each_confirm_one() {
        let mut tl = timeline();
        let first = tl.push_pending(Message::pending("chat1", "U1", "ok"));
        let second = tl.push_pending(Message::pending("chat1", "U1", "ok"));

        let ts = Utc::now();
        assert_eq!(
            tl.reconcile(incoming("U1", Author::Me, "ok", ts)),
            Reconciliation::Confirmed(first)
        );
        assert_eq!(
            tl.reconcile(incoming("U1", Author::Me, "ok", ts)),
            Reconciliation::Confirmed(second)
        );
        assert_eq!(tl.pending_count(), 0);
    }

    #[test]
    fn test_genuinely_new_message_appended_last() {
        let mut tl = timeline();
        tl.push_pending(Message::pending("chat1", "U1", "first"));
        tl.reconcile(incoming("U2", Author::Other, "reply", Utc::now()));

        assert_eq!(tl.messages().last().unwrap().content, "reply");
    }

    #[test]
    fn test_take_pending_keeps_confirmed() {
        let mut tl = timeline();
        tl.reconcile(incoming("U2", Author::Other, "hey", Utc::now()));
        tl.push_pending(Message::pending("chat1", "U1", "unsent"));

        let pending = tl.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].content, "unsent");
        assert_eq!(tl.len(), 1);
    }

    #[test]
    fn test_merge_drops_delivered_and_keeps_undelivered() {
        let mut tl = timeline();
        let queued = Message::pending("chat1", "U1", "delivered");
        let lost = Message::pending("chat1", "U1", "lost");

        tl.load(vec![Message::confirmed(
            "chat1",
            "U1",
            Author::Me,
            "delivered",
            Utc::now(),
        )]);

        let kept = tl.merge_pending(vec![queued, lost]);

        assert_eq!(kept, 1);
        assert_eq!(tl.len(), 2);
        assert_eq!(tl.messages()[1].content, "lost");
        assert!(tl.messages()[1].pending);
    }

    #[test]
    fn test_merge_ignores_older_identical_history() {
        let mut tl = timeline();
        let yesterday = Utc::now() - TimeDelta::days(1);
        tl.load(vec![Message::confirmed(
            "chat1", "U1", Author::Me, "thanks", yesterday,
        )]);

        let kept = tl.merge_pending(vec![Message::pending("chat1", "U1", "thanks")]);

        assert_eq!(kept, 1);
        assert_eq!(tl.pending_count(), 1);
    }
}
