use core::sync::atomic::{AtomicU64, Ordering};
use dashmap::DashMap;
use model::ConversationId;
use tokio::sync::oneshot;

/// Handle to a running delivery loop.
pub struct Session {
    /// Name of the quiz being delivered.
    pub quiz: Box<str>,
    /// Distinguishes this session from earlier ones in the same conversation.
    pub ticket: u64,
    stop: oneshot::Sender<()>,
}

impl Session {
    /// Signals the delivery loop to exit before its next tick.
    pub fn cancel(self) {
        // The loop may have already exited on its own.
        let _ = self.stop.send(());
    }
}

/// At most one active session per conversation.
#[derive(Default)]
pub struct Registry {
    sessions: DashMap<ConversationId, Session>,
    tickets: AtomicU64,
}

impl Registry {
    /// Creates a session for `conversation`, cancelling whichever session it replaces. The
    /// returned receiver resolves once the session is cancelled.
    pub fn arm(&self, conversation: ConversationId, quiz: Box<str>) -> (u64, oneshot::Receiver<()>) {
        let (stop, stopped) = oneshot::channel();
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        self.register(conversation, Session { quiz, ticket, stop });
        (ticket, stopped)
    }

    pub fn register(&self, conversation: ConversationId, session: Session) {
        if let Some(previous) = self.sessions.insert(conversation, session) {
            previous.cancel();
        }
    }

    /// Cancels and forgets the session for `conversation`, if any.
    pub fn unregister(&self, conversation: &ConversationId) -> bool {
        match self.sessions.remove(conversation) {
            Some((_, session)) => {
                session.cancel();
                true
            }
            None => false,
        }
    }

    /// Forgets the session only if it is still the one identified by `ticket`. Exiting loops call
    /// this so that they never evict their own replacement.
    pub fn unregister_ticket(&self, conversation: &ConversationId, ticket: u64) -> bool {
        self.sessions.remove_if(conversation, |_, session| session.ticket == ticket).is_some()
    }

    /// Name of the quiz currently delivered to `conversation`.
    pub fn get(&self, conversation: &ConversationId) -> Option<Box<str>> {
        self.sessions.get(conversation).map(|session| session.quiz.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cancels every session. Returns how many were running.
    pub fn clear(&self) -> usize {
        let conversations: Vec<_> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        conversations.iter().filter(|conversation| self.unregister(conversation)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::Registry;
    use model::ConversationId;
    use tokio::sync::oneshot::error::TryRecvError;

    #[test]
    fn replacing_a_session_cancels_the_old_one() {
        let registry = Registry::default();
        let room = ConversationId::from("room");
        let (first, mut first_stopped) = registry.arm(room.clone(), "alpha".into());
        let (second, mut second_stopped) = registry.arm(room.clone(), "beta".into());

        assert_ne!(first, second);
        assert_eq!(first_stopped.try_recv(), Ok(()));
        assert_eq!(second_stopped.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(registry.get(&room).as_deref(), Some("beta"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_tickets_do_not_evict_replacements() {
        let registry = Registry::default();
        let room = ConversationId::from("room");
        let (first, _first_stopped) = registry.arm(room.clone(), "alpha".into());
        let (second, _second_stopped) = registry.arm(room.clone(), "beta".into());

        assert!(!registry.unregister_ticket(&room, first));
        assert_eq!(registry.get(&room).as_deref(), Some("beta"));
        assert!(registry.unregister_ticket(&room, second));
        assert!(registry.is_empty());
    }

    #[test]
    fn clearing_cancels_everything() {
        let registry = Registry::default();
        let (_, mut a) = registry.arm(ConversationId::from("a"), "quiz".into());
        let (_, mut b) = registry.arm(ConversationId::from("b"), "quiz".into());

        assert_eq!(registry.clear(), 2);
        assert_eq!(a.try_recv(), Ok(()));
        assert_eq!(b.try_recv(), Ok(()));
        assert!(!registry.unregister(&ConversationId::from("a")));
    }
}
