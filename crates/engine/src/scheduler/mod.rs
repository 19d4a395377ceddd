mod registry;

pub use registry::{Registry, Session};

use crate::{
    deliver::{Deliver, DeliveryError},
    error::{self, Error},
};
use core::time::Duration;
use db::QuizStore;
use log::{debug, error, info, warn};
use model::ConversationId;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::{sync::oneshot, time};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Time between two deliveries to the same conversation.
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(15) }
    }
}

struct Inner<S, D> {
    store: Arc<S>,
    deliver: D,
    registry: Registry,
    interval: Duration,
}

/// Periodically delivers a random question from a quiz to every subscribed conversation.
pub struct Scheduler<S, D> {
    inner: Arc<Inner<S, D>>,
}

impl<S, D> Clone for Scheduler<S, D> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<S, D> Scheduler<S, D>
where
    S: QuizStore + 'static,
    D: Deliver + 'static,
{
    pub fn new(store: Arc<S>, deliver: D, config: SchedulerConfig) -> Self {
        let SchedulerConfig { interval } = config;
        Self { inner: Arc::new(Inner { store, deliver, registry: Registry::default(), interval }) }
    }

    /// Begins delivering `quiz` to `conversation` once per interval, replacing whatever session
    /// the conversation already had. The first delivery happens one full interval from now.
    pub async fn start(&self, conversation: ConversationId, quiz: &str) -> error::Result<()> {
        let quiz = self.inner.store.get(quiz).await?;
        let name = Box::<str>::from(quiz.name());
        let (ticket, stopped) = self.inner.registry.arm(conversation.clone(), name.clone());
        info!("started delivering quiz {name} to conversation {conversation}");
        tokio::spawn(self.inner.clone().run(conversation, name, ticket, stopped));
        Ok(())
    }

    /// Stops deliveries to `conversation`. Returns `false` if nothing was running.
    pub fn cancel(&self, conversation: &ConversationId) -> bool {
        let cancelled = self.inner.registry.unregister(conversation);
        if cancelled {
            info!("stopped deliveries to conversation {conversation}");
        }
        cancelled
    }

    /// Cancels every session. Returns how many were running.
    pub fn shutdown(&self) -> usize {
        self.inner.registry.clear()
    }

    pub fn active_quiz(&self, conversation: &ConversationId) -> Option<Box<str>> {
        self.inner.registry.get(conversation)
    }

    pub fn active_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl<S, D> Inner<S, D>
where
    S: QuizStore,
    D: Deliver,
{
    async fn run(self: Arc<Self>, conversation: ConversationId, quiz: Box<str>, ticket: u64, mut stopped: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                _ = time::sleep(self.interval) => (),
            }

            // Always read the latest version so that re-ingested quizzes take effect.
            let current = match self.store.get(&quiz).await {
                Ok(current) => current,
                Err(err @ db::error::Error::NotFound) => {
                    let err = Error::from(err);
                    error!("[{}] delivery of quiz {quiz} to {conversation} stopped: {err}", err.kind());
                    break;
                }
                Err(err) => {
                    let err = Error::from(err);
                    warn!("[{}] missed a tick of quiz {quiz} in {conversation}: {err}", err.kind());
                    continue;
                }
            };

            let item = {
                let mut rng = rand::thread_rng();
                current.items().choose(&mut rng).cloned()
            };
            let Some(item) = item else { break };

            match self.deliver.deliver(&conversation, &item).await {
                Ok(()) => debug!("delivered a question from quiz {quiz} to {conversation}"),
                Err(err @ DeliveryError::Transient) => warn!("missed a tick of quiz {quiz} in {conversation}: {err}"),
                Err(err @ DeliveryError::Unrecoverable) => {
                    error!("[{}] delivery of quiz {quiz} to {conversation} stopped: {err}", crate::ErrorKind::Upstream);
                    break;
                }
            }
        }

        self.registry.unregister_ticket(&conversation, ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::{Scheduler, SchedulerConfig};
    use crate::{
        deliver::{Deliver, DeliveryError},
        error::Error,
    };
    use core::time::Duration;
    use db::{MemoryStore, QuizStore};
    use model::{ConversationId, Quiz, QuizItem};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use tokio::{sync::Notify, time};

    struct Recorder {
        outcome: Result<(), DeliveryError>,
        calls: Mutex<Vec<(ConversationId, QuizItem)>>,
    }

    impl Recorder {
        fn new(outcome: Result<(), DeliveryError>) -> Arc<Self> {
            Arc::new(Self { outcome, calls: Mutex::default() })
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Deliver for Arc<Recorder> {
        async fn deliver(&self, conversation: &ConversationId, item: &QuizItem) -> Result<(), DeliveryError> {
            self.calls.lock().unwrap().push((conversation.clone(), item.clone()));
            self.outcome
        }
    }

    /// Fails the first read after `start` with a storage error.
    struct Flaky {
        quizzes: MemoryStore,
        reads: AtomicUsize,
    }

    impl QuizStore for Flaky {
        async fn put(&self, name: &str, items: Vec<QuizItem>) -> db::error::Result<Quiz> {
            self.quizzes.put(name, items).await
        }

        async fn get(&self, name: &str) -> db::error::Result<Quiz> {
            if self.reads.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(db::error::Error::Fatal);
            }
            self.quizzes.get(name).await
        }

        async fn list(&self) -> db::error::Result<Vec<Box<str>>> {
            self.quizzes.list().await
        }

        async fn delete(&self, name: &str) -> db::error::Result<bool> {
            self.quizzes.delete(name).await
        }
    }

    /// Blocks every delivery until released.
    #[derive(Default)]
    struct Gate {
        release: Notify,
        calls: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Deliver for Arc<Gate> {
        async fn deliver(&self, _: &ConversationId, _: &QuizItem) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn item(question: &str) -> QuizItem {
        QuizItem { question: question.into(), options: vec!["yes".into(), "no".into()], answer: 0 }
    }

    async fn setup(outcome: Result<(), DeliveryError>) -> (Arc<MemoryStore>, Arc<Recorder>, Scheduler<MemoryStore, Arc<Recorder>>) {
        let store = Arc::new(MemoryStore::default());
        store.put("history", vec![item("Who?"), item("When?"), item("Where?")]).await.unwrap();
        let recorder = Recorder::new(outcome);
        let scheduler = Scheduler::new(store.clone(), recorder.clone(), SchedulerConfig::default());
        (store, recorder, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_once_per_interval() {
        let (store, recorder, scheduler) = setup(Ok(())).await;
        let room = ConversationId::from("room");
        scheduler.start(room.clone(), "history").await.unwrap();
        assert_eq!(scheduler.active_quiz(&room).as_deref(), Some("history"));

        time::sleep(Duration::from_secs(14)).await;
        assert_eq!(recorder.count(), 0);

        time::sleep(Duration::from_secs(32)).await;
        assert_eq!(recorder.count(), 3);

        let quiz = store.get("history").await.unwrap();
        for (conversation, item) in recorder.calls.lock().unwrap().iter() {
            assert_eq!(conversation, &room);
            assert!(quiz.items().contains(item));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_the_session() {
        let (_, recorder, scheduler) = setup(Ok(())).await;
        let room = ConversationId::from("room");
        scheduler.start(room.clone(), "history").await.unwrap();
        scheduler.start(room.clone(), "history").await.unwrap();
        assert_eq!(scheduler.active_count(), 1);

        time::sleep(Duration::from_secs(46)).await;
        assert_eq!(recorder.count(), 3);
        assert_eq!(scheduler.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sessions_stay_silent() {
        let (_, recorder, scheduler) = setup(Ok(())).await;
        let room = ConversationId::from("room");
        scheduler.start(room.clone(), "history").await.unwrap();
        assert!(scheduler.cancel(&room));
        assert!(!scheduler.cancel(&room));

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(recorder.count(), 0);
        assert_eq!(scheduler.active_quiz(&room), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_quizzes_are_never_scheduled() {
        let (_, recorder, scheduler) = setup(Ok(())).await;
        let room = ConversationId::from("room");
        assert_eq!(scheduler.start(room.clone(), "geography").await, Err(Error::UnknownQuiz));
        assert_eq!(scheduler.active_count(), 0);

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_quizzes_stop_their_sessions() {
        let (store, recorder, scheduler) = setup(Ok(())).await;
        scheduler.start(ConversationId::from("room"), "history").await.unwrap();
        assert!(store.delete("history").await.unwrap());

        time::sleep(Duration::from_secs(16)).await;
        assert_eq!(recorder.count(), 0);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_failures_stop_the_session() {
        let (_, recorder, scheduler) = setup(Err(DeliveryError::Unrecoverable)).await;
        scheduler.start(ConversationId::from("gone"), "history").await.unwrap();

        time::sleep(Duration::from_secs(46)).await;
        assert_eq!(recorder.count(), 1);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_keep_the_session() {
        let (_, recorder, scheduler) = setup(Err(DeliveryError::Transient)).await;
        scheduler.start(ConversationId::from("flaky"), "history").await.unwrap();

        time::sleep(Duration::from_secs(46)).await;
        assert_eq!(recorder.count(), 3);
        assert_eq!(scheduler.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn store_failures_skip_a_single_tick() {
        let store = Arc::new(Flaky { quizzes: MemoryStore::default(), reads: AtomicUsize::new(0) });
        store.put("history", vec![item("Who?")]).await.unwrap();
        let recorder = Recorder::new(Ok(()));
        let scheduler = Scheduler::new(store.clone(), recorder.clone(), SchedulerConfig::default());
        scheduler.start(ConversationId::from("room"), "history").await.unwrap();

        time::sleep(Duration::from_secs(16)).await;
        assert_eq!(recorder.count(), 0);
        assert_eq!(scheduler.active_count(), 1);

        time::sleep(Duration::from_secs(15)).await;
        assert_eq!(recorder.count(), 1);
        assert_eq!(scheduler.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_during_a_delivery_lets_it_finish_without_another_tick() {
        let store = Arc::new(MemoryStore::default());
        store.put("history", vec![item("Who?")]).await.unwrap();
        let gate = Arc::new(Gate::default());
        let scheduler = Scheduler::new(store, gate.clone(), SchedulerConfig::default());

        let room = ConversationId::from("room");
        scheduler.start(room.clone(), "history").await.unwrap();
        time::sleep(Duration::from_secs(16)).await;
        assert_eq!(gate.calls.load(Ordering::SeqCst), 1);

        assert!(scheduler.cancel(&room));
        gate.release.notify_one();
        time::sleep(Duration::from_secs(31)).await;

        assert_eq!(gate.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.finished.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_every_session() {
        let (_, recorder, scheduler) = setup(Ok(())).await;
        scheduler.start(ConversationId::from("a"), "history").await.unwrap();
        scheduler.start(ConversationId::from("b"), "history").await.unwrap();
        assert_eq!(scheduler.shutdown(), 2);

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(recorder.count(), 0);
        assert_eq!(scheduler.active_count(), 0);
    }
}
