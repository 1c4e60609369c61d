//! Blocking bridge over the runtime's asynchronous join
//!
//! The runtime receives a [`JoinCallback`] and completes it exactly once from
//! whatever thread it likes. The caller of [`StartupBridge::join`] parks on a
//! condition variable until the outcome has been written.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::{debug, info};

use super::join::JoinConfiguration;
use super::runtime::ClusterRuntime;
use crate::error::{BootstrapError, BootstrapResult};

const DROPPED_CAUSE: &str = "join callback dropped without completion";

/// Outcome reported by the runtime
#[derive(Debug)]
pub enum JoinOutcome<H> {
    Joined(H),
    Failed { cause: Option<String> },
}

struct Completion<H> {
    outcome: Mutex<Option<JoinOutcome<H>>>,
    released: Condvar,
}

impl<H> Completion<H> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    /// Write the outcome and wake the waiter; later writes are ignored
    fn release(&self, outcome: JoinOutcome<H>) {
        let mut slot = self.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.released.notify_all();
        }
    }

    fn wait(&self) -> JoinOutcome<H> {
        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.take() {
                return outcome;
            }
            self.released.wait(&mut slot);
        }
    }
}

/// Single-use completion handed to the runtime
///
/// Completing consumes the callback, so a second completion cannot be
/// expressed. Dropping it uncompleted releases the waiter with a failure.
pub struct JoinCallback<H> {
    completion: Option<Arc<Completion<H>>>,
}

impl<H> JoinCallback<H> {
    fn new(completion: Arc<Completion<H>>) -> Self {
        Self {
            completion: Some(completion),
        }
    }

    pub fn complete(mut self, outcome: JoinOutcome<H>) {
        if let Some(completion) = self.completion.take() {
            completion.release(outcome);
        }
    }

    pub fn succeed(self, handle: H) {
        self.complete(JoinOutcome::Joined(handle));
    }

    pub fn fail(self, cause: Option<String>) {
        self.complete(JoinOutcome::Failed { cause });
    }
}

impl<H> Drop for JoinCallback<H> {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.release(JoinOutcome::Failed {
                cause: Some(DROPPED_CAUSE.to_string()),
            });
        }
    }
}

/// Turns `start_clustered_async` into a blocking call
///
/// No timeout is applied: a runtime that holds the callback without ever
/// completing it blocks the caller indefinitely.
pub struct StartupBridge;

impl StartupBridge {
    pub fn join<R: ClusterRuntime>(runtime: &R, config: JoinConfiguration) -> BootstrapResult<R::Handle> {
        let completion = Arc::new(Completion::new());
        let callback = JoinCallback::new(Arc::clone(&completion));

        debug!(
            cluster = ?config.cluster_name,
            peers = config.peer_addresses.len(),
            quorum = config.quorum_size,
            "submitting join"
        );
        runtime.start_clustered_async(config, callback);

        match completion.wait() {
            JoinOutcome::Joined(handle) => {
                info!("cluster join completed");
                Ok(handle)
            }
            JoinOutcome::Failed { cause } => Err(BootstrapError::JoinFailed { cause }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::runtime::ClusterHandle;
    use crate::config::MeshConfig;
    use crate::types::MemberRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Debug)]
    struct StubHandle {
        id: Uuid,
        completed_at: usize,
    }

    impl ClusterHandle for StubHandle {
        fn members(&self) -> BootstrapResult<Vec<MemberRecord>> {
            Ok(Vec::new())
        }
        fn local_id(&self) -> Uuid {
            self.id
        }
        fn shutdown(&self) {}
    }

    enum Behaviour {
        Succeed,
        FailWith(Option<&'static str>),
        Drop,
        Hold(mpsc::Sender<JoinCallback<StubHandle>>),
    }

    struct StubRuntime {
        behaviour: Mutex<Option<Behaviour>>,
        sequence: Arc<AtomicUsize>,
    }

    impl StubRuntime {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour: Mutex::new(Some(behaviour)),
                sequence: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ClusterRuntime for StubRuntime {
        type Handle = StubHandle;

        fn start_clustered_async(&self, _config: JoinConfiguration, callback: JoinCallback<StubHandle>) {
            let behaviour = self.behaviour.lock().take();
            let sequence = Arc::clone(&self.sequence);
            thread::spawn(move || match behaviour {
                Some(Behaviour::Succeed) => {
                    let completed_at = sequence.fetch_add(1, Ordering::SeqCst) + 1;
                    callback.succeed(StubHandle {
                        id: Uuid::new_v4(),
                        completed_at,
                    });
                }
                Some(Behaviour::FailWith(cause)) => callback.fail(cause.map(str::to_string)),
                Some(Behaviour::Drop) | None => drop(callback),
                Some(Behaviour::Hold(tx)) => {
                    let _ = tx.send(callback);
                }
            });
        }
    }

    fn config() -> JoinConfiguration {
        JoinConfiguration::standalone(&MeshConfig::default())
    }

    #[test]
    fn test_success_is_observed_before_caller_continues() {
        let runtime = StubRuntime::new(Behaviour::Succeed);

        let handle = StartupBridge::join(&runtime, config()).unwrap();
        let after_return = runtime.sequence.fetch_add(1, Ordering::SeqCst) + 1;

        assert_eq!(handle.completed_at, 1);
        assert_eq!(after_return, 2);
    }

    #[test]
    fn test_failure_carries_cause() {
        let runtime = StubRuntime::new(Behaviour::FailWith(Some("port 5701 already bound")));

        let err = StartupBridge::join(&runtime, config()).unwrap_err();
        match &err {
            BootstrapError::JoinFailed { cause } => {
                assert_eq!(cause.as_deref(), Some("port 5701 already bound"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("port 5701 already bound"));
    }

    #[test]
    fn test_failure_without_cause() {
        let runtime = StubRuntime::new(Behaviour::FailWith(None));

        let err = StartupBridge::join(&runtime, config()).unwrap_err();
        assert!(err.to_string().contains("unknown reason"));
    }

    #[test]
    fn test_dropped_callback_releases_caller() {
        let runtime = StubRuntime::new(Behaviour::Drop);

        let err = StartupBridge::join(&runtime, config()).unwrap_err();
        assert!(err.to_string().contains(DROPPED_CAUSE));
    }

    #[test]
    fn test_caller_blocks_while_join_outstanding() {
        let (callback_tx, callback_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = StubRuntime::new(Behaviour::Hold(callback_tx));
            let result = StartupBridge::join(&runtime, config());
            let _ = done_tx.send(result.map(|h| h.id));
        });

        let callback = callback_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

        let id = Uuid::new_v4();
        callback.succeed(StubHandle { id, completed_at: 0 });
        let joined = done_rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(joined, id);
    }

    #[test]
    fn test_release_is_single_assignment() {
        let completion = Completion::new();
        completion.release(JoinOutcome::Joined(1));
        completion.release(JoinOutcome::Joined(2));

        match completion.wait() {
            JoinOutcome::Joined(value) => assert_eq!(value, 1),
            JoinOutcome::Failed { .. } => panic!("expected success"),
        }
    }
}
