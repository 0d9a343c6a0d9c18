use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use sasspipe_proto as proto;

use crate::error::{Error, Result};
use crate::resolver::ImportResolver;

/// What a waiting caller receives: the compiler's terminal response, or the
/// error that ended the call.
pub(crate) type Outcome = std::result::Result<proto::CompileResponse, Error>;

/// One in-flight compilation: its per-call resolver and completion signal.
pub(crate) struct PendingCall {
    pub(crate) resolver: Option<Arc<dyn ImportResolver>>,
    done: SyncSender<Outcome>,
}

impl PendingCall {
    /// Complete the call. The channel has capacity one and the send never
    /// blocks, so racing completers (deadline vs. reader, drain vs. reader)
    /// coalesce: the first outcome wins, later ones are dropped.
    pub(crate) fn complete(&self, outcome: Outcome) {
        let _ = self.done.try_send(outcome);
    }
}

/// The pending-call table, the id counter, and the lifecycle flags.
///
/// The whole struct is guarded by a single lock in the transpiler; every
/// transition between insert, lookup-and-remove, and flag changes happens
/// under it.
pub(crate) struct Registry {
    next_id: u32,
    pending: HashMap<u32, PendingCall>,
    /// Set by a caller-initiated close.
    pub(crate) closing: bool,
    /// Set when the reader loop has terminated.
    pub(crate) shutdown: bool,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
            closing: false,
            shutdown: false,
        }
    }

    /// Admit a new call, failing fast once the connection is closing or
    /// down. Ids are assigned strictly monotonically.
    pub(crate) fn register(
        &mut self,
        resolver: Option<Arc<dyn ImportResolver>>,
    ) -> Result<(u32, Receiver<Outcome>)> {
        if self.closing || self.shutdown {
            return Err(Error::Shutdown);
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let (done, wait) = sync_channel(1);
        self.pending.insert(id, PendingCall { resolver, done });
        Ok((id, wait))
    }

    /// Remove and return the call for a terminal response.
    pub(crate) fn take(&mut self, id: u32) -> Option<PendingCall> {
        self.pending.remove(&id)
    }

    /// The resolver for a callback message, without removing the call.
    /// `None` means no such call; `Some(None)` a call without a resolver.
    pub(crate) fn peek_resolver(&self, id: u32) -> Option<Option<Arc<dyn ImportResolver>>> {
        self.pending.get(&id).map(|call| call.resolver.clone())
    }

    /// Mark the registry shut down and empty it. The returned calls are
    /// completed by the caller outside the lock.
    pub(crate) fn drain(&mut self) -> Vec<PendingCall> {
        self.shutdown = true;
        self.pending.drain().map(|(_, call)| call).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::TryRecvError;

    use super::*;
    use crate::resolver::{Import, ResolverError};

    struct NopResolver;

    impl ImportResolver for NopResolver {
        fn canonicalize(&self, _url: &str) -> std::result::Result<Option<String>, ResolverError> {
            Ok(None)
        }

        fn load(&self, _url: &str) -> std::result::Result<Import, ResolverError> {
            Ok(Import::default())
        }
    }

    fn response(id: u32) -> proto::CompileResponse {
        proto::CompileResponse { id, result: None }
    }

    #[test]
    fn ids_are_monotonic() {
        let mut registry = Registry::new();
        let (a, _wait_a) = registry.register(None).unwrap();
        let (b, _wait_b) = registry.register(None).unwrap();
        let (c, _wait_c) = registry.register(None).unwrap();
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn take_removes_the_call() {
        let mut registry = Registry::new();
        let (id, wait) = registry.register(None).unwrap();
        let call = registry.take(id).unwrap();
        assert_eq!(registry.len(), 0);
        assert!(registry.take(id).is_none());

        call.complete(Ok(response(id)));
        assert!(wait.recv().unwrap().is_ok());
    }

    #[test]
    fn peek_keeps_the_call_pending() {
        let mut registry = Registry::new();
        let (id, _wait) = registry
            .register(Some(Arc::new(NopResolver)))
            .unwrap();
        assert!(registry.peek_resolver(id).unwrap().is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.peek_resolver(id + 1).is_none());
    }

    #[test]
    fn register_fails_fast_when_closing_or_shutdown() {
        let mut registry = Registry::new();
        registry.closing = true;
        assert!(matches!(registry.register(None), Err(Error::Shutdown)));

        let mut registry = Registry::new();
        registry.shutdown = true;
        assert!(matches!(registry.register(None), Err(Error::Shutdown)));
    }

    #[test]
    fn drain_sets_shutdown_and_empties_the_table() {
        let mut registry = Registry::new();
        let (_id_a, wait_a) = registry.register(None).unwrap();
        let (_id_b, wait_b) = registry.register(None).unwrap();

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.shutdown);
        assert_eq!(registry.len(), 0);

        for call in drained {
            call.complete(Err(Error::Shutdown));
        }
        assert!(matches!(wait_a.recv().unwrap(), Err(Error::Shutdown)));
        assert!(matches!(wait_b.recv().unwrap(), Err(Error::Shutdown)));
    }

    #[test]
    fn duplicate_completions_coalesce() {
        let mut registry = Registry::new();
        let (id, wait) = registry.register(None).unwrap();
        let call = registry.take(id).unwrap();

        call.complete(Ok(response(id)));
        call.complete(Err(Error::Shutdown));

        assert!(wait.recv().unwrap().is_ok());
        assert!(matches!(wait.try_recv(), Err(TryRecvError::Disconnected) | Err(TryRecvError::Empty)));
    }
}
