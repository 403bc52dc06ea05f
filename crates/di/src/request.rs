//! Per-request instance scope.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, debug_span};
use weave_core::{BindingError, ProviderKey, RequestId};

use crate::container::Container;
use crate::provider::{DisposeFn, Instance, erase};
use crate::resolver::Resolver;

#[derive(Default)]
struct ScopeState {
    /// Values supplied by the caller for this request only (they win over bindings).
    locals: HashMap<ProviderKey, Instance>,
    /// Request-scoped instances built so far.
    instances: HashMap<ProviderKey, Instance>,
    /// Disposal hooks in creation order.
    disposals: Vec<(ProviderKey, Instance, DisposeFn)>,
}

/// A request scope: request-scoped providers resolve to one instance per scope.
///
/// Dropping the scope ends it; disposal hooks registered with
/// [`ProviderConfig::on_dispose`](crate::ProviderConfig::on_dispose) run in reverse
/// creation order. Because the end of the scope is tied to `Drop`, it also runs when
/// the owning future is cancelled or a handler panics.
pub struct RequestScope {
    id: RequestId,
    container: Arc<Container>,
    state: Mutex<ScopeState>,
}

impl RequestScope {
    pub fn new(container: Arc<Container>) -> Self {
        Self::with_id(container, RequestId::new())
    }

    pub fn with_id(container: Arc<Container>, id: RequestId) -> Self {
        debug!(request_id = %id, container = %container.name(), "request scope opened");
        Self {
            id,
            container,
            state: Mutex::new(ScopeState::default()),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Make `value` resolvable as `T` for the lifetime of this scope only.
    pub fn provide_instance<T: Send + Sync + 'static>(&self, value: T) {
        self.provide_shared(Arc::new(value));
    }

    pub fn provide_shared<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) {
        self.lock()
            .locals
            .insert(ProviderKey::of::<T>(), erase(value));
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::for_request(&self.container, self)
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, BindingError> {
        self.resolver().get::<T>()
    }

    pub fn get_tagged<T: ?Sized + Send + Sync + 'static>(
        &self,
        tag: &str,
    ) -> Result<Arc<T>, BindingError> {
        self.resolver().get_tagged::<T>(tag)
    }

    /// Number of request-scoped instances built in this scope.
    pub fn instance_count(&self) -> usize {
        self.lock().instances.len()
    }

    pub(crate) fn local_instance(&self, key: ProviderKey) -> Option<Instance> {
        self.lock().locals.get(&key).cloned()
    }

    pub(crate) fn cached(&self, key: ProviderKey) -> Option<Instance> {
        self.lock().instances.get(&key).cloned()
    }

    /// Keep `instance` for `key` unless one was stored concurrently, in which case the
    /// existing one is returned.
    pub(crate) fn store(
        &self,
        key: ProviderKey,
        instance: Instance,
        on_dispose: Option<DisposeFn>,
    ) -> Instance {
        let mut state = self.lock();
        if let Some(existing) = state.instances.get(&key) {
            return existing.clone();
        }
        state.instances.insert(key, instance.clone());
        if let Some(hook) = on_dispose {
            state.disposals.push((key, instance.clone(), hook));
        }
        instance
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        let span = debug_span!("request_scope", request_id = %self.id);
        let _guard = span.enter();

        let state = std::mem::take(
            self.state
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let disposed = state.disposals.len();
        for (key, instance, hook) in state.disposals.into_iter().rev() {
            debug!(provider = %key, "disposing request-scoped instance");
            hook(&instance);
        }
        debug!(
            instances = state.instances.len(),
            disposed, "request scope closed"
        );
    }
}

impl core::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("container", &self.container.name())
            .field("instances", &self.instance_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::provider::{Injectable, ProviderConfig};
    use weave_core::ProviderScope;

    #[derive(Debug)]
    struct Session {
        user: String,
    }

    #[derive(Debug)]
    struct Audit {
        session: Arc<Session>,
    }

    impl Injectable for Audit {
        fn inject(r: &Resolver<'_>) -> Result<Self, BindingError> {
            Ok(Self { session: r.get()? })
        }
    }

    fn container() -> Arc<Container> {
        let container = Container::new("root");
        container
            .register_scoped::<Session, _>(|r| {
                let user = r
                    .request_id()
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                Ok(Arc::new(Session { user }))
            })
            .unwrap();
        container.register::<Audit>(ProviderScope::Transient).unwrap();
        Arc::new(container)
    }

    #[test]
    fn one_instance_per_scope() {
        let container = container();

        let first = RequestScope::new(container.clone());
        let a = first.get::<Session>().unwrap();
        let b = first.get::<Session>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.user, first.id().to_string());

        let second = RequestScope::new(container);
        let c = second.get::<Session>().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn transients_see_the_scope_of_the_request() {
        let scope = RequestScope::new(container());
        let audit = scope.get::<Audit>().unwrap();
        let session = scope.get::<Session>().unwrap();
        assert!(Arc::ptr_eq(&audit.session, &session));
        assert_eq!(scope.instance_count(), 1);
    }

    #[test]
    fn singletons_cannot_capture_request_scoped_values() {
        let container = Container::new("root");
        container
            .register_scoped::<Session, _>(|_| Ok(Arc::new(Session { user: "x".into() })))
            .unwrap();
        container.register::<Audit>(ProviderScope::Singleton).unwrap();
        let scope = RequestScope::new(Arc::new(container));

        let err = scope.get::<Audit>().unwrap_err();
        assert!(matches!(err, BindingError::RequestScopeRequired { .. }));
    }

    #[test]
    fn provided_instances_shadow_bindings() {
        let scope = RequestScope::new(container());
        scope.provide_instance(Session {
            user: "alice".into(),
        });

        assert_eq!(scope.get::<Session>().unwrap().user, "alice");
        assert_eq!(scope.get::<Audit>().unwrap().session.user, "alice");
    }

    #[test]
    fn dispose_hooks_run_in_reverse_creation_order_on_drop() {
        struct First;
        struct Second;

        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new("root");
        let l = log.clone();
        container
            .add(
                &ProviderConfig::factory(|_| Ok(Arc::new(First)))
                    .request_scoped()
                    .on_dispose(move |_: &First| l.lock().unwrap().push("first")),
            )
            .unwrap();
        let l = log.clone();
        container
            .add(
                &ProviderConfig::factory(|r| {
                    r.get::<First>()?;
                    Ok(Arc::new(Second))
                })
                .request_scoped()
                .on_dispose(move |_: &Second| l.lock().unwrap().push("second")),
            )
            .unwrap();

        {
            let scope = RequestScope::new(Arc::new(container));
            scope.get::<Second>().unwrap();
            assert!(log.lock().unwrap().is_empty());
        }

        // First finished constructing before Second, so it is disposed last.
        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
    }

    #[test]
    fn request_scope_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RequestScope>();
        assert_send_sync::<Container>();
    }
}
