use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use weave_core::{BindingError, ModuleType, RequestId};
use weave_di::{ProviderConfig, RequestScope, Resolver};
use weave_module::{AppInjector, Config, Module, ModuleDescriptor, ModuleInit};

#[derive(Default, Debug)]
struct Ledger {
    opened: AtomicUsize,
    released: Mutex<Vec<RequestId>>,
}

#[derive(Debug)]
struct Transaction {
    request: RequestId,
    ledger: Arc<Ledger>,
}

struct BankModule;

impl Module for BankModule {
    fn declare() -> ModuleDescriptor {
        ModuleDescriptor::application::<Self>()
            .provider(ProviderConfig::value(Ledger::default()).export())
            .provider(
                ProviderConfig::factory(|r: &Resolver<'_>| {
                    let ledger = r.get::<Ledger>()?;
                    let request = r.request_id().ok_or_else(|| {
                        BindingError::construction("Transaction", "resolved outside a request")
                    })?;
                    ledger.opened.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(Transaction { request, ledger }))
                })
                .request_scoped()
                .on_dispose(|tx: &Transaction| {
                    tx.ledger.released.lock().unwrap().push(tx.request);
                }),
            )
            .build()
    }

    fn create(_: &ModuleInit<'_>) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

fn injector() -> AppInjector {
    AppInjector::build::<BankModule>(Config::default()).unwrap()
}

fn scope(injector: &AppInjector) -> RequestScope {
    injector
        .create_request_scope(ModuleType::of::<BankModule>())
        .unwrap()
}

#[tokio::test]
async fn concurrent_requests_get_isolated_instances() {
    let injector = injector();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let scope = scope(&injector);
            tokio::spawn(async move {
                let first = scope.get::<Transaction>().unwrap();
                tokio::task::yield_now().await;
                let second = scope.get::<Transaction>().unwrap();
                assert!(Arc::ptr_eq(&first, &second));
                assert_eq!(first.request, scope.id());
                scope.id()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort_by_key(|id| id.to_string());
    ids.dedup();
    assert_eq!(ids.len(), 8);

    let ledger = injector.get::<Ledger>().unwrap();
    assert_eq!(ledger.opened.load(Ordering::SeqCst), 8);
    assert_eq!(ledger.released.lock().unwrap().len(), 8);
}

#[tokio::test]
async fn cancelled_requests_still_dispose_their_instances() {
    let injector = injector();
    let scope = scope(&injector);
    let request = scope.id();
    let (resolved_tx, resolved_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let tx = scope.get::<Transaction>().unwrap();
        let _ = resolved_tx.send(tx.request);
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(scope);
    });

    assert_eq!(resolved_rx.await.unwrap(), request);
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    let ledger = injector.get::<Ledger>().unwrap();
    assert_eq!(*ledger.released.lock().unwrap(), vec![request]);
}

#[test]
fn request_scoped_providers_need_a_scope() {
    let injector = injector();
    let module = injector.get_module_ref_of::<BankModule>().unwrap();
    let err = module.container().get::<Transaction>().unwrap_err();
    assert!(matches!(err, BindingError::RequestScopeRequired { .. }));
}
