//! Dependency resolution over a container chain.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use weave_core::{BindingError, ProviderKey, ProviderScope, RequestId};

use crate::binding::{Binding, Strategy};
use crate::container::Container;
use crate::provider::{Instance, unerase};
use crate::request::RequestScope;

/// Resolution context handed to constructors and factories.
///
/// A resolver tracks the chain of providers currently under construction so that
/// missing dependencies are reported against their consumer and cycles are detected
/// instead of overflowing the stack.
pub struct Resolver<'a> {
    container: &'a Container,
    request: Option<&'a RequestScope>,
    path: Rc<RefCell<Vec<ProviderKey>>>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(container: &'a Container) -> Self {
        Self {
            container,
            request: None,
            path: Rc::default(),
        }
    }

    pub(crate) fn for_request(container: &'a Container, request: &'a RequestScope) -> Self {
        Self {
            container,
            request: Some(request),
            path: Rc::default(),
        }
    }

    /// The container lookups start from.
    pub fn container(&self) -> &Container {
        self.container
    }

    /// Id of the enclosing request scope, if resolution happens inside one.
    pub fn request_id(&self) -> Option<RequestId> {
        self.request.map(RequestScope::id)
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, BindingError> {
        let key = ProviderKey::of::<T>();
        let instance = self.resolve_key(key)?;
        downcast(key, &instance)
    }

    /// Resolve `T` if anything provides it, `None` otherwise.
    pub fn get_optional<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, BindingError> {
        if self.contains(ProviderKey::of::<T>()) {
            self.get::<T>().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn get_tagged<T: ?Sized + Send + Sync + 'static>(
        &self,
        tag: &str,
    ) -> Result<Arc<T>, BindingError> {
        let key = self
            .container
            .find_tag(tag)
            .ok_or_else(|| self.missing(&format!("tag `{tag}`")))?;
        let instance = self.resolve_key(key)?;
        downcast(key, &instance)
    }

    pub fn contains(&self, key: ProviderKey) -> bool {
        self.request.is_some_and(|r| r.local_instance(key).is_some()) || self.container.contains(key)
    }

    /// Resolve `key` to its type-erased instance.
    pub fn resolve_key(&self, key: ProviderKey) -> Result<Instance, BindingError> {
        if let Some(instance) = self.request.and_then(|r| r.local_instance(key)) {
            return Ok(instance);
        }
        let (binding, owner) = self
            .container
            .find(key)
            .ok_or_else(|| self.missing(key.type_name()))?;
        self.resolve_binding(key, &binding, owner)
    }

    fn resolve_binding(
        &self,
        key: ProviderKey,
        binding: &Binding,
        owner: &Container,
    ) -> Result<Instance, BindingError> {
        let factory = match binding.strategy() {
            Strategy::Value(value) => return Ok(value.clone()),
            Strategy::Delegate(source) => {
                let target = source
                    .local(key)
                    .ok_or_else(|| self.missing(key.type_name()))?;
                return self.resolve_binding(key, &target, source);
            }
            Strategy::Construct(factory) => factory,
        };

        match binding.scope() {
            ProviderScope::Singleton => {
                if let Some(instance) = binding.cached_singleton() {
                    return Ok(instance);
                }
                // Singletons outlive any request, so they are built without one.
                let instance = self.construct(key, owner, None, |r| factory(r))?;
                Ok(binding.store_singleton(instance))
            }
            ProviderScope::Transient => self.construct(key, owner, self.request, |r| factory(r)),
            ProviderScope::Request => {
                let request = self.request.ok_or_else(|| BindingError::RequestScopeRequired {
                    provider: key.type_name().to_string(),
                })?;
                if let Some(instance) = request.cached(key) {
                    return Ok(instance);
                }
                let instance = self.construct(key, owner, Some(request), |r| factory(r))?;
                Ok(request.store(key, instance, binding.dispose_hook()))
            }
        }
    }

    fn construct<F>(
        &self,
        key: ProviderKey,
        owner: &Container,
        request: Option<&RequestScope>,
        build: F,
    ) -> Result<Instance, BindingError>
    where
        F: FnOnce(&Resolver<'_>) -> Result<Instance, BindingError>,
    {
        {
            let mut path = self.path.borrow_mut();
            if let Some(start) = path.iter().position(|k| *k == key) {
                let mut chain: Vec<String> = path[start..]
                    .iter()
                    .map(|k| k.type_name().to_string())
                    .collect();
                chain.push(key.type_name().to_string());
                return Err(BindingError::CircularDependency { chain });
            }
            path.push(key);
        }

        let nested = Resolver {
            container: owner,
            request,
            path: self.path.clone(),
        };
        let result = build(&nested);
        self.path.borrow_mut().pop();
        result
    }

    fn missing(&self, what: &str) -> BindingError {
        match self.path.borrow().last() {
            Some(consumer) => BindingError::UnsatisfiedRequirement {
                consumer: consumer.type_name().to_string(),
                missing: what.to_string(),
            },
            None => BindingError::NotFound {
                provider: what.to_string(),
                container: self.container.name().to_string(),
            },
        }
    }
}

fn downcast<T: ?Sized + Send + Sync + 'static>(
    key: ProviderKey,
    instance: &Instance,
) -> Result<Arc<T>, BindingError> {
    unerase::<T>(instance).ok_or_else(|| BindingError::TypeMismatch {
        provider: key.type_name().to_string(),
    })
}

impl core::fmt::Debug for Resolver<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let path: Vec<&'static str> = self.path.borrow().iter().map(ProviderKey::type_name).collect();
        f.debug_struct("Resolver")
            .field("container", &self.container.name())
            .field("request", &self.request_id())
            .field("path", &path)
            .finish()
    }
}
