//! In-memory `ObjectStore` for unit testing
//!
//! Stores objects in a map keyed by namespace/name and mimics the parts of
//! API server behaviour the reconciler depends on:
//! - resourceVersion bumps on every write, stale versions get `Conflict`
//! - uid assignment on create
//! - cluster IP allocation for Services
//! - rejection of immutable-field changes with `Invalid`
//!
//! Conflicts can be injected to exercise the retry path.

use super::{ObjectStore, StoreError};
use crds::AppService;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Server-side behaviour that differs per kind.
pub trait SimulatedServer: Resource<DynamicType = ()> + Clone + Send + Sync + 'static {
    /// Fill server-assigned fields on create
    fn on_create(&mut self, _seq: u64) {}

    /// Reject updates the real API server would reject
    fn validate_update(_old: &Self, _new: &Self) -> Result<(), String> {
        Ok(())
    }
}

impl SimulatedServer for AppService {}

impl SimulatedServer for Deployment {
    fn validate_update(old: &Self, new: &Self) -> Result<(), String> {
        let old_selector = old.spec.as_ref().map(|s| &s.selector);
        let new_selector = new.spec.as_ref().map(|s| &s.selector);
        if old_selector != new_selector {
            return Err("spec.selector: field is immutable".to_string());
        }
        Ok(())
    }
}

impl SimulatedServer for Service {
    fn on_create(&mut self, seq: u64) {
        let spec = self.spec.get_or_insert_with(Default::default);
        if spec.cluster_ip.is_none() {
            let ip = format!("10.96.0.{}", seq % 250 + 1);
            spec.cluster_ip = Some(ip.clone());
            spec.cluster_ips = Some(vec![ip]);
        }
    }

    fn validate_update(old: &Self, new: &Self) -> Result<(), String> {
        let old_ip = old.spec.as_ref().and_then(|s| s.cluster_ip.as_ref());
        let new_ip = new.spec.as_ref().and_then(|s| s.cluster_ip.as_ref());
        if old_ip.is_some() && old_ip != new_ip {
            return Err("spec.clusterIP: field is immutable".to_string());
        }
        Ok(())
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Mock object store for testing
pub struct MockStore<K> {
    objects: Mutex<HashMap<(String, String), K>>,
    next_version: AtomicU64,
    creates: AtomicUsize,
    updates: AtomicUsize,
    update_attempts: AtomicUsize,
    pending_conflicts: AtomicU32,
    fail_next_create: AtomicBool,
    update_hook: Mutex<Option<Hook>>,
}

impl<K: SimulatedServer> MockStore<K> {
    /// Create an empty store
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            update_attempts: AtomicUsize::new(0),
            pending_conflicts: AtomicU32::new(0),
            fail_next_create: AtomicBool::new(false),
            update_hook: Mutex::new(None),
        })
    }

    fn key(obj: &K) -> (String, String) {
        (obj.namespace().unwrap_or_default(), obj.name_any())
    }

    fn bump_version(&self, obj: &mut K) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        obj.meta_mut().resource_version = Some(version.to_string());
    }

    /// Seed an object directly (test setup), bypassing write counters
    pub fn insert(&self, mut obj: K) -> K {
        let seq = self.next_version.load(Ordering::SeqCst);
        if obj.meta().uid.is_none() {
            obj.meta_mut().uid = Some(format!("uid-{}-{}", obj.name_any(), seq));
        }
        obj.on_create(seq);
        self.bump_version(&mut obj);
        self.objects.lock().unwrap().insert(Self::key(&obj), obj.clone());
        obj
    }

    /// Mutate a stored object as an external actor would (bumps resourceVersion)
    pub fn modify(&self, namespace: &str, name: &str, f: impl FnOnce(&mut K)) {
        let mut objects = self.objects.lock().unwrap();
        if let Some(obj) = objects.get_mut(&(namespace.to_string(), name.to_string())) {
            f(obj);
            let version = self.next_version.fetch_add(1, Ordering::SeqCst);
            obj.meta_mut().resource_version = Some(version.to_string());
        }
    }

    /// Remove an object as an external actor would
    pub fn remove(&self, namespace: &str, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Peek at a stored object
    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Make the next `n` update calls fail with a conflict, each one also
    /// bumping the stored resourceVersion as a concurrent writer would
    pub fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Make the next create fail with `AlreadyExists`
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    /// Run `f` at the start of every update call
    pub fn on_update(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.update_hook.lock().unwrap() = Some(Box::new(f));
    }

    /// Successful creates
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Successful updates
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Update calls, including ones that failed
    pub fn update_attempts(&self) -> usize {
        self.update_attempts.load(Ordering::SeqCst)
    }

    /// Successful writes of any kind
    pub fn writes(&self) -> usize {
        self.creates() + self.updates()
    }
}

#[async_trait::async_trait]
impl<K: SimulatedServer> ObjectStore<K> for MockStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.object(namespace, name)
            .ok_or_else(|| StoreError::NotFound(format!("{} {}/{}", K::kind(&()), namespace, name)))
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let key = Self::key(obj);
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(StoreError::AlreadyExists(format!("{}/{}", key.0, key.1)));
        }
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{}/{}", key.0, key.1)));
        }
        if obj.meta().resource_version.is_some() {
            return Err(StoreError::Invalid("resourceVersion must not be set on create".to_string()));
        }

        let mut created = obj.clone();
        let seq = self.next_version.load(Ordering::SeqCst);
        created.meta_mut().uid = Some(format!("uid-{}-{}", key.1, seq));
        created.on_create(seq);
        self.bump_version(&mut created);
        objects.insert(key, created.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.update_hook.lock().unwrap().as_ref() {
            hook();
        }

        let key = Self::key(obj);
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&key) else {
            return Err(StoreError::NotFound(format!("{}/{}", key.0, key.1)));
        };

        let injected = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            let version = self.next_version.fetch_add(1, Ordering::SeqCst);
            stored.meta_mut().resource_version = Some(version.to_string());
            return Err(StoreError::Conflict(format!("{}/{} was modified", key.0, key.1)));
        }

        if obj.meta().resource_version != stored.meta().resource_version {
            return Err(StoreError::Conflict(format!(
                "{}/{}: resourceVersion {:?} is stale",
                key.0,
                key.1,
                obj.meta().resource_version
            )));
        }
        K::validate_update(stored, obj).map_err(StoreError::Invalid)?;

        let mut updated = obj.clone();
        updated.meta_mut().uid = stored.meta().uid.clone();
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        updated.meta_mut().resource_version = Some(version.to_string());
        *stored = updated.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}
