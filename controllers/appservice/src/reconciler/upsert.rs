//! Upsert Engine
//!
//! Create-or-update of a single child with bounded conflict retry. Each
//! attempt is a full get, build, compare, write cycle: a conflict means the
//! stored object moved, so the desired state is rebuilt on the fresh copy.

use super::child::OwnedChild;
use super::context::{NamespacedName, ReconcileContext};
use super::owner;
use crate::backoff::RetryPolicy;
use crate::error::ControllerError;
use crate::store::ObjectStore;
use crds::AppService;
use tracing::{debug, info, warn};

/// What an upsert did to the stored child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    Created,
    Updated,
    Unchanged,
}

/// Drive the child `K` of `app` to its desired state.
///
/// The child shares the parent's namespace and name.
pub async fn upsert<K>(
    store: &dyn ObjectStore<K>,
    app: &AppService,
    retry: &RetryPolicy,
    ctx: &ReconcileContext,
) -> Result<UpsertResult, ControllerError>
where
    K: OwnedChild,
{
    let key = NamespacedName::of(app);
    let mut attempts = 0u32;

    loop {
        let current = match ctx.run(store.get(&key.namespace, &key.name)).await? {
            Ok(obj) => obj,
            Err(e) if e.is_not_found() => return create(store, app, &key, ctx).await,
            Err(e) => return Err(e.into()),
        };

        let Some(desired) = desired_update(&current, app)? else {
            debug!("{} {} is up to date", K::KIND, key);
            return Ok(UpsertResult::Unchanged);
        };

        attempts += 1;
        match ctx.run(store.update(&desired)).await? {
            Ok(_) => {
                info!("Updated {} {}", K::KIND, key);
                return Ok(UpsertResult::Updated);
            }
            Err(e) if e.is_conflict() => {
                if attempts >= retry.max_attempts {
                    return Err(ControllerError::ConflictRetriesExhausted {
                        kind: K::KIND,
                        name: key.to_string(),
                        attempts,
                    });
                }
                let delay = retry.delay_after(attempts);
                warn!(
                    "Conflict updating {} {} (attempt {}/{}), retrying in {:?}",
                    K::KIND,
                    key,
                    attempts,
                    retry.max_attempts,
                    delay
                );
                ctx.sleep(delay).await?;
            }
            Err(e) if e.is_not_found() => {
                debug!("{} {} disappeared before update, recreating", K::KIND, key);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn create<K>(
    store: &dyn ObjectStore<K>,
    app: &AppService,
    key: &NamespacedName,
    ctx: &ReconcileContext,
) -> Result<UpsertResult, ControllerError>
where
    K: OwnedChild,
{
    let mut obj = K::named(&key.namespace, &key.name);
    obj.apply_desired(app);
    owner::bind(app, obj.meta_mut())?;

    ctx.run(store.create(&obj)).await??;
    info!("Created {} {}", K::KIND, key);
    Ok(UpsertResult::Created)
}

/// Desired state built on top of `current`, or `None` when the owned fields
/// already match.
fn desired_update<K: OwnedChild>(current: &K, app: &AppService) -> Result<Option<K>, ControllerError> {
    let mut desired = current.clone();
    desired.apply_desired(app);
    owner::bind(app, desired.meta_mut())?;
    desired.carry_forward(current);
    K::check_immutable(current, &desired)?;

    let owners_equal = current.meta().owner_references == desired.meta().owner_references;
    if owners_equal && K::owned_fields_equal(current, &desired) {
        return Ok(None);
    }
    Ok(Some(desired))
}
