//! Ownership Binder
//!
//! Points each child at its AppService with a controller owner reference so
//! the API server's cascade removes the child when the parent goes away.

use crate::error::ControllerError;
use crds::AppService;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

/// Attach (or refresh) the controller reference from `child` to `parent`,
/// with `controller` and `blockOwnerDeletion` both set.
///
/// Fails when the parent has no uid, when the two live in different
/// namespaces, or when the child is already controlled by another object.
pub fn bind(parent: &AppService, child: &mut ObjectMeta) -> Result<(), ControllerError> {
    let mut owner = parent.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::Ownership(format!(
            "AppService {} has no uid yet",
            parent.name_any()
        ))
    })?;
    // Foreground deletion of the parent waits for its children.
    owner.block_owner_deletion = Some(true);

    let parent_ns = parent.namespace();
    if child.namespace != parent_ns {
        return Err(ControllerError::Ownership(format!(
            "{} lives in namespace {:?}, owner {} in {:?}",
            child.name.as_deref().unwrap_or_default(),
            child.namespace,
            parent.name_any(),
            parent_ns
        )));
    }

    let refs = child.owner_references.get_or_insert_with(Vec::new);
    if let Some(other) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(ControllerError::Ownership(format!(
            "{} is already controlled by {} {}",
            child.name.as_deref().unwrap_or_default(),
            other.kind,
            other.name
        )));
    }

    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner,
        None => refs.push(owner),
    }
    Ok(())
}
