//! Startup installation of the operator's CRDs (`--install-crds`).

use tracing::info;

use crate::error::ControllerError;
use crate::resource_reconciler::{DesiredState, ResourceReconciler};

/// Create or update every CRD, waiting for new ones to be established.
pub async fn install_crds(resources: &ResourceReconciler) -> Result<(), ControllerError> {
    for crd in crds::all_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        let outcome = resources.reconcile(&crd, DesiredState::Present).await?;
        info!("CRD {}: {:?}", name, outcome);
    }
    Ok(())
}
