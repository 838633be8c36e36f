//! Post-loop materialization (mesh / solid commit)

use crate::error::FinalizeError;
use crate::kernel::Solid;

/// Last step of a clean rebuild pass, before the new solid becomes visible
pub trait Finalizer: Send + Sync {
    fn finalize(&self, solid: &Solid) -> Result<(), FinalizeError>;
}

impl<F> Finalizer for F
where
    F: Fn(&Solid) -> Result<(), FinalizeError> + Send + Sync,
{
    fn finalize(&self, solid: &Solid) -> Result<(), FinalizeError> {
        self(solid)
    }
}

/// Rejects solids no kernel could have produced
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidityCheck;

impl Finalizer for ValidityCheck {
    fn finalize(&self, solid: &Solid) -> Result<(), FinalizeError> {
        let volume = solid.volume();
        if !volume.is_finite() || volume < 0.0 {
            return Err(FinalizeError::new(
                "validity",
                format!("invalid solid volume {volume}"),
            ));
        }
        let bbox = solid.bbox();
        let corners = [bbox.min, bbox.max];
        if corners
            .iter()
            .any(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(FinalizeError::new("validity", "non-finite bounding box"));
        }
        Ok(())
    }
}
