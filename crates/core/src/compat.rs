//! Agent/model compatibility rules used by the dispatcher.
//!
//! Pure logic: the caller supplies the agent's last published resources
//! and the model's catalog requirements.

use crate::resources::ResourceSnapshot;

/// Hardware requirements of a catalog model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequirements {
    pub name: String,
    pub requires_gpu: bool,
    pub min_ram_mb: Option<i64>,
    pub min_vram_mb: Option<i64>,
}

/// Outcome of checking one agent against one model.
#[derive(Debug, Clone, PartialEq)]
pub enum Compatibility {
    /// The model is already loaded on the agent; resource checks skipped.
    Resident,
    /// All resource requirements are met.
    Suitable,
    /// The model needs a GPU and the agent reports none.
    NoGpu,
    InsufficientRam { available_mb: f64, required_mb: i64 },
    InsufficientVram { available_mb: i64, required_mb: i64 },
}

impl Compatibility {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Compatibility::Resident | Compatibility::Suitable)
    }
}

/// Check whether an agent can serve `model`.
///
/// A model that is already resident on the agent is accepted without
/// looking at resources. Otherwise the GPU, RAM and VRAM requirements are
/// checked in that order and the first failing one is reported.
pub fn check(
    resources: &ResourceSnapshot,
    active_model: Option<&str>,
    model: &ModelRequirements,
) -> Compatibility {
    if active_model.map(str::trim) == Some(model.name.trim()) {
        return Compatibility::Resident;
    }

    if model.requires_gpu && resources.gpu.mem_total_mb() <= 0 {
        return Compatibility::NoGpu;
    }

    if let Some(required_mb) = model.min_ram_mb.filter(|mb| *mb > 0) {
        let available_mb = resources.ram_available_mb();
        if available_mb < required_mb as f64 {
            return Compatibility::InsufficientRam {
                available_mb,
                required_mb,
            };
        }
    }

    if let Some(required_mb) = model.min_vram_mb.filter(|mb| *mb > 0) {
        let available_mb = resources.gpu.mem_available_mb();
        if available_mb < required_mb {
            return Compatibility::InsufficientVram {
                available_mb,
                required_mb,
            };
        }
    }

    Compatibility::Suitable
}
