//! Model identifier resolution

use super::{HullConfig, ModelError, ReconstructionModel, SilhouetteHullModel};
use crate::config::DEFAULT_MODEL_ID;
use std::sync::Arc;

/// Identifiers that can be passed to [`load`]
pub fn available() -> &'static [&'static str] {
    &[DEFAULT_MODEL_ID]
}

/// Load the model registered under `model_id`
pub fn load(model_id: &str) -> Result<Arc<dyn ReconstructionModel>, ModelError> {
    match model_id {
        DEFAULT_MODEL_ID => {
            tracing::info!("Loading model {model_id}");
            Ok(Arc::new(SilhouetteHullModel::new(
                model_id,
                HullConfig::default(),
            )))
        }
        other => Err(ModelError::UnknownModel(other.to_string())),
    }
}
