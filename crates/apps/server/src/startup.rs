//! One-time model loading.

use photomesh::model::registry;
use photomesh::{BorderSegmenter, Device, LoadedModel, ServiceContext};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Load the configured model, resolve the device and install both into
/// `context`. Blocks for as long as loading takes.
pub fn load_model(context: &ServiceContext, device_preference: &str) -> anyhow::Result<()> {
    let model_id = &context.config().model_id;
    tracing::info!("Loading model {model_id} (device preference: {device_preference})");

    let model = registry::load(model_id)?;
    let device = Device::resolve(device_preference, model.as_ref());
    let segmenter = Arc::new(BorderSegmenter::default());

    context.install(LoadedModel::new(model, device, segmenter))?;
    Ok(())
}

/// Load the model in the background; requests are answered with the
/// not-ready failure until it finishes.
pub fn spawn_model_loader(context: Arc<ServiceContext>, device_preference: String) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = load_model(&context, &device_preference) {
            tracing::error!("Model loading failed, service stays not ready: {e:#}");
        }
    })
}
