//! Shared service state
//!
//! One [`ServiceContext`] lives for the whole process. It starts out not
//! ready; the startup task installs a [`LoadedModel`] exactly once, after
//! which the readiness flag flips and every request sees the same model,
//! device and segmentation session.

use crate::config::PipelineConfig;
use crate::device::Device;
use crate::model::ReconstructionModel;
use crate::preprocess::Segmenter;
use crate::types::HealthStatus;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Everything startup produces for the request pipeline
#[derive(Clone)]
pub struct LoadedModel {
    model: Arc<dyn ReconstructionModel>,
    device: Device,
    segmenter: Arc<dyn Segmenter>,
}

impl LoadedModel {
    pub fn new(
        model: Arc<dyn ReconstructionModel>,
        device: Device,
        segmenter: Arc<dyn Segmenter>,
    ) -> Self {
        Self {
            model,
            device,
            segmenter,
        }
    }

    pub fn model(&self) -> &dyn ReconstructionModel {
        self.model.as_ref()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn segmenter(&self) -> &dyn Segmenter {
        self.segmenter.as_ref()
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("model", &self.model.id())
            .field("device", &self.device)
            .field("segmenter", &self.segmenter.name())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("A model is already installed ({0})")]
    AlreadyInstalled(String),
}

/// Process-wide state shared by every request
#[derive(Debug)]
pub struct ServiceContext {
    config: PipelineConfig,
    ready: AtomicBool,
    loaded: OnceLock<LoadedModel>,
}

impl ServiceContext {
    /// A context with nothing loaded yet
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ready: AtomicBool::new(false),
            loaded: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Install the loaded model and mark the context ready
    ///
    /// Only the first call succeeds.
    pub fn install(&self, loaded: LoadedModel) -> Result<(), ContextError> {
        let model_id = loaded.model.id().to_string();
        let device = loaded.device;
        self.loaded.set(loaded).map_err(|_| {
            let existing = self.loaded.get().map(|l| l.model.id()).unwrap_or_default();
            ContextError::AlreadyInstalled(existing.to_string())
        })?;
        self.ready.store(true, Ordering::Release);
        tracing::info!("Model {model_id} ready on {device}");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// The installed model, once ready
    pub fn loaded(&self) -> Option<&LoadedModel> {
        if self.is_ready() {
            self.loaded.get()
        } else {
            None
        }
    }

    /// Identifier of the installed model, or the configured one before that
    pub fn model_id(&self) -> &str {
        self.loaded()
            .map(|loaded| loaded.model.id())
            .unwrap_or(&self.config.model_id)
    }

    pub fn health(&self) -> HealthStatus {
        let device = self.loaded().map(LoadedModel::device).unwrap_or_default();
        HealthStatus {
            success: true,
            ready: self.is_ready(),
            device: device.to_string(),
            cuda: device.is_cuda(),
            model_id: self.model_id().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SilhouetteHullModel;
    use crate::preprocess::BorderSegmenter;

    fn loaded() -> LoadedModel {
        LoadedModel::new(
            Arc::new(SilhouetteHullModel::default()),
            Device::Cpu,
            Arc::new(BorderSegmenter::default()),
        )
    }

    #[test]
    fn test_starts_not_ready() {
        let context = ServiceContext::new(PipelineConfig::default());
        assert!(!context.is_ready());
        assert!(context.loaded().is_none());

        let health = context.health();
        assert!(health.success);
        assert!(!health.ready);
        assert_eq!(health.model_id, crate::config::DEFAULT_MODEL_ID);
    }

    #[test]
    fn test_cuda_flag_follows_resolved_device() {
        let context = ServiceContext::new(PipelineConfig::default());
        context
            .install(LoadedModel::new(
                Arc::new(SilhouetteHullModel::default()),
                Device::Cuda(1),
                Arc::new(BorderSegmenter::default()),
            ))
            .unwrap();
        let health = context.health();
        assert_eq!(health.device, "cuda:1");
        assert!(health.cuda);
    }

    #[test]
    fn test_install_once() {
        let context = ServiceContext::new(PipelineConfig::default());
        context.install(loaded()).unwrap();
        assert!(context.is_ready());
        assert_eq!(context.health().device, "cpu");
        assert!(!context.health().cuda);

        assert!(matches!(
            context.install(loaded()),
            Err(ContextError::AlreadyInstalled(_))
        ));
        assert!(context.is_ready());
    }

    #[test]
    fn test_ready_is_visible_across_threads() {
        let context = Arc::new(ServiceContext::new(PipelineConfig::default()));
        let installer = {
            let context = Arc::clone(&context);
            std::thread::spawn(move || context.install(loaded()))
        };
        installer.join().unwrap().unwrap();
        assert!(context.loaded().is_some());
    }
}
