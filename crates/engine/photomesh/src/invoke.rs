//! Model invocation: encode once, then extract, bake and render from the
//! same scene code

use crate::context::LoadedModel;
use crate::device::Device;
use crate::mesh::{bake_texture, extract_isosurface, Mesh};
use crate::model::{FieldSampler, ModelError, ReconstructionModel, SceneCode};
use crate::render::render_preview;
use crate::types::RequestParams;
use image::RgbImage;

/// What to produce from one scene code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceParams {
    /// Isosurface samples per axis
    pub mc_resolution: u32,
    /// Colour vertices directly instead of baking a texture
    pub vertex_colors: bool,
    /// Edge length of the baked texture, when baking
    pub texture_resolution: Option<u32>,
    /// Preview edge length, when a preview is wanted
    pub preview_size: Option<u32>,
}

impl InferenceParams {
    /// Translate validated request parameters.
    ///
    /// `bakeTexture` is inverted here: extraction colours vertices exactly
    /// when no texture is baked.
    pub fn from_request(params: &RequestParams, preview_size: u32) -> Self {
        Self {
            mc_resolution: params.mc_resolution,
            vertex_colors: !params.bake_texture,
            texture_resolution: params.bake_texture.then_some(params.texture_resolution),
            preview_size: params.return_preview.then_some(preview_size),
        }
    }
}

/// Drives one loaded model on its resolved device
pub struct Invoker<'a> {
    model: &'a dyn ReconstructionModel,
    device: Device,
    chunk_size: usize,
}

impl<'a> Invoker<'a> {
    pub fn new(loaded: &'a LoadedModel, chunk_size: usize) -> Self {
        Self {
            model: loaded.model(),
            device: loaded.device(),
            chunk_size,
        }
    }

    fn sampler<'s>(&'s self, scene: &'s SceneCode) -> FieldSampler<'s> {
        FieldSampler::new(self.model, scene, self.chunk_size)
    }

    /// Run the image encoder
    pub fn encode(&self, image: &RgbImage) -> Result<SceneCode, ModelError> {
        self.model.encode(image, &self.device)
    }

    /// Extract the surface at `params.mc_resolution` and colour it
    #[tracing::instrument(level = "debug", skip(self, scene))]
    pub fn extract_mesh(&self, scene: &SceneCode, params: &InferenceParams) -> Result<Mesh, ModelError> {
        let sampler = self.sampler(scene);
        let mut mesh = extract_isosurface(&sampler, params.mc_resolution)?;

        if params.vertex_colors {
            let points: Vec<_> = mesh
                .positions
                .iter()
                .map(|p| glam::Vec3::from_array(*p))
                .collect();
            let colors = sampler.color(&points)?;
            mesh.colors = Some(
                colors
                    .into_iter()
                    .map(|c| c.clamp(glam::Vec3::ZERO, glam::Vec3::ONE).to_array())
                    .collect(),
            );
        }
        if let Some(resolution) = params.texture_resolution {
            bake_texture(&sampler, &mut mesh, resolution)?;
        }
        Ok(mesh)
    }

    /// Render the front view from the same scene code
    pub fn render_preview(&self, scene: &SceneCode, size: u32) -> Result<RgbImage, ModelError> {
        render_preview(&self.sampler(scene), size)
    }

    /// Encode, extract and optionally render in one go
    pub fn infer(
        &self,
        image: &RgbImage,
        params: &InferenceParams,
    ) -> Result<(Mesh, Option<RgbImage>), ModelError> {
        let scene = self.encode(image)?;
        let mesh = self.extract_mesh(&scene, params)?;
        let preview = params
            .preview_size
            .map(|size| self.render_preview(&scene, size))
            .transpose()?;
        Ok((mesh, preview))
    }
}
