//! Request pipeline and response assembly
//!
//! ```text
//! Received → Validated → Decoded → Preprocessed → Inferred → MeshExtracted
//!          [→ PreviewRendered] → Assembled → Responded
//! ```
//!
//! `Rejected` can only follow `Received` or `Validated` (range violations and
//! oversized payloads). `Errored` follows any later state, or `Validated`
//! when the model is not ready yet.

use crate::context::ServiceContext;
use crate::decode::decode_image;
use crate::error::{PipelineError, Rejection};
use crate::invoke::{InferenceParams, Invoker};
use crate::mesh::{export_glb, Mesh};
use crate::preprocess;
use crate::types::{GenerateRequest, GenerateResponse};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;
use std::fmt;
use std::io::Cursor;
use std::time::Instant;

/// Where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Received,
    Validated,
    Decoded,
    Preprocessed,
    Inferred,
    MeshExtracted,
    PreviewRendered,
    Assembled,
    Responded,
    Rejected,
    Errored,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Responded | RequestState::Rejected | RequestState::Errored
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Received => "received",
            RequestState::Validated => "validated",
            RequestState::Decoded => "decoded",
            RequestState::Preprocessed => "preprocessed",
            RequestState::Inferred => "inferred",
            RequestState::MeshExtracted => "mesh_extracted",
            RequestState::PreviewRendered => "preview_rendered",
            RequestState::Assembled => "assembled",
            RequestState::Responded => "responded",
            RequestState::Rejected => "rejected",
            RequestState::Errored => "errored",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller receives
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A well-formed response body (successful or not)
    Responded(GenerateResponse),
    /// Refused at the transport level
    Rejected(Rejection),
}

impl Outcome {
    pub fn response(&self) -> Option<&GenerateResponse> {
        match self {
            Outcome::Responded(response) => Some(response),
            Outcome::Rejected(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.response().is_some_and(|r| r.success)
    }
}

/// Outcome plus every state the request passed through
#[derive(Debug, Clone)]
pub struct Report {
    pub outcome: Outcome,
    pub trail: Vec<RequestState>,
}

impl Report {
    pub fn final_state(&self) -> RequestState {
        self.trail.last().copied().unwrap_or(RequestState::Received)
    }

    pub fn visited(&self, state: RequestState) -> bool {
        self.trail.contains(&state)
    }
}

struct Trail(Vec<RequestState>);

impl Trail {
    fn new() -> Self {
        tracing::debug!(state = %RequestState::Received, "request state");
        Self(vec![RequestState::Received])
    }

    fn advance(&mut self, state: RequestState) {
        tracing::debug!(
            from = %self.0.last().copied().unwrap_or(RequestState::Received),
            to = %state,
            "request state"
        );
        self.0.push(state);
    }
}

/// Run one generation request to completion
///
/// Never panics on bad input; every failure is folded into the [`Outcome`].
#[tracing::instrument(level = "info", skip_all, fields(bake = request.bake_texture))]
pub fn generate(context: &ServiceContext, request: &GenerateRequest) -> Report {
    let started = Instant::now();
    let mut trail = Trail::new();

    let outcome = match run(context, request, &mut trail, started) {
        Ok(response) => {
            trail.advance(RequestState::Responded);
            tracing::info!(
                elapsed_ms = response.processing_time_ms.unwrap_or_default(),
                "generation succeeded"
            );
            Outcome::Responded(response)
        }
        Err(err) => {
            let is_rejection = err.is_rejection();
            if is_rejection {
                tracing::warn!("request rejected: {err}");
            } else {
                tracing::error!("generation failed: {err}");
            }
            let outcome = err.into_outcome(context.config().expose_error_details);
            trail.advance(if is_rejection {
                RequestState::Rejected
            } else {
                RequestState::Errored
            });
            outcome
        }
    };

    Report {
        outcome,
        trail: trail.0,
    }
}

fn run(
    context: &ServiceContext,
    request: &GenerateRequest,
    trail: &mut Trail,
    started: Instant,
) -> Result<GenerateResponse, PipelineError> {
    let config = context.config();

    let params = request.validate(config.default_mc_resolution)?;
    trail.advance(RequestState::Validated);

    let loaded = context.loaded().ok_or(PipelineError::NotReady)?;

    let image = decode_image(&request.image, config.max_image_bytes)?;
    trail.advance(RequestState::Decoded);

    let prepared = preprocess::prepare(
        &image,
        params.background_removed,
        params.foreground_ratio,
        loaded.segmenter(),
    )?;
    trail.advance(RequestState::Preprocessed);

    let invoker = Invoker::new(loaded, config.chunk_size);
    let inference = InferenceParams::from_request(&params, config.preview_size);

    let scene = invoker.encode(&prepared)?;
    trail.advance(RequestState::Inferred);

    let mesh = invoker.extract_mesh(&scene, &inference)?;
    trail.advance(RequestState::MeshExtracted);

    let preview = match inference.preview_size {
        Some(size) => {
            let preview = invoker.render_preview(&scene, size)?;
            trail.advance(RequestState::PreviewRendered);
            Some(preview)
        }
        None => None,
    };

    let response = assemble(&mesh, preview.as_ref(), started)?;
    trail.advance(RequestState::Assembled);
    Ok(response)
}

/// Encode the mesh (GLB) and preview (PNG) as base64 and stamp elapsed time
pub fn assemble(
    mesh: &Mesh,
    preview: Option<&RgbImage>,
    started: Instant,
) -> Result<GenerateResponse, PipelineError> {
    let glb = export_glb(mesh)?;
    let preview = preview
        .map(encode_png)
        .transpose()?
        .map(|png| STANDARD.encode(png));
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(GenerateResponse::succeeded(
        STANDARD.encode(glb),
        preview,
        elapsed_ms,
    ))
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
    Ok(png)
}
