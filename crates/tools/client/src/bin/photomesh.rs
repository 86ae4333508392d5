//! photomesh CLI - Command-line interface for image-to-mesh generation

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use photomesh_client::{GenerateRequest, PhotomeshClient};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// photomesh CLI - Image-to-mesh generation tool
#[derive(Parser)]
#[command(name = "photomesh")]
#[command(about = "Generate textured meshes from single images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a GLB mesh from an image
    Generate {
        /// Input image (PNG, JPEG, WebP, ...)
        input: PathBuf,

        /// Output file path (.glb)
        #[arg(short, long)]
        output: PathBuf,

        /// Write the preview render here (.png)
        #[arg(long)]
        preview: Option<PathBuf>,

        /// Isosurface resolution (64-512, server default when omitted)
        #[arg(long)]
        mc_resolution: Option<i64>,

        /// Let the server segment the subject from its background
        #[arg(long)]
        remove_background: bool,

        /// Fraction of the frame the subject should fill (0.5-0.95)
        #[arg(long, default_value = "0.85")]
        foreground_ratio: f64,

        /// Bake a texture instead of vertex colours
        #[arg(long)]
        bake_texture: bool,

        /// Baked texture edge length (512-4096)
        #[arg(long, default_value = "2048")]
        texture_resolution: i64,

        /// photomesh server URL
        #[arg(long, default_value = "http://localhost:8000")]
        server: String,

        /// Request timeout in seconds
        #[arg(long, default_value = "120")]
        timeout: u64,
    },

    /// Check photomesh server health
    Health {
        /// photomesh server URL
        #[arg(long, default_value = "http://localhost:8000")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            input,
            output,
            preview,
            mc_resolution,
            remove_background,
            foreground_ratio,
            bake_texture,
            texture_resolution,
            server,
            timeout,
        } => {
            let mut request = GenerateRequest::new(read_image(&input)?)
                .with_background_removed(!remove_background)
                .with_foreground_ratio(foreground_ratio)
                .with_bake_texture(bake_texture)
                .with_texture_resolution(texture_resolution)
                .with_return_preview(preview.is_some());
            if let Some(resolution) = mc_resolution {
                request = request.with_mc_resolution(resolution);
            }
            generate_command(request, output, preview, server, timeout).await?;
        }
        Commands::Health { server } => {
            health_command(server).await?;
        }
    }

    Ok(())
}

fn read_image(path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(STANDARD.encode(bytes))
}

fn spinner(message: &'static str) -> anyhow::Result<ProgressBar> {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress.set_message(message);
    Ok(progress)
}

async fn generate_command(
    request: GenerateRequest,
    output: PathBuf,
    preview: Option<PathBuf>,
    server: String,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let extension = output.extension().and_then(|s| s.to_str()).unwrap_or("");
    anyhow::ensure!(extension == "glb", "Output file must have .glb extension");

    println!("photomesh Image-to-Mesh Generator");
    println!("=================================");
    println!("Server: {}", server);
    match request.mc_resolution {
        Some(resolution) => println!("Resolution: {}", resolution),
        None => println!("Resolution: server default"),
    }
    println!("Texture: {}", if request.bake_texture { "baked" } else { "vertex colours" });
    println!("Output: {}", output.display());
    println!();

    let client = PhotomeshClient::new(server).with_generate_timeout(Duration::from_secs(timeout_secs));

    let progress = spinner("Generating mesh...")?;
    let model = match client.generate(&request).await {
        Ok(model) => {
            progress.finish_with_message("✓ Generation complete");
            model
        }
        Err(e) => {
            progress.finish_with_message("✗ Generation failed");
            return Err(e.into());
        }
    };

    fs::write(&output, &model.glb)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("✓ Saved to {}", output.display());
    println!("  Size: {} bytes", model.glb_len());
    if let Some(ms) = model.processing_time_ms {
        println!("  Server time: {} ms", ms);
    }

    if let (Some(path), Some(png)) = (preview, model.preview_png.as_ref()) {
        fs::write(&path, png).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("✓ Preview saved to {}", path.display());
    }

    Ok(())
}

async fn health_command(server: String) -> anyhow::Result<()> {
    println!("Checking photomesh server health...");
    println!("Server: {}", server);
    println!();

    let client = PhotomeshClient::new(server);

    let progress = spinner("Connecting to server...")?;
    let status = match client.health_check().await {
        Ok(status) => {
            progress.finish_with_message("✓ Server is reachable");
            status
        }
        Err(e) => {
            progress.finish_with_message("✗ Server is unreachable");
            return Err(e.into());
        }
    };

    println!();
    println!("Server Status");
    println!("=============");
    println!("Ready: {}", status.ready);
    println!("Device: {}", status.device);
    println!("CUDA: {}", status.cuda);
    println!("Model: {}", status.model_id);

    anyhow::ensure!(status.is_ready(), "Server is not ready yet");
    Ok(())
}
