use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::analysis::AnalysisTimeline;
use crate::compositor::CompositeMode;
use crate::engine::{Engine, EngineConfig};
use crate::gpu::context::GpuContext;
use crate::palette::{Color, Palette};
use crate::render_job::{file_digest, RenderJobSpec, RenderMetadata};
use crate::scheduler::{CueCollector, CueScheduler};
use crate::transport::{PositionSource, SimulatedTransport};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an analysis-driven composition to PNG frames
    Render {
        /// Analysis JSON for the simulated track
        #[arg(long)]
        analysis: PathBuf,

        /// Optional cover image fed to the scenes
        #[arg(long)]
        album: Option<PathBuf>,

        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Frames per second
        #[arg(long, default_value_t = 60.0)]
        fps: f32,

        /// Duration in seconds (defaults to the remaining track length)
        #[arg(long)]
        duration: Option<f32>,

        /// Output width
        #[arg(long, default_value_t = 1280)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 720)]
        height: u32,

        /// Output resolution scale factor (0.5 - 1.0)
        #[arg(long, default_value_t = 1.0)]
        scale: f32,

        /// Composite mode: director, all, or solo:<id>
        #[arg(long, default_value = "director")]
        mode: String,

        /// Playback offset to start from, in milliseconds
        #[arg(long, default_value_t = 0)]
        seek: u64,
    },

    /// Print the cues a playback sweep would fire
    Cues {
        /// Analysis JSON to inspect
        #[arg(long)]
        analysis: PathBuf,

        /// Sweep start position in milliseconds
        #[arg(long, default_value_t = 0)]
        from: u64,

        /// Sweep end position in milliseconds (defaults to track end)
        #[arg(long)]
        to: Option<u64>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            analysis,
            album,
            out,
            fps,
            duration,
            width,
            height,
            scale,
            mode,
            seek,
        } => {
            let spec = RenderJobSpec {
                analysis_path: analysis,
                album_path: album,
                output_dir: out,
                fps,
                duration,
                width,
                height,
                scale,
                mode,
                seek_ms: seek,
            };
            pollster::block_on(render_offline(spec))?;
        }
        Commands::Cues { analysis, from, to } => {
            print_cues(&analysis, from, to)?;
        }
    }
    Ok(())
}

fn load_timeline(path: &PathBuf) -> Result<AnalysisTimeline> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading analysis {}", path.display()))?;
    AnalysisTimeline::from_json(&json)
        .with_context(|| format!("parsing analysis {}", path.display()))
}

fn print_cues(path: &PathBuf, from: u64, to: Option<u64>) -> Result<()> {
    let timeline = load_timeline(path)?;
    let to = to.unwrap_or_else(|| timeline.duration_ms());

    let mut scheduler = CueScheduler::new(std::sync::Arc::new(timeline));
    scheduler.seek(from);
    let mut collector = CueCollector::new();
    let fired = scheduler.advance(from, to, &mut collector);

    let mut cues = collector.cues;
    cues.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
    for cue in &cues {
        println!(
            "{:>10.0} ms  {:<7} #{:<5} ({:.3}s long)",
            cue.start as f64 * 1000.0,
            cue.kind.name(),
            cue.index,
            cue.duration
        );
    }
    println!("{fired} cues in ({from}, {to}] ms");
    Ok(())
}

/// Stand-in for the collaborator that samples a palette from cover art:
/// dominant is the mean color, swatches come from a coarse grid of cells.
fn sample_palette(image: &image::RgbaImage) -> Palette {
    let (width, height) = image.dimensions();
    let mean_of = |x0: u32, y0: u32, x1: u32, y1: u32| {
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        for y in y0..y1 {
            for x in x0..x1 {
                let px = image.get_pixel(x, y).0;
                sum[0] += px[0] as u64;
                sum[1] += px[1] as u64;
                sum[2] += px[2] as u64;
                count += 1;
            }
        }
        let count = count.max(1);
        Color::from_rgb8(
            (sum[0] / count) as u8,
            (sum[1] / count) as u8,
            (sum[2] / count) as u8,
        )
    };

    let dominant = mean_of(0, 0, width, height);
    let mut swatches = Vec::with_capacity(6);
    for row in 0..2u32 {
        for col in 0..3u32 {
            let x0 = width * col / 3;
            let y0 = height * row / 2;
            swatches.push(mean_of(x0, y0, width * (col + 1) / 3, height * (row + 1) / 2));
        }
    }
    let accent = swatches.first().copied().unwrap_or(dominant);
    Palette::new(dominant, accent, swatches)
}

async fn render_offline(spec: RenderJobSpec) -> Result<()> {
    let timeline = load_timeline(&spec.analysis_path)?;
    let mode = CompositeMode::from_str(&spec.mode)?;

    let gpu = GpuContext::headless().await?;
    let mut engine = Engine::new(
        gpu,
        EngineConfig {
            width: spec.width,
            height: spec.height,
            scale: spec.scale,
            mode,
            ..EngineConfig::default()
        },
    );

    let track_id = "offline";
    engine.begin_track(track_id);

    let track_end_ms = timeline.duration_ms();
    engine.deliver_analysis(track_id, timeline);

    if let Some(album_path) = &spec.album_path {
        let image = image::open(album_path)
            .with_context(|| format!("reading album art {}", album_path.display()))?
            .to_rgba8();
        let palette = sample_palette(&image);
        engine.deliver_artwork(track_id, &image, palette);
    }

    if spec.seek_ms > 0 {
        engine.seek(spec.seek_ms);
    }

    let remaining_s = (track_end_ms.saturating_sub(spec.seek_ms)) as f32 / 1000.0;
    let render_duration = spec.duration.unwrap_or(remaining_s).max(0.0);
    let total_frames = (render_duration * spec.fps).ceil() as usize;
    let dt = 1.0 / spec.fps;

    std::fs::create_dir_all(&spec.output_dir)?;

    // Readback target: copy each finished frame into a mappable buffer.
    let (width, height) = engine.output_size();
    let texture_desc = wgpu::TextureDescriptor {
        label: Some("Frame Target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: crate::gpu::context::TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    };
    let texture = engine.gpu().device.create_texture(&texture_desc);
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    let u32_size = std::mem::size_of::<u32>() as u32;
    let unpadded_bytes_per_row = u32_size * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row =
        unpadded_bytes_per_row + (align - unpadded_bytes_per_row % align) % align;

    let output_buffer = engine.gpu().device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Frame Readback Buffer"),
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut transport = SimulatedTransport::new(track_id, spec.seek_ms, spec.fps);

    println!(
        "Rendering {total_frames} frames at {width}x{height} to {} ({})...",
        spec.output_dir.display(),
        engine.describe_stack()
    );

    for i in 0..total_frames {
        let playback = transport.sample();
        engine.render_frame(playback.position_ms, dt, &texture_view);

        let mut encoder = engine
            .gpu()
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            texture_desc.size,
        );
        engine.gpu().queue.submit(Some(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| tx.send(v).unwrap());
        engine.gpu().device.poll(wgpu::Maintain::Wait);
        rx.recv()??;

        let data = buffer_slice.get_mapped_range();
        let mut unpadded = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            unpadded.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
        }
        drop(data);
        output_buffer.unmap();

        let frame_path = spec.output_dir.join(format!("frame_{i:05}.png"));
        image::save_buffer(&frame_path, &unpadded, width, height, image::ColorType::Rgba8)?;

        if i % 60 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }
    println!("\nDone.");

    let metadata = RenderMetadata {
        analysis_sha256: file_digest(&spec.analysis_path)?,
        created_at: chrono::Utc::now(),
        frames: total_frames,
        spec,
    };
    let metadata_path = metadata.spec.output_dir.join("metadata.json");
    metadata.write(&metadata_path)?;
    println!("Metadata written to {}", metadata_path.display());

    Ok(())
}
