use anyhow::{Context, Result, bail};
use openspectra::settings::SettingsStore;
use openspectra::util::audio::db_to_amplitude;
use openspectra::util::telemetry;
use openspectra::{
    EngineConfig, ImageBuffer, MemorySignal, Preset, Renderable, SignalSource, SpectrogramEngine,
    SurfaceId, SurfaceView,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

const SAMPLE_RATE: f32 = 44_100.0;
const DURATION_SECS: f32 = 6.0;
const WIDTH: u32 = 960;
const HEIGHT: u32 = 360;

fn main() {
    telemetry::init();
    if let Err(err) = run() {
        error!("[demo] {err:#}");
        std::process::exit(1);
    }
}

/// `openspectra [output.ppm] [settings.json]`
fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("spectrogram.ppm"));
    let settings = match args.next() {
        Some(path) => SettingsStore::new(path).load()?,
        None => Preset::Default.settings(),
    };

    let source = Arc::new(MemorySignal::mono(test_signal(), SAMPLE_RATE));
    let frames = source.frame_count();
    let mut engine = SpectrogramEngine::with_settings(source, EngineConfig::default(), &settings)
        .context("settings rejected by engine")?;
    if let Some(err) = engine.error() {
        bail!("transform unavailable: {err}");
    }
    telemetry::engine_summary("demo", &engine);

    let zoom = frames.div_ceil(WIDTH as usize).max(1) as u32;
    let view = SurfaceView::new(SurfaceId(1), 0, zoom, WIDTH, HEIGHT);
    let mut image = ImageBuffer::new(WIDTH, HEIGHT);
    let budget = engine.config().paint_budget;

    let started = Instant::now();
    let mut passes = 0;
    while !engine.largest_uncached_rect(&view).is_empty() {
        let result =
            engine.render_time_constrained(&view, view.bounds(), Instant::now() + budget, &mut image);
        passes += 1;
        debug!(
            "[demo] pass {passes}: {} new columns, {} of {WIDTH} painted, transform {}%",
            result.computed_columns,
            result.rendered.width,
            engine.completion()
        );
        if result.computed_columns == 0 {
            bail!("renderer stopped making progress after {passes} passes");
        }
    }
    info!(
        "[demo] rendered {WIDTH}x{HEIGHT} in {passes} passes ({:.1?})",
        started.elapsed()
    );
    if let Some(range) = engine.surface_range(view.id) {
        info!("[demo] magnitude range {:.4} .. {:.4}", range.min(), range.max());
    }

    write_ppm(&output, &image)?;
    info!("[demo] wrote {}", output.display());
    Ok(())
}

/// Exponential sweep from 100 Hz to 10 kHz over a steady quiet A4.
fn test_signal() -> Vec<f32> {
    use core::f32::consts::TAU;
    let total = (SAMPLE_RATE * DURATION_SECS) as usize;
    let (f0, f1) = (100.0f32, 10_000.0f32);
    let k = (f1 / f0).ln() / DURATION_SECS;
    let tone = db_to_amplitude(-20.0);
    (0..total)
        .map(|n| {
            let t = n as f32 / SAMPLE_RATE;
            let sweep_phase = TAU * f0 * ((k * t).exp() - 1.0) / k;
            0.6 * sweep_phase.sin() + tone * (TAU * 440.0 * t).sin()
        })
        .collect()
}

/// Binary PPM, transparent pixels composited onto black.
fn write_ppm(path: &Path, image: &ImageBuffer) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    write!(out, "P6\n{} {}\n255\n", image.width(), image.height())?;
    for rgba in image.as_bytes().chunks_exact(4) {
        let alpha = rgba[3] as u16;
        let rgb = [rgba[0], rgba[1], rgba[2]].map(|c| ((c as u16 * alpha) / 255) as u8);
        out.write_all(&rgb)?;
    }
    out.flush()
        .with_context(|| format!("failed to write {}", path.display()))
}
