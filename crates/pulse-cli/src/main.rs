use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use plotters::prelude::*;
use pulse_lib::{
    config::PipelineConfig,
    detectors::peaks::{detect_peaks, dynamic_threshold},
    io::text as text_io,
    metrics::{
        glucose::GlucoseEstimate, heart_rate::HeartRateEstimator, hrv::Condition,
        sqi::SQIResult,
    },
    pipeline::{analyze_recording, analyze_window},
    plot::{spectrum_figure, waveform_figure, Figure, Series},
    session::SessionRecord,
    signal::Sample,
    spectrum::{analyze_spectrum, dominant_pulse_bpm, BandPass, SpectrumPoint},
};
use pulse_run::{
    FinishReason, HistoryStore, RunnerOptions, RunnerUpdate, SessionRunner, SyntheticCamera,
    SyntheticCameraConfig,
};
use serde::Serialize;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "Fingertip camera pulse analysis tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Pipeline settings shared by the analysis commands. Flags override the
/// TOML file, which overrides the defaults.
#[derive(Args, Clone, Debug)]
struct PipelineArgs {
    /// TOML file with pipeline settings
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    fs: Option<f64>,
    #[arg(long)]
    threshold: Option<f64>,
    /// Keep every spectral bin instead of the 0.7-3.0 Hz band
    #[arg(long)]
    no_band_pass: bool,
    #[arg(long)]
    buffer_capacity: Option<usize>,
}

impl PipelineArgs {
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(fs) = self.fs {
            cfg.sample_rate_hz = fs;
        }
        if let Some(threshold) = self.threshold {
            cfg.threshold_factor = threshold;
        }
        if self.no_band_pass {
            cfg.band_pass_enabled = false;
        }
        if let Some(capacity) = self.buffer_capacity {
            cfg.buffer_capacity = capacity;
        }
        Ok(cfg.sanitized())
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PlotKind {
    Waveform,
    Spectrum,
}

#[derive(Subcommand)]
enum Commands {
    /// Full analysis of a recorded trace (`value` or `t_ms,value` per line)
    Analyze {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// Include every spectral bin in the report
        #[arg(long)]
        spectrum: bool,
        /// Analyse the whole trace instead of the trailing buffer window
        #[arg(long)]
        whole: bool,
    },
    /// Detect pulse peaks in a recorded trace
    Peaks {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Zero-padded FFT of a recorded trace
    Spectrum {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Run a live session against the synthetic camera
    Simulate {
        #[arg(long, default_value_t = 72.0)]
        bpm: f64,
        #[arg(long, default_value_t = 60.0)]
        camera_fps: f64,
        /// Session length in seconds (overrides the config file)
        #[arg(long)]
        seconds: Option<u32>,
        /// Red-channel jitter, peak to peak, in 8-bit levels
        #[arg(long, default_value_t = 0.0)]
        noise: f64,
        /// Seeds both the camera jitter and the glucose placeholder
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Pace frames and the countdown against the wall clock
        #[arg(long)]
        realtime: bool,
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// Append the session record to this CSV history
        #[arg(long)]
        history: Option<PathBuf>,
        /// Write the final buffer as `t_ms,value` lines
        #[arg(long)]
        samples_out: Option<PathBuf>,
    },
    /// List stored session records
    History {
        #[arg(long)]
        file: PathBuf,
        /// Only the most recent N records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Render a recorded trace to a PNG via plotters
    Plot {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, value_enum, default_value = "waveform")]
        kind: PlotKind,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            input,
            pipeline,
            spectrum,
            whole,
        } => cmd_analyze(input.as_deref(), &pipeline, spectrum, whole)?,
        Commands::Peaks { input, pipeline } => cmd_peaks(input.as_deref(), &pipeline)?,
        Commands::Spectrum { input, pipeline } => cmd_spectrum(input.as_deref(), &pipeline)?,
        Commands::Simulate {
            bpm,
            camera_fps,
            seconds,
            noise,
            seed,
            realtime,
            pipeline,
            history,
            samples_out,
        } => cmd_simulate(
            SyntheticCameraConfig {
                fps: camera_fps,
                bpm,
                noise,
                seed,
                realtime,
                ..SyntheticCameraConfig::default()
            },
            seconds,
            &pipeline,
            history.as_deref(),
            samples_out.as_deref(),
        )?,
        Commands::History { file, limit } => cmd_history(&file, limit)?,
        Commands::Plot {
            input,
            out,
            kind,
            pipeline,
        } => cmd_plot(input.as_deref(), &out, kind, &pipeline)?,
    }
    Ok(())
}

fn read_samples(input: Option<&Path>, fs: f64) -> Result<Vec<Sample>> {
    match input {
        Some(path) => text_io::read_sample_series(path, fs),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_sample_series(&buf, fs)
        }
    }
}

/// The trailing `capacity` samples, as the live buffer would hold them.
fn window(samples: &[Sample], capacity: usize) -> &[Sample] {
    &samples[samples.len().saturating_sub(capacity)..]
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn cmd_analyze(
    input: Option<&Path>,
    pipeline: &PipelineArgs,
    include_spectrum: bool,
    whole: bool,
) -> Result<()> {
    let cfg = pipeline.resolve()?;
    let samples = read_samples(input, cfg.sample_rate_hz)?;
    let samples = if whole {
        &samples[..]
    } else {
        window(&samples, cfg.buffer_capacity)
    };
    let report = analyze_recording(samples, &cfg, include_spectrum);
    print_json(&report)
}

#[derive(Serialize)]
struct PeaksOutput {
    threshold_factor: f64,
    threshold: f64,
    count: usize,
    indices: Vec<usize>,
    times_ms: Vec<f64>,
}

fn cmd_peaks(input: Option<&Path>, pipeline: &PipelineArgs) -> Result<()> {
    let cfg = pipeline.resolve()?;
    let samples = read_samples(input, cfg.sample_rate_hz)?;
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let peaks = detect_peaks(&values, cfg.threshold_factor);
    let times_ms = peaks.indices.iter().map(|&i| samples[i].t_ms).collect();
    print_json(&PeaksOutput {
        threshold_factor: cfg.threshold_factor,
        threshold: dynamic_threshold(&values, cfg.threshold_factor),
        count: peaks.len(),
        indices: peaks.indices,
        times_ms,
    })
}

#[derive(Serialize)]
struct SpectrumOutput {
    input_len: usize,
    fft_len: usize,
    sample_rate_hz: f64,
    band_limited: bool,
    dominant_hz: Option<f64>,
    spectral_bpm: Option<f64>,
    bins: Vec<SpectrumPoint>,
}

fn cmd_spectrum(input: Option<&Path>, pipeline: &PipelineArgs) -> Result<()> {
    let cfg = pipeline.resolve()?;
    let samples = read_samples(input, cfg.sample_rate_hz)?;
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let band = cfg
        .band_pass_enabled
        .then(|| BandPass::pulse(cfg.sample_rate_hz));
    let spectrum = analyze_spectrum(&values, cfg.sample_rate_hz, band);
    print_json(&SpectrumOutput {
        input_len: values.len(),
        fft_len: spectrum.len(),
        sample_rate_hz: cfg.sample_rate_hz,
        band_limited: spectrum.band_limited,
        dominant_hz: spectrum.dominant_frequency_hz(),
        spectral_bpm: dominant_pulse_bpm(&values, cfg.sample_rate_hz),
        bins: spectrum.points(),
    })
}

#[derive(Serialize)]
struct SimulateOutput {
    reason: FinishReason,
    ticks: u64,
    skipped: u64,
    errors: Vec<String>,
    final_bpm: Option<u32>,
    spectral_bpm: Option<f64>,
    quality: Option<SQIResult>,
    record: Option<SessionRecord>,
    condition_note: &'static str,
    glucose_note: &'static str,
}

fn cmd_simulate(
    camera: SyntheticCameraConfig,
    seconds: Option<u32>,
    pipeline: &PipelineArgs,
    history: Option<&Path>,
    samples_out: Option<&Path>,
) -> Result<()> {
    let mut cfg = pipeline.resolve()?;
    if let Some(seconds) = seconds {
        cfg.session_duration_secs = seconds;
    }
    let cfg = cfg.sanitized();
    let realtime = camera.realtime;
    let seed = camera.seed;
    // Without wall-clock pacing the source itself bounds the session length.
    let camera = SyntheticCameraConfig {
        duration_secs: (!realtime).then_some(cfg.session_duration_secs as f64),
        ..camera
    };
    let source = SyntheticCamera::open(camera).context("opening synthetic camera")?;
    let options = RunnerOptions {
        countdown_interval: realtime.then_some(Duration::from_secs(1)),
        seed: Some(seed),
    };
    info!("simulating {} s session", cfg.session_duration_secs);
    let runner = SessionRunner::start(source, cfg, options);

    let mut errors = Vec::new();
    let mut finished = None;
    for update in runner.updates().iter() {
        match update {
            RunnerUpdate::Error(message) => errors.push(message),
            RunnerUpdate::Finished {
                record,
                reason,
                last_tick,
            } => {
                finished = Some((record, reason, last_tick));
                break;
            }
            RunnerUpdate::Started { .. }
            | RunnerUpdate::Tick(_)
            | RunnerUpdate::TickSkipped { .. }
            | RunnerUpdate::Countdown { .. } => {}
        }
    }
    runner.join()?;
    let Some((record, reason, last_tick)) = finished else {
        bail!("session ended without a result");
    };
    // Progress updates may be dropped under load; count from the record and
    // the final tick instead.
    let ticks = record.as_ref().map_or(0, |r| r.samples_analyzed);
    let skipped = last_tick
        .as_ref()
        .map_or(0, |t| t.frame_stats.frame_count.saturating_sub(ticks));

    if let (Some(path), Some(record)) = (history, record.as_ref()) {
        HistoryStore::new(path).append(record)?;
    }
    if let (Some(path), Some(tick)) = (samples_out, last_tick.as_ref()) {
        std::fs::write(path, text_io::format_sample_series(&tick.buffer))
            .with_context(|| format!("writing samples {}", path.display()))?;
    }

    print_json(&SimulateOutput {
        reason,
        ticks,
        skipped,
        errors,
        final_bpm: last_tick.as_ref().and_then(|t| t.heart_rate),
        spectral_bpm: last_tick.as_ref().and_then(|t| t.spectral_bpm),
        quality: last_tick.as_ref().map(|t| t.quality),
        record,
        condition_note: Condition::disclaimer(),
        glucose_note: GlucoseEstimate::disclaimer(),
    })
}

fn cmd_history(file: &Path, limit: Option<usize>) -> Result<()> {
    let records = HistoryStore::new(file).list()?;
    let start = limit.map_or(0, |n| records.len().saturating_sub(n));
    print_json(&records[start..])
}

fn cmd_plot(
    input: Option<&Path>,
    out: &Path,
    kind: PlotKind,
    pipeline: &PipelineArgs,
) -> Result<()> {
    let cfg = pipeline.resolve()?;
    let samples = read_samples(input, cfg.sample_rate_hz)?;
    let samples = window(&samples, cfg.buffer_capacity);
    let mut estimator = HeartRateEstimator::new();
    let analysis = analyze_window(samples, &cfg, &mut estimator);
    let fig = match kind {
        PlotKind::Waveform => waveform_figure(samples, &analysis.peaks, 2048),
        PlotKind::Spectrum => spectrum_figure(&analysis.spectrum),
    };
    draw_plotters_figure(out, &fig)
}

fn draw_plotters_figure(path: &Path, fig: &Figure) -> Result<()> {
    if let Err(err) = render_figure(path, fig, true) {
        // hosts without system fonts cannot draw text
        warn!("labelled plot failed ({err}), drawing without text");
        render_figure(path, fig, false)?;
    }
    info!("wrote {}", path.display());
    Ok(())
}

fn render_figure(path: &Path, fig: &Figure, text: bool) -> Result<()> {
    let backend = BitMapBackend::new(path, (800, 480));
    let root = backend.into_drawing_area();
    root.fill(&WHITE)?;
    let (x_min, x_max, y_min, y_max) = fig.bounds();
    let mut builder = ChartBuilder::on(&root);
    builder.margin(10);
    if text {
        builder
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(50);
    }
    let mut chart = builder.build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    if text {
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let (r, g, b) = line.style.color.rgb();
                chart.draw_series(LineSeries::new(
                    line.points.iter().map(|p| (p[0], p[1])),
                    RGBColor(r, g, b).stroke_width(line.style.width.round().max(1.0) as u32),
                ))?;
            }
            Series::Markers(markers) => {
                let (r, g, b) = markers.color.rgb();
                let style = RGBColor(r, g, b).filled();
                chart.draw_series(
                    markers
                        .points
                        .iter()
                        .map(|p| Circle::new((p[0], p[1]), markers.radius, style)),
                )?;
            }
        }
    }
    root.present()?;
    Ok(())
}
