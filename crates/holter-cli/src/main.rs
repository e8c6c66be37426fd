use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use holter_lib::{
    config::{load_config, HolterConfig},
    detectors::{
        ecg::{BeatDetector, PanTompkinsDetector, PrecomputedPeaks},
        pvc::{analyze_recording, AmplitudeSource, PvcReport},
    },
    filter::lowpass_filter,
    io::{self as holter_io, metadata::read_metadata, text as text_io, Recording},
    metrics::{
        amplitude::{amplitude_mode, ModeTieBreak},
        baseline::Baseline,
    },
    plot::{figure_from_pvc_report, Figure, PlotBackend, Series},
    signal::{Events, RRSeries, TimeSeries},
    store::{CsvStore, EcgStore, SqliteStore},
};
use log::LevelFilter;
use plotters::prelude::*;
use serde_json::json;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

const DEFAULT_FS: f64 = 1000.0;
const PLOT_POINTS: usize = 4096;

#[derive(Parser)]
#[command(
    name = "holter",
    version,
    about = "Holter monitor ECG analysis: premature ventricular contraction screening"
)]
struct Cli {
    /// Default log level; RUST_LOG takes precedence when set
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log: LogLevel,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TieBreak {
    First,
    Last,
}

impl From<TieBreak> for ModeTieBreak {
    fn from(value: TieBreak) -> Self {
        match value {
            TieBreak::First => ModeTieBreak::First,
            TieBreak::Last => ModeTieBreak::Last,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ModeSource {
    Filtered,
    Raw,
}

impl From<ModeSource> for AmplitudeSource {
    fn from(value: ModeSource) -> Self {
        match value {
            ModeSource::Filtered => AmplitudeSource::Filtered,
            ModeSource::Raw => AmplitudeSource::Raw,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StoreFormat {
    /// Single SQLite database file
    Sqlite,
    /// Directory of CSV files
    Csv,
}

fn open_store(path: &Path, format: StoreFormat) -> Result<Box<dyn EcgStore>> {
    Ok(match format {
        StoreFormat::Sqlite => Box::new(SqliteStore::open(path)?),
        StoreFormat::Csv => Box::new(CsvStore::new(path)),
    })
}

/// Where the ECG samples come from and how to interpret them.
#[derive(clap::Args, Debug)]
struct SignalArgs {
    /// Recording (.lvm, .bin, or delimited text); stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,
    /// Sampling rate in Hz (falls back to --metadata, the LVM header, then 1000)
    #[arg(long)]
    fs: Option<f64>,
    /// JSON acquisition metadata with sampling_rate/start_time/units
    #[arg(long)]
    metadata: Option<PathBuf>,
    /// Column holding ECG values in text input
    #[arg(long, default_value_t = 0)]
    column: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and grade PVC candidates, printing the report as JSON
    PvcDetect {
        #[command(flatten)]
        signal: SignalArgs,
        /// Newline-delimited R-peak sample indices; skips beat detection
        #[arg(long)]
        rpeaks: Option<PathBuf>,
        /// TOML file with [pvc] and [detector] tables
        #[arg(long)]
        config: Option<PathBuf>,
        /// Butterworth low-pass cutoff in Hz
        #[arg(long)]
        cutoff_hz: Option<f64>,
        /// Butterworth low-pass order
        #[arg(long)]
        filter_order: Option<usize>,
        /// Baseline window length in seconds
        #[arg(long)]
        window_s: Option<f64>,
        /// Fraction below baseline an interval must fall to count as premature
        #[arg(long)]
        prematurity: Option<f64>,
        /// Fraction above baseline the following interval must reach
        #[arg(long)]
        compensatory: Option<f64>,
        /// Allowed deviation of the interval pair mean from baseline
        #[arg(long)]
        distance_tolerance: Option<f64>,
        /// Amplitude histogram bin count
        #[arg(long)]
        histogram_bins: Option<usize>,
        /// Which bin wins when several share the top count
        #[arg(long, value_enum)]
        tie_break: Option<TieBreak>,
        /// Signal the amplitude mode is taken from
        #[arg(long, value_enum)]
        mode_source: Option<ModeSource>,
        /// Persist samples and candidates here
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "sqlite")]
        store_format: StoreFormat,
        /// Render the filtered trace with tier markers to a PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Condition the signal and print detected R-peaks as JSON
    EcgFindRpeaks {
        #[command(flatten)]
        signal: SignalArgs,
        /// TOML file with [pvc] and [detector] tables
        #[arg(long)]
        config: Option<PathBuf>,
        /// Refractory period between beats in seconds
        #[arg(long)]
        min_rr_s: Option<f64>,
        /// Butterworth low-pass cutoff in Hz
        #[arg(long)]
        cutoff_hz: Option<f64>,
    },
    /// Windowed robust RR baseline from R-peak indices (file or stdin)
    RrBaseline {
        #[arg(long)]
        rpeaks: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_FS)]
        fs: f64,
        #[arg(long, default_value_t = 10.0)]
        window_s: f64,
    },
    /// Histogram mode of the signal amplitude
    AmplitudeMode {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        column: usize,
        #[arg(long, default_value_t = 10)]
        bins: usize,
        #[arg(long, value_enum, default_value = "first")]
        tie_break: TieBreak,
    },
    /// Query a store written by `pvc-detect --store`
    StoreQuery {
        #[arg(long)]
        store: PathBuf,
        #[arg(long, value_enum, default_value = "sqlite")]
        store_format: StoreFormat,
        /// Print the stored sample count
        #[arg(long)]
        length: bool,
        /// Range start (seconds, inclusive)
        #[arg(long, requires = "end")]
        start: Option<f64>,
        /// Range end (seconds, exclusive)
        #[arg(long, requires = "start")]
        end: Option<f64>,
        /// Print one sample by index
        #[arg(long)]
        point: Option<usize>,
        /// Print stored PVC candidates
        #[arg(long)]
        pvcs: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log.into())
        .parse_default_env()
        .init();
    match cli.command {
        Commands::PvcDetect {
            signal,
            rpeaks,
            config,
            cutoff_hz,
            filter_order,
            window_s,
            prematurity,
            compensatory,
            distance_tolerance,
            histogram_bins,
            tie_break,
            mode_source,
            store,
            store_format,
            plot,
        } => {
            let mut cfg = read_config(config.as_deref())?;
            let pvc = &mut cfg.pvc;
            override_field(&mut pvc.cutoff_hz, cutoff_hz);
            override_field(&mut pvc.filter_order, filter_order);
            override_field(&mut pvc.window_s, window_s);
            override_field(&mut pvc.prematurity, prematurity);
            override_field(&mut pvc.compensatory, compensatory);
            override_field(&mut pvc.distance_tolerance, distance_tolerance);
            override_field(&mut pvc.histogram_bins, histogram_bins);
            override_field(&mut pvc.mode_tie_break, tie_break.map(Into::into));
            override_field(&mut pvc.amplitude_source, mode_source.map(Into::into));
            let store = store.map(|path| (path, store_format));
            cmd_pvc_detect(&signal, rpeaks.as_deref(), &cfg, store, plot.as_deref())?
        }
        Commands::EcgFindRpeaks {
            signal,
            config,
            min_rr_s,
            cutoff_hz,
        } => {
            let mut cfg = read_config(config.as_deref())?;
            override_field(&mut cfg.detector.min_rr_s, min_rr_s);
            override_field(&mut cfg.pvc.cutoff_hz, cutoff_hz);
            cmd_ecg_find_rpeaks(&signal, &cfg)?
        }
        Commands::RrBaseline {
            rpeaks,
            fs,
            window_s,
        } => cmd_rr_baseline(rpeaks.as_deref(), fs, window_s)?,
        Commands::AmplitudeMode {
            input,
            column,
            bins,
            tie_break,
        } => cmd_amplitude_mode(input.as_deref(), column, bins, tie_break.into())?,
        Commands::StoreQuery {
            store,
            store_format,
            length,
            start,
            end,
            point,
            pvcs,
        } => {
            let store = open_store(&store, store_format)?;
            cmd_store_query(store.as_ref(), length, start.zip(end), point, pvcs)?
        }
    }
    Ok(())
}

fn override_field<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn read_config(path: Option<&Path>) -> Result<HolterConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(HolterConfig::default()),
    }
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn read_samples(input: Option<&Path>, column: usize) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_column(path, column),
        None => text_io::parse_column(&read_stdin()?, column),
    }
}

fn read_rpeaks(input: Option<&Path>) -> Result<Events> {
    let indices = match input {
        Some(path) => text_io::read_event_indices(path)?,
        None => text_io::parse_event_indices(&read_stdin()?)?,
    };
    Ok(Events::from_indices(indices))
}

fn load_signal(args: &SignalArgs) -> Result<Recording> {
    let metadata_fs = match &args.metadata {
        Some(path) => Some(read_metadata(path)?.sampling_rate),
        None => None,
    };
    let fs = args.fs.or(metadata_fs);
    match &args.input {
        Some(path) => {
            let is_lvm = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("lvm"));
            let fs = if is_lvm { fs } else { Some(fs.unwrap_or(DEFAULT_FS)) };
            holter_io::load_recording(path, fs, args.column)
        }
        None => {
            let data = text_io::parse_column(&read_stdin()?, args.column)?;
            Ok(TimeSeries::new(fs.unwrap_or(DEFAULT_FS), data)?.into())
        }
    }
}

fn cmd_pvc_detect(
    signal: &SignalArgs,
    rpeaks: Option<&Path>,
    cfg: &HolterConfig,
    store: Option<(PathBuf, StoreFormat)>,
    plot: Option<&Path>,
) -> Result<()> {
    let recording = load_signal(signal)?;
    let detector: Box<dyn BeatDetector> = match rpeaks {
        Some(path) => Box::new(PrecomputedPeaks::new(read_rpeaks(Some(path))?)),
        None => Box::new(PanTompkinsDetector::new(cfg.detector)),
    };
    let analysis = analyze_recording(&recording.series, detector.as_ref(), &cfg.pvc)
        .context("PVC detection failed")?;

    if let Some((path, format)) = store {
        open_store(&path, format)?.upload(
            &recording.time,
            &recording.series.data,
            &analysis.report.candidates,
        )?;
    }
    if let Some(out) = plot {
        let fig = figure_from_pvc_report(
            &analysis.filtered,
            &analysis.report.candidates,
            PLOT_POINTS,
        );
        PngBackend::new(out).draw(&fig)?;
    }
    print_report(&analysis.report)
}

fn print_report(report: &PvcReport) -> Result<()> {
    println!("{}", serde_json::to_string(report)?);
    Ok(())
}

fn cmd_ecg_find_rpeaks(signal: &SignalArgs, cfg: &HolterConfig) -> Result<()> {
    let ts = load_signal(signal)?.series;
    let conditioned = lowpass_filter(&ts, cfg.pvc.cutoff_hz, cfg.pvc.filter_order)?;
    let detection = PanTompkinsDetector::new(cfg.detector).detect(&conditioned);
    println!("{}", serde_json::to_string(&detection.rpeaks)?);
    Ok(())
}

fn cmd_rr_baseline(rpeaks: Option<&Path>, fs: f64, window_s: f64) -> Result<()> {
    let events = read_rpeaks(rpeaks)?;
    let rr = RRSeries::from_events(&events, fs)?;
    let baseline = Baseline::estimate(&rr, window_s)?;
    println!(
        "{}",
        json!({
            "intervals": rr.intervals,
            "boundaries": baseline.boundaries,
            "averages": baseline.averages,
        })
    );
    Ok(())
}

fn cmd_amplitude_mode(
    input: Option<&Path>,
    column: usize,
    bins: usize,
    tie_break: ModeTieBreak,
) -> Result<()> {
    let data = read_samples(input, column)?;
    let mode = amplitude_mode(&data, bins, tie_break)?;
    println!("{}", json!({ "mode": mode, "bins": bins }));
    Ok(())
}

fn cmd_store_query(
    store: &dyn EcgStore,
    length: bool,
    range: Option<(f64, f64)>,
    point: Option<usize>,
    pvcs: bool,
) -> Result<()> {
    let mut answered = false;
    if length {
        println!("{}", json!({ "length": store.query_length()? }));
        answered = true;
    }
    if let Some((start, end)) = range {
        let (time, ecg) = store.query_range(start, end)?;
        println!("{}", json!({ "time": time, "ecg": ecg }));
        answered = true;
    }
    if let Some(index) = point {
        let value = store
            .query_point(index)?
            .map(|(time, ecg)| json!({ "index": index, "time": time, "ecg": ecg }));
        println!("{}", value.unwrap_or(serde_json::Value::Null));
        answered = true;
    }
    if pvcs || !answered {
        let candidates = store.query_pvcs(0, usize::MAX)?;
        println!("{}", serde_json::to_string(&candidates)?);
    }
    Ok(())
}

/// Renders figures to a PNG file through plotters' bitmap backend.
struct PngBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PngBackend {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            size: (1200, 480),
        }
    }
}

impl PlotBackend for PngBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let root = BitMapBackend::new(&self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let (x_min, x_max) = padded(fig.bounds(0).unwrap_or((0.0, 1.0)));
        let (y_min, y_max) = padded(fig.bounds(1).unwrap_or((0.0, 1.0)));
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        let mut mesh = chart.configure_mesh();
        if let Some(label) = &fig.x.label {
            mesh.x_desc(label.as_str());
        }
        if let Some(label) = &fig.y.label {
            mesh.y_desc(label.as_str());
        }
        mesh.draw()?;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let (r, g, b) = line.style.color.rgb();
                    let color = RGBColor(r, g, b);
                    chart
                        .draw_series(LineSeries::new(
                            line.points.iter().map(|p| (p[0], p[1])),
                            &color,
                        ))?
                        .label(line.name.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                }
                Series::Scatter(scatter) => {
                    let (r, g, b) = scatter.style.color.rgb();
                    let color = RGBColor(r, g, b);
                    let radius = scatter.style.width.round() as i32;
                    chart
                        .draw_series(
                            scatter
                                .points
                                .iter()
                                .map(|p| Circle::new((p[0], p[1]), radius, color.filled())),
                        )?
                        .label(scatter.name.as_str())
                        .legend(move |(x, y)| Circle::new((x + 10, y), radius, color.filled()));
                }
            }
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        root.present()?;
        Ok(())
    }
}

fn padded((lo, hi): (f64, f64)) -> (f64, f64) {
    if hi > lo {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}
