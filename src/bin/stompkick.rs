//! Stompkick CLI - Command-line interface for the stomp/kick detector
//!
//! Commands:
//! - run: Stream samples and commands from stdin, write events and responses to stdout
//! - analyze: Detect gestures in a recorded sample file (batch mode)
//! - decode: Convert hex-encoded im600 packets into bridge JSON samples
//! - config: Print the effective thresholds

use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use stompkick::adapters::{parse_hex, BridgeJsonAdapter, Im600PacketAdapter, SampleAdapter};
use stompkick::control::{Command, CommandDispatcher, Inbound, Response};
use stompkick::{
    ChannelSink, DetectorHandle, DetectorStatus, EngineError, EventSink, MotionDetector,
    MotionEvent, NdjsonSink, ThresholdField, Thresholds, ENGINE_VERSION, PRODUCER_NAME,
};

/// Capacity of the event queue between the detector and the output writer
const EVENT_QUEUE: usize = 1024;

/// Stompkick - Streaming stomp/kick detection for wearable IMU sensors
#[derive(Parser)]
#[command(name = "stompkick")]
#[command(author = "Stompkick Contributors")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Detect stomp and kick gestures in IMU sample streams", long_about = None)]
struct Cli {
    /// Log output format (logs go to stderr)
    #[arg(long, global = true, default_value = "plain")]
    log_format: LogFormat,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream bridge samples and commands from stdin (streaming mode)
    Run {
        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// Flush output after each record
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Detect gestures in a recorded bridge sample file (batch mode)
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Sample rate used to stamp samples that carry no timestamp (Hz)
        #[arg(long, default_value = "50")]
        rate: f64,

        /// Append the final detector status to the output
        #[arg(long)]
        stats: bool,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },

    /// Decode hex-encoded im600 packets (one per line) into bridge JSON samples
    Decode {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Packet rate used for synthetic timestamps (Hz)
        #[arg(long, default_value = "50")]
        rate: f64,

        /// Omit the raw packet from each output record
        #[arg(long)]
        no_raw: bool,
    },

    /// Print the effective thresholds as JSON
    Config {
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
}

#[derive(Args, Clone, Default)]
struct ThresholdArgs {
    /// Load thresholds from a JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Short-window intensity that starts a gesture
    #[arg(long)]
    intensity_threshold: Option<f64>,

    /// Minimum gesture duration in seconds
    #[arg(long)]
    min_duration: Option<f64>,

    /// Maximum gesture duration in seconds
    #[arg(long)]
    max_duration: Option<f64>,

    /// Minimum seconds between two events
    #[arg(long)]
    cooldown: Option<f64>,

    /// Seconds a calibration waits for the window to refill
    #[arg(long)]
    calibration_timeout: Option<f64>,
}

impl ThresholdArgs {
    /// Defaults, then the config file, then individual flags
    fn resolve(&self) -> Result<Thresholds, StompkickCliError> {
        let mut thresholds = match &self.config {
            Some(path) => Thresholds::from_json(&fs::read_to_string(path)?)?,
            None => Thresholds::default(),
        };

        let overrides = [
            (ThresholdField::MotionIntensityThreshold, self.intensity_threshold),
            (ThresholdField::MinMotionDuration, self.min_duration),
            (ThresholdField::MaxMotionDuration, self.max_duration),
            (ThresholdField::Cooldown, self.cooldown),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                thresholds.set(field, finite(field.as_str(), value)?);
            }
        }
        if let Some(value) = self.calibration_timeout {
            thresholds.calibration_timeout = finite("calibration_timeout", value)?;
        }

        Ok(thresholds)
    }
}

fn finite(field: &str, value: f64) -> Result<f64, StompkickCliError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::configuration(field, format!("expected a finite number, got {value}")).into())
    }
}

#[derive(Clone, ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Plain,
    /// One JSON object per log record
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_format, &cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(format: &LogFormat, default_level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Plain => registry
            .with(fmt::layer().with_writer(io::stderr).with_target(false))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(io::stderr).with_thread_names(true))
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("failed to initialize logging: {e}");
    }
}

fn run(cli: Cli) -> Result<(), StompkickCliError> {
    match cli.command {
        Commands::Run { thresholds, flush } => cmd_run(thresholds.resolve()?, flush),

        Commands::Analyze {
            input,
            output,
            output_format,
            rate,
            stats,
            thresholds,
        } => cmd_analyze(
            &input,
            &output,
            output_format,
            rate,
            stats,
            thresholds.resolve()?,
        ),

        Commands::Decode {
            input,
            output,
            rate,
            no_raw,
        } => cmd_decode(&input, &output, rate, !no_raw),

        Commands::Config { thresholds } => {
            println!("{}", thresholds.resolve()?.to_json()?);
            Ok(())
        }
    }
}

fn cmd_run(thresholds: Thresholds, flush: bool) -> Result<(), StompkickCliError> {
    let (event_tx, event_rx) = channel::bounded::<MotionEvent>(EVENT_QUEUE);
    let (response_tx, response_rx) = channel::unbounded::<Response>();

    let handle = DetectorHandle::with_sink(
        MotionDetector::with_thresholds(thresholds),
        Box::new(ChannelSink::new(event_tx)),
    );
    info!(
        producer = PRODUCER_NAME,
        version = ENGINE_VERSION,
        detector_id = %handle.status().detector_id,
        "streaming started"
    );

    let writer = thread::Builder::new()
        .name("output".to_string())
        .spawn(move || write_output(event_rx, response_rx, flush))?;

    let (calibrate_tx, calibrate_rx) = channel::unbounded::<Command>();
    let worker = {
        let dispatcher = CommandDispatcher::new(handle.clone());
        let response_tx = response_tx.clone();
        thread::Builder::new()
            .name("calibration".to_string())
            .spawn(move || {
                for command in calibrate_rx {
                    dispatcher.dispatch(command, &response_tx);
                }
            })?
    };

    let mut router = StreamRouter::new(handle, response_tx, calibrate_tx);
    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }
        router.route(trimmed);
    }

    let stats = router.handle.stats();
    let rejected = router.rejected;
    // A pending calibration finishes (or times out) before output closes
    drop(router);
    if worker.join().is_err() {
        warn!("calibration worker panicked");
    }
    writer.join().map_err(|_| StompkickCliError::WriterPanicked)??;

    info!(
        stomp = stats.stomp,
        kick = stats.kick,
        total_processed = stats.total_processed,
        rejected,
        "streaming finished"
    );
    Ok(())
}

/// Applies one `run` input line at a time, in input order.
///
/// Samples and every command except `calibrate` are handled on the reading
/// thread, so a threshold change takes effect on the very next sample line.
/// Calibration blocks until the window refills and is handed to a worker.
struct StreamRouter {
    handle: DetectorHandle,
    dispatcher: CommandDispatcher,
    responses: Sender<Response>,
    calibrations: Sender<Command>,
    started: Instant,
    rejected: usize,
}

impl StreamRouter {
    fn new(handle: DetectorHandle, responses: Sender<Response>, calibrations: Sender<Command>) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(handle.clone()),
            handle,
            responses,
            calibrations,
            started: Instant::now(),
            rejected: 0,
        }
    }

    fn route(&mut self, line: &str) {
        match Inbound::parse(line) {
            Ok(Inbound::Command(Command::Calibrate)) => {
                if self.calibrations.send(Command::Calibrate).is_err() {
                    warn!("calibration worker stopped; ignoring command");
                }
            }
            Ok(Inbound::Command(command)) => self.dispatcher.dispatch(command, &self.responses),
            Ok(Inbound::Sample(sample)) => {
                let result = sample
                    .into_sample(self.started.elapsed().as_secs_f64())
                    .and_then(|s| self.handle.process(s));
                if let Err(e) = result {
                    self.rejected += 1;
                    warn!(error = %e, "sample rejected");
                }
            }
            Err(e) => {
                self.rejected += 1;
                warn!(error = %e, "unreadable input line");
            }
        }
    }
}

/// Merge events and responses onto stdout until both producers hang up
fn write_output(
    mut events: Receiver<MotionEvent>,
    mut responses: Receiver<Response>,
    flush: bool,
) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut events_open = true;
    let mut responses_open = true;

    while events_open || responses_open {
        let line = select! {
            recv(events) -> msg => match msg {
                Ok(event) => Some(serde_json::to_string(&event)),
                Err(_) => {
                    events_open = false;
                    None
                }
            },
            recv(responses) -> msg => match msg {
                Ok(response) => Some(serde_json::to_string(&response)),
                Err(_) => {
                    responses_open = false;
                    None
                }
            },
        };

        if !events_open {
            events = channel::never();
        }
        if !responses_open {
            responses = channel::never();
        }

        if let Some(line) = line {
            writeln!(out, "{}", line?)?;
            if flush {
                out.flush()?;
            }
        }
    }

    out.flush()
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    rate: f64,
    with_stats: bool,
    thresholds: Thresholds,
) -> Result<(), StompkickCliError> {
    let period = sample_period(rate)?;
    let input_data = read_input(input)?;

    let adapter = BridgeJsonAdapter::new();
    let mut detector = MotionDetector::with_thresholds(thresholds);
    let mut events: Vec<MotionEvent> = Vec::new();
    let mut samples = 0usize;

    for (index, line) in input_data.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
        let fallback = index as f64 * period;
        let sample = match adapter.decode(line, fallback) {
            Ok(sample) => sample,
            Err(e) => {
                warn!(record = index + 1, error = %e, "skipping unreadable sample");
                continue;
            }
        };

        samples += 1;
        match detector.process(sample) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => warn!(record = index + 1, error = %e, "sample rejected"),
        }
    }

    if samples == 0 {
        return Err(StompkickCliError::NoSamples);
    }
    debug!(samples, events = events.len(), "analysis finished");

    let status = with_stats.then(|| detector.status());
    let output_data = format_output(&events, status.as_ref(), &output_format)?;
    write_destination(output, &output_data)
}

#[derive(Serialize)]
struct AnalysisReport<'a> {
    events: &'a [MotionEvent],
    status: &'a DetectorStatus,
}

fn format_output(
    events: &[MotionEvent],
    status: Option<&DetectorStatus>,
    format: &OutputFormat,
) -> Result<String, StompkickCliError> {
    let output = match (format, status) {
        (OutputFormat::Ndjson, _) => {
            let mut sink = NdjsonSink::new(Vec::new()).with_flush(false);
            for event in events {
                sink.deliver(event)?;
            }
            let mut out = sink.into_inner();
            if let Some(status) = status {
                serde_json::to_writer(&mut out, status)?;
                out.push(b'\n');
            }
            String::from_utf8(out).map_err(|e| {
                StompkickCliError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
            })?
        }
        (OutputFormat::Json, None) => serde_json::to_string(events)? + "\n",
        (OutputFormat::JsonPretty, None) => serde_json::to_string_pretty(events)? + "\n",
        (OutputFormat::Json, Some(status)) => {
            serde_json::to_string(&AnalysisReport { events, status })? + "\n"
        }
        (OutputFormat::JsonPretty, Some(status)) => {
            serde_json::to_string_pretty(&AnalysisReport { events, status })? + "\n"
        }
    };
    Ok(output)
}

fn cmd_decode(input: &Path, output: &Path, rate: f64, keep_raw: bool) -> Result<(), StompkickCliError> {
    let period = sample_period(rate)?;
    let input_data = read_input(input)?;

    let packets = Im600PacketAdapter::new();
    let bridge = BridgeJsonAdapter::new();
    let mut lines = Vec::new();

    for (line_no, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let timestamp = lines.len() as f64 * period;
        let decoded = parse_hex(trimmed).and_then(|bytes| {
            let sample = packets.decode(&bytes, timestamp)?;
            bridge.encode(&sample, keep_raw.then_some(bytes.as_slice()))
        });

        match decoded {
            Ok(json) => lines.push(json),
            Err(e) => warn!(line = line_no + 1, adapter = packets.name(), error = %e, "skipping packet"),
        }
    }

    if lines.is_empty() {
        return Err(StompkickCliError::NoSamples);
    }

    let mut output_data = lines.join("\n");
    output_data.push('\n');
    write_destination(output, &output_data)
}

fn sample_period(rate: f64) -> Result<f64, StompkickCliError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(1.0 / rate)
    } else {
        Err(StompkickCliError::InvalidRate(rate))
    }
}

fn read_input(input: &Path) -> Result<String, StompkickCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_destination(output: &Path, data: &str) -> Result<(), StompkickCliError> {
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum StompkickCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    NoSamples,
    InvalidRate(f64),
    WriterPanicked,
}

impl From<io::Error> for StompkickCliError {
    fn from(e: io::Error) -> Self {
        StompkickCliError::Io(e)
    }
}

impl From<EngineError> for StompkickCliError {
    fn from(e: EngineError) -> Self {
        StompkickCliError::Engine(e)
    }
}

impl From<serde_json::Error> for StompkickCliError {
    fn from(e: serde_json::Error) -> Self {
        StompkickCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<StompkickCliError> for CliError {
    fn from(e: StompkickCliError) -> Self {
        match e {
            StompkickCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            StompkickCliError::Engine(EngineError::Configuration { field, message }) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: format!("{field}: {message}"),
                hint: Some("Run 'stompkick config' to inspect the effective thresholds".to_string()),
            },
            StompkickCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            StompkickCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            StompkickCliError::NoSamples => CliError {
                code: "NO_SAMPLES".to_string(),
                message: "No readable samples found in input".to_string(),
                hint: Some("Ensure each line is a bridge sample or a hex packet".to_string()),
            },
            StompkickCliError::InvalidRate(rate) => CliError {
                code: "INVALID_RATE".to_string(),
                message: format!("Sample rate must be a positive number, got {rate}"),
                hint: None,
            },
            StompkickCliError::WriterPanicked => CliError {
                code: "INTERNAL_ERROR".to_string(),
                message: "Output writer stopped unexpectedly".to_string(),
                hint: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stompkick::{DetectionStats, MotionLabel, MotionScores, Sample, Vector3};

    fn event(timestamp: f64) -> MotionEvent {
        MotionEvent {
            motion_type: MotionLabel::Kick,
            confidence: 0.85,
            timestamp,
            scores: MotionScores {
                stomp: 2.0,
                kick: 8.5,
            },
            reasons: vec![],
            stats: DetectionStats {
                stomp: 0,
                kick: 1,
                total_processed: 100,
            },
        }
    }

    #[test]
    fn test_threshold_flags_override_defaults() {
        let args = ThresholdArgs {
            cooldown: Some(1.0),
            intensity_threshold: Some(0.2),
            ..ThresholdArgs::default()
        };
        let thresholds = args.resolve().unwrap();
        assert_eq!(thresholds.cooldown, 1.0);
        assert_eq!(thresholds.motion_intensity_threshold, 0.2);
        assert_eq!(thresholds.max_motion_duration, 3.0);
    }

    #[test]
    fn test_non_finite_flag_is_rejected() {
        let args = ThresholdArgs {
            min_duration: Some(f64::NAN),
            ..ThresholdArgs::default()
        };
        assert!(matches!(
            args.resolve(),
            Err(StompkickCliError::Engine(EngineError::Configuration { .. }))
        ));
    }

    #[test]
    fn test_ndjson_output_appends_status() {
        let detector = MotionDetector::new();
        let status = detector.status();
        let output =
            format_output(&[event(1.0), event(4.0)], Some(&status), &OutputFormat::Ndjson).unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("\"detector_id\""));
    }

    #[test]
    fn test_json_output_is_array_without_status() {
        let output = format_output(&[event(1.0)], None, &OutputFormat::Json).unwrap();
        let parsed: Vec<MotionEvent> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, vec![event(1.0)]);
        assert_eq!(format_output(&[], None, &OutputFormat::Ndjson).unwrap(), "");
    }

    #[test]
    fn test_sample_period() {
        assert_eq!(sample_period(50.0).unwrap(), 0.02);
        assert!(sample_period(0.0).is_err());
        assert!(sample_period(f64::INFINITY).is_err());
    }

    const DT: f64 = 0.02;

    fn sample_lines(start: usize, count: usize, stomping: bool) -> Vec<String> {
        (start..start + count)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                let (accel, gyro) = if stomping {
                    (Vector3::new(sign, 0.0, 1.0 + 2.0 * sign), Vector3::new(0.0, 40.0 * sign, 0.0))
                } else {
                    (Vector3::new(0.0, 0.0, 1.0), Vector3::default())
                };
                BridgeJsonAdapter
                    .encode(&Sample::new(i as f64 * DT, accel, gyro), None)
                    .unwrap()
            })
            .collect()
    }

    struct Session {
        router: StreamRouter,
        events: Receiver<MotionEvent>,
        responses: Receiver<Response>,
        calibrations: Receiver<Command>,
    }

    fn session() -> Session {
        let (event_tx, events) = channel::unbounded();
        let (response_tx, responses) = channel::unbounded();
        let (calibrate_tx, calibrations) = channel::unbounded();
        let handle = DetectorHandle::with_sink(
            MotionDetector::new(),
            Box::new(ChannelSink::new(event_tx)),
        );
        Session {
            router: StreamRouter::new(handle, response_tx, calibrate_tx),
            events,
            responses,
            calibrations,
        }
    }

    fn stomp_input(setter: Option<&str>) -> Vec<String> {
        let mut lines = sample_lines(0, 30, false);
        lines.extend(setter.map(str::to_string));
        lines.extend(sample_lines(30, 60, true));
        lines.extend(sample_lines(90, 30, false));
        lines
    }

    #[test]
    fn test_setter_applies_before_next_sample_line() {
        let mut s = session();
        let setter = r#"{"command":"set_intensity_threshold","value":1000}"#;
        for line in stomp_input(Some(setter)) {
            s.router.route(&line);
        }

        assert_eq!(
            s.responses.try_recv().unwrap(),
            Response::ThresholdUpdated {
                field: "motion_intensity_threshold".to_string(),
                value: 1000.0
            }
        );
        assert!(s.events.try_recv().is_err());
        assert_eq!(s.router.handle.stats().total_processed, 120);
        assert_eq!(s.router.rejected, 0);
    }

    #[test]
    fn test_same_stream_without_setter_emits() {
        let mut s = session();
        for line in stomp_input(None) {
            s.router.route(&line);
        }
        assert_eq!(s.events.try_recv().unwrap().motion_type, MotionLabel::Stomp);
    }

    #[test]
    fn test_queries_answer_inline_and_calibrate_is_deferred() {
        let mut s = session();
        for line in sample_lines(0, 5, false) {
            s.router.route(&line);
        }
        s.router.route(r#"{"command":"ping"}"#);
        s.router.route(r#"{"command":"calibrate"}"#);
        s.router.route(r#"{"command":"get_stats"}"#);
        s.router.route("not json");

        assert_eq!(s.responses.try_recv().unwrap(), Response::Pong);
        match s.responses.try_recv().unwrap() {
            Response::Stats { stats } => assert_eq!(stats.total_processed, 5),
            other => panic!("unexpected response {other:?}"),
        }
        assert!(s.responses.try_recv().is_err());
        assert_eq!(s.calibrations.try_recv().unwrap(), Command::Calibrate);
        assert_eq!(s.router.rejected, 1);
    }
}
