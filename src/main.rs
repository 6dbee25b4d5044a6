//! Camera Session CLI
//!
//! Drives a simulated camera through create, initialize and a series of
//! still captures, writing JPEGs with their orientation tag.

use camera_session::{
    hardware::simulated::{SimulatedCamera, SimulatedSurfaces},
    metrics::{MetricsRegistry, MetricsSnapshot},
    CameraService, FileConfig, SessionEvent,
};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const INIT_TIMEOUT: Duration = Duration::from_secs(5);
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(author, version, about = "Camera session demo on the simulated backend", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Camera to open
    #[arg(long)]
    camera: Option<String>,

    /// Number of stills to take
    #[arg(long)]
    captures: Option<u32>,

    /// Pause between stills in milliseconds
    #[arg(long = "interval-ms")]
    interval_ms: Option<u64>,

    /// Directory receiving captured stills
    #[arg(long = "output-dir", value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Keep capturing until Ctrl-C
    #[arg(long)]
    continuous: bool,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    info!("Camera Session v{}", camera_session::VERSION);

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(camera) = args.camera {
        config.output.camera = camera;
    }
    if let Some(captures) = args.captures {
        config.output.captures = captures;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.output.interval_ms = interval_ms;
    }
    if let Some(output_dir) = args.output_dir {
        config.session.output_dir = output_dir;
    }
    if let Err(e) = config.session.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    if args.continuous {
        let flag = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Ctrl+C received, stopping after the current capture");
            flag.store(false, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {}", e);
        }
    }

    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to create metrics registry: {}", e);
            std::process::exit(1);
        }
    };
    let exporter = start_exporter(config.output.metrics_port, registry);

    let camera = SimulatedCamera::with_default_cameras();
    let (events_tx, events) = unbounded();
    let service = CameraService::new(
        Arc::new(camera.clone()),
        Arc::new(camera),
        Arc::new(SimulatedSurfaces::new()),
        Arc::new(events_tx),
        config.session.clone(),
    );

    if let Err(e) = service.create(config.output.camera.as_str()) {
        eprintln!("Failed to create camera session: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = service.initialize() {
        eprintln!("Failed to initialize camera: [{}] {}", e.code(), e);
        std::process::exit(1);
    }
    if !wait_initialized(&events) {
        let _ = service.dispose();
        std::process::exit(1);
    }

    let mut taken = 0u32;
    let mut failed = 0u32;
    let interval = Duration::from_millis(config.output.interval_ms);

    while running.load(Ordering::SeqCst) && (args.continuous || taken + failed < config.output.captures)
    {
        let ticket = match service.take_picture() {
            Ok(ticket) => ticket,
            Err(e) => {
                error!("takePicture rejected: [{}] {}", e.code(), e);
                break;
            }
        };
        match ticket.wait_timeout(CAPTURE_TIMEOUT) {
            Some(Ok(path)) => {
                taken += 1;
                println!("{}", path.display());
            }
            Some(Err(e)) => {
                failed += 1;
                warn!("Capture failed: [{}] {}", e.code(), e);
            }
            None => {
                failed += 1;
                warn!("Capture timed out after {:?}", CAPTURE_TIMEOUT);
            }
        }

        drain_events(&events);
        if let (Some(exporter), Some(snapshot)) = (&exporter, service.snapshot()) {
            exporter.update(&snapshot);
        }
        std::thread::sleep(interval);
    }

    let snapshot = service.snapshot().unwrap_or_default();
    if let Err(e) = service.dispose() {
        warn!("Dispose failed: {}", e);
    }
    drain_events(&events);

    info!(
        "Done. {} captured, {} failed, {} opens",
        taken, failed, snapshot.stats.opens
    );
    if let Some(exporter) = exporter {
        exporter.update(&snapshot);
        if let Some(text) = exporter.encode() {
            print!("{}", text);
        }
    }
}

/// Blocks until the session reports `initialized`, or fails.
fn wait_initialized(events: &Receiver<SessionEvent>) -> bool {
    match events.recv_timeout(INIT_TIMEOUT) {
        Ok(SessionEvent::Initialized {
            preview_width,
            preview_height,
        }) => {
            info!("Camera initialized at {}x{}", preview_width, preview_height);
            true
        }
        Ok(SessionEvent::Error { description }) => {
            error!("Camera error: {}", description.unwrap_or_default());
            false
        }
        Ok(SessionEvent::Closing) => {
            error!("Camera closed during initialization");
            false
        }
        Err(_) => {
            error!("Camera did not initialize within {:?}", INIT_TIMEOUT);
            false
        }
    }
}

fn drain_events(events: &Receiver<SessionEvent>) {
    for event in events.try_iter() {
        match event {
            SessionEvent::Error { description } => {
                warn!("Camera error: {}", description.unwrap_or_default())
            }
            other => info!("Camera event: {:?}", other),
        }
    }
}

/// Metrics sink for the capture loop.
enum Exporter {
    Local(MetricsRegistry),
    #[cfg(feature = "metrics")]
    Http {
        state: Arc<tokio::sync::RwLock<camera_session::metrics::MetricsState>>,
        _thread: std::thread::JoinHandle<()>,
    },
}

impl Exporter {
    fn update(&self, snapshot: &MetricsSnapshot) {
        match self {
            Self::Local(registry) => registry.update(snapshot),
            #[cfg(feature = "metrics")]
            Self::Http { state, .. } => state.blocking_write().update(snapshot),
        }
    }

    fn encode(&self) -> Option<String> {
        match self {
            Self::Local(registry) => registry.encode().ok(),
            #[cfg(feature = "metrics")]
            Self::Http { .. } => None,
        }
    }
}

#[cfg(feature = "metrics")]
fn start_exporter(port: u16, registry: MetricsRegistry) -> Option<Exporter> {
    use camera_session::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return Some(Exporter::Local(registry));
    }
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
    let state = server.state();
    let thread = std::thread::Builder::new()
        .name("metrics-server".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start metrics runtime: {}", e);
                    return;
                }
            };
            if let Err(e) = runtime.block_on(server.run()) {
                error!("Metrics server stopped: {}", e);
            }
        });
    match thread {
        Ok(thread) => Some(Exporter::Http {
            state,
            _thread: thread,
        }),
        Err(e) => {
            warn!("Failed to spawn metrics server thread: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "metrics"))]
fn start_exporter(_port: u16, registry: MetricsRegistry) -> Option<Exporter> {
    Some(Exporter::Local(registry))
}
