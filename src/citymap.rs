use anyhow::Context;
use citymap::city::format_coords;
use citymap::config::{AppConfig, LocatorKind};
use citymap::geolocation::request_position;
use citymap::gui;
use citymap::loader::{LibraryLoader, probe_map_service};
use citymap::scene::Scene;
use citymap::sdk::MapFactory;
use citymap::session::{Session, SessionConfig, SessionStatus, SubmitOutcome};
use citymap::store::CityStore;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("APP_GIT_HASH"), ")");
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const HEADLESS_LIMIT: Duration = Duration::from_secs(30);

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about = "Shows a city feed as pins on a map.", long_about = None)]
struct Cli {
    /// Config file [default: <config dir>/citymap.conf]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides [feed] base_url and $CITYMAP_BACKEND_URL
    #[arg(long, value_name = "URL")]
    backend_url: Option<String>,

    /// Run without a window and print the resulting pins
    #[arg(long)]
    headless: bool,

    /// Filter term applied once the cities are loaded
    #[arg(long, value_name = "TERM")]
    search: Option<String>,

    /// Center the map on the city with this exact name
    #[arg(long, value_name = "NAME")]
    go: Option<String>,

    #[arg(long)]
    no_geolocation: bool,

    /// -v for debug, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn log_filter(&self) -> EnvFilter {
        let level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("citymap={level}")))
    }

    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => AppConfig::default_path()?,
        };
        let mut config = AppConfig::load_or_create(&path)
            .with_context(|| format!("loading {}", path.display()))?;
        config.apply_env();
        if let Some(url) = &self.backend_url {
            config.feed.base_url = url.clone();
        }
        if self.no_geolocation {
            config.geolocation.provider = LocatorKind::Off;
        }
        Ok(config)
    }
}

fn build_session(config: &AppConfig, library: LibraryLoader<Scene>) -> anyhow::Result<Session<Scene>> {
    let session_config = SessionConfig::try_from(config)?;
    let cities = CityStore::load(&config.feed);
    let geolocation = config.geolocation.clone();
    Ok(Session::new(session_config, library, cities, move || request_position(&geolocation)))
}

fn run_headless(cli: &Cli, mut session: Session<Scene>) -> ExitCode {
    let deadline = Instant::now() + HEADLESS_LIMIT;
    let settle = |session: &mut Session<Scene>| {
        loop {
            session.pump(Instant::now());
            if session.is_settled() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
    };

    settle(&mut session);
    if !session.is_settled() {
        tracing::warn!("gave up waiting after {}s", HEADLESS_LIMIT.as_secs());
    }

    match session.status() {
        SessionStatus::MapUnavailable(error) => {
            eprintln!("Error: map unavailable: {error}");
            return ExitCode::FAILURE;
        }
        SessionStatus::Ready { feed_error: Some(error), .. } => {
            eprintln!("Error: city list unavailable: {error}");
            return ExitCode::FAILURE;
        }
        SessionStatus::Loading { .. } => {
            eprintln!("Error: timed out waiting for the map and city list");
            return ExitCode::FAILURE;
        }
        SessionStatus::Ready { .. } => {}
    }

    if let Some(term) = &cli.search {
        session.on_search_input(term, Instant::now());
        settle(&mut session);
    }
    if let Some(name) = &cli.go {
        match session.on_search_submit(name) {
            SubmitOutcome::Centered => {}
            SubmitOutcome::NotFound => eprintln!("No city named \"{name}\""),
            SubmitOutcome::Ambiguous(n) => eprintln!("{n} cities are named \"{name}\", not moving"),
            SubmitOutcome::NotReady => eprintln!("Map is not ready"),
        }
    }

    for pin in session.pins() {
        println!("{}\t{}", pin.city.name, format_coords(&pin.city.position));
    }
    if let SessionStatus::Ready { shown, total, .. } = session.status() {
        println!("Showing {shown} of {total} cities.");
    }
    if let Some(map) = session.map()
        && let Some(center) = session.sdk().and_then(|scene| scene.map_center(map.id()))
    {
        println!("Center: {}", format_coords(&center));
    }
    match (session.user_position(), session.geolocation_failure()) {
        (Some(at), _) => println!("You: {}", format_coords(&at)),
        (None, Some(error)) => println!("You: unknown ({error})"),
        (None, None) => {}
    }

    session.shutdown();
    ExitCode::SUCCESS
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_env_filter(cli.log_filter()).with_writer(std::io::stderr).init();
    tracing::debug!("citymap {VERSION}");

    let config = cli.load_config()?;

    if cli.headless {
        let session = build_session(&config, LibraryLoader::ready_now(Scene::new()))?;
        return Ok(run_headless(&cli, session));
    }

    let probe_url = config.map.tile_probe_url.clone();
    let library = LibraryLoader::spawn(move || {
        probe_map_service(&probe_url, PROBE_TIMEOUT).map(|()| Scene::new())
    });
    let session = build_session(&config, library)?;
    println!("Launching map...");
    gui::run(&config, session).map_err(|e| anyhow::anyhow!("GUI error: {e}"))?;
    Ok(ExitCode::SUCCESS)
}
