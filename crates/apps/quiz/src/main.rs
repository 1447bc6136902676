use std::env;
use std::path::PathBuf;
use std::rc::Rc;

use catalog::Catalog;
use clap::Parser;
use game::{Game, Mode};
use layers::{HeadlessMap, LayerManager};
use runtime::clock::{Clock, SystemClock};
use runtime::viewport::ViewportReactor;
use streaming::{FetchCoordinator, HttpTransport};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod command;
mod session;

use command::Line;
use session::{Flow, Session};

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal geography quiz over Natural Earth boundaries")]
struct Args {
    /// Catalog override (JSON); defaults to $QUIZ_CATALOG, then the built-in tables
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Cache proxy origin used for warm-up (default: $CACHE_PROXY_ORIGIN)
    #[arg(long)]
    cache_proxy: Option<String>,

    /// Starting mode: name, flag or city
    #[arg(long, default_value = "name")]
    mode: Mode,

    /// Seed for reproducible target picks
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run(args))
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let catalog_path = args
        .catalog
        .or_else(|| env::var("QUIZ_CATALOG").ok().map(PathBuf::from));
    let catalog = match catalog_path {
        Some(path) => {
            info!(?path, "loading catalog override");
            Catalog::load(&path)?
        }
        None => Catalog::default(),
    };
    let catalog = Rc::new(catalog);
    let proxy = args
        .cache_proxy
        .or_else(|| env::var("CACHE_PROXY_ORIGIN").ok());

    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let http = reqwest::Client::new();
    let start = catalog.start;
    let map = Rc::new(HeadlessMap::new(start.lat, start.lng, start.zoom));
    let fetcher = Rc::new(FetchCoordinator::new(Box::new(HttpTransport::new(
        http.clone(),
    ))));
    let manager = Rc::new(LayerManager::new(
        catalog.clone(),
        fetcher,
        map.clone(),
        clock.clone(),
    ));
    let game = match args.seed {
        Some(seed) => Game::with_seed(catalog.clone(), clock, seed),
        None => Game::new(catalog.clone(), clock),
    };

    let mut session = Session {
        catalog,
        map,
        manager: manager.clone(),
        reactor: ViewportReactor::new(),
        game,
        http: http.clone(),
    };

    info!("loading boundaries");
    session.start().await?;
    if args.mode != Mode::Name {
        let layer = session.manager.active_country_layer();
        let effects = session.game.set_mode(args.mode, layer.as_deref());
        session.apply(effects).await;
    }
    tokio::task::spawn_local(session::warm_up(manager, http, proxy));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match Line::parse_input(&line) {
            Ok(command) => {
                if session.execute(command).await == Flow::Quit {
                    break;
                }
            }
            Err(err) => println!("{err}"),
        }
    }
    Ok(())
}
