#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::rc::Rc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use sketchsync::envelopes::{Path, Point, to_wire_json};
use sketchsync::net::api::{ApiClient, ApiError};
use sketchsync::net::ws::WsConnector;
use sketchsync::net::{ConnectionScope, HandlerSet};
use sketchsync::sketch::{Raster, Surface};
use sketchsync::state::ChatBody;
use sketchsync::timers::TokioTimers;
use sketchsync::{ConfigError, Session, SyncClient, SyncConfig};
use tokio::sync::watch;
use tokio::task::LocalSet;
use tracing::{info, trace, warn};

const STATUS_KEY: &str = "cli-status";
const PRINTER_KEY: &str = "cli-printer";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Lets the socket task write queued frames before the runtime stops.
const FLUSH_GRACE: Duration = Duration::from_millis(200);
/// Largest sketch side the local raster will allocate.
const MAX_SKETCH_SIDE: u32 = 4096;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line {line}: expected `x,y`, got `{text}`")]
    BadPoint { line: usize, text: String },
    #[error("timed out waiting for the {0} socket")]
    Timeout(ConnectionScope),
    #[error("message was not sent")]
    NotSent,
    #[error("sketch is {width}x{height}, larger than {max} per side", max = MAX_SKETCH_SIDE)]
    SketchTooLarge { width: u32, height: u32 },
}

#[derive(Parser, Debug)]
#[command(name = "sketchsync", about = "Chat and sketch sync client")]
struct Cli {
    #[arg(long, env = "SKETCHSYNC_TOKEN", hide_env_values = true)]
    token: String,

    #[arg(long, env = "SKETCHSYNC_USERNAME", help = "Defaults to the name the API reports for the token")]
    username: Option<String>,

    #[arg(long, help = "Overrides SKETCHSYNC_WS_URL")]
    ws_url: Option<String>,

    #[arg(long, help = "Overrides SKETCHSYNC_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print channel and system traffic until interrupted.
    Watch(WatchArgs),
    /// Send one chat message.
    Say { channel: String, message: String },
    /// Replay strokes from a file onto a sketch.
    Draw(DrawArgs),
    /// List a channel's sketches as JSON.
    Sketches { channel: String },
}

#[derive(Args, Debug)]
struct WatchArgs {
    channel: String,

    #[arg(long, help = "Sketch to follow and rasterize")]
    sketch: Option<String>,

    #[arg(long, help = "Stop after this many seconds instead of waiting for Ctrl-C")]
    seconds: Option<u64>,

    #[arg(long, default_value_t = false)]
    history: bool,

    #[arg(long, default_value_t = false, help = "Print the followed sketch on exit")]
    ascii: bool,
}

#[derive(Args, Debug)]
struct DrawArgs {
    channel: String,

    #[arg(long, help = "Existing sketch id; a new sketch is created when omitted")]
    sketch: Option<String>,

    #[arg(long, default_value = "CLI sketch")]
    name: String,

    #[arg(long, default_value_t = 64)]
    width: u32,

    #[arg(long, default_value_t = 32)]
    height: u32,

    #[arg(long, default_value_t = 1)]
    stroke: u32,

    #[arg(long, default_value_t = false)]
    erase: bool,

    #[arg(long, default_value = "-", help = "Point file (`x,y` per line, blank line ends a stroke), or - for stdin")]
    input: String,

    #[arg(long, default_value_t = 10)]
    interval_ms: u64,

    #[arg(long, default_value_t = false, help = "Join the channel through the API first")]
    join: bool,

    #[arg(long, default_value_t = false)]
    ascii: bool,
}

struct Context {
    config: SyncConfig,
    api: ApiClient,
    token: String,
    username: Option<String>,
}

impl Context {
    async fn session(&self) -> Result<Session, CliError> {
        let username = match &self.username {
            Some(name) => name.clone(),
            None => self.api.validate_token().await?.username,
        };
        Ok(Session::new(self.token.clone(), username))
    }

    fn client(&self, session: Session, raster: &Rc<RefCell<Raster>>) -> SyncClient {
        SyncClient::new(
            &self.config,
            session,
            Rc::new(WsConnector),
            Rc::new(TokioTimers::new()),
            Box::new(SharedRaster(Rc::clone(raster))),
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    LocalSet::new().run_until(run(cli)).await
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = SyncConfig::from_env()?;
    if let Some(url) = cli.ws_url {
        config.ws_url = url.trim_end_matches('/').to_owned();
    }
    if let Some(url) = cli.api_url {
        config.api_url = url.trim_end_matches('/').to_owned();
    }
    let ctx = Context { api: ApiClient::new(&config.api_url, &cli.token), config, token: cli.token, username: cli.username };

    match cli.command {
        Command::Watch(args) => run_watch(&ctx, args).await,
        Command::Say { channel, message } => run_say(&ctx, &channel, &message).await,
        Command::Draw(args) => run_draw(&ctx, args).await,
        Command::Sketches { channel } => run_sketches(&ctx, &channel).await,
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

async fn run_watch(ctx: &Context, args: WatchArgs) -> Result<(), CliError> {
    let session = ctx.session().await?;
    let sketch = match &args.sketch {
        Some(id) => Some(ctx.api.get_sketch(id).await?),
        None => None,
    };
    let (width, height) = sketch.as_ref().map_or((1, 1), |s| (s.width, s.height));
    let raster = raster_for(width, height)?;
    let client = ctx.client(session, &raster);

    for scope in ConnectionScope::ALL {
        client.manager().add_handlers(scope, PRINTER_KEY, printer());
    }
    let mut status = connection_watch(&client, ConnectionScope::Channel);
    client.start();
    client.join_channel(&args.channel);
    wait_connected(&mut status, ConnectionScope::Channel).await?;

    if args.history {
        let history = ctx.api.message_history(&args.channel).await?;
        client.channel().load_history(&history);
        for message in client.channel().messages() {
            match message.body {
                ChatBody::Text(text) => println!("[{}] {}: {text}", args.channel, message.username),
                ChatBody::Image(url) => println!("[{}] {}: <image {url}>", args.channel, message.username),
            }
        }
    }
    if let Some(sketch) = sketch {
        client.sketch().select_sketch(sketch);
    }

    match args.seconds {
        Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
        None => tokio::signal::ctrl_c().await?,
    }

    client.shutdown();
    tokio::time::sleep(FLUSH_GRACE).await;
    if args.ascii {
        println!("{}", ascii(&raster.borrow()));
    }
    Ok(())
}

async fn run_say(ctx: &Context, channel: &str, message: &str) -> Result<(), CliError> {
    let session = ctx.session().await?;
    let client = ctx.client(session, &Rc::new(RefCell::new(Raster::new(1, 1))));
    let mut status = connection_watch(&client, ConnectionScope::Channel);
    client.join_channel(channel);
    wait_connected(&mut status, ConnectionScope::Channel).await?;

    let sent = client.send_chat(message);
    client.shutdown();
    tokio::time::sleep(FLUSH_GRACE).await;
    if sent { Ok(()) } else { Err(CliError::NotSent) }
}

async fn run_draw(ctx: &Context, args: DrawArgs) -> Result<(), CliError> {
    let strokes = read_strokes(&args.input)?;
    let session = ctx.session().await?;
    if args.join {
        ctx.api.join_channel(&args.channel).await?;
    }
    let (sketch, created) = match &args.sketch {
        Some(id) => (ctx.api.get_sketch(id).await?, false),
        None => (ctx.api.create_sketch(&args.channel, &args.name, args.width, args.height).await?, true),
    };
    info!(sketch = %sketch.id, created, "drawing onto sketch");

    let raster = raster_for(sketch.width, sketch.height)?;
    let client = ctx.client(session, &raster);
    let mut status = connection_watch(&client, ConnectionScope::Channel);
    client.join_channel(&args.channel);
    wait_connected(&mut status, ConnectionScope::Channel).await?;

    let sync = client.sketch();
    if created {
        sync.announce_created(sketch.clone());
    }
    sync.select_sketch(sketch);

    let pause = Duration::from_millis(args.interval_ms);
    for stroke in &strokes {
        let Some((first, rest)) = stroke.split_first() else {
            continue;
        };
        sync.start_path(*first, !args.erase, args.stroke);
        for point in rest {
            tokio::time::sleep(pause).await;
            sync.continue_path(*point);
        }
        sync.complete_path();
    }

    let pending = sync.pending_paths().len();
    if pending > 0 {
        warn!(pending, "some strokes were not submitted");
    }
    info!(strokes = strokes.len(), "drawing sent");

    client.shutdown();
    tokio::time::sleep(FLUSH_GRACE).await;
    if args.ascii {
        println!("{}", ascii(&raster.borrow()));
    }
    Ok(())
}

async fn run_sketches(ctx: &Context, channel: &str) -> Result<(), CliError> {
    let sketches = ctx.api.list_sketches(channel).await?;
    print_json(&to_wire_json(&sketches)?)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Raster shared with the command so it can be printed on exit.
struct SharedRaster(Rc<RefCell<Raster>>);

impl Surface for SharedRaster {
    fn render_path(&mut self, path: &Path) {
        trace!(points = path.points.len(), erase = !path.is_drawing, "render");
        self.0.borrow_mut().render_path(path);
    }

    fn clear(&mut self) {
        trace!("clear");
        self.0.borrow_mut().clear();
    }
}

/// Local raster for a sketch whose dimensions came from the server.
fn raster_for(width: u32, height: u32) -> Result<Rc<RefCell<Raster>>, CliError> {
    if width > MAX_SKETCH_SIDE || height > MAX_SKETCH_SIDE {
        return Err(CliError::SketchTooLarge { width, height });
    }
    Ok(Rc::new(RefCell::new(Raster::new(width, height))))
}

fn printer() -> HandlerSet {
    HandlerSet::new()
        .on_chat(|e, body| println!("[{}] {}: {body}", e.channel_name, e.username))
        .on_member_update(|e, u| {
            println!("[{}] member {} {:?} (admin: {})", e.channel_name, u.username, u.action, u.is_admin);
        })
        .on_user_status(|e, s| println!("[{}] {} is {:?}", e.channel_name, s.username, s.action))
        .on_channel_update(|_, u| println!("channel {} {:?}", u.channel.name, u.action))
        .on_system_user_status(|_, s| println!("{} users online", s.count))
        .on_sketch(|e, c| {
            let partial = if c.is_partial() { " (partial)" } else { "" };
            println!("[{}] {} sketch {} {:?}{partial}", e.channel_name, e.username, c.sketch_id, c.command_type);
        })
}

fn connection_watch(client: &SyncClient, scope: ConnectionScope) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(client.manager().is_connected(scope));
    let handlers = HandlerSet::new().on_connection_change(move |connected| {
        tx.send_replace(connected);
    });
    client.manager().add_handlers(scope, STATUS_KEY, handlers);
    rx
}

async fn wait_connected(status: &mut watch::Receiver<bool>, scope: ConnectionScope) -> Result<(), CliError> {
    match tokio::time::timeout(CONNECT_TIMEOUT, status.wait_for(|connected| *connected)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(CliError::Timeout(scope)),
    }
}

fn read_strokes(input: &str) -> Result<Vec<Vec<Point>>, CliError> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };
    parse_strokes(reader)
}

/// One point per line; a blank line ends the current stroke.
fn parse_strokes(reader: impl BufRead) -> Result<Vec<Vec<Point>>, CliError> {
    let mut strokes = Vec::new();
    let mut current = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            if !current.is_empty() {
                strokes.push(std::mem::take(&mut current));
            }
            continue;
        }
        let point = parse_point(text).ok_or_else(|| CliError::BadPoint { line: index + 1, text: text.to_owned() })?;
        current.push(point);
    }
    if !current.is_empty() {
        strokes.push(current);
    }
    Ok(strokes)
}

fn parse_point(text: &str) -> Option<Point> {
    let mut parts = text.split(|c: char| c == ',' || c.is_whitespace()).filter(|p| !p.is_empty());
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    parts.next().is_none().then_some(Point::new(x, y))
}

fn ascii(raster: &Raster) -> String {
    let width = i32::try_from(raster.width()).unwrap_or(i32::MAX);
    let height = i32::try_from(raster.height()).unwrap_or(i32::MAX);
    (0..height)
        .map(|y| (0..width).map(|x| if raster.is_inked(x, y) { '#' } else { '.' }).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
