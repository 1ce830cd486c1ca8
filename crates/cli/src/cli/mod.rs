
use clap::Parser;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;

/// Default port of the browser client's dev server.
pub const DEFAULT_CLIENT_PORT: u16 = 5173;

/// Default bound of the loopback engine's video frame queue.
pub const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 8;

const HELP_STYLES: Styles = Styles::styled()
	.header(AnsiColor::Green.on_default().bold())
	.usage(AnsiColor::Green.on_default().bold())
	.literal(AnsiColor::Cyan.on_default())
	.placeholder(AnsiColor::Cyan.on_default())
	.valid(AnsiColor::Cyan.on_default())
	.error(AnsiColor::Red.on_default().bold());

/// Websocket server bridging browser sessions to the assistant engine.
#[derive(Parser, Debug)]
#[command(name = "bridge-server")]
#[command(about = "Assistant session bridge - websocket server for the assistant UI")]
#[command(version)]
#[command(styles = HELP_STYLES)]
pub struct Cli {
	/// Increase verbosity (-v lifecycle, -vv routing, -vvv every frame)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Port the browser client is served from; its localhost origins are allowed
	#[arg(long, env = "CLIENT_PORT", default_value_t = DEFAULT_CLIENT_PORT)]
	pub client_port: u16,

	/// Extra allowed origins, comma separated
	#[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', value_name = "ORIGINS")]
	pub allowed_origins: Vec<String>,

	/// Shared key websocket clients must present as `?key=`
	#[arg(long, env = "BRIDGE_SECRET_KEY", hide_env_values = true, value_name = "KEY")]
	pub secret_key: Option<String>,

	/// Video frames the assistant keeps queued before dropping the oldest
	#[arg(long, env = "FRAME_QUEUE_CAPACITY", default_value_t = DEFAULT_FRAME_QUEUE_CAPACITY)]
	pub frame_queue_capacity: usize,
}
