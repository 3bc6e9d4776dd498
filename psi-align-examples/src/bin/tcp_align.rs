//! TCP-based alignment example.
//!
//! Two processes align their id sets over a TCP connection. Messages are
//! sent as newline-delimited JSON; every bucket of the configured bucket
//! count is aligned as its own batch.
//!
//! Run server:
//! ```bash
//! cargo run --bin tcp_align -- server --start 0 --end 10000
//! ```
//!
//! Run client (in another terminal):
//! ```bash
//! cargo run --bin tcp_align -- client --start 9000 --end 11000
//! ```

use clap::Parser;
use psi_align::{run_bucketed, CommRole, Message, PsiConfig, PsiError, Transport};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tcp_align")]
#[command(about = "Align an id set with a peer over TCP", long_about = None)]
struct Cli {
    /// Side of the connection: server or client
    mode: CommRole,

    /// Address the server listens on and the client connects to
    #[arg(long, default_value = "127.0.0.1:7878")]
    address: String,

    /// Alignment config file (TOML); defaults are used if omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// File with one id per line; overrides --start/--end
    #[arg(long)]
    input: Option<PathBuf>,

    /// First generated id
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// End of generated ids (exclusive)
    #[arg(long, default_value_t = 1000)]
    end: u64,

    /// Write the intersection here, one id per line
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Newline-delimited JSON over one TCP stream.
struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl TcpTransport {
    fn new(stream: TcpStream) -> std::io::Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader,
            writer: BufWriter::new(stream),
        })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, message: Message) -> psi_align::Result<()> {
        let to_transport = |e: std::io::Error| PsiError::Transport(e.to_string());
        serde_json::to_writer(&mut self.writer, &message)
            .map_err(|e| PsiError::Transport(e.to_string()))?;
        self.writer.write_all(b"\n").map_err(to_transport)?;
        self.writer.flush().map_err(to_transport)
    }

    fn receive(&mut self) -> psi_align::Result<Message> {
        let mut line = String::new();
        let bytes = self
            .reader
            .read_line(&mut line)
            .map_err(|e| PsiError::Transport(e.to_string()))?;
        if bytes == 0 {
            return Err(PsiError::Transport("connection closed by peer".to_string()));
        }
        serde_json::from_str(&line)
            .map_err(|e| PsiError::ProtocolViolation(format!("malformed message: {e}")))
    }
}

fn load_items(cli: &Cli) -> Result<Vec<Vec<u8>>, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.input {
        let contents = fs::read_to_string(path)?;
        return Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.as_bytes().to_vec())
            .collect());
    }
    Ok((cli.start..cli.end)
        .map(|i| i.to_string().into_bytes())
        .collect())
}

fn connect(cli: &Cli) -> std::io::Result<TcpStream> {
    match cli.mode {
        CommRole::Server => {
            let listener = TcpListener::bind(&cli.address)?;
            println!("Listening on {}", cli.address);
            println!("Waiting for client connection...");
            let (stream, addr) = listener.accept()?;
            println!("Connected to {}", addr);
            Ok(stream)
        }
        CommRole::Client => {
            println!("Connecting to {}", cli.address);
            let stream = TcpStream::connect(&cli.address)?;
            println!("Connected to server");
            Ok(stream)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PsiConfig::load(path)?,
        None => PsiConfig::default(),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("=== PSI TCP Alignment ({}) ===", cli.mode);
    let items = load_items(&cli)?;
    println!("Loaded {} ids", items.len());

    let stream = connect(&cli)?;
    let mut transport = TcpTransport::new(stream)?;

    let start = Instant::now();
    let intersection = run_bucketed(&config, &items, cli.mode, &mut transport)?;
    info!(
        buckets = config.bucket_num,
        intersection = intersection.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "alignment finished"
    );

    println!("\n=== Results ===");
    println!("Intersection size: {}", intersection.len());
    for item in intersection.iter().take(10) {
        println!("  {}", String::from_utf8_lossy(item));
    }
    if intersection.len() > 10 {
        println!("  ... and {} more", intersection.len() - 10);
    }

    if let Some(path) = &cli.output {
        let mut out = BufWriter::new(fs::File::create(path)?);
        for item in &intersection {
            out.write_all(item)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        println!("Wrote intersection to {}", path.display());
    }

    println!("\n✓ Alignment completed!");
    Ok(())
}
