use std::{
    error::Error,
    io::{self, BufReader},
    net::TcpStream,
};

use clap::Parser;
use log::info;

use blockwire::{
    ClientConfig, Connection,
    cli::LineSource,
    protocol::{ColumnType, CompressionMethod, Settings},
};

/// Streams tab-separated rows from stdin into a table.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address, as host:port
    address: String,
    /// Target table
    table: String,
    /// Column types of the input, in table order (e.g. `UInt32,String,Date`)
    #[arg(long, value_delimiter = ',', required = true)]
    columns: Vec<ColumnType>,
    /// Compress data blocks with lz4, lz4hc, zstd or none
    #[arg(long)]
    compression: Option<CompressionMethod>,
    /// Compression level used with zstd
    #[arg(long, default_value_t = 1)]
    zstd_level: u64,
    #[arg(long, default_value = "default")]
    database: String,
    #[arg(long, default_value = "default")]
    user: String,
    #[arg(long, default_value = "")]
    password: String,
    /// Threads compressing outbound blocks
    #[arg(long, default_value_t = 2)]
    workers: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let stream = TcpStream::connect(&cli.address)?;
    stream.set_nodelay(true)?;
    info!("connected to {}", cli.address);

    let config = ClientConfig {
        database: cli.database,
        username: cli.user,
        password: cli.password,
        compression_workers: cli.workers,
        ..ClientConfig::default()
    };
    let mut settings = Settings::new();
    if let Some(method) = cli.compression {
        settings = settings.with_compression(method);
        if method == CompressionMethod::Zstd {
            settings = settings.with_zstd_level(cli.zstd_level);
        }
    }

    let source = LineSource::new(BufReader::new(io::stdin()), cli.columns);
    let mut connection = Connection::new(stream, config);
    let summary = connection.insert(&format!("INSERT INTO {} VALUES", cli.table), &settings, source)?;

    println!("inserted {} rows in {} blocks", summary.rows, summary.blocks);
    Ok(())
}
