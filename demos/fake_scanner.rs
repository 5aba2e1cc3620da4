//! Loopback scanner station.
//!
//! Listens like a camera station does: every capture command deposits a photo and an
//! overlay into the imagery root, then emits the matching scan document.
//!
//! ```text
//! cargo run --example fake_scanner -- --port 2323 --imagery-root ftp-root
//! ```

use std::path::{Path, PathBuf};

use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use scanlink::network::decoder::DISCONNECT_SENTINEL;

#[derive(Parser)]
#[command(name = "fake_scanner")]
#[command(about = "Loopback scanner station for scanlink")]
struct Args {
    #[arg(long, default_value_t = 2323)]
    port: u16,
    #[arg(long, default_value = "ftp-root")]
    imagery_root: PathBuf,
    #[arg(long, default_value = "||>trigger on")]
    capture_command: String,
    #[arg(long, default_value = "cam")]
    image_name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    tokio::fs::create_dir_all(&args.imagery_root).await?;
    let listener = TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("fake scanner listening on {}", listener.local_addr()?);

    let mut index = 0u64;
    loop {
        let (stream, peer) = listener.accept().await?;
        info!("controller connected from {}", peer);
        if let Err(e) = serve(stream, &args, &mut index).await {
            warn!("session with {} ended: {}", peer, e);
        }
    }
}

async fn serve(stream: TcpStream, args: &Args, index: &mut u64) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let command = line.trim_end();
        if command == "quit" {
            write_half
                .write_all(format!("{}\r\n", DISCONNECT_SENTINEL).as_bytes())
                .await?;
            return Ok(());
        }
        if command != args.capture_command {
            info!("ignoring command {:?}", command);
            continue;
        }

        *index += 1;
        deposit(&args.imagery_root, &args.image_name, *index).await?;
        let document = serde_json::json!({
            "codes": [
                {"content": format!("PKG-{:04}", index), "corners": square(40.0, 40.0, 120.0)},
                {"content": format!("LOT-{:04}", index), "corners": square(220.0, 60.0, 80.0)},
            ],
            "image": {"name": args.image_name, "trigger": {"index": *index}},
        });
        write_half
            .write_all(format!("{}\r\n", document).as_bytes())
            .await?;
        info!("capture {} emitted", index);
    }
    Ok(())
}

fn square(x: f64, y: f64, side: f64) -> serde_json::Value {
    serde_json::json!([
        {"x": x, "y": y},
        {"x": x + side, "y": y},
        {"x": x + side, "y": y + side},
        {"x": x, "y": y + side},
    ])
}

async fn deposit(root: &Path, name: &str, index: u64) -> std::io::Result<()> {
    let base = format!("{}-{}", name, index);
    // SOI and EOI markers
    tokio::fs::write(root.join(format!("{}.jpg", base)), [0xFF, 0xD8, 0xFF, 0xD9]).await?;
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300">"#,
            r#"<text x="10" y="20">capture {}</text>"#,
            r#"<polygon class="result" points="40,40 160,40 160,160 40,160"/>"#,
            "</svg>"
        ),
        index
    );
    tokio::fs::write(root.join(format!("{}.svg", base)), svg).await
}
