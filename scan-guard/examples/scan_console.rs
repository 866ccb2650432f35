//! Interactive scan console
//!
//! Reads one barcode per line from stdin and runs it through the guard, the
//! way a handheld's scan hook would.
//!
//! Commands:
//! - `O-BTN.progress`: print per-line progress
//! - `O-BTN.sync`: run a sync cycle now
//! - `O-BTN.offline` / `O-BTN.online`: toggle the connectivity indicator
//! - `O-CMD.EXIT`: finish the picking and quit
//!
//! Run: SCAN_GUARD_BASE_URL=http://localhost:8069 cargo run --example scan_console -- <picking_id>

use scan_guard::{GuardConfig, PickingGuard, ScanOutcome, TracingNotifier};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    scan_guard::logger::init_logger();

    let picking_id: i64 = std::env::args()
        .nth(1)
        .ok_or("usage: scan_console <picking_id>")?
        .parse()?;

    let config = GuardConfig::from_env();
    println!("\nStrict picking {picking_id} @ {}", config.base_url);
    println!("=====================================\n");

    let mut guard = PickingGuard::connect(config, picking_id, Arc::new(TracingNotifier))?;
    guard.load().await?;
    guard.start_sync();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match guard.on_scan(&line).await {
            ScanOutcome::Command(cmd) => match cmd.as_str() {
                "O-CMD.EXIT" => break,
                "O-BTN.progress" => {
                    for p in guard.progress().await {
                        println!(
                            "  line {:>4}  product {:>6}  {}/{}",
                            p.line_id, p.product_id, p.qty_done, p.qty_reserved
                        );
                    }
                    if guard.is_complete().await {
                        println!("  picking complete");
                    }
                }
                "O-BTN.sync" => println!("  {:?}", guard.sync_now().await),
                "O-BTN.offline" => guard.set_online(false),
                "O-BTN.online" => guard.set_online(true),
                other => println!("  unhandled command {other}"),
            },
            ScanOutcome::Rejected(rejection) => println!("  ✗ {rejection}"),
            outcome => println!("  {outcome:?}"),
        }
    }

    if guard.finish().await? {
        println!("Session closed");
    } else {
        println!("Unsynced scans kept for the next run");
    }
    Ok(())
}
