use anyhow::Result;
use c11204_lib::serialport::SerialPowerSupply;
use log::{error, info};
use serde_json::json;
use std::time::Duration;

use crate::commandline::OutputFormat;

pub fn run(
    psu: &mut SerialPowerSupply,
    format: OutputFormat,
    interval: Duration,
    count: Option<u64>,
) -> Result<()> {
    info!("Starting watch mode: format={format:?}, interval={interval:?}, count={count:?}");
    let mut readings = 0;
    loop {
        match psu.get_monitor_info() {
            Ok(monitor) => match format {
                OutputFormat::Text => {
                    println!("--- Data at {} ---", chrono::Local::now().to_rfc3339());
                    println!("{monitor}");
                    println!("--------------------------");
                }
                OutputFormat::Json => {
                    let data = json!({
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                        "monitor": monitor,
                    });
                    println!("{data}");
                }
            },
            Err(e) => error!("Error fetching monitor info: {e}"),
        }
        readings += 1;
        if count.is_some_and(|count| readings >= count) {
            break;
        }
        std::thread::sleep(interval);
    }
    Ok(())
}
