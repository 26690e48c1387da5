use anyhow::{Context, Result};
use c11204_lib::serialport::{SerialPowerSupply, SerialResolver};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use serde_json::json;
use std::{ops::Deref, panic};

mod commandline;
mod config;
mod watch;

use commandline::{CliArgs, CliCommands, OutputFormat};
use config::Config;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn load_config(args: &CliArgs) -> Result<Config> {
    let mut config = Config::load_or_default(args.config.as_deref())?;
    if let Some(device) = &args.device {
        config.device = Some(device.clone());
    }
    if let Some(description) = &args.description {
        config.description = description.clone();
    }
    if let Some(timeout) = args.timeout {
        config.timeout = timeout;
    }
    if let Some(voltage_min) = args.min_voltage {
        config.voltage_min = voltage_min;
    }
    if let Some(voltage_max) = args.max_voltage {
        config.voltage_max = voltage_max;
    }
    debug!("Effective configuration: {config:?}");
    Ok(config)
}

fn connect(config: &Config) -> Result<SerialPowerSupply> {
    let resolver = match &config.device {
        Some(device) => SerialResolver::path(device.as_str()),
        None => SerialResolver::description(config.description.as_str()),
    }
    .timeout(config.timeout);
    let psu = SerialPowerSupply::connect(&resolver)
        .with_context(|| format!("Cannot open serial port {:?}", resolver.selector()))?;
    Ok(psu.with_limits(config.voltage_limits()?))
}

fn print_value(format: OutputFormat, name: &str, value: f64, unit: &str) {
    match format {
        OutputFormat::Text => println!("{name}: {value} {unit}"),
        OutputFormat::Json => {
            let mut data = serde_json::Map::new();
            data.insert(name.to_string(), json!(value));
            println!("{}", serde_json::Value::Object(data));
        }
    }
}

fn print_serialized<T: serde::Serialize + std::fmt::Display>(
    format: OutputFormat,
    value: &T,
) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{value}"),
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    let config = load_config(&args)?;
    let mut psu = connect(&config)?;

    match args.command {
        CliCommands::Monitor => print_serialized(
            args.format,
            &psu.get_monitor_info()
                .with_context(|| "Cannot get monitor info")?,
        )?,
        CliCommands::Power => {
            let (voltage, current) = psu
                .get_power_info()
                .with_context(|| "Cannot get power info")?;
            match args.format {
                OutputFormat::Text => {
                    println!("High Voltage Output      :   {voltage} V");
                    println!("Output current           :   {current} mA");
                }
                OutputFormat::Json => {
                    println!("{}", json!({ "voltage": voltage, "current": current }))
                }
            }
        }
        CliCommands::Voltage => print_value(
            args.format,
            "voltage",
            psu.get_voltage().with_context(|| "Cannot get voltage")?,
            "V",
        ),
        CliCommands::Current => print_value(
            args.format,
            "current",
            psu.get_current().with_context(|| "Cannot get current")?,
            "mA",
        ),
        CliCommands::Status => print_serialized(
            args.format,
            &psu.get_status().with_context(|| "Cannot get status")?,
        )?,
        CliCommands::SetVoltage { voltage } => psu
            .set_voltage(voltage)
            .with_context(|| format!("Cannot set voltage to {voltage} V"))?,
        CliCommands::On => psu
            .set_high_voltage_on()
            .with_context(|| "Cannot switch high voltage on")?,
        CliCommands::Off => psu
            .set_high_voltage_off()
            .with_context(|| "Cannot switch high voltage off")?,
        CliCommands::Reset => psu.reset().with_context(|| "Cannot reset power supply")?,
        CliCommands::Watch { interval, count } => {
            watch::run(&mut psu, args.format, interval, count)?
        }
    }

    psu.close().with_context(|| "Cannot close serial port")
}
