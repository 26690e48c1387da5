use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::time::Duration;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Show status flags, output voltage and output current
    Monitor,
    /// Show output voltage (V) and output current (mA)
    Power,
    /// Show output voltage in volts
    Voltage,
    /// Show output current in milliamps
    Current,
    /// Show status flags: HV output, over-current protection, temperature sensor and correction
    Status,
    /// Set the output voltage in volts (checked against the configured limits)
    SetVoltage {
        /// The desired output voltage (e.g., 55.0)
        voltage: f64,
    },
    /// Switch the high voltage output on
    On,
    /// Switch the high voltage output off
    Off,
    /// Reset the power supply
    Reset,
    /// Periodically read and print status, voltage and current
    Watch {
        /// Interval between readings (e.g., "1s", "500ms")
        #[clap(long, short, value_parser = humantime::parse_duration, default_value = "1s")]
        interval: Duration,
        /// Stop after this many readings
        #[clap(long, short)]
        count: Option<u64>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

const fn about_text() -> &'static str {
    "Hamamatsu C11204 power supply command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Serial port device path (e.g., /dev/ttyUSB0 on Linux, COM1 on Windows).
    /// Without it the port is found by its USB description.
    #[arg(short, long)]
    pub device: Option<String>,

    /// USB product description used to find the serial port
    #[arg(long)]
    pub description: Option<String>,

    /// YAML configuration file [default: c11204.yaml if present]
    #[arg(short, long)]
    pub config: Option<String>,

    /// Timeout for serial I/O operations (e.g., "500ms", "1s", "2s 500ms")
    #[arg(value_parser = humantime::parse_duration, long)]
    pub timeout: Option<Duration>,

    /// Lowest voltage accepted by set-voltage, at least 40 V
    #[arg(long)]
    pub min_voltage: Option<f64>,

    /// Highest voltage accepted by set-voltage, at most 90 V
    #[arg(long)]
    pub max_voltage: Option<f64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: CliCommands,
}
