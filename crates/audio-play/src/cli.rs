use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "audio-play", version)]
pub struct Args {
    /// Path to the audio file to play
    #[arg(required_unless_present = "list_devices")]
    pub path: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Decoded readahead the queue may hold, in seconds
    #[arg(long, default_value_t = 1.0)]
    pub high_water_seconds: f64,
}
