/// Pipeline tuning parameters shared by the decode and playback stages.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Seconds of decoded audio the queue holds before decode waits.
    pub high_water_seconds: f64,
}

impl Default for PipelineConfig {
    /// Matches roughly one second of readahead on common sources.
    fn default() -> Self {
        Self {
            high_water_seconds: 1.0,
        }
    }
}
