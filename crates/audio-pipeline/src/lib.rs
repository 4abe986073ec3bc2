pub mod config;
pub mod convert;
pub mod decode;
pub mod device;
pub mod pcm;
pub mod playback;
pub mod queue;
