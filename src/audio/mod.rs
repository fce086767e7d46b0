pub mod transcode;
pub mod wave;

pub use transcode::{
    check_ffmpeg_available, transcode_to_pcm_wav, TranscodeError, CANONICAL_SAMPLE_RATE,
};
pub use wave::{read_wav, resample_linear, write_wav, WaveError, Waveform};
