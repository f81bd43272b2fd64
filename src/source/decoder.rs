use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use lofty::file::AudioFile;
use rodio::{Decoder, Source};
use tracing::debug;

use crate::audio::{Bitrate, ChannelCount, SampleRate, SignalInfo, StreamInfo};
use crate::error::{Error, Result};

/// Open the stream and report its actual properties.
///
/// The decoder is authoritative for the signal. Containers that do not
/// announce a length and the bitrate are filled in from the file headers.
pub fn probe_stream_info(path: &Path) -> Result<StreamInfo> {
    let file = File::open(path)?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| Error::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let signal = SignalInfo::new(
        ChannelCount::new(decoder.channels()),
        SampleRate::new(decoder.sample_rate()),
    );
    if !signal.is_valid() {
        return Err(Error::Decode {
            path: path.to_path_buf(),
            message: format!("invalid signal: {signal}"),
        });
    }
    let decoded_duration = decoder.total_duration();
    drop(decoder);

    let properties = match lofty::read_from_path(path) {
        Ok(tagged) => Some(tagged.properties().clone()),
        Err(err) => {
            debug!("No file properties for {}: {err}", path.display());
            None
        }
    };
    let duration = decoded_duration
        .or_else(|| properties.as_ref().map(|p| p.duration()))
        .unwrap_or_default();
    let bitrate = properties
        .as_ref()
        .and_then(|p| p.audio_bitrate())
        .unwrap_or(0);

    Ok(StreamInfo::new(signal, Bitrate::new(bitrate), duration))
}
