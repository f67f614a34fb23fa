//! Opus encode/decode wrappers around `audiopus`. The wire format exchanged
//! with `webrtc`'s RTP tracks is Opus; everywhere else in this crate audio
//! is plain interleaved int16 PCM.

use parking_lot::Mutex;

use crate::error::TransportError;

fn channels_of(count: u32) -> audiopus::Channels {
    if count == 1 {
        audiopus::Channels::Mono
    } else {
        audiopus::Channels::Stereo
    }
}

fn sample_rate_of(hz: u32) -> audiopus::SampleRate {
    match hz {
        8000 => audiopus::SampleRate::Hz8000,
        16000 => audiopus::SampleRate::Hz16000,
        24000 => audiopus::SampleRate::Hz24000,
        _ => audiopus::SampleRate::Hz48000,
    }
}

pub struct OpusEncoder {
    inner: Mutex<audiopus::coder::Encoder>,
    channels: u32,
}

impl OpusEncoder {
    pub fn new(sample_rate: u32, channels: u32) -> Result<Self, TransportError> {
        let encoder = audiopus::coder::Encoder::new(
            sample_rate_of(sample_rate),
            channels_of(channels),
            audiopus::Application::Voip,
        )
        .map_err(TransportError::from)?;
        Ok(Self {
            inner: Mutex::new(encoder),
            channels,
        })
    }

    /// Encodes one frame of interleaved int16 PCM into an Opus packet.
    pub fn encode(&self, samples: &[i16]) -> Result<Vec<u8>, TransportError> {
        let mut out = vec![0u8; 4000];
        let mut encoder = self.inner.lock();
        let len = encoder
            .encode(samples, &mut out)
            .map_err(TransportError::from)?;
        out.truncate(len);
        Ok(out)
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }
}

pub struct OpusDecoder {
    inner: Mutex<audiopus::coder::Decoder>,
    channels: u32,
    frame_size: usize,
}

impl OpusDecoder {
    pub fn new(sample_rate: u32, channels: u32) -> Result<Self, TransportError> {
        let decoder = audiopus::coder::Decoder::new(sample_rate_of(sample_rate), channels_of(channels))
            .map_err(TransportError::from)?;
        // 20ms frame at the given sample rate/channels.
        let frame_size = (sample_rate as usize / 50) * channels as usize;
        Ok(Self {
            inner: Mutex::new(decoder),
            channels,
            frame_size,
        })
    }

    pub fn decode(&self, packet: &[u8]) -> Result<Vec<i16>, TransportError> {
        let mut out = vec![0i16; self.frame_size];
        let mut decoder = self.inner.lock();
        let len = decoder
            .decode(Some(packet), &mut out, false)
            .map_err(TransportError::from)?;
        out.truncate(len * self.channels as usize);
        Ok(out)
    }

    /// Packet-loss concealment: synthesizes a frame in place of a dropped
    /// Opus packet.
    pub fn decode_plc(&self) -> Result<Vec<i16>, TransportError> {
        let mut out = vec![0i16; self.frame_size];
        let mut decoder = self.inner.lock();
        let len = decoder
            .decode(None, &mut out, false)
            .map_err(TransportError::from)?;
        out.truncate(len * self.channels as usize);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip_preserves_length() {
        let encoder = OpusEncoder::new(48000, 2).unwrap();
        let decoder = OpusDecoder::new(48000, 2).unwrap();
        let samples = vec![0i16; 1920];
        let packet = encoder.encode(&samples).unwrap();
        let decoded = decoder.decode(&packet).unwrap();
        assert_eq!(decoded.len(), 1920);
    }

    #[test]
    fn plc_produces_a_full_frame() {
        let decoder = OpusDecoder::new(48000, 2).unwrap();
        let decoded = decoder.decode_plc().unwrap();
        assert_eq!(decoded.len(), 1920);
    }
}
