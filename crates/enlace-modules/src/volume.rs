//! Volume: per-sample gain on 16-bit PCM.
//!
//! Audio-stream shaped, one source, one sink. The gain is a Q10
//! fixed-point factor (1024 = unity) settable at runtime through the
//! binary configuration protocol; a fragmented payload is reassembled in
//! place before being applied.

use tracing::debug;

use enlace_core::{
    FragmentPosition, Module, ModuleDescriptor, ModuleError, ModuleShape, StreamInput,
    StreamOutput,
};

/// Unity gain in Q10.
pub const UNITY_GAIN: u32 = 1 << 10;

/// Largest accepted gain: +18 dB and a bit, in Q10.
pub const MAX_GAIN: u32 = 8 << 10;

/// Per-sample s16 gain stage.
pub struct Volume {
    gain_q10: u32,
    /// Configuration blob under reassembly.
    cfg: Vec<u8>,
}

impl Volume {
    /// A volume module at unity gain.
    pub fn new() -> Self {
        Self {
            gain_q10: UNITY_GAIN,
            cfg: Vec::new(),
        }
    }

    /// Current gain factor in Q10.
    pub fn gain_q10(&self) -> u32 {
        self.gain_q10
    }

    fn apply_config(&mut self) -> Result<(), ModuleError> {
        if self.cfg.len() < 4 {
            return Err(ModuleError::BadConfig("volume blob shorter than 4 bytes"));
        }
        let gain = u32::from_le_bytes([self.cfg[0], self.cfg[1], self.cfg[2], self.cfg[3]]);
        if gain > MAX_GAIN {
            return Err(ModuleError::BadConfig("gain above supported range"));
        }
        debug!(gain_q10 = gain, "volume gain applied");
        self.gain_q10 = gain;
        Ok(())
    }

    #[inline]
    fn scale(&self, sample: i16) -> i16 {
        let scaled = (i32::from(sample) * self.gain_q10 as i32) >> 10;
        scaled.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Volume {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new(ModuleShape::AudioStream)
    }

    fn process_stream(
        &mut self,
        inputs: &mut [StreamInput<'_>],
        outputs: &mut [StreamOutput<'_>],
    ) -> Result<(), ModuleError> {
        let Some(input) = inputs.first_mut() else {
            return Err(ModuleError::NoDataAvailable);
        };
        let bytes = input.frames * input.stream.params().frame_bytes();
        if bytes == 0 {
            return Err(ModuleError::NoDataAvailable);
        }

        let mut chunk = vec![0u8; bytes];
        input.stream.peek_at(0, &mut chunk);
        for pair in chunk.chunks_exact_mut(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            pair.copy_from_slice(&self.scale(sample).to_le_bytes());
        }
        input.consumed = bytes;

        if let Some(output) = outputs.first_mut() {
            output.stream.write_at(0, &chunk);
            output.produced = bytes;
        }
        Ok(())
    }

    fn set_configuration(
        &mut self,
        _param_id: u32,
        position: FragmentPosition,
        offset: usize,
        fragment: &[u8],
    ) -> Result<(), ModuleError> {
        match position {
            FragmentPosition::First | FragmentPosition::Single => {
                // The first fragment's offset carries the total size.
                self.cfg.clear();
                self.cfg.resize(offset, 0);
                if fragment.len() > self.cfg.len() {
                    return Err(ModuleError::BadConfig("fragment larger than declared blob"));
                }
                self.cfg[..fragment.len()].copy_from_slice(fragment);
            }
            FragmentPosition::Middle | FragmentPosition::Last => {
                let end = offset
                    .checked_add(fragment.len())
                    .filter(|&e| e <= self.cfg.len())
                    .ok_or(ModuleError::BadConfig("fragment outside declared blob"))?;
                self.cfg[offset..end].copy_from_slice(fragment);
            }
        }
        if matches!(position, FragmentPosition::Single | FragmentPosition::Last) {
            self.apply_config()?;
        }
        Ok(())
    }

    fn get_configuration(
        &mut self,
        _position: FragmentPosition,
        offset: &mut usize,
        dst: &mut [u8],
    ) -> Result<usize, ModuleError> {
        let blob = self.gain_q10.to_le_bytes();
        if dst.len() < blob.len() {
            return Err(ModuleError::NoSpaceAvailable);
        }
        dst[..blob.len()].copy_from_slice(&blob);
        *offset = 0;
        Ok(blob.len())
    }

    fn reset(&mut self) -> Result<enlace_core::PipelineStatus, ModuleError> {
        self.cfg.clear();
        Ok(enlace_core::PipelineStatus::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enlace_core::{StreamBuffer, StreamParams, lock_buffer};

    fn stereo_s16() -> StreamParams {
        StreamParams::default_pcm()
    }

    fn write_samples(buf: &enlace_core::SharedStreamBuffer, samples: &[i16]) {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        lock_buffer(buf).write_from(&bytes);
    }

    fn read_samples(buf: &enlace_core::SharedStreamBuffer, count: usize) -> Vec<i16> {
        let mut bytes = vec![0u8; count * 2];
        let n = lock_buffer(buf).read_into(&mut bytes);
        bytes[..n]
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect()
    }

    fn run_once(volume: &mut Volume, input: &[i16]) -> Vec<i16> {
        let source = StreamBuffer::shared(1024, stereo_s16());
        let sink = StreamBuffer::shared(1024, stereo_s16());
        write_samples(&source, input);

        let frames = lock_buffer(&source).available_frames();
        let src_guard = lock_buffer(&source);
        let mut sink_guard = lock_buffer(&sink);
        let mut inputs = [StreamInput {
            stream: &*src_guard,
            frames,
            consumed: 0,
        }];
        let mut outputs = [StreamOutput {
            stream: &mut *sink_guard,
            produced: 0,
        }];
        volume.process_stream(&mut inputs, &mut outputs).unwrap();
        let produced = outputs[0].produced;
        sink_guard.produce(produced);
        drop(src_guard);
        drop(sink_guard);
        read_samples(&sink, produced / 2)
    }

    #[test]
    fn unity_gain_is_bit_exact() {
        let mut v = Volume::new();
        let input = [0, 1000, -1000, i16::MAX, i16::MIN, 42, -42, 7];
        assert_eq!(run_once(&mut v, &input), input);
    }

    #[test]
    fn half_gain_halves_samples() {
        let mut v = Volume::new();
        v.gain_q10 = UNITY_GAIN / 2;
        let out = run_once(&mut v, &[2000, -2000, 0, 400, 401, -401, 8, -8]);
        assert_eq!(out, [1000, -1000, 0, 200, 200, -201, 4, -4]);
    }

    #[test]
    fn gain_clamps_at_the_rails() {
        let mut v = Volume::new();
        v.gain_q10 = 4 * UNITY_GAIN;
        let out = run_once(&mut v, &[i16::MAX, i16::MIN, 20000, -20000]);
        assert_eq!(out, [i16::MAX, i16::MIN, i16::MAX, i16::MIN]);
    }

    #[test]
    fn config_blob_sets_gain() {
        let mut v = Volume::new();
        let blob = (2 * UNITY_GAIN).to_le_bytes();
        v.set_configuration(0, FragmentPosition::Single, blob.len(), &blob)
            .unwrap();
        assert_eq!(v.gain_q10(), 2 * UNITY_GAIN);
    }

    #[test]
    fn split_config_blob_applies_on_last_fragment() {
        let mut v = Volume::new();
        let blob = (3 * UNITY_GAIN).to_le_bytes();
        v.set_configuration(0, FragmentPosition::First, 4, &blob[..2])
            .unwrap();
        assert_eq!(v.gain_q10(), UNITY_GAIN, "gain must not change mid-transfer");
        v.set_configuration(0, FragmentPosition::Last, 2, &blob[2..])
            .unwrap();
        assert_eq!(v.gain_q10(), 3 * UNITY_GAIN);
    }

    #[test]
    fn oversized_gain_is_rejected() {
        let mut v = Volume::new();
        let blob = (MAX_GAIN + 1).to_le_bytes();
        let err = v
            .set_configuration(0, FragmentPosition::Single, blob.len(), &blob)
            .unwrap_err();
        assert!(matches!(err, ModuleError::BadConfig(_)));
        assert_eq!(v.gain_q10(), UNITY_GAIN);
    }

    #[test]
    fn get_configuration_reads_back_the_gain() {
        let mut v = Volume::new();
        v.gain_q10 = 1234;
        let mut dst = [0u8; 8];
        let mut offset = usize::MAX;
        let n = v
            .get_configuration(FragmentPosition::Single, &mut offset, &mut dst)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(offset, 0);
        assert_eq!(u32::from_le_bytes([dst[0], dst[1], dst[2], dst[3]]), 1234);
    }
}
