//! Rechunker: re-blocks a stream into fixed-size chunks.
//!
//! Raw-data shaped. Stands in for codec-style modules that can only work
//! on whole blocks: it refuses to process until a full input block has
//! been staged, then consumes and emits exactly one block. Because its
//! block size usually differs from the pipeline period, it exercises the
//! adapter's deep-buffering warm-up and local-buffer drain.

use enlace_core::{Module, ModuleDescriptor, ModuleError, ModuleShape, RawInput, RawOutput};

/// Fixed-block passthrough.
pub struct Rechunker {
    block_bytes: usize,
}

impl Rechunker {
    /// A rechunker working in blocks of `block_bytes`.
    pub fn new(block_bytes: usize) -> Self {
        Self { block_bytes }
    }

    /// The configured block size.
    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }
}

impl Module for Rechunker {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor {
            input_chunk_bytes: self.block_bytes,
            output_chunk_bytes: self.block_bytes,
            ..ModuleDescriptor::new(ModuleShape::RawData)
        }
    }

    fn process_raw(
        &mut self,
        inputs: &mut [RawInput<'_>],
        outputs: &mut [RawOutput<'_>],
    ) -> Result<(), ModuleError> {
        let Some(input) = inputs.first_mut() else {
            return Err(ModuleError::NoDataAvailable);
        };
        if input.data.len() < self.block_bytes {
            return Err(ModuleError::NoDataAvailable);
        }
        let Some(output) = outputs.first_mut() else {
            return Err(ModuleError::NoSpaceAvailable);
        };
        if output.data.len() < self.block_bytes {
            return Err(ModuleError::NoSpaceAvailable);
        }

        output.data[..self.block_bytes].copy_from_slice(&input.data[..self.block_bytes]);
        input.consumed = self.block_bytes;
        output.produced = self.block_bytes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(r: &mut Rechunker, staged: &[u8], out_capacity: usize) -> Result<Vec<u8>, ModuleError> {
        let mut out = vec![0u8; out_capacity];
        let mut inputs = [RawInput {
            data: staged,
            consumed: 0,
        }];
        let mut outputs = [RawOutput {
            data: &mut out,
            produced: 0,
        }];
        r.process_raw(&mut inputs, &mut outputs)?;
        assert_eq!(inputs[0].consumed, r.block_bytes());
        let produced = outputs[0].produced;
        out.truncate(produced);
        Ok(out)
    }

    #[test]
    fn short_input_reports_no_data() {
        let mut r = Rechunker::new(64);
        let err = run(&mut r, &[1; 63], 64).unwrap_err();
        assert_eq!(err, ModuleError::NoDataAvailable);
    }

    #[test]
    fn full_block_passes_through() {
        let mut r = Rechunker::new(8);
        let staged: Vec<u8> = (0..12).collect();
        let out = run(&mut r, &staged, 16).unwrap();
        assert_eq!(out, staged[..8]);
    }

    #[test]
    fn tight_output_reports_no_space() {
        let mut r = Rechunker::new(16);
        let err = run(&mut r, &[5; 16], 8).unwrap_err();
        assert_eq!(err, ModuleError::NoSpaceAvailable);
    }
}
