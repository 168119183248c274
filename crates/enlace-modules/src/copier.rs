//! Stream copier: self-paced byte mover across port pairs.
//!
//! Sink/source shaped. Moves `min(available, free)` bytes across each
//! source/sink pair every time it runs, reporting its pacing only through
//! the ports' processed-byte counters. Works unchanged against pipeline
//! buffers (LL) or shadow queues (DP).

use enlace_core::{
    Module, ModuleDescriptor, ModuleError, ModuleShape, PipelineStatus, SinkPort, SourcePort,
};

/// Pairwise source→sink byte mover.
pub struct StreamCopier {
    ports: usize,
}

impl StreamCopier {
    /// A copier with one source/sink pair.
    pub fn new() -> Self {
        Self::with_ports(1)
    }

    /// A copier with `ports` source/sink pairs.
    pub fn with_ports(ports: usize) -> Self {
        Self { ports: ports.max(1) }
    }
}

impl Default for StreamCopier {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for StreamCopier {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor {
            max_sources: self.ports,
            max_sinks: self.ports,
            ..ModuleDescriptor::new(ModuleShape::SinkSource)
        }
    }

    fn prepare(
        &mut self,
        sources: &[SourcePort],
        sinks: &[SinkPort],
    ) -> Result<PipelineStatus, ModuleError> {
        if sources.len() != sinks.len() {
            return Err(ModuleError::BadConfig("copier needs paired ports"));
        }
        Ok(PipelineStatus::Continue)
    }

    fn process_sink_source(
        &mut self,
        sources: &mut [SourcePort],
        sinks: &mut [SinkPort],
    ) -> Result<(), ModuleError> {
        let mut moved = 0;
        for (source, sink) in sources.iter_mut().zip(sinks.iter_mut()) {
            let bytes = source.available().min(sink.free_space());
            if bytes == 0 {
                continue;
            }
            let mut chunk = vec![0u8; bytes];
            let read = source.read(&mut chunk);
            sink.write(&chunk[..read]);
            moved += read;
        }
        if moved == 0 {
            return Err(ModuleError::NoDataAvailable);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enlace_core::{StreamBuffer, StreamParams, lock_buffer};

    #[test]
    fn moves_the_pairwise_minimum() {
        let a_in = StreamBuffer::shared(256, StreamParams::default_pcm());
        let a_out = StreamBuffer::shared(64, StreamParams::default_pcm());
        let b_in = StreamBuffer::shared(256, StreamParams::default_pcm());
        let b_out = StreamBuffer::shared(256, StreamParams::default_pcm());
        lock_buffer(&a_in).write_from(&[1; 100]);
        lock_buffer(&b_in).write_from(&[2; 30]);

        let mut sources = vec![
            enlace_core::SourcePort::new(a_in),
            enlace_core::SourcePort::new(b_in),
        ];
        let mut sinks = vec![
            enlace_core::SinkPort::new(a_out.clone()),
            enlace_core::SinkPort::new(b_out.clone()),
        ];

        let mut copier = StreamCopier::with_ports(2);
        copier
            .process_sink_source(&mut sources, &mut sinks)
            .unwrap();

        // Pair a is limited by the 64-byte sink, pair b by its 30 bytes
        // of input.
        assert_eq!(lock_buffer(&a_out).available(), 64);
        assert_eq!(lock_buffer(&b_out).available(), 30);
    }

    #[test]
    fn idle_ports_report_no_data() {
        let src = StreamBuffer::shared(64, StreamParams::default_pcm());
        let dst = StreamBuffer::shared(64, StreamParams::default_pcm());
        let mut sources = vec![enlace_core::SourcePort::new(src)];
        let mut sinks = vec![enlace_core::SinkPort::new(dst)];
        let mut copier = StreamCopier::new();
        assert_eq!(
            copier.process_sink_source(&mut sources, &mut sinks),
            Err(ModuleError::NoDataAvailable)
        );
    }

    #[test]
    fn unpaired_ports_are_rejected_at_prepare() {
        let src = StreamBuffer::shared(64, StreamParams::default_pcm());
        let mut copier = StreamCopier::with_ports(2);
        let sources = vec![enlace_core::SourcePort::new(src)];
        let err = copier.prepare(&sources, &[]).unwrap_err();
        assert!(matches!(err, ModuleError::BadConfig(_)));
    }
}
