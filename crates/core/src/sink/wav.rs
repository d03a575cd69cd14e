use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use super::AudioSink;
use crate::error::{CaptureError, Result};
use crate::media::{BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};

/// WAV file sink (8000 Hz, 16-bit, mono).
///
/// The RIFF header is written up front by `hound`; the data chunk length
/// is patched in when the sink is closed. Dropping an unclosed sink lets
/// `hound` finalize on a best-effort basis.
pub struct WavSink {
    path: PathBuf,
    label: String,
    writer: Option<WavWriter<BufWriter<File>>>,
    samples_written: u64,
}

impl WavSink {
    /// Create (or truncate) the file at `path` and write the WAV header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let label = path.display().to_string();
        let writer = WavWriter::create(&path, Self::spec())
            .map_err(|e| CaptureError::sink(&label, into_io(e)))?;
        tracing::info!(path = %label, "WAV recording opened");
        Ok(Self {
            path,
            label,
            writer: Some(writer),
            samples_written: 0,
        })
    }

    pub fn spec() -> WavSpec {
        WavSpec {
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: SampleFormat::Int,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, pcm: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            CaptureError::sink(&self.label, std::io::Error::other("WAV sink already closed"))
        })?;
        for s in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([s[0], s[1]]))
                .map_err(|e| CaptureError::sink(&self.label, into_io(e)))?;
        }
        self.samples_written += (pcm.len() / 2) as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| CaptureError::sink(&self.label, into_io(e)))?;
            tracing::info!(
                path = %self.label,
                samples = self.samples_written,
                "WAV recording finalized"
            );
        }
        Ok(())
    }

    fn label(&self) -> &str {
        &self.label
    }
}

fn into_io(err: hound::Error) -> std::io::Error {
    match err {
        hound::Error::IoError(e) => e,
        other => std::io::Error::other(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_playable_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let mut sink = WavSink::create(&path).unwrap();
        let pcm: Vec<u8> = [0i16, 1000, -1000, i16::MAX]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        sink.write(&pcm).unwrap();
        assert_eq!(sink.samples_written(), 4);
        sink.close().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, i16::MAX]);
    }

    #[test]
    fn close_is_idempotent_and_blocks_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = WavSink::create(dir.path().join("a.wav")).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(matches!(
            sink.write(&[0, 0]),
            Err(CaptureError::SinkWrite { .. })
        ));
    }

    #[test]
    fn create_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = WavSink::create(dir.path().join("missing").join("a.wav"));
        assert!(matches!(result, Err(CaptureError::SinkWrite { .. })));
    }
}
