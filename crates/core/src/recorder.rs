use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::capture::{self, CaptureSender, DEFAULT_CHANNEL_CAPACITY};
use crate::error::{CaptureError, Result};
use crate::session::{RecordingSession, SessionSinks, SessionStats};
use crate::sink::WavSink;
use crate::transport::UdpCapture;

/// Conventional monitored port for lab setups.
pub const DEFAULT_MONITORED_PORT: u16 = 10000;
pub const DEFAULT_PEER_PORT: u16 = 10002;

/// Where recordings are written, and under which policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputConfig {
    /// Both directions summed into one file.
    Mixed { path: PathBuf },
    /// One file per direction.
    Separate { incoming: PathBuf, outgoing: PathBuf },
}

impl OutputConfig {
    /// Create the WAV sinks for this output layout.
    pub fn open_sinks(&self) -> Result<SessionSinks> {
        Ok(match self {
            Self::Mixed { path } => SessionSinks::Mixed(Box::new(WavSink::create(path)?)),
            Self::Separate { incoming, outgoing } => SessionSinks::Separate {
                incoming: Box::new(WavSink::create(incoming)?),
                outgoing: Box::new(WavSink::create(outgoing)?),
            },
        })
    }
}

/// Recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Local address the capture sockets bind to.
    pub bind_host: String,
    /// Datagrams to this port are `Incoming`.
    pub monitored_port: u16,
    /// Second port captured; its datagrams are `Outgoing`.
    pub peer_port: u16,
    pub output: OutputConfig,
    /// Capacity of the capture channel, in packets.
    pub channel_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            monitored_port: DEFAULT_MONITORED_PORT,
            peer_port: DEFAULT_PEER_PORT,
            output: OutputConfig::Mixed {
                path: PathBuf::from("capture.wav"),
            },
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl RecorderConfig {
    /// Check ports, channel capacity and output paths before binding.
    pub fn validate(&self) -> Result<()> {
        if self.monitored_port == 0 || self.peer_port == 0 {
            return Err(CaptureError::Config("ports must be non-zero".into()));
        }
        if self.monitored_port == self.peer_port {
            return Err(CaptureError::Config(format!(
                "peer port must differ from monitored port {}",
                self.monitored_port
            )));
        }
        if self.channel_capacity == 0 {
            return Err(CaptureError::Config("channel capacity must be positive".into()));
        }
        if let OutputConfig::Separate { incoming, outgoing } = &self.output {
            if incoming == outgoing {
                return Err(CaptureError::Config(
                    "incoming and outgoing recordings need distinct paths".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Top-level capture orchestrator.
///
/// Owns the capture threads and the pipeline thread. [`start`](Self::start)
/// opens the sinks and begins capturing; [`stop`](Self::stop) halts the
/// capture, lets the pipeline finish the queued packets, flushes the tail
/// and closes the recordings.
pub struct Recorder {
    config: RecorderConfig,
    running: Arc<AtomicBool>,
    sender: Option<CaptureSender>,
    capture_threads: Vec<JoinHandle<()>>,
    pipeline: Option<JoinHandle<Result<SessionStats>>>,
}

impl Recorder {
    /// Create a stopped recorder; nothing is bound until [`start`](Self::start).
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            sender: None,
            capture_threads: Vec::new(),
            pipeline: None,
        }
    }

    /// Bind the capture sockets, open the recordings and start capturing.
    ///
    /// A recorder that was started must be [`stop`](Self::stop)ped before
    /// it can start again, even when a sink failure already ended capture.
    pub fn start(&mut self) -> Result<()> {
        if self.pipeline.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        self.config.validate()?;

        let capture = UdpCapture::bind(
            &self.config.bind_host,
            self.config.monitored_port,
            self.config.peer_port,
        )?;
        let mut session = RecordingSession::new(self.config.output.open_sinks()?);
        let (sender, events) = capture::channel(self.config.channel_capacity);

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        self.pipeline = Some(thread::spawn(move || {
            let result = capture::run_pipeline(&mut session, events);
            if let Err(e) = &result {
                // Capture threads exit once the flag drops.
                running.store(false, Ordering::SeqCst);
                tracing::error!(error = %e, "recording ended by failure");
            }
            result
        }));
        self.capture_threads = capture.spawn(sender.clone(), self.running.clone());
        self.sender = Some(sender);

        tracing::info!(
            monitored_port = self.config.monitored_port,
            peer_port = self.config.peer_port,
            "recorder started"
        );
        Ok(())
    }

    /// Stop capturing and finalize the recordings.
    ///
    /// Returns the session statistics, or the sink failure that ended the
    /// session early.
    pub fn stop(&mut self) -> Result<SessionStats> {
        let pipeline = self.pipeline.take().ok_or(CaptureError::NotStarted)?;
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("recorder stopping");

        for handle in self.capture_threads.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
        }
        if let Some(sender) = self.sender.take() {
            sender.stop();
        }

        pipeline
            .join()
            .map_err(|_| CaptureError::Io(std::io::Error::other("pipeline thread panicked")))?
    }

    /// True while capturing. Turns false as soon as a sink failure ends
    /// the recording; [`stop`](Self::stop) then returns that failure.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.pipeline.as_ref().is_some_and(|p| !p.is_finished())
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.pipeline.is_some() {
            if let Err(e) = self.stop() {
                tracing::warn!(error = %e, "recorder stopped with error on drop");
            }
        }
    }
}
