use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use rtpcap::media::pcmu::SAMPLES_PER_PACKET;
use rtpcap::media::{BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE};
use rtpcap::{OutputConfig, PcmuPacketizer, Recorder, RecorderConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rtp-capture",
    about = "Record two-party PCMU voice calls from RTP traffic"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture RTP on a port pair and write WAV recordings
    Record(RecordArgs),
    /// Send an 8 kHz mono WAV file as PCMU RTP (test traffic)
    Send(SendArgs),
}

#[derive(Args)]
struct RecordArgs {
    /// Local address to bind the capture sockets to
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Monitored port; datagrams to it are the incoming side
    #[arg(long, short, default_value_t = 10000)]
    port: u16,

    /// Peer port; datagrams to it are the outgoing side
    #[arg(long, default_value_t = 10002)]
    peer_port: u16,

    /// Single mixed recording
    #[arg(long, short, conflicts_with_all = ["incoming", "outgoing"])]
    output: Option<PathBuf>,

    /// Incoming-side recording (separate policy)
    #[arg(long, requires = "outgoing")]
    incoming: Option<PathBuf>,

    /// Outgoing-side recording (separate policy)
    #[arg(long, requires = "incoming")]
    outgoing: Option<PathBuf>,
}

#[derive(Args)]
struct SendArgs {
    /// WAV file (8000 Hz, mono, 16-bit)
    #[arg(long, short)]
    input: PathBuf,

    /// Destination address (host:port)
    #[arg(long, short, default_value = "127.0.0.1:10000")]
    target: SocketAddr,

    /// Local source port (0 = ephemeral)
    #[arg(long, default_value_t = 0)]
    source_port: u16,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Record(args) => record(args),
        Command::Send(args) => send(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn record(args: RecordArgs) -> Result<(), Box<dyn std::error::Error>> {
    let output = match (args.output, args.incoming, args.outgoing) {
        (_, Some(incoming), Some(outgoing)) => OutputConfig::Separate { incoming, outgoing },
        (Some(path), _, _) => OutputConfig::Mixed { path },
        _ => OutputConfig::Mixed {
            path: PathBuf::from("capture.wav"),
        },
    };

    let config = RecorderConfig {
        bind_host: args.bind,
        monitored_port: args.port,
        peer_port: args.peer_port,
        output,
        ..RecorderConfig::default()
    };

    let mut recorder = Recorder::new(config);
    recorder.start()?;

    println!(
        "Recording RTP on ports {} / {}, press Enter to stop...",
        args.port, args.peer_port
    );
    wait_for_enter(&recorder);

    let stats = recorder.stop()?;
    println!(
        "Recorded {} of {} packets ({} dropped), {} bytes of PCM written",
        stats.packets_recorded,
        stats.packets_received,
        stats.dropped_packets(),
        stats.bytes_written
    );
    Ok(())
}

/// Block until Enter is pressed or the recorder stops on its own.
fn wait_for_enter(recorder: &Recorder) {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
        let _ = tx.send(());
    });

    while recorder.is_running() {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
    tracing::warn!("recording stopped before Enter was pressed");
}

fn send(args: SendArgs) -> Result<(), Box<dyn std::error::Error>> {
    let reader = hound::WavReader::open(&args.input)?;
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE
        || spec.channels != CHANNELS
        || spec.bits_per_sample != BITS_PER_SAMPLE
    {
        return Err(format!(
            "{}: expected 8000 Hz mono 16-bit, got {} Hz {} ch {}-bit",
            args.input.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample
        )
        .into());
    }

    let mut pcm = Vec::new();
    for sample in reader.into_samples::<i16>() {
        pcm.extend_from_slice(&sample?.to_le_bytes());
    }

    let socket = UdpSocket::bind(("0.0.0.0", args.source_port))?;
    let mut packetizer = PcmuPacketizer::with_random_ssrc();
    let packets = packetizer.packetize(&pcm);
    tracing::info!(
        target_addr = %args.target,
        packets = packets.len(),
        ssrc = format_args!("{:#010X}", packetizer.ssrc()),
        "sending"
    );

    let packet_time = Duration::from_millis((SAMPLES_PER_PACKET as u64 * 1000) / SAMPLE_RATE as u64);
    let started = Instant::now();
    for (i, packet) in packets.iter().enumerate() {
        let due = started + packet_time * i as u32;
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
        socket.send_to(packet, args.target)?;
    }

    println!("Sent {} packets to {}", packets.len(), args.target);
    Ok(())
}
