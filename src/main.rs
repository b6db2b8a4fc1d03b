use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use susurro::config::{read_app_config_from, ModelSource};
use susurro::engine::VadEngine;
use susurro::events::VadEvent;

#[derive(Parser)]
#[command(name = "susurro")]
#[command(about = "Streaming Silero voice activity detection for 16 kHz PCM audio")]
#[command(version)]
struct Args {
    /// Input WAV file (16 kHz, mono, 16-bit PCM)
    input: PathBuf,

    /// TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Local ONNX model file (overrides the configured model source)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Include per-frame probability events in the output stream
    #[arg(long)]
    emit_frames: bool,

    /// Enable in-flight chunk emission with this slice width in frames
    #[arg(long)]
    chunk_frames: Option<usize>,

    /// Write each detected utterance as a WAV file into this directory
    #[arg(long)]
    segments_dir: Option<PathBuf>,

    /// Bytes pushed into the engine per call
    #[arg(long, default_value_t = 4096)]
    push_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let app_config = read_app_config_from(&args.config);
    let mut vad_config = app_config.vad_config();
    if let Some(frames) = args.chunk_frames {
        vad_config.num_frames_to_emit = frames;
    }

    let source = match &args.model {
        Some(path) => ModelSource::Path(path.clone()),
        None => app_config.model_source(),
    };

    let sample_rate = vad_config.sample_rate;
    let mut engine = VadEngine::create(vad_config, &source)
        .await
        .context("failed to initialize VAD engine")?;

    let mut reader = hound::WavReader::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let spec = reader.spec();
    anyhow::ensure!(
        spec.channels == 1
            && spec.sample_rate == sample_rate as u32
            && spec.bits_per_sample == 16
            && spec.sample_format == hound::SampleFormat::Int,
        "expected {} Hz mono 16-bit PCM input, got {:?}",
        sample_rate,
        spec
    );

    let mut bytes = Vec::with_capacity(reader.len() as usize * 2);
    for sample in reader.samples::<i16>() {
        let sample = sample.context("failed to decode WAV sample")?;
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    if let Some(dir) = &args.segments_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut utterances = 0usize;

    for push in bytes.chunks(args.push_bytes.max(2)) {
        for event in engine.process_audio_data(push) {
            report_event(&mut out, &event, &args, &mut utterances, sample_rate)?;
        }
    }

    // A stream that ends mid-utterance still yields its validated speech.
    for event in engine.force_end_speech() {
        report_event(&mut out, &event, &args, &mut utterances, sample_rate)?;
    }

    log::info!(
        "processed {} frames ({} utterances)",
        engine.total_frames_processed(),
        utterances
    );
    engine.release();
    Ok(())
}

fn report_event(
    out: &mut impl Write,
    event: &VadEvent,
    args: &Args,
    utterances: &mut usize,
    sample_rate: usize,
) -> Result<()> {
    if matches!(event, VadEvent::FrameProcessed { .. }) && !args.emit_frames {
        return Ok(());
    }

    writeln!(out, "{}", serde_json::to_string(event)?)?;

    if let VadEvent::SpeechEnd { t, audio } = event {
        *utterances += 1;
        if let Some(dir) = &args.segments_dir {
            write_segment_wav(dir, *utterances, *t, audio, sample_rate)?;
        }
    }
    Ok(())
}

fn write_segment_wav(
    dir: &Path,
    index: usize,
    t: f64,
    audio: &[i16],
    sample_rate: usize,
) -> Result<()> {
    let path = dir.join(format!("utterance_{index:03}_{t:.2}s.wav"));
    let mut writer = hound::WavWriter::create(
        &path,
        hound::WavSpec {
            channels: 1,
            sample_rate: sample_rate as u32,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        },
    )
    .with_context(|| format!("failed to create {}", path.display()))?;

    for &sample in audio {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    log::info!("wrote speech segment to {}", path.display());
    Ok(())
}
