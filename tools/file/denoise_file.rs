use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rnnoise_vox::dsp::{DenoiseKernel, RnnoiseFactory, SplitBlock};
use rnnoise_vox::presets::settings_for_name;
use std::path::PathBuf;
use std::sync::Arc;

// Uneven host-style block sizes, so the file path exercises the same chunking a DAW would.
const BLOCK_PATTERN: [usize; 7] = [441, 480, 1, 1024, 256, 37, 512];

fn read_channels(path: &PathBuf) -> Result<(WavSpec, Vec<Vec<f32>>)> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open input WAV '{}'", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        anyhow::bail!("'{}' declares zero channels", path.display());
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        (format, bits) => anyhow::bail!(
            "unsupported WAV format {:?}/{} bits; use 16-bit int or 32-bit float",
            format,
            bits
        ),
    };

    let frames = interleaved.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }
    Ok((spec, planar))
}

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (input, output) = match (args.next(), args.next()) {
        (Some(i), Some(o)) => (PathBuf::from(i), PathBuf::from(o)),
        _ => anyhow::bail!("usage: rnnoise_vox_file <in.wav> <out.wav> [preset]"),
    };
    let preset = args.next().unwrap_or_else(|| "Standard".to_string());
    let settings = settings_for_name(&preset)
        .with_context(|| format!("no gate preset named '{}'", preset))?;

    let (spec, inputs) = read_channels(&input)?;
    let channel_count = inputs.len();
    let frames = inputs[0].len();
    let sample_rate = spec.sample_rate as f32;

    let mut kernel = DenoiseKernel::new(Arc::new(RnnoiseFactory));
    kernel
        .init(channel_count, sample_rate)
        .context("failed to create denoise engines")?;
    settings.apply(kernel.controls(), sample_rate);
    let latency = kernel.latency_samples();

    let mut processed = vec![vec![0.0f32; frames]; channel_count];
    {
        let ins: Vec<&[f32]> = inputs.iter().map(|c| c.as_slice()).collect();
        let mut outs: Vec<&mut [f32]> = processed.iter_mut().map(|c| c.as_mut_slice()).collect();
        let mut block = SplitBlock::new(&ins, &mut outs);

        let mut pos = 0usize;
        for &size in BLOCK_PATTERN.iter().cycle() {
            if pos >= frames {
                break;
            }
            let n = size.min(frames - pos);
            kernel.process(&mut block, n, pos);
            pos += n;
        }
    }

    let mut tails = vec![vec![0.0f32; latency]; channel_count];
    {
        let mut outs: Vec<&mut [f32]> = tails.iter_mut().map(|c| c.as_mut_slice()).collect();
        kernel.flush(&mut outs);
    }

    let out_spec = WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&output, out_spec)
        .with_context(|| format!("failed to create output WAV '{}'", output.display()))?;

    // Drop the leading latency so the output lines up with the input.
    let aligned: Vec<Vec<f32>> = processed
        .into_iter()
        .zip(tails)
        .map(|(body, tail)| body.into_iter().chain(tail).skip(latency).take(frames).collect())
        .collect();
    for i in 0..frames {
        for ch in &aligned {
            writer.write_sample(ch[i])?;
        }
    }
    writer.finalize()?;

    let peak_in = inputs.iter().flatten().fold(0.0f32, |m, v| m.max(v.abs()));
    let peak_out = aligned.iter().flatten().fold(0.0f32, |m, v| m.max(v.abs()));
    let muted = aligned.iter().flatten().filter(|&&v| v == 0.0).count();

    println!("Denoise summary for '{}':", input.display());
    println!("  preset           : {}", preset);
    println!("  channels         : {}", channel_count);
    println!("  samples/channel  : {}", frames);
    println!("  engine frames    : {}", kernel.meters().get_frames_processed());
    println!("  latency trimmed  : {} samples", latency);
    println!("  peak in / out    : {:.4} / {:.4}", peak_in, peak_out);
    println!(
        "  muted samples    : {:.1}%",
        100.0 * muted as f64 / (frames * channel_count).max(1) as f64
    );
    println!("  written to       : {}", output.display());
    Ok(())
}
