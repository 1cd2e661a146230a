use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::Read;
use std::sync::{Arc, Mutex};

use libcw::audio::{AudioSink, NullSink, RodioSink, WavSink};
use libcw::bridge::SelfTestBridge;
use libcw::error::CwError;
use libcw::generator::Generator;
use libcw::morse::{text_to_morse, PracticeMode};
use libcw::receiver::{CharPoll, Receiver};
use libcw::timing::ReceiveTimingParams;

mod interactive;

use interactive::{interactive_mode, practice_mode};

// ---------- CLI ------------------------------------------------------------
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Speed in WPM (PARIS standard)
    #[arg(short, long, default_value_t = 20)]
    wpm: u32,

    /// Tone frequency in Hz
    #[arg(short, long, default_value_t = 700)]
    tone: u32,

    /// Extra gap between characters, in Farnsworth gap units
    #[arg(short, long, default_value_t = 0)]
    gap: u32,

    /// Mode of operation
    #[arg(long, value_enum, default_value_t = Mode::Dictionary)]
    mode: Mode,

    /// Read text from file instead of stdin
    #[arg(short, long)]
    file: Option<String>,

    /// Background QRM: S0 (no noise) … S9 (extreme) (0-9)
    #[arg(long, value_name = "S", default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=9))]
    qrm: u8,

    /// Practice mode (random words, callsigns, Q-codes, numbers)
    #[arg(short, long, value_enum)]
    practice: Option<PracticeMode>,

    /// Custom text for practice mode or receive self-test
    #[arg(long)]
    custom_text: Option<String>,

    /// Use Farnsworth timing for learning (specify character speed)
    #[arg(long)]
    farnsworth: Option<u32>,

    /// Emit text-only Morse representation (space separated) instead of audio
    #[arg(long)]
    text_output: bool,

    /// Save audio to a WAV file instead of playing it
    #[arg(long)]
    output_file: Option<String>,

    /// Frequency drift percentage (0-100), simulates a homebrew transmitter
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    drift: Option<u8>,

    /// Swap dot/dash per character, as a reversed-paddle keyer would send it
    #[arg(long)]
    reverse_paddles: bool,

    /// Adaptive receive speed tracking (receive self-test mode only)
    #[arg(long)]
    adaptive: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Read stdin/file text and render it.
    Dictionary,
    /// Interactive per-keystroke typing.
    Keyboard,
    /// Generate text, feed it straight back through the receiver via the
    /// key/edge bridge, and print what the receiver decoded.
    Receive,
}

fn main() -> Result<()> {
    let args = Args::parse();
    validate_args(&args)?;

    let gap = resolve_gap(&args)?;

    match args.mode {
        Mode::Keyboard => return interactive_mode(args.wpm, args.tone, gap, args.text_output, args.qrm),
        Mode::Receive => return run_receive_self_test(&args, gap),
        Mode::Dictionary => {}
    }

    if let Some(mode) = args.practice {
        return practice_mode(args.wpm, args.tone, gap, mode, args.custom_text.as_deref(), args.qrm);
    }

    let text = if let Some(path) = &args.file {
        std::fs::read_to_string(path)?
    } else {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    };

    if args.text_output {
        println!("{}", text_to_morse(&text)?);
        return Ok(());
    }

    let mut gen = Generator::new(args.wpm, 0, gap, 50)?;
    gen.set_frequency(args.tone as i32)?;
    gen.set_qrm_level(args.qrm);
    gen.set_drift_percentage(args.drift);

    if let Some(output_path) = &args.output_file {
        let samples = gen.render_text_to_samples(&text, 8000)?;
        let mut sink = WavSink::new(output_path.clone(), 8000);
        sink.open()?;
        sink.write(&samples)?;
        sink.close()?;
        println!("Saved morse code to: {}", output_path);
    } else {
        gen.start(Box::new(RodioSink::new(44_100)))?;
        if args.reverse_paddles {
            gen.enqueue_string_paddle_reversed(&text.to_ascii_uppercase())?;
        } else {
            gen.enqueue_string(&text.to_ascii_uppercase())?;
        }
        gen.stop();
    }

    Ok(())
}

fn resolve_gap(args: &Args) -> Result<u32> {
    if let Some(char_speed) = args.farnsworth {
        if char_speed <= args.wpm {
            return Err(CwError::InvalidFarnsworth(char_speed, args.wpm).into());
        }
        // Approximates the Farnsworth character-speed request as additional
        // inter-character/inter-word gap units on top of the overall speed.
        Ok(((args.wpm as f64 / char_speed as f64 - 1.0) * 19.0).round().max(0.0) as u32)
    } else {
        Ok(args.gap)
    }
}

fn run_receive_self_test(args: &Args, gap: u32) -> Result<()> {
    let text = args.custom_text.clone().unwrap_or_else(|| "PARIS".to_string());

    let mut gen = Generator::new(args.wpm, 0, gap, 50)?;
    gen.set_frequency(args.tone as i32)?;

    let mut receive_timing = ReceiveTimingParams::new(args.wpm, 50, gap)?;
    if args.adaptive {
        receive_timing.set_adaptive_mode(true);
    }
    let receiver = Arc::new(Mutex::new(Receiver::new(receive_timing)));
    let bridge = SelfTestBridge::new(Arc::clone(&receiver));
    gen.register_key_callback(bridge.callback());

    gen.start(Box::new(NullSink::new()))?;
    let upper = text.to_ascii_uppercase();
    if args.reverse_paddles {
        gen.enqueue_string_paddle_reversed(&upper)?;
    } else {
        gen.enqueue_string(&upper)?;
    }
    gen.stop();

    let mut decoded = String::new();
    loop {
        match receiver.lock().unwrap().poll_character(None) {
            Ok(CharPoll::Ready { character, .. }) => decoded.push(character),
            Ok(CharPoll::TryAgain) => break,
            Err(_) => break,
        }
    }
    println!("sent:    {}", upper);
    println!("decoded: {}", decoded);
    Ok(())
}

fn validate_args(args: &Args) -> Result<(), CwError> {
    if !(5..=60).contains(&args.wpm) {
        return Err(CwError::InvalidParameter {
            name: "speed_wpm",
            value: args.wpm.to_string(),
            range: "5..60",
        });
    }
    if !(20..=20_000).contains(&args.tone) {
        return Err(CwError::InvalidParameter {
            name: "frequency_hz",
            value: args.tone.to_string(),
            range: "20..20000",
        });
    }
    Ok(())
}
