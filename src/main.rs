use std::error::Error;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use thousands::Separable;

use midiroll_rs::config::{FrameMode, SchedulerConfig};
use midiroll_rs::midi::{load_midi_file, DecodedMidi};
use midiroll_rs::playback::{
    spawn_frame_loop, AudioBuffer, AudioHardware, EventQueue, EventRateMeter, FrameScheduler,
    NoteTimeline, PlaybackClock, Playhead, QueuedEvent, SimulatedHardware, SystemHardware,
};

// Timing only needs the buffer length, so simulated audio is kept coarse.
const SIMULATED_SAMPLE_RATE: u32 = 1_000;

#[derive(Parser)]
#[command(name = "midiroll", version, about = "MIDI timing and note scheduling engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a MIDI file and print its structure
    Inspect {
        file: PathBuf,
        /// Print the decoded tracks as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the frame loop offline against a simulated audio clock
    Simulate {
        file: PathBuf,
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
        /// Most queued events applied per frame
        #[arg(long, default_value = "64")]
        batch: NonZeroUsize,
        /// Length of a silent audio track to play alongside the notes
        #[arg(long)]
        audio_seconds: Option<f64>,
        /// Seconds skipped at the start of the audio track
        #[arg(long, default_value_t = 0.0)]
        trim: f64,
    },
    /// Run the frame loop in real time on the system clock
    Watch {
        file: PathBuf,
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
        #[arg(long, default_value = "64")]
        batch: NonZeroUsize,
    },
}

fn format_duration(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}.{:03}",
        total_ms / 60_000,
        (total_ms % 60_000) / 1_000,
        total_ms % 1_000
    )
}

fn load(file: &Path) -> Result<(DecodedMidi, std::time::Duration), Box<dyn Error>> {
    let start = Instant::now();
    let midi = load_midi_file(file)?;
    Ok((midi, start.elapsed()))
}

fn inspect(file: PathBuf, json: bool) -> Result<(), Box<dyn Error>> {
    let (midi, parse_time) = load(&file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&midi)?);
        return Ok(());
    }

    println!(
        "MIDI Summary:\n\
     - Format: {}\n\
     - Tracks: {}\n\
     - Time Division: {}\n\
     - Note Count: {}\n\
     - Tempo Changes: {}\n\
     - Total Ticks: {}\n\
     - Total Duration: {}\n\
     - Parse Time: {:.2?}",
        midi.format_type,
        midi.track_count,
        midi.time_division,
        midi.note_count().separate_with_commas(),
        midi.tempo_events().len(),
        midi.last_tick().separate_with_commas(),
        format_duration(midi.duration_seconds()),
        parse_time
    );
    for (i, track) in midi.tracks.iter().enumerate() {
        println!(
            "   [{:>3}] {:<32} {:>10} notes",
            i,
            track.name,
            track.note_count().separate_with_commas()
        );
    }
    Ok(())
}

fn simulate(
    file: PathBuf,
    fps: f64,
    batch: NonZeroUsize,
    audio_seconds: Option<f64>,
    trim: f64,
) -> Result<(), Box<dyn Error>> {
    let (midi, _) = load(&file)?;
    let timeline = NoteTimeline::from_midi(&midi);

    let hardware = SimulatedHardware::new();
    let mut clock = PlaybackClock::new(hardware.clone());
    let mut end = timeline.end_time();
    if let Some(seconds) = audio_seconds {
        clock.load_buffer(
            Arc::new(AudioBuffer::silent(SIMULATED_SAMPLE_RATE, 1, seconds)),
            trim,
        );
        end = end.max(seconds - trim);
    }

    let config = SchedulerConfig {
        max_batch: batch.get(),
        frame_mode: FrameMode::DisplayRefresh { hz: fps },
        ..SchedulerConfig::default()
    };
    let frame = config.frame_mode.interval().as_secs_f64();
    let mut scheduler = FrameScheduler::new(config);
    let mut queue = EventQueue::with_capacity(256);
    let meter = EventRateMeter::for_rate(fps);

    if !clock.start(timeline.len(), None)? {
        log::warn!("{} has nothing to play", file.display());
        return Ok(());
    }

    let mut playhead = Playhead::new(clock.current_time());
    let mut audio_done = audio_seconds.is_none();
    let mut played = 0.0;
    let mut peak_active = 0usize;
    let mut clamped_frames = 0u64;

    loop {
        hardware.advance(frame);
        if clock.poll() {
            playhead.finish(&timeline, &mut queue);
            audio_done = true;
            played = end;
        } else if clock.is_playing() {
            played = clock.current_time();
            playhead.advance(&timeline, &mut queue, played);
        }

        let ctx = scheduler.on_frame(hardware.current_time(), &mut queue, |_| {});
        if ctx.was_clamped() {
            clamped_frames += 1;
        }
        meter.record(ctx.applied_events);
        meter.end_frame();
        peak_active = peak_active.max(queue.active_notes().len());

        if playhead.is_finished() && audio_done && queue.is_empty() {
            break;
        }
    }
    clock.stop(false);

    println!(
        "Simulation Summary:\n\
     - Frames: {}\n\
     - Played: {}\n\
     - Events Applied: {}\n\
     - Peak Events/s: {}\n\
     - Peak Active Notes: {}\n\
     - Clamped Frames: {}\n\
     - Event Pool Size: {}",
        scheduler.frames().separate_with_commas(),
        format_duration(played),
        meter.total().separate_with_commas(),
        meter.peak().separate_with_commas(),
        peak_active,
        clamped_frames,
        queue.pool_size()
    );
    Ok(())
}

fn watch(file: PathBuf, fps: f64, batch: NonZeroUsize) -> Result<(), Box<dyn Error>> {
    let (midi, _) = load(&file)?;
    let timeline = NoteTimeline::from_midi(&midi);

    let mut clock = PlaybackClock::new(SystemHardware::new());
    if !clock.start(timeline.len(), None)? {
        log::warn!("{} has nothing to play", file.display());
        return Ok(());
    }

    let mode = FrameMode::DisplayRefresh { hz: fps };
    let mut scheduler = FrameScheduler::new(SchedulerConfig {
        max_batch: batch.get(),
        frame_mode: mode,
        ..SchedulerConfig::default()
    });
    let mut queue = EventQueue::with_capacity(256);
    let meter = EventRateMeter::for_rate(fps);
    let report_every = fps.round().max(1.0) as u64;
    let mut playhead = Playhead::new(clock.current_time());

    let handle = spawn_frame_loop(mode, move |timestamp| {
        let now = clock.current_time();
        if clock.poll() {
            playhead.finish(&timeline, &mut queue);
        } else {
            playhead.advance(&timeline, &mut queue, now);
        }

        let ctx = scheduler.on_frame(timestamp, &mut queue, |event| {
            if let QueuedEvent::NoteOn { note, velocity, .. } = *event {
                log::trace!("note on {} vel {}", note, velocity);
            }
        });
        meter.record(ctx.applied_events);
        let rate = meter.end_frame();
        if ctx.frame_index % report_every == 0 {
            log::info!(
                "{} | {} active notes | {} events/s",
                format_duration(now),
                queue.active_notes().len(),
                rate
            );
        }

        if playhead.is_finished() && queue.is_empty() {
            clock.stop(false);
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    handle.wait();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Inspect { file, json } => inspect(file, json),
        Command::Simulate {
            file,
            fps,
            batch,
            audio_seconds,
            trim,
        } => simulate(file, fps, batch, audio_seconds, trim),
        Command::Watch { file, fps, batch } => watch(file, fps, batch),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
