use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info};

use super::types::StreamInfo;
use crate::error::PlaybackError;
use crate::import::{SampleSink, SinkFactory};

/// How often (in output frames) to send position updates.
const POSITION_UPDATE_INTERVAL: usize = 2048;

/// Commands processed inside the output callback.
#[derive(Debug)]
pub enum PlaybackCommand {
    /// Replace the current clip with an unwritten one of this shape.
    Load {
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
    },
    /// Samples decoded at an interleaved offset.
    Write { samples: Vec<f32>, offset: usize },
    Play,
    Stop,
    Unload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Playback position in seconds.
    PositionChanged(f64),
    Finished,
}

struct PlayerState {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    /// End of the furthest write, in interleaved samples.
    written: usize,
    /// Fractional frame position in the clip.
    position: f64,
    playing: bool,
    output_sample_rate: u32,
    frames_since_update: usize,
}

impl PlayerState {
    fn new(output_sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: 0,
            channels: 0,
            written: 0,
            position: 0.0,
            playing: false,
            output_sample_rate,
            frames_since_update: 0,
        }
    }

    fn num_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    fn handle_command(&mut self, cmd: PlaybackCommand, event_tx: &Sender<PlaybackEvent>) {
        match cmd {
            PlaybackCommand::Load {
                samples,
                sample_rate,
                channels,
            } => {
                self.samples = samples;
                self.sample_rate = sample_rate;
                self.channels = channels;
                self.written = 0;
                self.position = 0.0;
                self.playing = false;
            }
            PlaybackCommand::Write { samples, offset } => {
                if offset >= self.samples.len() {
                    return;
                }
                let end = (offset + samples.len()).min(self.samples.len());
                self.samples[offset..end].copy_from_slice(&samples[..end - offset]);
                self.written = self.written.max(end);
            }
            PlaybackCommand::Play => {
                if self.num_frames() > 0 && self.sample_rate > 0 {
                    self.playing = true;
                }
            }
            PlaybackCommand::Stop => {
                self.playing = false;
                self.position = 0.0;
                let _ = event_tx.try_send(PlaybackEvent::PositionChanged(0.0));
            }
            PlaybackCommand::Unload => {
                *self = Self::new(self.output_sample_rate);
            }
        }
    }

    /// Fill the output buffer from the clip, waiting in silence at the end
    /// of what has been decoded so far.
    fn fill_buffer(&mut self, output: &mut [f32], channels: u16, event_tx: &Sender<PlaybackEvent>) {
        output.fill(0.0);
        if !self.playing || channels == 0 || self.output_sample_rate == 0 {
            return;
        }

        let audio_channels = self.channels as usize;
        let out_channels = channels as usize;
        let total_frames = self.num_frames();
        let available = self.written / audio_channels;
        let step = self.sample_rate as f64 / self.output_sample_rate as f64;

        for out_frame in output.chunks_exact_mut(out_channels) {
            let frame = self.position as usize;
            if frame >= total_frames {
                self.playing = false;
                let _ = event_tx.try_send(PlaybackEvent::Finished);
                return;
            }
            let next = (frame + 1).min(total_frames - 1);
            if next >= available {
                // Decoding has not caught up yet.
                return;
            }

            let frac = (self.position - frame as f64) as f32;
            for (c, out) in out_frame.iter_mut().enumerate() {
                let src_c = c % audio_channels;
                let a = self.samples[frame * audio_channels + src_c];
                let b = self.samples[next * audio_channels + src_c];
                *out = a + (b - a) * frac;
            }
            self.position += step;

            self.frames_since_update += 1;
            if self.frames_since_update >= POSITION_UPDATE_INTERVAL {
                self.frames_since_update = 0;
                let secs = self.position / self.sample_rate as f64;
                let _ = event_tx.try_send(PlaybackEvent::PositionChanged(secs));
            }
        }
    }
}

/// Handle to the output device thread.
pub struct Player {
    commands: Sender<PlaybackCommand>,
    events: Receiver<PlaybackEvent>,
}

impl Player {
    /// Open the default output device and start its stream.
    pub fn spawn() -> Result<Self, PlaybackError> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded::<PlaybackCommand>();
        let (event_tx, event_rx) = crossbeam_channel::bounded::<PlaybackEvent>(256);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(PlaybackError::NoDevice)?;
        let config = device.default_output_config()?;

        let sample_rate = config.sample_rate();
        let channels = config.channels();
        let sample_format = config.sample_format();

        let mut state = PlayerState::new(sample_rate);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    while let Ok(cmd) = cmd_rx.try_recv() {
                        state.handle_command(cmd, &event_tx);
                    }
                    state.fill_buffer(data, channels, &event_tx);
                },
                |err| {
                    error!("Audio stream error: {err}");
                },
                None,
            )?,
            other => return Err(PlaybackError::UnsupportedFormat(other)),
        };

        stream.play()?;

        // Keep stream alive by moving it into a thread
        std::thread::Builder::new()
            .name("audio-keepalive".into())
            .spawn(move || {
                let _stream = stream;
                loop {
                    std::thread::park();
                }
            })
            .map_err(PlaybackError::Thread)?;

        info!(sample_rate, channels, "Audio output started");
        Ok(Self {
            commands: cmd_tx,
            events: event_rx,
        })
    }

    pub fn play(&self) {
        let _ = self.commands.send(PlaybackCommand::Play);
    }

    pub fn stop(&self) {
        let _ = self.commands.send(PlaybackCommand::Stop);
    }

    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events.clone()
    }

    /// Sink factory whose clips are mirrored to this player.
    pub fn sink_factory(&self) -> PlaybackFactory {
        PlaybackFactory::new(Some(self.commands.clone()))
    }
}

/// An imported clip held by the player. Keeps only its shape on the owner
/// side; the samples live in the output thread.
#[derive(Debug)]
pub struct PlayableClip {
    pub name: String,
    pub info: StreamInfo,
    written: u64,
    feed: Option<Sender<PlaybackCommand>>,
}

impl PlayableClip {
    pub fn samples_written(&self) -> u64 {
        self.written
    }
}

impl SampleSink for PlayableClip {
    fn write_samples(&mut self, samples: &[f32], offset: u64) {
        self.written = self.written.max(offset + samples.len() as u64);
        if let Some(feed) = &self.feed {
            let _ = feed.send(PlaybackCommand::Write {
                samples: samples.to_vec(),
                offset: offset as usize,
            });
        }
    }
}

/// Creates [`PlayableClip`]s. Without a player the clips only track their
/// shape, so imports still run on machines with no output device.
pub struct PlaybackFactory {
    feed: Option<Sender<PlaybackCommand>>,
}

impl PlaybackFactory {
    pub fn new(feed: Option<Sender<PlaybackCommand>>) -> Self {
        Self { feed }
    }
}

impl SinkFactory for PlaybackFactory {
    type Sink = PlayableClip;

    fn create(&mut self, name: &str, info: &StreamInfo) -> PlayableClip {
        if let Some(feed) = &self.feed {
            let _ = feed.send(PlaybackCommand::Load {
                samples: vec![0.0; info.length_samples as usize],
                sample_rate: info.sample_rate,
                channels: info.channels,
            });
        }
        PlayableClip {
            name: name.to_string(),
            info: *info,
            written: 0,
            feed: self.feed.clone(),
        }
    }

    fn destroy(&mut self, _sink: PlayableClip) {
        if let Some(feed) = &self.feed {
            let _ = feed.send(PlaybackCommand::Unload);
        }
    }
}
