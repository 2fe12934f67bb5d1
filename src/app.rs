use std::path::PathBuf;

use crossbeam_channel::Receiver;
use iced::widget::{column, container, text};
use iced::{Element, Length, Subscription, Task, Theme};
use tracing::{info, warn};

use clipstream::audio::playback::PlaybackEvent;
use clipstream::audio::{ImportSource, PlaybackFactory, Player};
use clipstream::{Config, ImportEvent, Importer};

use crate::ui::controls::{self, ClipSummary, ControlMessage};

pub struct App {
    importer: Importer<PlaybackFactory>,
    events: Receiver<ImportEvent>,
    player: Option<Player>,
    player_events: Option<Receiver<PlaybackEvent>>,

    // State
    locator: String,
    loaded: Option<String>,
    playing: bool,
    position: f64,
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Message {
    Control(ControlMessage),
    Tick,
    FileDialogResult(Option<PathBuf>),
}

fn boot(config: Config) -> (App, Task<Message>) {
    let player = match Player::spawn() {
        Ok(player) => Some(player),
        Err(e) => {
            warn!("Playback unavailable: {e}");
            None
        }
    };
    let sinks = player
        .as_ref()
        .map_or_else(|| PlaybackFactory::new(None), Player::sink_factory);
    let player_events = player.as_ref().map(Player::events);

    let importer = Importer::new(&config, sinks);
    let events = importer.events();
    let app = App {
        importer,
        events,
        player,
        player_events,
        locator: String::new(),
        loaded: None,
        playing: false,
        position: 0.0,
        error: None,
    };
    (app, Task::none())
}

fn title(app: &App) -> String {
    match &app.loaded {
        Some(name) => format!("Clipstream - {name}"),
        None => "Clipstream".to_string(),
    }
}

fn start_import(app: &mut App, locator: &str) {
    match ImportSource::parse(locator) {
        Ok(source) => {
            app.error = None;
            app.loaded = None;
            app.playing = false;
            app.position = 0.0;
            app.importer.import(source);
        }
        Err(e) => {
            warn!("Rejected source {locator:?}: {e}");
            app.error = Some(e.to_string());
        }
    }
}

fn update(app: &mut App, message: Message) -> Task<Message> {
    match message {
        Message::Control(ctrl) => match ctrl {
            ControlMessage::OpenFile => Task::perform(
                async {
                    let handle = rfd::AsyncFileDialog::new()
                        .add_filter("Audio", &["mp3", "wav", "flac", "aac"])
                        .pick_file()
                        .await;
                    handle.map(|h| h.path().to_path_buf())
                },
                Message::FileDialogResult,
            ),
            ControlMessage::LocatorChanged(locator) => {
                app.locator = locator;
                Task::none()
            }
            ControlMessage::ImportLocator => {
                let locator = app.locator.clone();
                start_import(app, &locator);
                Task::none()
            }
            ControlMessage::Abort => {
                app.importer.abort();
                Task::none()
            }
            ControlMessage::Play => {
                if let Some(player) = &app.player {
                    player.play();
                    app.playing = true;
                }
                Task::none()
            }
            ControlMessage::Stop => {
                if let Some(player) = &app.player {
                    player.stop();
                    app.playing = false;
                }
                Task::none()
            }
        },
        Message::FileDialogResult(path) => {
            if let Some(path) = path {
                let locator = path.to_string_lossy().to_string();
                app.locator = locator.clone();
                start_import(app, &locator);
            }
            Task::none()
        }
        Message::Tick => {
            app.importer.update();
            while let Ok(event) = app.events.try_recv() {
                match event {
                    ImportEvent::Loaded { name } => {
                        info!(%name, "Clip playable, starting playback");
                        app.loaded = Some(name);
                        if let Some(player) = &app.player {
                            player.play();
                            app.playing = true;
                        }
                    }
                    ImportEvent::Finished => {}
                    ImportEvent::Failed(e) => {
                        app.error = Some(e);
                    }
                    ImportEvent::Aborted => {
                        if !app.importer.is_initialized() {
                            app.loaded = None;
                        }
                    }
                }
            }
            if let Some(events) = &app.player_events {
                while let Ok(event) = events.try_recv() {
                    match event {
                        PlaybackEvent::PositionChanged(secs) => app.position = secs,
                        PlaybackEvent::Finished => app.playing = false,
                    }
                }
            }
            Task::none()
        }
    }
}

fn view(app: &App) -> Element<'_, Message> {
    let clip = app
        .loaded
        .as_ref()
        .and(app.importer.sink())
        .map(|clip| ClipSummary {
            name: &clip.name,
            channels: clip.info.channels,
            sample_rate: clip.info.sample_rate,
            duration: clip.info.duration(),
            position: app.position,
        });

    let controls = controls::view_controls(
        &app.importer.status(),
        app.importer.progress(),
        &app.locator,
        app.importer.is_active(),
        app.player.is_some(),
        app.playing,
        clip,
    )
    .map(Message::Control);

    let mut content = column![controls].spacing(5);

    if let Some(err) = &app.error {
        content = content.push(
            container(text(format!("Error: {err}")).color(iced::Color::from_rgb(1.0, 0.3, 0.3)))
                .padding(10),
        );
    }

    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn subscription(_app: &App) -> Subscription<Message> {
    iced::time::every(std::time::Duration::from_millis(16)).map(|_| Message::Tick)
}

fn theme(_app: &App) -> Theme {
    Theme::Dark
}

pub fn run(config: Config) -> iced::Result {
    iced::application(move || boot(config.clone()), update, view)
        .title(title)
        .subscription(subscription)
        .theme(theme)
        .window_size((900.0, 240.0))
        .run()
}
