use iced::widget::{button, container, progress_bar, row, text, text_input, Column, Row};
use iced::{Alignment, Element, Length};

use clipstream::ImportStatus;

#[derive(Debug, Clone)]
pub enum ControlMessage {
    OpenFile,
    LocatorChanged(String),
    ImportLocator,
    Abort,
    Play,
    Stop,
}

/// Format seconds as MM:SS.
fn format_time(seconds: f64) -> String {
    let total_secs = seconds as u64;
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{mins}:{secs:02}")
}

/// Summary of the loaded clip shown under the progress bar.
pub struct ClipSummary<'a> {
    pub name: &'a str,
    pub channels: u16,
    pub sample_rate: u32,
    pub duration: f64,
    pub position: f64,
}

/// Build the import controls view.
pub fn view_controls<'a>(
    status: &ImportStatus,
    progress: f32,
    locator: &str,
    active: bool,
    can_play: bool,
    playing: bool,
    clip: Option<ClipSummary<'_>>,
) -> Element<'a, ControlMessage> {
    let open_btn = button(text("Open File")).on_press(ControlMessage::OpenFile);

    let locator_input = text_input("https://… or /path/to/file", locator)
        .on_input(ControlMessage::LocatorChanged)
        .on_submit(ControlMessage::ImportLocator)
        .width(Length::Fixed(420.0));
    let import_btn = button(text("Import")).on_press(ControlMessage::ImportLocator);

    let mut abort_btn = button(text("Abort"));
    if active {
        abort_btn = abort_btn.on_press(ControlMessage::Abort);
    }

    let loaded = clip.is_some();
    let play_btn = if playing {
        button(text("Stop")).on_press(ControlMessage::Stop)
    } else {
        let btn = button(text("Play"));
        if can_play && loaded {
            btn.on_press(ControlMessage::Play)
        } else {
            btn
        }
    };

    let controls_row = Row::new()
        .spacing(10)
        .align_y(Alignment::Center)
        .push(open_btn)
        .push(locator_input)
        .push(import_btn)
        .push(abort_btn)
        .push(play_btn);

    let status_label = text(format!("Status: {status}")).size(14);
    let progress_row = row![
        progress_bar(0.0..=1.0, progress),
        text(format!("{:.0}%", progress * 100.0)).size(14),
    ]
    .spacing(10)
    .align_y(Alignment::Center);

    let mut column = Column::new()
        .spacing(10)
        .push(controls_row)
        .push(status_label)
        .push(progress_row);

    if let Some(clip) = clip {
        column = column.push(
            text(format!(
                "{}: {} ch, {} Hz, {} / {}",
                clip.name,
                clip.channels,
                clip.sample_rate,
                format_time(clip.position),
                format_time(clip.duration)
            ))
            .size(16),
        );
    }

    container(column).padding(10).into()
}
