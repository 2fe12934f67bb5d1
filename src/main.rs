mod app;
mod ui;

use tracing_subscriber::EnvFilter;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clipstream=info")),
        )
        .init();

    let config = clipstream::Config::load();

    if let Err(e) = clipstream::audio::initialize() {
        tracing::error!("Remote imports unavailable: {e}");
    }

    let result = app::run(config);

    clipstream::audio::shutdown();
    result
}
