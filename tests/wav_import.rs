use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};

use clipstream::audio::{DecoderBackend, ImportSource};
use clipstream::{ClipFactory, Config, ImportEvent, ImportStatus, Importer};

const FRAMES: usize = 5_000;

/// Stereo 16-bit ramp; left and right differ in sign.
fn write_stereo_ramp(path: &Path) -> Vec<f32> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    let mut expected = Vec::with_capacity(FRAMES * 2);
    for i in 0..FRAMES {
        let value = (i % 1000) as i16 * 16;
        writer.write_sample(value).unwrap();
        writer.write_sample(-value).unwrap();
        expected.push(value as f32 / 32_768.0);
        expected.push(-value as f32 / 32_768.0);
    }
    writer.finalize().unwrap();
    expected
}

fn run_to_end(importer: &mut Importer<ClipFactory>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while importer.is_active() || !importer.status().is_terminal() {
        importer.update();
        assert!(Instant::now() < deadline, "import did not finish");
        thread::sleep(Duration::from_millis(1));
    }
    importer.update();
}

fn import_with(backend: DecoderBackend) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramp.wav");
    let expected = write_stereo_ramp(&path);

    let config = Config {
        backend: Some(backend),
        chunk_samples: 1_024,
    };
    let mut importer = Importer::new(&config, ClipFactory);
    let events = importer.events();

    importer.import(ImportSource::Path(path));
    run_to_end(&mut importer);

    assert_eq!(importer.status(), ImportStatus::Done, "backend {backend}");
    assert_eq!(importer.progress(), 1.0);

    let clip = importer.take_sink().unwrap();
    assert_eq!(clip.name, "ramp");
    assert_eq!(clip.channels, 2);
    assert_eq!(clip.sample_rate, 44_100);
    assert_eq!(clip.num_frames(), FRAMES);
    assert_eq!(clip.samples_written(), FRAMES * 2);
    for (i, (got, want)) in clip.samples.iter().zip(&expected).enumerate() {
        assert!((got - want).abs() < 1e-4, "sample {i}: {got} != {want}");
    }

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            ImportEvent::Loaded {
                name: "ramp".into()
            },
            ImportEvent::Finished,
        ]
    );
}

#[test]
fn symphonia_backend_imports_wav() {
    import_with(DecoderBackend::Symphonia);
}

#[test]
fn hound_backend_imports_wav() {
    import_with(DecoderBackend::Wav);
}

#[test]
fn missing_file_fails_without_creating_a_clip() {
    let dir = tempfile::tempdir().unwrap();
    let mut importer = Importer::new(&Config::default(), ClipFactory);

    importer.import(ImportSource::Path(dir.path().join("nope.flac")));
    run_to_end(&mut importer);

    assert!(importer.is_error());
    assert!(importer
        .error()
        .unwrap()
        .starts_with("Failed to open file"));
    assert!(importer.sink().is_none());
}

#[test]
fn http_backend_requires_initialization() {
    clipstream::audio::shutdown();
    let config = Config {
        backend: Some(DecoderBackend::Http),
        ..Config::default()
    };
    let mut importer = Importer::new(&config, ClipFactory);

    importer.import(ImportSource::parse("http://127.0.0.1:9/track.mp3").unwrap());
    run_to_end(&mut importer);

    assert_eq!(
        importer.status(),
        ImportStatus::Error("decoder backends are not initialized".into())
    );
}
