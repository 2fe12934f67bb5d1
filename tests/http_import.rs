use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};

use clipstream::audio::{Decoder, HttpDecoder, ImportSource};
use clipstream::{ClipFactory, Config, ImportEvent, ImportStatus, Importer};

const FRAMES: usize = 1_000;

/// Mono 16-bit WAV held in memory.
fn tone_wav() -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
    for i in 0..FRAMES {
        writer.write_sample(tone_sample(i)).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

fn tone_sample(i: usize) -> i16 {
    ((i % 200) as i16 - 100) * 100
}

/// Accept a single connection on a local port and let `respond` answer it.
fn serve_once(respond: impl FnOnce(&mut TcpStream) + Send + 'static) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        skip_request(&mut stream);
        respond(&mut stream);
    });
    format!("http://{addr}")
}

fn skip_request(stream: &mut TcpStream) {
    let mut request = Vec::new();
    let mut byte = [0u8; 1];
    while !request.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => return,
            Ok(_) => request.push(byte[0]),
        }
    }
}

fn respond_with(body: Vec<u8>, content_length: bool) -> impl FnOnce(&mut TcpStream) + Send {
    move |stream: &mut TcpStream| {
        let mut head = String::from("HTTP/1.1 200 OK\r\nContent-Type: audio/wav\r\n");
        if content_length {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        head.push_str("Connection: close\r\n\r\n");
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(&body);
    }
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

#[test]
fn remote_wav_is_imported_with_the_default_backend() {
    clipstream::audio::initialize().unwrap();
    let base = serve_once(respond_with(tone_wav(), true));

    let config = Config {
        backend: None,
        chunk_samples: 256,
    };
    let mut importer = Importer::new(&config, ClipFactory);
    let events = importer.events();

    importer.import(ImportSource::parse(&format!("{base}/tone.wav")).unwrap());
    run_to_end(&mut importer);

    assert_eq!(importer.status(), ImportStatus::Done);
    let clip = importer.take_sink().unwrap();
    assert_eq!(clip.name, "tone");
    assert_eq!(clip.channels, 1);
    assert_eq!(clip.sample_rate, 8_000);
    assert_eq!(clip.samples.len(), FRAMES);
    assert_eq!(clip.samples_written(), FRAMES);
    for i in [0, 1, 150, FRAMES - 1] {
        let want = tone_sample(i) as f32 / 32_768.0;
        assert!((clip.samples[i] - want).abs() < 1e-4, "sample {i}");
    }
    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![
            ImportEvent::Loaded {
                name: "tone".into()
            },
            ImportEvent::Finished,
        ]
    );
}

#[test]
fn aborting_a_slow_download_returns_promptly() {
    clipstream::audio::initialize().unwrap();
    // Promises 10 MB, then trickles 16 bytes every 50 ms.
    let base = serve_once(|stream| {
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 10000000\r\n\r\n";
        if stream.write_all(head.as_bytes()).is_err() {
            return;
        }
        for _ in 0..400 {
            if stream.write_all(&[0u8; 16]).is_err() {
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }
    });

    let config = Config {
        backend: None,
        ..Config::default()
    };
    let mut importer = Importer::new(&config, ClipFactory);
    let events = importer.events();

    importer.import(ImportSource::parse(&format!("{base}/slow.mp3")).unwrap());
    thread::sleep(Duration::from_millis(300));
    importer.update();
    assert!(importer.is_active());

    let started = Instant::now();
    importer.abort();
    let blocked = started.elapsed();

    assert!(blocked < Duration::from_secs(1), "abort blocked {blocked:?}");
    assert!(!importer.is_active());
    assert_eq!(importer.status(), ImportStatus::Aborted);
    assert!(importer.sink().is_none());
    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![ImportEvent::Aborted]
    );
}

#[test]
fn oversized_bodies_are_rejected() {
    clipstream::audio::initialize().unwrap();

    for content_length in [true, false] {
        let base = serve_once(respond_with(tone_wav(), content_length));
        let mut importer = Importer::with_decoders(ClipFactory, 256, |_: &ImportSource| {
            Box::new(HttpDecoder::with_max_bytes(1_024)) as Box<dyn Decoder>
        });

        importer.import(ImportSource::parse(&format!("{base}/tone.wav")).unwrap());
        run_to_end(&mut importer);

        let error = importer.error().unwrap();
        assert_eq!(
            error, "Remote file exceeds the 1024 byte limit",
            "content length sent: {content_length}"
        );
        assert!(importer.sink().is_none());
    }
}
