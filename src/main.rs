//! shmcast: firmware frame buffer to ADTS audio stream

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tracing::{error, info};

use shmcast::adts::{self, StreamInfo, StreamParams};
use shmcast::capture::{InputRegion, ShmCapture};
use shmcast::pipeline::FrameRingBuffer;
use shmcast::sink::AdtsSink;
use shmcast::{utils, Config};

fn load_config() -> Result<Config> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name("shmcast").required(false))
        .add_source(config::Environment::with_prefix("SHMCAST").separator("__"))
        .build()?
        .try_deserialize::<Config>()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("shmcast=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("shmcast launching...");

    let config = load_config()?;
    let model = config.capture.model;
    let profile = model.profile();
    info!(
        %model,
        offset = profile.offset,
        header_len = profile.header_len,
        "using model profile"
    );

    let found = utils::locate_buffer(model, config.capture.buffer_path.as_deref())?;
    let region = InputRegion::open(&found.path, profile.offset, found.size)?;

    let ring = Arc::new(FrameRingBuffer::new());
    let stream_info = Arc::new(StreamInfo::new());

    // Parameters known up front short-circuit autodetection
    if let (Some(sample_rate), Some(channels)) = (config.stream.sample_rate, config.stream.channels)
    {
        stream_info.publish(StreamParams { sample_rate, channels });
    }

    let capture = ShmCapture::new(region, profile, ring.clone(), stream_info.clone());
    let stats = capture.stats();
    capture.spawn()?;

    // The streaming engine must not start before parameters are known
    let params = loop {
        if let Some(p) = stream_info.get() {
            break p;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    let asc = adts::audio_specific_config(&params);
    info!(
        sample_rate = params.sample_rate,
        channels = params.channels,
        config = %format!("{:02X}{:02X}", asc[0], asc[1]),
        "stream ready, beginning streaming..."
    );

    // Drain the ring into ADTS frames on stdout, the hand-off point for
    // the external consumer
    let drain = tokio::spawn(async move {
        let mut sink = AdtsSink::new(params, io::stdout());
        loop {
            match ring.pop() {
                Some(frame) => {
                    if let Err(e) = sink.push(&frame.payload).and_then(|_| sink.flush()) {
                        error!("failed to forward frame: {e}");
                        break;
                    }
                }
                None => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    drain.abort();

    info!(
        accepted = stats.frames_accepted.load(Ordering::Relaxed),
        lost = stats.frames_lost.load(Ordering::Relaxed),
        audio_lost = stats.audio_frames_lost.load(Ordering::Relaxed),
        resyncs = stats.resyncs.load(Ordering::Relaxed),
        "shmcast shutting down"
    );
    Ok(())
}
