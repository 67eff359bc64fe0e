mod config;
mod draw;
mod fps;
mod stream;
mod vision;

use anyhow::Result;
use clap::Parser;
use log::{debug, info};
use opencv::highgui;
use std::{thread, time::Duration};

use config::Args;
use draw::Palette;
use fps::Fps;
use stream::{Source, VideoStream};
use vision::Detector;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    args.validate()?;

    let labels = args.labels()?;
    let palette = Palette::random(labels.len());
    let mut detector = Detector::new(&args, labels)?;
    debug!("classes: {:?}", detector.labels());

    info!("starting video stream...");
    let mut stream = VideoStream::start(&Source::parse(&args.source))?;
    thread::sleep(args.warmup());

    let mut fps = Fps::start();
    let result = run(&mut detector, &stream, &palette, &mut fps);
    fps.stop();

    debug!("{} frames processed", fps.frames());
    println!("elapsed time: {:.2}", fps.elapsed().as_secs_f64());
    println!("approx. FPS: {:.2}", fps.fps());

    highgui::destroy_all_windows()?;
    stream.stop();
    result
}

fn run(detector: &mut Detector, stream: &VideoStream, palette: &Palette, fps: &mut Fps) -> Result<()> {
    loop {
        let Some(mut frame) = stream.read()? else {
            if stream.is_finished() {
                info!("video stream ended");
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
            continue;
        };

        let detections = detector.detect(&frame)?;
        debug!("{} detections", detections.len());

        draw::draw_detections(&mut frame, &detections, palette)?;

        highgui::imshow(config::WINDOW_NAME, &frame)?;
        let key = highgui::wait_key(1)? & 0xFF;

        if key == config::QUIT_KEY {
            return Ok(());
        }

        fps.update();

        if stream.is_finished() {
            info!("video stream ended");
            return Ok(());
        }
    }
}
