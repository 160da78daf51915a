// Loops the clock generator into a synchronizer and prints every beat
// Run with: cargo run --bin clock_loopback [config.ron] [seconds]

use std::time::Duration;

use tempo_clock::{BarBeatTime, EngineConfig, Transport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };
    let seconds: u64 = match args.next() {
        Some(value) => value.parse()?,
        None => 4,
    };

    let mut transport = Transport::loopback(&config)?;
    println!(
        "Clock loopback: {} at {} BPM for {}s",
        transport.time_signature(),
        transport.tempo(),
        seconds
    );

    let _beats = transport.synchronizer().subscribe_when(
        |time: &BarBeatTime| time.subbeat_fraction().is_zero(),
        |time: &BarBeatTime| println!("{}", time.display_string()),
    )?;

    transport.play()?;
    std::thread::sleep(Duration::from_secs(seconds));
    transport.pause()?;
    transport.flush()?;

    println!(
        "Stopped at {} after {} ticks",
        transport.position_display(),
        transport.generator().tick_count()
    );
    transport.stop()?;
    Ok(())
}
