//! Headless cube emulator front-end
//!
//! Runs one or more cubes for a fixed span of simulated time and reports
//! statistics. The graphical front-end drives the same [`System`] API;
//! this binary exists for batch runs, traces and profiles.

use std::path::PathBuf;
use std::process::ExitCode;

use cube_core::peripherals::FlashStorage;
use cube_core::System;

struct Options {
    firmware: Option<PathBuf>,
    clock_hz: u64,
    flash_file: Option<PathBuf>,
    profile_file: Option<PathBuf>,
    trace_file: Option<PathBuf>,
    net_host: Option<String>,
    net_port: Option<String>,
    cubes: usize,
    ticks: u64,
}

impl Options {
    fn parse() -> Result<Self, String> {
        let mut opts = Options {
            firmware: None,
            clock_hz: cube_core::vtime::NOMINAL_HZ,
            flash_file: None,
            profile_file: None,
            trace_file: None,
            net_host: None,
            net_port: None,
            cubes: 1,
            ticks: 16_000_000,
        };

        for arg in std::env::args().skip(1) {
            if let Some(flag) = arg.strip_prefix('-') {
                if let Some(value) = flag.strip_prefix("clock=") {
                    opts.clock_hz = value
                        .parse::<u64>()
                        .map_err(|_| format!("bad clock rate '{}'", value))?
                        .max(1);
                } else if let Some(value) = flag.strip_prefix("flash=") {
                    opts.flash_file = Some(PathBuf::from(value));
                } else if let Some(value) = flag.strip_prefix("profile=") {
                    opts.profile_file = Some(PathBuf::from(value));
                } else if let Some(value) = flag.strip_prefix("trace=") {
                    opts.trace_file = Some(PathBuf::from(value));
                } else if let Some(value) = flag.strip_prefix("host=") {
                    opts.net_host = Some(value.to_string());
                } else if let Some(value) = flag.strip_prefix("port=") {
                    opts.net_port = Some(value.to_string());
                } else if let Some(value) = flag.strip_prefix("cubes=") {
                    opts.cubes = value
                        .parse()
                        .map_err(|_| format!("bad cube count '{}'", value))?;
                } else if let Some(value) = flag.strip_prefix("ticks=") {
                    opts.ticks = value
                        .parse()
                        .map_err(|_| format!("bad tick count '{}'", value))?;
                } else {
                    return Err(format!("unknown option '-{}'", flag));
                }
            } else {
                opts.firmware = Some(PathBuf::from(arg));
            }
        }

        Ok(opts)
    }
}

fn usage(program: &str) {
    eprintln!(
        "{} [options] [firmware.ihx]\n\
         \n\
         Both the filename and options are optional. Available options:\n\
         \n\
         -profile=out.txt  Profile performance, write annotated disassembly\n\
         -trace=out.txt    Write a full execution trace to disk\n\
         -clock=value      Set clock speed, in Hz\n\
         -flash=file.bin   Path for file-backed flash memory (default: not file-backed)\n\
         -cubes=n          Number of simulated cubes (default 1)\n\
         -ticks=n          Simulated cycles to run (default one second)\n\
         -host=hostname    Hostname for an external hub (unsupported)\n\
         -port=port        Port for an external hub (unsupported)",
        program
    );
}

fn main() -> ExitCode {
    env_logger::init();

    let program = std::env::args().next().unwrap_or_else(|| "cubesim".into());
    let opts = match Options::parse() {
        Ok(opts) => opts,
        Err(message) => {
            eprintln!("{}", message);
            usage(&program);
            return ExitCode::from(255);
        }
    };

    if opts.net_host.is_some() || opts.net_port.is_some() {
        eprintln!("external network hubs are not supported; using the in-process hub");
    }

    let mut system = System::with_clock_rate(opts.clock_hz);

    for index in 0..opts.cubes.max(1) {
        let storage = match &opts.flash_file {
            // Only the first cube binds the backing file
            Some(path) if index == 0 => match FlashStorage::open(path) {
                Ok(storage) => storage,
                Err(err) => {
                    eprintln!("{}", err);
                    return ExitCode::from(255);
                }
            },
            _ => FlashStorage::new(),
        };
        system.add_cube(storage);
    }

    if let Some(path) = &opts.trace_file {
        for index in 0..system.num_cubes() {
            let cube_path = if system.num_cubes() == 1 {
                path.clone()
            } else {
                path.with_extension(format!("{}.txt", index))
            };
            if let Err(err) = system.cube_mut(index).attach_tracer(&cube_path) {
                eprintln!("cannot open trace file: {}", err);
                return ExitCode::from(1);
            }
        }
    }

    if opts.profile_file.is_some() {
        for index in 0..system.num_cubes() {
            system.cube_mut(index).enable_profiler();
        }
    }

    if let Some(path) = &opts.firmware {
        if let Err(err) = system.load_firmware(path) {
            eprintln!("file '{}' load failure: {}", path.display(), err);
            return ExitCode::from(255);
        }
    }

    system.run(opts.ticks);

    let exceptions = system.take_exception_count();
    println!(
        "ran {} cubes for {} cycles ({:.3} s simulated), {} exceptions",
        system.num_cubes(),
        system.time.clocks,
        system.time.clocks as f64 / system.time.rate() as f64,
        exceptions
    );
    for index in 0..system.num_cubes() {
        let cube = system.cube_mut(index);
        let frames = cube.bus.lcd.frame_count();
        let pixels = cube.bus.lcd.pixel_count();
        let packets = cube.bus.spi.radio.take_packet_count();
        println!(
            "cube {}: {} frames, {} pixels, {} packets, flash busy {}%",
            index,
            frames,
            pixels,
            packets,
            cube.bus.flash.take_busy_percent()
        );
    }

    if let Some(path) = &opts.profile_file {
        if let Err(err) = system.cube(0).write_profile(path) {
            eprintln!("cannot write profile: {}", err);
        } else {
            eprintln!("profiler output written to '{}'", path.display());
        }
    }

    for index in 0..system.num_cubes() {
        if let Err(err) = system.cube(index).save_flash() {
            eprintln!("cannot save flash: {}", err);
        }
    }

    ExitCode::SUCCESS
}
