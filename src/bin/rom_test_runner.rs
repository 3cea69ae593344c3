use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use dotclock::config::EmulatorConfig;
use dotclock::logging;
use dotclock::nes::Nes;
use dotclock::nes::cartridge::TvSystem;
use dotclock::nes::error::{LoadError, MapperError};
use quick_xml::Reader;
use quick_xml::events::Event;
use sha1::{Digest, Sha1};

#[derive(Debug, Clone)]
struct SuiteTest {
    filename: String,
    system: String,
    runframes: u32,
    tvsha1: String,
    recordedinput: String,
}

#[derive(Debug, Clone)]
struct RunResult {
    rgba: String,
    rgb: String,
    pc: u16,
    cycles: u64,
    ppu_registers: (u8, u8, u8, u8),
    ppu_position: (i16, u16),
    mapper: String,
}

enum Outcome {
    Ran(RunResult),
    Unsupported(u8),
}

#[derive(Debug, Clone)]
struct Options {
    suite: PathBuf,
    rom_root: PathBuf,
    max_tests: usize,
    include_pal: bool,
    contains: Vec<String>,
    extra_frames: u32,
    update: bool,
    verbosity: u8,
    emulator: EmulatorConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            suite: PathBuf::from("external/nes-test-roms/test_roms.xml"),
            rom_root: PathBuf::from("external/nes-test-roms"),
            max_tests: 80,
            include_pal: false,
            contains: Vec::new(),
            extra_frames: 0,
            update: false,
            verbosity: 0,
            emulator: EmulatorConfig {
                error_log: None,
                ..EmulatorConfig::default()
            },
        }
    }
}

fn parse_args() -> Result<Options> {
    let mut opts = Options::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--suite" => {
                let value = args.next().context(
                    "--suite requires a path, e.g. --suite external/nes-test-roms/test_roms.xml",
                )?;
                opts.suite = PathBuf::from(value);
            }
            "--rom-root" => {
                let value = args.next().context(
                    "--rom-root requires a path, e.g. --rom-root external/nes-test-roms",
                )?;
                opts.rom_root = PathBuf::from(value);
            }
            "--max-tests" => {
                let value = args
                    .next()
                    .context("--max-tests requires an integer, e.g. --max-tests 120")?;
                opts.max_tests = value
                    .parse::<usize>()
                    .with_context(|| format!("invalid --max-tests value: {value}"))?;
            }
            "--include-pal" => opts.include_pal = true,
            "--contains" => {
                let value = args
                    .next()
                    .context("--contains requires a substring, e.g. --contains vbl_nmi_timing")?;
                opts.contains.push(value.to_lowercase());
            }
            "--extra-frames" => {
                let value = args
                    .next()
                    .context("--extra-frames requires an integer, e.g. --extra-frames 120")?;
                opts.extra_frames = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid --extra-frames value: {value}"))?;
            }
            "--config" => {
                let value = args.next().context("--config requires a JSON file path")?;
                opts.emulator = EmulatorConfig::from_json_file(Path::new(&value))?;
            }
            "--update" => opts.update = true,
            "-v" => opts.verbosity = opts.verbosity.saturating_add(1),
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument: {other}\nUse --help to view supported options.");
            }
        }
    }

    Ok(opts)
}

fn print_help() {
    println!(
        "ROM suite runner for dotclock\n\n\
Usage:\n\
  rom_test_runner [options]\n\n\
Options:\n\
  --suite <path>                 Path to test_roms.xml\n\
  --rom-root <path>              Root path containing ROM files\n\
  --max-tests <n>                Maximum number of tests to run (default 80)\n\
  --include-pal                  Include PAL tests\n\
  --contains <substr>            Only run tests whose filename contains this text (repeatable)\n\
  --extra-frames <n>             Add n frames after XML runframes (default 0)\n\
  --config <file>                Emulator config JSON\n\
  --update                       Print observed digests as <tvsha1> lines instead of judging\n\
  -v                             More logging (repeatable)\n\
  -h, --help                     Show this help\n"
    );
}

fn parse_suite_xml(path: &Path) -> Result<Vec<SuiteTest>> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("failed to read suite XML: {}", path.display()))?;
    parse_suite(&xml)
}

fn parse_suite(xml: &str) -> Result<Vec<SuiteTest>> {

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tests = Vec::new();
    let mut current: Option<SuiteTest> = None;
    let mut reading_tvsha1 = false;
    let mut reading_recorded = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                if name.as_ref() == b"test" {
                    let mut test = SuiteTest {
                        filename: String::new(),
                        system: String::new(),
                        runframes: 0,
                        tvsha1: String::new(),
                        recordedinput: String::new(),
                    };

                    for attr in e.attributes().flatten() {
                        let value = attr
                            .decode_and_unescape_value(reader.decoder())
                            .map(|v| v.to_string())
                            .unwrap_or_default();
                        match attr.key.as_ref() {
                            b"filename" => test.filename = value,
                            b"system" => test.system = value,
                            b"runframes" => test.runframes = value.parse::<u32>().unwrap_or(0),
                            _ => {}
                        }
                    }

                    current = Some(test);
                } else if name.as_ref() == b"tvsha1" {
                    reading_tvsha1 = true;
                } else if name.as_ref() == b"recordedinput" {
                    reading_recorded = true;
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.decode().map(|v| v.to_string()).unwrap_or_default();
                append_text(&mut current, &text, reading_tvsha1, reading_recorded);
            }
            Ok(Event::CData(e)) => {
                let text = e.decode().map(|v| v.to_string()).unwrap_or_default();
                append_text(&mut current, &text, reading_tvsha1, reading_recorded);
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                if name.as_ref() == b"tvsha1" {
                    reading_tvsha1 = false;
                } else if name.as_ref() == b"recordedinput" {
                    reading_recorded = false;
                } else if name.as_ref() == b"test" {
                    if let Some(mut test) = current.take() {
                        test.tvsha1 = test.tvsha1.trim().to_string();
                        test.recordedinput = test.recordedinput.trim().to_string();
                        tests.push(test);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                anyhow::bail!("failed to parse suite XML: {err}");
            }
            _ => {}
        }
    }

    Ok(tests)
}

fn append_text(current: &mut Option<SuiteTest>, text: &str, tvsha1: bool, recorded: bool) {
    if let Some(test) = current.as_mut() {
        if tvsha1 {
            test.tvsha1.push_str(text);
        } else if recorded {
            test.recordedinput.push_str(text);
        }
    }
}

fn is_pal(test: &SuiteTest) -> bool {
    test.system.eq_ignore_ascii_case("pal")
}

fn should_run(test: &SuiteTest, opts: &Options) -> bool {
    if !opts.include_pal && is_pal(test) {
        return false;
    }

    // Controller replay is not supported; these would run without their input.
    if !test.recordedinput.is_empty() {
        return false;
    }

    if !opts.contains.is_empty() {
        let lower = test.filename.to_lowercase();
        if !opts.contains.iter().any(|f| lower.contains(f)) {
            return false;
        }
    }

    true
}

fn digest(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(Sha1::digest(bytes))
}

fn digest_rgb(frame_rgba: &[u8]) -> String {
    let rgb: Vec<u8> = frame_rgba
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    digest(&rgb)
}

fn run_single(test: &SuiteTest, opts: &Options) -> Result<Outcome> {
    let rom_path = opts.rom_root.join(&test.filename);
    let mut config = opts.emulator.clone();
    if is_pal(test) {
        config.tv_system = Some(TvSystem::Pal);
    }

    let mut nes = Nes::with_config(config);
    match nes.load_rom(&rom_path) {
        Ok(()) => {}
        Err(LoadError::Mapper(MapperError::Unsupported(id))) => return Ok(Outcome::Unsupported(id)),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to load ROM {}", rom_path.display()));
        }
    }

    let total_frames = test.runframes.saturating_add(opts.extra_frames);
    for _ in 0..total_frames {
        nes.run_frame();
    }

    let frame = nes.frame_buffer();
    Ok(Outcome::Ran(RunResult {
        rgba: digest(frame),
        rgb: digest_rgb(frame),
        pc: nes.cpu_registers().pc,
        cycles: nes.cycles(),
        ppu_registers: nes.ppu_registers(),
        ppu_position: nes.ppu_position(),
        mapper: nes.debug_mapper_state(),
    }))
}

fn main() -> Result<()> {
    let opts = parse_args()?;
    logging::init(logging::level_from_verbosity(opts.verbosity));

    let start = Instant::now();
    let tests = parse_suite_xml(&opts.suite)?;

    let selected: Vec<SuiteTest> = tests
        .into_iter()
        .filter(|t| should_run(t, &opts))
        .take(opts.max_tests)
        .collect();

    println!(
        "Running {} test(s) from {}",
        selected.len(),
        opts.suite.display()
    );

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;

    for (idx, test) in selected.iter().enumerate() {
        let label = format!("[{}/{}] {}", idx + 1, selected.len(), test.filename);
        match run_single(test, &opts) {
            Ok(Outcome::Ran(result)) if opts.update => {
                println!("{} <tvsha1>{}</tvsha1>", test.filename, result.rgba);
            }
            Ok(Outcome::Ran(result)) if result.rgba == test.tvsha1 => {
                passed += 1;
                println!("PASS {label} [rgba]");
            }
            Ok(Outcome::Ran(result)) if result.rgb == test.tvsha1 => {
                passed += 1;
                println!("PASS {label} [rgb]");
            }
            Ok(Outcome::Ran(result)) => {
                failed += 1;
                let (ctrl, mask, status, _) = result.ppu_registers;
                println!(
                    "FAIL {label}\n  expected: {}\n  got rgba: {}\n  got rgb : {}\n  pc=${:04X} cycles={}\n  ppu ctrl=${:02X} mask=${:02X} status=${:02X} sl={} dot={}\n  {}",
                    test.tvsha1,
                    result.rgba,
                    result.rgb,
                    result.pc,
                    result.cycles,
                    ctrl,
                    mask,
                    status,
                    result.ppu_position.0,
                    result.ppu_position.1,
                    result.mapper,
                );
            }
            Ok(Outcome::Unsupported(id)) => {
                skipped += 1;
                println!("SKIP {label} -> mapper {id} not supported");
            }
            Err(err) => {
                skipped += 1;
                println!("SKIP {label} -> {err:#}");
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f32();
    println!();
    println!("Summary:");
    println!("- Passed: {passed}");
    println!("- Failed: {failed}");
    println!("- Skipped: {skipped}");
    println!("- Runtime: {:.2}s", elapsed);

    Ok(())
}
