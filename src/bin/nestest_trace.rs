use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dotclock::config::EmulatorConfig;
use dotclock::logging;
use dotclock::nes::Nes;
use dotclock::nes::trace::TraceRecord;

#[derive(Debug)]
struct Options {
    rom: PathBuf,
    golden_log: Option<PathBuf>,
    start_pc: u16,
    max_lines: usize,
    compare_ppu: bool,
    quiet: bool,
    verbosity: u8,
}

fn print_help() {
    println!(
        "nestest trace generator for dotclock\n\n\
Usage:\n\
  nestest_trace [options] <nestest.nes>\n\n\
Options:\n\
  --log <file>       Compare against a golden nestest.log and stop at the first mismatch\n\
  --pc <hex>         Start address (default C000, the automation entry)\n\
  --lines <n>        Stop after n instructions (default 8991)\n\
  --ppu              Also compare the PPU column\n\
  --quiet            Print only the comparison summary\n\
  -v                 More logging (repeatable)\n\
  -h, --help         Show this help\n"
    );
}

fn parse_args() -> Result<Options> {
    let mut rom = None;
    let mut opts = Options {
        rom: PathBuf::new(),
        golden_log: None,
        start_pc: 0xC000,
        max_lines: 8991,
        compare_ppu: false,
        quiet: false,
        verbosity: 0,
    };
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--log" => {
                let value = args.next().context("--log requires a path to nestest.log")?;
                opts.golden_log = Some(PathBuf::from(value));
            }
            "--pc" => {
                let value = args.next().context("--pc requires a hex address, e.g. --pc C000")?;
                opts.start_pc = u16::from_str_radix(value.trim_start_matches("0x"), 16)
                    .with_context(|| format!("invalid --pc value: {value}"))?;
            }
            "--lines" => {
                let value = args.next().context("--lines requires an integer")?;
                opts.max_lines = value
                    .parse()
                    .with_context(|| format!("invalid --lines value: {value}"))?;
            }
            "--ppu" => opts.compare_ppu = true,
            "--quiet" => opts.quiet = true,
            "-v" => opts.verbosity = opts.verbosity.saturating_add(1),
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                anyhow::bail!("unknown argument: {other}\nUse --help to view supported options.");
            }
            other => rom = Some(PathBuf::from(other)),
        }
    }

    opts.rom = rom.context("missing ROM path; see --help")?;
    Ok(opts)
}

fn load_golden(path: &Path) -> Result<Vec<TraceRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read golden log {}", path.display()))?;
    let records: Vec<TraceRecord> = text.lines().filter_map(TraceRecord::parse).collect();
    anyhow::ensure!(!records.is_empty(), "no trace lines in {}", path.display());
    Ok(records)
}

fn main() -> Result<()> {
    let opts = parse_args()?;
    logging::init(logging::level_from_verbosity(opts.verbosity));

    let golden = opts.golden_log.as_deref().map(load_golden).transpose()?;

    let mut nes = Nes::with_config(EmulatorConfig {
        error_log: None,
        ..EmulatorConfig::default()
    });
    nes.load_rom(&opts.rom)
        .with_context(|| format!("failed to load {}", opts.rom.display()))?;
    nes.set_pc(opts.start_pc);

    let limit = golden
        .as_ref()
        .map_or(opts.max_lines, |g| g.len().min(opts.max_lines));

    for line in 0..limit {
        let record = nes.trace_record();
        if !opts.quiet {
            println!("{record}");
        }

        if let Some(expected) = golden.as_ref().map(|g| &g[line]) {
            let fields = record.diff(expected, opts.compare_ppu);
            if !fields.is_empty() {
                println!();
                println!("MISMATCH at line {} ({})", line + 1, fields.join(", "));
                println!("  expected: {expected}");
                println!("  got     : {record}");
                std::process::exit(1);
            }
        }

        nes.step_instruction();
    }

    if golden.is_some() {
        println!("{limit} line(s) match the golden log");
    }
    Ok(())
}
