use anyhow::{Context, Result};
use dotclock::config::EmulatorConfig;
use dotclock::logging;
use dotclock::nes::Nes;
use dotclock::nes::opcodes::decode;
use std::io::{BufRead, Write};
use std::path::Path;

fn print_help() {
    println!("Commands:");
    println!("  step, s [n]        - Execute n instructions (default 1)");
    println!("  frame, f [n]       - Run n frames (default 1)");
    println!("  regs               - Show CPU registers");
    println!("  mem <addr> [len]   - Dump CPU address space (hex, no side effects)");
    println!("  ppu                - Show PPU state");
    println!("  mapper             - Show mapper state");
    println!("  events [n]         - Show recent debug events");
    println!("  reset              - Press reset");
    println!("  quit, q            - Exit debugger");
}

fn parse_hex(text: &str) -> Option<u16> {
    let digits = text.trim_start_matches("0x").trim_start_matches('$');
    u16::from_str_radix(digits, 16).ok()
}

fn parse_count(text: Option<&&str>) -> usize {
    text.and_then(|t| t.parse().ok()).unwrap_or(1)
}

/// Instruction at `pc`: raw bytes, mnemonic, addressing mode.
fn disassemble(nes: &Nes, pc: u16) -> String {
    let opcode = nes.peek(pc);
    let (op, mode) = decode(opcode);
    let mut bytes = format!("{opcode:02X}");
    for i in 1..=mode.operand_len() {
        bytes.push_str(&format!(" {:02X}", nes.peek(pc.wrapping_add(i))));
    }
    format!("{:<8} {} ({mode:?})", bytes, op.mnemonic())
}

fn print_regs(nes: &Nes) {
    let regs = nes.cpu_registers();
    println!("A: ${:02X}  X: ${:02X}  Y: ${:02X}", regs.a, regs.x, regs.y);
    println!("P: {:08b} (NV-BDIZC)", regs.p);
    println!("SP: ${:02X}  PC: ${:04X}", regs.sp, regs.pc);
    println!(
        "Flags: N={} V={} D={} I={} Z={} C={}",
        (regs.p & 0x80) != 0,
        (regs.p & 0x40) != 0,
        (regs.p & 0x08) != 0,
        (regs.p & 0x04) != 0,
        (regs.p & 0x02) != 0,
        (regs.p & 0x01) != 0
    );
    println!("Cycles: {}", nes.cycles());
}

fn main() -> Result<()> {
    println!("dotclock NES Debugger");
    println!("=====================");
    println!();

    let mut args = std::env::args().skip(1);
    let mut rom_path = None;
    let mut config = EmulatorConfig::default();
    let mut verbosity = 0u8;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().context("--config requires a JSON file path")?;
                config = EmulatorConfig::from_json_file(Path::new(&value))?;
            }
            "-v" => verbosity = verbosity.saturating_add(1),
            _ => rom_path = Some(arg),
        }
    }
    logging::init(logging::level_from_verbosity(verbosity));

    let Some(rom_path) = rom_path else {
        println!("Usage: dotclock_debug [--config <file>] [-v] <rom.nes>");
        println!();
        print_help();
        return Ok(());
    };
    println!("Loading ROM: {}", rom_path);

    let mut nes = Nes::with_config(config);
    nes.load_rom(Path::new(&rom_path))
        .with_context(|| format!("failed to load {rom_path}"))?;

    println!("ROM loaded successfully!");
    println!("Mapper: {} ({:?})", nes.mapper_name(), nes.tv_system());
    println!();
    println!("Initial state:");
    println!("{}", nes.trace_line());
    println!();
    println!("Type 'help' for commands");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read command")?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "help" | "h" => print_help(),
            "step" | "s" => {
                for _ in 0..parse_count(parts.get(1)) {
                    let pc = nes.cpu_registers().pc;
                    let line = nes.trace_line();
                    let text = disassemble(&nes, pc);
                    let cycles = nes.step_instruction();
                    println!("{line}  {text}  +{cycles}");
                }
            }
            "frame" | "f" => {
                let count = parse_count(parts.get(1));
                for _ in 0..count {
                    nes.run_frame();
                }
                println!("Ran {count} frame(s); frame #{}", nes.frame_count());
                println!("{}", nes.trace_line());
            }
            "regs" => print_regs(&nes),
            "mem" => {
                let Some(addr) = parts.get(1).and_then(|t| parse_hex(t)) else {
                    println!("Usage: mem <addr> [len]");
                    continue;
                };
                let len = parts
                    .get(2)
                    .and_then(|t| t.parse::<u16>().ok())
                    .unwrap_or(16);
                for row in (0..len).step_by(16) {
                    let start = addr.wrapping_add(row);
                    let bytes: Vec<String> = (0..16u16.min(len - row))
                        .map(|i| format!("{:02X}", nes.peek(start.wrapping_add(i))))
                        .collect();
                    println!("{:04X}: {}", start, bytes.join(" "));
                }
            }
            "ppu" => {
                let (scanline, dot) = nes.ppu_position();
                let (ctrl, mask, status, oam_addr) = nes.ppu_registers();
                let (v, t, fine_x, toggle) = nes.ppu_scroll();
                println!("PPU State:");
                println!("  Scanline: {}, Dot: {}, Frame: {}", scanline, dot, nes.frame_count());
                println!("  $2000 (ctrl):   {:08b}", ctrl);
                println!("  $2001 (mask):   {:08b}", mask);
                println!("  $2002 (status): {:08b}", status);
                println!("  OAMADDR: ${:02X}", oam_addr);
                println!("  v=${v:04X} t=${t:04X} fine_x={fine_x} toggle={toggle}");
                let palette: Vec<String> = nes.ppu_palette().iter().map(|c| format!("{c:02X}")).collect();
                println!("  palette: {}", palette.join(" "));
            }
            "mapper" => println!("Mapper: {}", nes.debug_mapper_state()),
            "events" => {
                let limit = parts.get(1).and_then(|t| t.parse().ok()).unwrap_or(16);
                for event in nes.debug_events(limit) {
                    println!("  {event}");
                }
            }
            "reset" => {
                nes.reset();
                println!("{}", nes.trace_line());
            }
            "quit" | "q" => {
                println!("Goodbye!");
                break;
            }
            other => {
                println!("Unknown command: {other}. Type 'help' for available commands.");
            }
        }
    }

    Ok(())
}
