//! nestest automation run against the golden log.
//!
//! The ROM and log are kevtris' `nestest.nes`/`nestest.log`, shipped in the
//! `other/` directory of the nes-test-roms collection
//! (https://github.com/christopherpow/nes-test-roms). Put both files in
//! `tests/roms/` or point `DOTCLOCK_NESTEST_DIR` at the directory holding them.
//! Without them the golden-log test reports that it skipped and passes.

use std::fs;
use std::path::{Path, PathBuf};

use dotclock::config::EmulatorConfig;
use dotclock::nes::Nes;
use dotclock::nes::trace::TraceRecord;

/// Lines before the first undocumented opcode (`*NOP` at C6BD).
const DOCUMENTED_LINES: usize = 5003;

fn quiet_nes() -> Nes {
    Nes::with_config(EmulatorConfig {
        error_log: None,
        ..EmulatorConfig::default()
    })
}

fn fixture_dir() -> Option<PathBuf> {
    let dir = std::env::var_os("DOTCLOCK_NESTEST_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/roms"));
    (dir.join("nestest.nes").is_file() && dir.join("nestest.log").is_file()).then_some(dir)
}

fn assert_follows_log(nes: &mut Nes, golden: &[TraceRecord]) {
    for (line, expected) in golden.iter().enumerate() {
        let got = nes.trace_record();
        let fields = got.diff(expected, false);
        assert!(
            fields.is_empty(),
            "line {}: {} differ\n  expected: {expected}\n  got     : {got}",
            line + 1,
            fields.join(", ")
        );
        nes.step_instruction();
    }
}

#[test]
fn documented_opcodes_match_golden_log() {
    let Some(root) = fixture_dir() else {
        eprintln!("skipping: nestest.nes/nestest.log not found (set DOTCLOCK_NESTEST_DIR)");
        return;
    };
    let log = fs::read_to_string(root.join("nestest.log")).expect("nestest.log");
    let golden: Vec<TraceRecord> = log.lines().filter_map(TraceRecord::parse).collect();
    assert!(golden.len() >= DOCUMENTED_LINES);

    let mut nes = quiet_nes();
    nes.load_rom(&root.join("nestest.nes")).expect("nestest.nes loads");
    nes.set_pc(0xC000);
    assert_follows_log(&mut nes, &golden[..DOCUMENTED_LINES]);

    // Result codes for the documented tests land in $02/$03.
    assert_eq!(nes.cpu_ram()[0x02], 0x00);
    assert_eq!(nes.cpu_ram()[0x03], 0x00);
}

#[test]
fn handwritten_log_matches_short_program() {
    // LDA #$01; LDX #$02; JMP $8000
    let program = [0xA9, 0x01, 0xA2, 0x02, 0x4C, 0x00, 0x80];
    let mut prg = vec![0xEA; 0x8000];
    prg[..program.len()].copy_from_slice(&program);
    prg[0x7FFC] = 0x00;
    prg[0x7FFD] = 0x80;
    let mut image = b"NES\x1A".to_vec();
    image.extend_from_slice(&[2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    image.extend_from_slice(&prg);
    image.extend_from_slice(&vec![0; 0x2000]);

    let log = "\
8000  A9 01     LDA #$01                        A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7
8002  A2 02     LDX #$02                        A:01 X:00 Y:00 P:24 SP:FD PPU:  0, 27 CYC:9
8004  4C 00 80  JMP $8000                       A:01 X:02 Y:00 P:24 SP:FD PPU:  0, 33 CYC:11
8000  A9 01     LDA #$01                        A:01 X:02 Y:00 P:24 SP:FD PPU:  0, 42 CYC:14";
    let golden: Vec<TraceRecord> = log.lines().filter_map(TraceRecord::parse).collect();
    assert_eq!(golden.len(), 4);

    let mut nes = quiet_nes();
    nes.load_rom_bytes(&image, "short").unwrap();
    assert_follows_log(&mut nes, &golden);
    assert_eq!(
        nes.trace_record().diff(&golden[0], true),
        vec!["PC", "A", "X", "CYC", "PPU"]
    );
}
