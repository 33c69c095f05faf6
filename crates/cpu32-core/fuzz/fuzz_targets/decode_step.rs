#![no_main]

use cpu32_core::{Cpu, CpuConfig, Decoded, Decoder, Disk, Ram, Rom, PAGE_SIZE};
use libfuzzer_sys::fuzz_target;

const RAM_BASE: u32 = 0x1000_0000;

fuzz_target!(|data: &[u8]| {
    let words: Vec<u32> = data
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    for &word in &words {
        if let Decoded::Instruction(instruction) = Decoder::decode(word) {
            assert_eq!(instruction.encode(), word);
        }
    }

    let mut cpu = match Cpu::new(
        CpuConfig::default(),
        Ram::new(RAM_BASE, PAGE_SIZE * 256),
        Rom::new(0, PAGE_SIZE),
        Disk::new(8),
    ) {
        Ok(cpu) => cpu,
        Err(_) => return,
    };
    if cpu.load_program(RAM_BASE, &words).is_err() {
        return;
    }
    let outcome = cpu.run(256);
    assert!(outcome.executed <= 256);
});
