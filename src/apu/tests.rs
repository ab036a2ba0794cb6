use super::dsp::*;
use super::spc700::Psw;
use super::voice::EnvelopePhase;
use super::*;

struct FlatRam(Vec<u8>);

impl SpcBus for FlatRam {
    fn read(&mut self, addr: u16) -> u8 {
        self.0[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.0[addr as usize] = value;
    }
}

fn spc_with(program: &[u8]) -> (Spc700, FlatRam) {
    let mut ram = FlatRam(vec![0; RAM_LEN]);
    ram.0[0x200..0x200 + program.len()].copy_from_slice(program);
    let mut spc = Spc700::new();
    spc.pc = 0x200;
    (spc, ram)
}

fn run_steps(spc: &mut Spc700, ram: &mut FlatRam, n: usize) -> u32 {
    (0..n).map(|_| spc.step(&mut *ram)).sum()
}

#[test]
fn adc_sets_overflow_and_negative() {
    let (mut spc, mut ram) = spc_with(&[0xE8, 0x7F, 0x88, 0x01]);
    run_steps(&mut spc, &mut ram, 2);
    assert_eq!(spc.a, 0x80);
    assert!(spc.psw.contains(Psw::OVERFLOW | Psw::NEGATIVE));
    assert!(!spc.psw.contains(Psw::CARRY));
}

#[test]
fn sbc_borrows() {
    let (mut spc, mut ram) = spc_with(&[0x80, 0xE8, 0x10, 0xA8, 0x20]);
    run_steps(&mut spc, &mut ram, 3);
    assert_eq!(spc.a, 0xF0);
    assert!(!spc.psw.contains(Psw::CARRY));
    assert!(spc.psw.contains(Psw::NEGATIVE));
}

#[test]
fn mul_then_div() {
    let (mut spc, mut ram) = spc_with(&[0xE8, 0x07, 0x8D, 0x06, 0xCF, 0xCD, 0x05, 0x9E]);
    run_steps(&mut spc, &mut ram, 3);
    assert_eq!((spc.y, spc.a), (0, 42));
    run_steps(&mut spc, &mut ram, 2);
    assert_eq!(spc.a, 8);
    assert_eq!(spc.y, 2);
}

#[test]
fn call_and_return() {
    let (mut spc, mut ram) = spc_with(&[0x3F, 0x00, 0x03]);
    ram.0[0x300..0x303].copy_from_slice(&[0xE8, 0x55, 0x6F]);
    let sp = spc.sp;
    run_steps(&mut spc, &mut ram, 3);
    assert_eq!(spc.a, 0x55);
    assert_eq!(spc.pc, 0x203);
    assert_eq!(spc.sp, sp);
}

#[test]
fn set1_then_bbs_takes_branch() {
    let (mut spc, mut ram) = spc_with(&[0x02, 0x10, 0x03, 0x10, 0x02]);
    spc.step(&mut ram);
    assert_eq!(ram.0[0x10], 0x01);
    let cycles = spc.step(&mut ram);
    assert_eq!(spc.pc, 0x207);
    assert_eq!(cycles, 7);
}

#[test]
fn daa_adjusts_bcd_sum() {
    let (mut spc, mut ram) = spc_with(&[0xE8, 0x19, 0x60, 0x88, 0x28, 0xDF]);
    run_steps(&mut spc, &mut ram, 4);
    assert_eq!(spc.a, 0x47);
}

#[test]
fn movw_and_addw() {
    let (mut spc, mut ram) = spc_with(&[
        0x8F, 0x34, 0x10, // MOV $10,#$34
        0x8F, 0x12, 0x11, // MOV $11,#$12
        0xBA, 0x10, // MOVW YA,$10
        0x7A, 0x10, // ADDW YA,$10
    ]);
    run_steps(&mut spc, &mut ram, 3);
    assert_eq!((spc.y, spc.a), (0x12, 0x34));
    spc.step(&mut ram);
    assert_eq!((spc.y, spc.a), (0x24, 0x68));
}

#[test]
fn direct_page_flag_moves_dp_to_page_one() {
    let (mut spc, mut ram) = spc_with(&[0x40, 0xE8, 0xAA, 0xC4, 0x10]);
    run_steps(&mut spc, &mut ram, 3);
    assert_eq!(ram.0[0x110], 0xAA);
    assert_eq!(ram.0[0x010], 0x00);
}

#[test]
fn push_pop_and_xcn() {
    let (mut spc, mut ram) = spc_with(&[0xE8, 0x12, 0x2D, 0xE8, 0x00, 0xAE, 0x9F]);
    run_steps(&mut spc, &mut ram, 4);
    assert_eq!(spc.a, 0x12);
    spc.step(&mut ram);
    assert_eq!(spc.a, 0x21);
}

#[test]
fn stop_halts_core() {
    let (mut spc, mut ram) = spc_with(&[0xFF, 0xE8, 0x01]);
    spc.step(&mut ram);
    assert!(spc.is_stopped());
    assert_eq!(spc.step(&mut ram), 2);
    assert_eq!(spc.a, 0);
}

// --- memory map and ports ---

#[test]
fn ports_are_two_separate_latches() {
    let mut apu = Apu::default();
    apu.cpu_write_port(0, 0x12);
    assert_eq!(apu.mem.read(0xF4), 0x12);
    assert_eq!(apu.cpu_read_port(0), 0x00);
    apu.mem.write(0xF5, 0x34);
    assert_eq!(apu.cpu_read_port(1), 0x34);
    assert_eq!(apu.cpu_read_port(5), 0x34);
}

#[test]
fn control_clears_cpu_ports_and_unmaps_ipl() {
    let mut apu = Apu::default();
    apu.cpu_write_port(0, 1);
    apu.cpu_write_port(3, 2);
    assert_eq!(apu.mem.read(0xFFC0), 0xCD);
    apu.mem.write(0xFFC0, 0x99);
    apu.mem.write(0xF1, 0x10);
    assert_eq!(apu.mem.read(0xF4), 0);
    assert_eq!(apu.mem.read(0xF7), 2);
    assert!(!apu.is_ipl_enabled());
    assert_eq!(apu.mem.read(0xFFC0), 0x99);
}

#[test]
fn timer_counter_through_io_page() {
    let mut apu = Apu::default();
    apu.mem.write(0xFA, 2);
    apu.mem.write(0xF1, 0x81);
    apu.mem.run_timers(128 * 2 * 5);
    assert_eq!(apu.mem.read(0xFD), 5);
    assert_eq!(apu.mem.read(0xFD), 0);
    assert_eq!(apu.mem.read(0xFE), 0);
}

#[test]
fn dsp_window_at_f2_f3() {
    let mut apu = Apu::default();
    apu.mem.write(0xF2, MVOL_L);
    apu.mem.write(0xF3, 0x55);
    assert_eq!(apu.read_dsp(MVOL_L), 0x55);
    assert_eq!(apu.mem.read(0xF3), 0x55);
    // $80 以上は書き込み不可
    apu.mem.write(0xF2, 0x8C);
    apu.mem.write(0xF3, 0x11);
    assert_eq!(apu.read_dsp(MVOL_L), 0x55);
}

fn run_until(apu: &mut Apu, done: impl Fn(&Apu) -> bool) -> bool {
    for _ in 0..2000 {
        apu.process(1364);
        if done(apu) {
            return true;
        }
    }
    false
}

#[test]
fn ipl_boot_signals_ready() {
    let mut apu = Apu::default();
    assert!(run_until(&mut apu, |a| a.cpu_read_port(0) == 0xAA
        && a.cpu_read_port(1) == 0xBB));
}

#[test]
fn ipl_uploads_program_and_jumps_to_it() {
    let mut apu = Apu::default();
    assert!(run_until(&mut apu, |a| a.cpu_read_port(0) == 0xAA));

    // MOV A,#$42 / MOV $F4,A / BRA *
    let program = [0xE8, 0x42, 0xC4, 0xF4, 0x2F, 0xFE];
    apu.cpu_write_port(1, 0x01);
    apu.cpu_write_port(2, 0x00);
    apu.cpu_write_port(3, 0x02);
    apu.cpu_write_port(0, 0xCC);
    assert!(run_until(&mut apu, |a| a.cpu_read_port(0) == 0xCC));

    for (i, byte) in program.iter().enumerate() {
        apu.cpu_write_port(1, *byte);
        apu.cpu_write_port(0, i as u8);
        assert!(run_until(&mut apu, |a| a.cpu_read_port(0) == i as u8));
    }

    apu.cpu_write_port(1, 0x00);
    apu.cpu_write_port(2, 0x00);
    apu.cpu_write_port(3, 0x02);
    apu.cpu_write_port(0, program.len() as u8 + 1);
    assert!(run_until(&mut apu, |a| a.cpu_read_port(0) == 0x42));
    assert_eq!(&apu.ram()[0x200..0x206], &program);
}

#[test]
fn sample_output_follows_master_clock() {
    let mut apu = Apu::new(32000);
    for _ in 0..262 {
        apu.process(1364);
    }
    let expected = (262u64 * 1364 * 32000 / MASTER_CLOCK) as usize;
    assert_eq!(apu.buffered_frames(), expected);
    assert_eq!(apu.take_samples().len(), expected * 2);
    assert_eq!(apu.buffered_frames(), 0);
}

// --- DSP voices ---

const DIR_PAGE: u8 = 0x20;

/// Voice 0 plays a looping constant sample, voice source 1 is a one-shot block.
fn dsp_fixture() -> Apu {
    let mut apu = Apu::default();
    let mut looped = [0x77u8; 9];
    looped[0] = 0xB3;
    let mut one_shot = [0x77u8; 9];
    one_shot[0] = 0xB1;
    apu.poke_ram(0x3000, &looped);
    apu.poke_ram(0x3100, &one_shot);
    apu.poke_ram(0x2000, &[0x00, 0x30, 0x00, 0x30, 0x00, 0x31, 0x00, 0x31]);

    apu.write_dsp(FLG, 0x20);
    apu.write_dsp(DIR, DIR_PAGE);
    apu.write_dsp(MVOL_L, 0x7F);
    apu.write_dsp(MVOL_R, 0x7F);
    for v in 0..2u8 {
        let base = v << 4;
        apu.write_dsp(base | V_VOL_L, 0x7F);
        apu.write_dsp(base | V_VOL_R, 0x7F);
        apu.write_dsp(base | V_PITCH_L, 0x00);
        apu.write_dsp(base | V_PITCH_H, 0x10);
    }
    apu
}

fn render(apu: &mut Apu, n: usize) -> Vec<[i16; 2]> {
    (0..n).map(|_| apu.mem.dsp.render_sample()).collect()
}

#[test]
fn attack_rises_monotonically_then_decays_to_sustain() {
    let mut apu = dsp_fixture();
    apu.write_dsp(V_ADSR1, 0x80 | (5 << 4));
    apu.write_dsp(V_ADSR2, 0x70);
    apu.write_dsp(KON, 0x01);

    let mut prev = 0;
    let mut left_attack = false;
    for _ in 0..4000 {
        render(&mut apu, 1);
        let v = apu.dsp().voice(0);
        if v.phase() != EnvelopePhase::Attack {
            assert_eq!(v.envelope(), 127);
            assert_eq!(v.phase(), EnvelopePhase::Decay);
            left_attack = true;
            break;
        }
        assert!(v.envelope() >= prev);
        prev = v.envelope();
    }
    assert!(left_attack);

    render(&mut apu, 5000);
    let v = apu.dsp().voice(0);
    assert_eq!(v.phase(), EnvelopePhase::Sustain);
    assert_eq!(v.envelope(), 63);
    assert_eq!(apu.read_dsp(V_ENVX), 63);
}

#[test]
fn key_off_releases_to_zero_and_reports_completion() {
    let mut apu = dsp_fixture();
    apu.write_dsp(V_ADSR1, 0x80 | (7 << 4));
    apu.write_dsp(V_ADSR2, 0xFF);
    apu.write_dsp(KON, 0x01);
    render(&mut apu, 8);
    assert!(apu.dsp().voice(0).envelope() > 0);
    assert!(apu.take_voice_events().is_empty());

    apu.write_dsp(KOFF, 0x01);
    let mut prev = apu.dsp().voice(0).envelope();
    for _ in 0..200 {
        render(&mut apu, 1);
        let level = apu.dsp().voice(0).envelope();
        assert!(level <= prev);
        prev = level;
    }
    assert_eq!(prev, 0);
    assert!(!apu.dsp().voice(0).is_enabled());
    assert_eq!(apu.take_voice_events(), vec![0]);
}

#[test]
fn one_shot_sample_sets_endx_and_stops() {
    let mut apu = dsp_fixture();
    apu.write_dsp(V_SRCN, 1);
    apu.write_dsp(V_ADSR1, 0xF0);
    apu.write_dsp(KON, 0x01);
    render(&mut apu, 15);
    assert!(apu.dsp().voice(0).is_enabled());
    assert_eq!(apu.read_dsp(ENDX) & 1, 0);
    render(&mut apu, 2);
    assert!(!apu.dsp().voice(0).is_enabled());
    assert_eq!(apu.read_dsp(ENDX) & 1, 1);
    assert_eq!(apu.take_voice_events(), vec![0]);

    apu.write_dsp(KON, 0x01);
    assert_eq!(apu.read_dsp(ENDX) & 1, 0);
}

#[test]
fn gain_direct_mode_sets_level() {
    let mut apu = dsp_fixture();
    apu.write_dsp(V_ADSR1, 0x00);
    apu.write_dsp(V_GAIN, 0x40);
    apu.write_dsp(KON, 0x01);
    render(&mut apu, 1);
    assert_eq!(apu.dsp().voice(0).envelope(), 0x40);
}

#[test]
fn lowering_gain_mid_note_never_reports_a_falling_attack() {
    let mut apu = dsp_fixture();
    apu.write_dsp(V_ADSR1, 0x70);
    apu.write_dsp(V_GAIN, 0x7F);
    apu.write_dsp(KON, 0x01);
    render(&mut apu, 2);
    assert_eq!(apu.dsp().voice(0).phase(), EnvelopePhase::Gain);
    assert_eq!(apu.dsp().voice(0).envelope(), 127);

    apu.write_dsp(V_GAIN, 0x10);
    render(&mut apu, 1);
    let v = apu.dsp().voice(0);
    assert_eq!(v.phase(), EnvelopePhase::Gain);
    assert_eq!(v.envelope(), 0x10);

    // ADSR を有効にするとアタックから再開
    apu.write_dsp(V_ADSR1, 0xF0);
    assert_eq!(apu.dsp().voice(0).phase(), EnvelopePhase::Attack);
    let mut prev = apu.dsp().voice(0).envelope();
    for _ in 0..4 {
        render(&mut apu, 1);
        let v = apu.dsp().voice(0);
        if v.phase() != EnvelopePhase::Attack {
            break;
        }
        assert!(v.envelope() >= prev);
        prev = v.envelope();
    }
}

#[test]
fn mix_reaches_output_and_mute_silences_it() {
    let mut apu = dsp_fixture();
    apu.write_dsp(V_ADSR1, 0xF0);
    apu.write_dsp(V_ADSR2, 0xF0);
    apu.write_dsp(KON, 0x01);
    let out = render(&mut apu, 16);
    assert!(out[15][0] > 0);
    assert_eq!(out[15][0], out[15][1]);

    apu.write_dsp(FLG, 0x60);
    let out = render(&mut apu, 4);
    assert!(out.iter().all(|s| *s == [0, 0]));
}

#[test]
fn soft_reset_flag_silences_voices() {
    let mut apu = dsp_fixture();
    apu.write_dsp(V_ADSR1, 0xF0);
    apu.write_dsp(KON, 0x01);
    render(&mut apu, 4);
    apu.write_dsp(FLG, 0x80);
    assert!(!apu.dsp().voice(0).is_enabled());
    assert_eq!(apu.dsp().voice(0).envelope(), 0);
}

#[test]
fn pitch_modulation_scales_by_previous_voice_pitch() {
    let mut apu = dsp_fixture();
    apu.write_dsp(V_PITCH_H, 0x20); // voice 0: 0x2000
    apu.write_dsp(PMON, 0x02);
    apu.write_dsp(0x10 | V_ADSR1, 0xF0);
    apu.write_dsp(KON, 0x02);
    render(&mut apu, 1);
    // 0x1000 * 0x2000 >> 12
    assert_eq!(apu.dsp().voice(1).position(), 0x2000);
}

#[test]
fn echo_enabled_voice_feeds_delay_line() {
    let mut apu = dsp_fixture();
    apu.write_dsp(FLG, 0x00);
    apu.write_dsp(V_ADSR1, 0xF0);
    apu.write_dsp(V_ADSR2, 0xF0);
    apu.write_dsp(EON, 0x01);
    apu.write_dsp(EDL, 0x01);
    apu.write_dsp(0x7F, 0x7F); // FIR tap 7
    apu.write_dsp(EVOL_L, 0x7F);
    apu.write_dsp(MVOL_L, 0x00); // ドライ音のみ消える。エコー入力はマスター音量の前
    apu.write_dsp(KON, 0x01);

    let out = render(&mut apu, echo::FRAMES_PER_EDL + 8);
    assert!(out[..echo::FRAMES_PER_EDL].iter().all(|s| s[0] == 0));
    assert!(out[echo::FRAMES_PER_EDL + 4][0] > 0);
}

#[test]
fn restore_reloads_ram_and_registers() {
    let mut apu = Apu::default();
    let mut ram = vec![0u8; RAM_LEN];
    ram[0x1234] = 0x56;
    let mut regs = [0u8; REGISTER_COUNT];
    regs[V_PITCH_L as usize] = 0x34;
    regs[V_PITCH_H as usize] = 0x12;
    regs[FLG as usize] = 0x20;
    let spc = SpcSnapshot {
        pc: 0x0400,
        a: 9,
        ..Default::default()
    };
    apu.restore(&ram, &regs, &spc);
    assert_eq!(apu.ram()[0x1234], 0x56);
    assert_eq!(apu.dsp().voice(0).pitch, 0x1234);
    assert_eq!(apu.spc().pc, 0x0400);
    assert_eq!(apu.spc().a, 9);
}
