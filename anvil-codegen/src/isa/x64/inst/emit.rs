//! x86-64 binary code emission.

use crate::binemit::Reloc;
use crate::ir::TrapCode;
use crate::isa::x64::inst::*;
use crate::isa::x64::settings as x64_settings;
use crate::machinst::abi::FrameLayout;
use crate::machinst::{MachBuffer, MachInstEmit, MachInstEmitState, MachLabel, Reg};
use crate::settings;

/// Emission state carried between instructions.
#[derive(Clone, Debug)]
pub struct EmitState {
    frame: FrameLayout,
}

impl MachInstEmitState for EmitState {
    fn new(frame: FrameLayout) -> Self {
        Self { frame }
    }

    fn frame_layout(&self) -> &FrameLayout {
        &self.frame
    }
}

/// Constant information used in emission.
#[derive(Clone, Debug, Default)]
pub struct EmitInfo {
    _flags: settings::Flags,
    pub(crate) isa_flags: x64_settings::Flags,
}

impl EmitInfo {
    /// Create emission info from the shared and ISA flags.
    pub fn new(flags: settings::Flags, isa_flags: x64_settings::Flags) -> Self {
        Self {
            _flags: flags,
            isa_flags,
        }
    }
}

/// The hardware encoding of a register (0-15).
pub(crate) fn reg_enc(reg: Reg) -> u8 {
    reg.to_real_reg().hw_enc() as u8
}

/// A small bit field to record a REX prefix specification:
/// - bit 0 set to 1 indicates REX.W must be 0 (cleared).
/// - bit 1 set to 1 indicates the REX prefix must always be emitted.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub(crate) struct RexFlags(u8);

impl RexFlags {
    /// By default, set the W field, and don't always emit.
    pub(crate) fn set_w() -> Self {
        Self(0)
    }

    /// Creates a new RexPrefix for which the REX.W bit will be cleared.
    pub(crate) fn clear_w() -> Self {
        Self(1)
    }

    /// True if 64-bit operands are used.
    pub(crate) fn must_clear_w(self) -> bool {
        (self.0 & 1) != 0
    }

    /// Require that the REX prefix is emitted.
    pub(crate) fn always_emit(&mut self) -> &mut Self {
        self.0 |= 2;
        self
    }

    /// True if the REX prefix must always be emitted.
    pub(crate) fn must_always_emit(self) -> bool {
        (self.0 & 2) != 0
    }

    /// An 8-bit access of one of SPL, BPL, SIL, DIL requires a REX prefix
    /// even with no extension bits set, since without one the encodings
    /// mean AH, CH, DH, BH.
    pub(crate) fn always_emit_if_8bit_needed(&mut self, enc: u8) -> &mut Self {
        if (4..=7).contains(&enc) {
            self.always_emit();
        }
        self
    }

    /// Emit the rex prefix if the referenced register would require it for
    /// 8-bit operands.
    pub(crate) fn emit_two_op(self, sink: &mut MachBuffer<Inst>, enc_g: u8, enc_e: u8) {
        let w = if self.must_clear_w() { 0 } else { 1 };
        let r = (enc_g >> 3) & 1;
        let x = 0;
        let b = (enc_e >> 3) & 1;
        let rex = 0x40 | (w << 3) | (r << 2) | (x << 1) | b;
        if rex != 0x40 || self.must_always_emit() {
            sink.put1(rex);
        }
    }

    /// Emit a REX prefix for a three-operand (reg, index, base) form.
    pub(crate) fn emit_three_op(self, sink: &mut MachBuffer<Inst>, enc_g: u8, enc_index: u8, enc_base: u8) {
        let w = if self.must_clear_w() { 0 } else { 1 };
        let r = (enc_g >> 3) & 1;
        let x = (enc_index >> 3) & 1;
        let b = (enc_base >> 3) & 1;
        let rex = 0x40 | (w << 3) | (r << 2) | (x << 1) | b;
        if rex != 0x40 || self.must_always_emit() {
            sink.put1(rex);
        }
    }
}

/// Legacy opcode prefixes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum LegacyPrefixes {
    /// No prefix.
    None,
    /// Operand-size override (0x66).
    _66,
    /// REPNE (0xF2), selecting scalar-double SSE forms.
    _F2,
    /// REP (0xF3), selecting scalar-single SSE forms.
    _F3,
}

impl LegacyPrefixes {
    pub(crate) fn emit(self, sink: &mut MachBuffer<Inst>) {
        match self {
            Self::None => {}
            Self::_66 => sink.put1(0x66),
            Self::_F2 => sink.put1(0xF2),
            Self::_F3 => sink.put1(0xF3),
        }
    }
}

/// ModR/M byte.
fn encode_modrm(m0d: u8, enc_reg_g: u8, rm_e: u8) -> u8 {
    debug_assert!(m0d < 4);
    ((m0d & 3) << 6) | ((enc_reg_g & 7) << 3) | (rm_e & 7)
}

/// SIB byte.
fn encode_sib(scale: u8, enc_index: u8, enc_base: u8) -> u8 {
    debug_assert!(scale < 4);
    ((scale & 3) << 6) | ((enc_index & 7) << 3) | (enc_base & 7)
}

/// Emit the opcode byte(s); `num_opcodes` low-order bytes of `opcodes`
/// are emitted, high byte first.
fn emit_opcodes(sink: &mut MachBuffer<Inst>, opcodes: u32, num_opcodes: usize) {
    for i in (0..num_opcodes).rev() {
        sink.put1(((opcodes >> (i * 8)) & 0xff) as u8);
    }
}

/// Emit a standard reg-reg instruction: prefixes, opcode, ModR/M with
/// mod=11.
pub(crate) fn emit_std_reg_reg(
    sink: &mut MachBuffer<Inst>,
    prefix: LegacyPrefixes,
    opcodes: u32,
    num_opcodes: usize,
    enc_g: u8,
    enc_e: u8,
    rex: RexFlags,
) {
    prefix.emit(sink);
    rex.emit_two_op(sink, enc_g, enc_e);
    emit_opcodes(sink, opcodes, num_opcodes);
    sink.put1(encode_modrm(3, enc_g, enc_e));
}

/// Emit a standard reg-mem instruction: prefixes, opcode, then ModR/M,
/// optional SIB, and displacement for the memory operand.
///
/// Special cases, per the hardware encoding rules:
/// - base RSP or R12 (low bits 100) forces a SIB byte;
/// - base RBP or R13 (low bits 101) cannot use mod=00 and gets a disp8
///   of zero instead;
/// - RIP-relative addressing uses mod=00, rm=101 with a disp32.
pub(crate) fn emit_std_reg_mem(
    sink: &mut MachBuffer<Inst>,
    prefix: LegacyPrefixes,
    opcodes: u32,
    num_opcodes: usize,
    enc_g: u8,
    mem: &Amode,
    rex: RexFlags,
) {
    match *mem {
        Amode::ImmReg { simm32, base } => {
            let enc_e = reg_enc(base);
            prefix.emit(sink);
            rex.emit_two_op(sink, enc_g, enc_e);
            emit_opcodes(sink, opcodes, num_opcodes);

            if (enc_e & 7) == ENC_RSP {
                // Base RSP/R12: SIB required (index=100 means none).
                if simm32 == 0 {
                    sink.put1(encode_modrm(0, enc_g, 4));
                    sink.put1(encode_sib(0, 4, enc_e));
                } else if let Ok(d8) = i8::try_from(simm32) {
                    sink.put1(encode_modrm(1, enc_g, 4));
                    sink.put1(encode_sib(0, 4, enc_e));
                    sink.put1(d8 as u8);
                } else {
                    sink.put1(encode_modrm(2, enc_g, 4));
                    sink.put1(encode_sib(0, 4, enc_e));
                    sink.put4(simm32 as u32);
                }
            } else if simm32 == 0 && (enc_e & 7) != ENC_RBP {
                sink.put1(encode_modrm(0, enc_g, enc_e));
            } else if let Ok(d8) = i8::try_from(simm32) {
                sink.put1(encode_modrm(1, enc_g, enc_e));
                sink.put1(d8 as u8);
            } else {
                sink.put1(encode_modrm(2, enc_g, enc_e));
                sink.put4(simm32 as u32);
            }
        }
        Amode::ImmRegRegShift {
            simm32,
            base,
            index,
            shift,
        } => {
            let enc_base = reg_enc(base);
            let enc_index = reg_enc(index);
            debug_assert_ne!(enc_index & 7, 4, "index cannot be RSP");
            prefix.emit(sink);
            rex.emit_three_op(sink, enc_g, enc_index, enc_base);
            emit_opcodes(sink, opcodes, num_opcodes);
            if simm32 == 0 && (enc_base & 7) != ENC_RBP {
                sink.put1(encode_modrm(0, enc_g, 4));
                sink.put1(encode_sib(shift, enc_index, enc_base));
            } else if let Ok(d8) = i8::try_from(simm32) {
                sink.put1(encode_modrm(1, enc_g, 4));
                sink.put1(encode_sib(shift, enc_index, enc_base));
                sink.put1(d8 as u8);
            } else {
                sink.put1(encode_modrm(2, enc_g, 4));
                sink.put1(encode_sib(shift, enc_index, enc_base));
                sink.put4(simm32 as u32);
            }
        }
        Amode::RipRelative { target } => {
            prefix.emit(sink);
            rex.emit_two_op(sink, enc_g, 0);
            emit_opcodes(sink, opcodes, num_opcodes);
            sink.put1(encode_modrm(0, enc_g, 5));
            let offset = sink.cur_offset();
            sink.use_label_at_offset(offset, target, LabelUse::JmpRel32);
            sink.put4(0);
        }
    }
}

/// A two- or three-byte VEX prefix builder, used for the AVX forms of
/// the scalar float instructions.
pub(crate) struct VexInstruction {
    length_256: bool,
    prefix: LegacyPrefixes,
    map_0f38: bool,
    map_0f3a: bool,
    w: bool,
    opcode: u8,
    reg: u8,
    vvvv: u8,
    rm_enc: u8,
    rm_is_reg: bool,
}

impl VexInstruction {
    /// A scalar VEX.128 instruction in the 0F map.
    pub(crate) fn new() -> Self {
        Self {
            length_256: false,
            prefix: LegacyPrefixes::None,
            map_0f38: false,
            map_0f3a: false,
            w: false,
            opcode: 0,
            reg: 0,
            vvvv: 0,
            rm_enc: 0,
            rm_is_reg: true,
        }
    }

    pub(crate) fn prefix(mut self, prefix: LegacyPrefixes) -> Self {
        self.prefix = prefix;
        self
    }

    pub(crate) fn w(mut self, w: bool) -> Self {
        self.w = w;
        self
    }

    pub(crate) fn opcode(mut self, op: u8) -> Self {
        self.opcode = op;
        self
    }

    pub(crate) fn reg(mut self, enc: u8) -> Self {
        self.reg = enc;
        self
    }

    pub(crate) fn vvvv(mut self, enc: u8) -> Self {
        self.vvvv = enc;
        self
    }

    pub(crate) fn rm(mut self, enc: u8) -> Self {
        self.rm_enc = enc;
        self.rm_is_reg = true;
        self
    }

    /// Encode into the sink: picks the 2-byte form when the X, B and W
    /// bits allow it, the 3-byte form otherwise.
    pub(crate) fn encode(self, sink: &mut MachBuffer<Inst>) {
        debug_assert!(self.rm_is_reg);
        let r = ((self.reg >> 3) & 1) ^ 1;
        let x = 1; // inverted; no index register
        let b = (((self.rm_enc >> 3) & 1)) ^ 1;
        let pp = match self.prefix {
            LegacyPrefixes::None => 0b00,
            LegacyPrefixes::_66 => 0b01,
            LegacyPrefixes::_F3 => 0b10,
            LegacyPrefixes::_F2 => 0b11,
        };
        let l = u8::from(self.length_256);
        let vvvv_inv = (!self.vvvv) & 0xf;
        let mmmmm = if self.map_0f38 {
            0b00010
        } else if self.map_0f3a {
            0b00011
        } else {
            0b00001
        };
        if !self.w && b == 1 && mmmmm == 0b00001 {
            // Two-byte form: C5 [R vvvv L pp].
            sink.put1(0xC5);
            sink.put1((r << 7) | (vvvv_inv << 3) | (l << 2) | pp);
        } else {
            // Three-byte form: C4 [R X B mmmmm] [W vvvv L pp].
            sink.put1(0xC4);
            sink.put1((r << 7) | (x << 6) | (b << 5) | mmmmm);
            sink.put1(((self.w as u8) << 7) | (vvvv_inv << 3) | (l << 2) | pp);
        }
        sink.put1(self.opcode);
        sink.put1(encode_modrm(3, self.reg, self.rm_enc));
    }
}

/// A four-byte EVEX prefix builder, for the AVX-512 forms of the scalar
/// float instructions (VEX-equivalent subset: 128-bit, no opmask, no
/// broadcast).
pub(crate) struct EvexInstruction {
    prefix: LegacyPrefixes,
    w: bool,
    opcode: u8,
    reg: u8,
    vvvv: u8,
    rm_enc: u8,
}

impl EvexInstruction {
    /// A scalar EVEX instruction in the 0F map.
    pub(crate) fn new() -> Self {
        Self {
            prefix: LegacyPrefixes::None,
            w: false,
            opcode: 0,
            reg: 0,
            vvvv: 0,
            rm_enc: 0,
        }
    }

    pub(crate) fn prefix(mut self, prefix: LegacyPrefixes) -> Self {
        self.prefix = prefix;
        self
    }

    pub(crate) fn w(mut self, w: bool) -> Self {
        self.w = w;
        self
    }

    pub(crate) fn opcode(mut self, op: u8) -> Self {
        self.opcode = op;
        self
    }

    pub(crate) fn reg(mut self, enc: u8) -> Self {
        self.reg = enc;
        self
    }

    pub(crate) fn vvvv(mut self, enc: u8) -> Self {
        self.vvvv = enc;
        self
    }

    pub(crate) fn rm(mut self, enc: u8) -> Self {
        self.rm_enc = enc;
        self
    }

    /// Encode: 62 [R X B R' 0 0 m m] [W vvvv 1 pp] [z L'L b V' aaa].
    pub(crate) fn encode(self, sink: &mut MachBuffer<Inst>) {
        let r = ((self.reg >> 3) & 1) ^ 1;
        let x = 1;
        let b = ((self.rm_enc >> 3) & 1) ^ 1;
        let r_prime = 1; // not using regs 16-31
        let mm = 0b01; // 0F map
        let pp = match self.prefix {
            LegacyPrefixes::None => 0b00,
            LegacyPrefixes::_66 => 0b01,
            LegacyPrefixes::_F3 => 0b10,
            LegacyPrefixes::_F2 => 0b11,
        };
        let vvvv_inv = (!self.vvvv) & 0xf;
        let v_prime = 1;
        sink.put1(0x62);
        sink.put1((r << 7) | (x << 6) | (b << 5) | (r_prime << 4) | mm);
        sink.put1(((self.w as u8) << 7) | (vvvv_inv << 3) | (1 << 2) | pp);
        sink.put1((v_prime << 3)); // z=0, L'L=00, b=0, aaa=000
        sink.put1(self.opcode);
        sink.put1(encode_modrm(3, self.reg, self.rm_enc));
    }
}

/// Resolve a synthetic address against the frame layout.
pub(crate) fn amode_finalize(addr: &SyntheticAmode, state: &EmitState) -> Amode {
    let frame = state.frame_layout();
    match *addr {
        SyntheticAmode::Real(amode) => amode,
        SyntheticAmode::SPOffset { off } => Amode::ImmReg {
            simm32: i32::try_from(off).unwrap(),
            base: rsp(),
        },
        SyntheticAmode::IncomingArg { off } => Amode::ImmReg {
            simm32: i32::try_from(frame.incoming_args_offset() + off).unwrap(),
            base: rsp(),
        },
        SyntheticAmode::SpillOffset { slot } => Amode::ImmReg {
            simm32: i32::try_from(frame.spillslot_offset(slot)).unwrap(),
            base: rsp(),
        },
        SyntheticAmode::StackSlotOffset { off } => Amode::ImmReg {
            simm32: i32::try_from(frame.stackslot_area_offset() as i64 + off).unwrap(),
            base: rsp(),
        },
    }
}

/// The (prefix, opcode) pair for an SSE opcode's legacy encoding.
fn sse_op_enc(op: SseOpcode) -> (LegacyPrefixes, u32, usize) {
    use LegacyPrefixes as P;
    use SseOpcode::*;
    match op {
        Addss => (P::_F3, 0x0F58, 2),
        Addsd => (P::_F2, 0x0F58, 2),
        Subss => (P::_F3, 0x0F5C, 2),
        Subsd => (P::_F2, 0x0F5C, 2),
        Mulss => (P::_F3, 0x0F59, 2),
        Mulsd => (P::_F2, 0x0F59, 2),
        Divss => (P::_F3, 0x0F5E, 2),
        Divsd => (P::_F2, 0x0F5E, 2),
        Minss => (P::_F3, 0x0F5D, 2),
        Minsd => (P::_F2, 0x0F5D, 2),
        Maxss => (P::_F3, 0x0F5F, 2),
        Maxsd => (P::_F2, 0x0F5F, 2),
        Andps => (P::None, 0x0F54, 2),
        Andpd => (P::_66, 0x0F54, 2),
        Orps => (P::None, 0x0F56, 2),
        Orpd => (P::_66, 0x0F56, 2),
        Xorps => (P::None, 0x0F57, 2),
        Xorpd => (P::_66, 0x0F57, 2),
        Sqrtss => (P::_F3, 0x0F51, 2),
        Sqrtsd => (P::_F2, 0x0F51, 2),
        Cvtss2sd => (P::_F3, 0x0F5A, 2),
        Cvtsd2ss => (P::_F2, 0x0F5A, 2),
        Ucomiss => (P::None, 0x0F2E, 2),
        Ucomisd => (P::_66, 0x0F2E, 2),
        Movss => (P::_F3, 0x0F10, 2),
        Movsd => (P::_F2, 0x0F10, 2),
    }
}

/// Can this SSE op be emitted in a VEX/EVEX 3-operand form?
fn sse_op_vex_ok(op: SseOpcode) -> bool {
    use SseOpcode::*;
    matches!(
        op,
        Addss | Addsd | Subss | Subsd | Mulss | Mulsd | Divss | Divsd | Minss | Minsd | Maxss
            | Maxsd
    )
}

fn one_way_jmp(sink: &mut MachBuffer<Inst>, cc: CC, label: MachLabel) {
    sink.put1(0x0F);
    sink.put1(0x80 + cc.get_enc());
    let offset = sink.cur_offset();
    sink.use_label_at_offset(offset, label, LabelUse::JmpRel32);
    sink.put4(0);
}

impl MachInstEmit for Inst {
    type State = EmitState;
    type Info = EmitInfo;

    fn emit(&self, sink: &mut MachBuffer<Inst>, info: &Self::Info, state: &mut EmitState) {
        match self {
            Inst::Nop { len } => {
                for _ in 0..*len {
                    sink.put1(0x90);
                }
            }

            Inst::AluRmiR {
                size,
                op,
                src2,
                dst,
                ..
            } => {
                let rex = if size.rex_w() {
                    RexFlags::set_w()
                } else {
                    RexFlags::clear_w()
                };
                let enc_dst = reg_enc(dst.to_reg());
                // (opcode for reg <- rm form, /digit for the imm form)
                let (opcode, digit) = match op {
                    AluRmiROpcode::Add => (0x03, 0),
                    AluRmiROpcode::Or => (0x0B, 1),
                    AluRmiROpcode::And => (0x23, 4),
                    AluRmiROpcode::Sub => (0x2B, 5),
                    AluRmiROpcode::Xor => (0x33, 6),
                };
                match src2 {
                    RegMemImm::Reg { reg } => {
                        emit_std_reg_reg(
                            sink,
                            LegacyPrefixes::None,
                            opcode,
                            1,
                            enc_dst,
                            reg_enc(*reg),
                            rex,
                        );
                    }
                    RegMemImm::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            LegacyPrefixes::None,
                            opcode,
                            1,
                            enc_dst,
                            &amode,
                            rex,
                        );
                    }
                    RegMemImm::Imm { simm32 } => {
                        if let Ok(imm8) = i8::try_from(*simm32) {
                            // 83 /digit ib
                            emit_std_reg_reg(
                                sink,
                                LegacyPrefixes::None,
                                0x83,
                                1,
                                digit,
                                enc_dst,
                                rex,
                            );
                            sink.put1(imm8 as u8);
                        } else {
                            // 81 /digit id
                            emit_std_reg_reg(
                                sink,
                                LegacyPrefixes::None,
                                0x81,
                                1,
                                digit,
                                enc_dst,
                                rex,
                            );
                            sink.put4(*simm32 as u32);
                        }
                    }
                }
            }

            Inst::Imul {
                size, src2, dst, ..
            } => {
                let rex = if size.rex_w() {
                    RexFlags::set_w()
                } else {
                    RexFlags::clear_w()
                };
                let enc_dst = reg_enc(dst.to_reg());
                match src2 {
                    RegMem::Reg { reg } => emit_std_reg_reg(
                        sink,
                        LegacyPrefixes::None,
                        0x0FAF,
                        2,
                        enc_dst,
                        reg_enc(*reg),
                        rex,
                    ),
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            LegacyPrefixes::None,
                            0x0FAF,
                            2,
                            enc_dst,
                            &amode,
                            rex,
                        );
                    }
                }
            }

            Inst::UnaryRmR { size, op, src, dst } => {
                let rex = if size.rex_w() {
                    RexFlags::set_w()
                } else {
                    RexFlags::clear_w()
                };
                let opcode = match op {
                    UnaryRmROpcode::Lzcnt => 0x0FBD,
                    UnaryRmROpcode::Tzcnt => 0x0FBC,
                    UnaryRmROpcode::Popcnt => 0x0FB8,
                };
                let enc_dst = reg_enc(dst.to_reg());
                match src {
                    RegMem::Reg { reg } => emit_std_reg_reg(
                        sink,
                        LegacyPrefixes::_F3,
                        opcode,
                        2,
                        enc_dst,
                        reg_enc(*reg),
                        rex,
                    ),
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            LegacyPrefixes::_F3,
                            opcode,
                            2,
                            enc_dst,
                            &amode,
                            rex,
                        );
                    }
                }
            }

            Inst::Imm {
                dst_size,
                simm64,
                dst,
            } => {
                let enc_dst = reg_enc(dst.to_reg());
                if *dst_size == OperandSize::Size64 {
                    if let Ok(simm32) = i32::try_from(*simm64 as i64) {
                        // Negative values: C7 /0 id, sign-extended.
                        RexFlags::set_w().emit_two_op(sink, 0, enc_dst);
                        sink.put1(0xC7);
                        sink.put1(encode_modrm(3, 0, enc_dst));
                        sink.put4(simm32 as u32);
                    } else if u32::try_from(*simm64).is_ok() {
                        // mov r32, imm32 zero-extends.
                        RexFlags::clear_w().emit_two_op(sink, 0, enc_dst);
                        sink.put1(0xB8 | (enc_dst & 7));
                        sink.put4(*simm64 as u32);
                    } else {
                        // movabs.
                        RexFlags::set_w().emit_two_op(sink, 0, enc_dst);
                        sink.put1(0xB8 | (enc_dst & 7));
                        sink.put8(*simm64);
                    }
                } else {
                    RexFlags::clear_w().emit_two_op(sink, 0, enc_dst);
                    sink.put1(0xB8 | (enc_dst & 7));
                    sink.put4(*simm64 as u32);
                }
            }

            Inst::MovRR { size, src, dst } => {
                let rex = if size.rex_w() {
                    RexFlags::set_w()
                } else {
                    RexFlags::clear_w()
                };
                emit_std_reg_reg(
                    sink,
                    LegacyPrefixes::None,
                    0x89,
                    1,
                    reg_enc(*src),
                    reg_enc(dst.to_reg()),
                    rex,
                );
            }

            Inst::MovzxRmR { ext_mode, src, dst } => {
                let (opcode, num, rex) = match ext_mode {
                    ExtMode::BL => (0x0FB6, 2, RexFlags::clear_w()),
                    ExtMode::BQ => (0x0FB6, 2, RexFlags::set_w()),
                    ExtMode::WL => (0x0FB7, 2, RexFlags::clear_w()),
                    ExtMode::WQ => (0x0FB7, 2, RexFlags::set_w()),
                    // A plain 32-bit mov zero-extends to 64 bits.
                    ExtMode::LQ => (0x8B, 1, RexFlags::clear_w()),
                };
                let mut rex = rex;
                let enc_dst = reg_enc(dst.to_reg());
                match src {
                    RegMem::Reg { reg } => {
                        let enc_src = reg_enc(*reg);
                        if matches!(ext_mode, ExtMode::BL | ExtMode::BQ) {
                            rex.always_emit_if_8bit_needed(enc_src);
                        }
                        emit_std_reg_reg(
                            sink,
                            LegacyPrefixes::None,
                            opcode,
                            num,
                            enc_dst,
                            enc_src,
                            rex,
                        );
                    }
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            LegacyPrefixes::None,
                            opcode,
                            num,
                            enc_dst,
                            &amode,
                            rex,
                        );
                    }
                }
            }

            Inst::MovsxRmR { ext_mode, src, dst } => {
                let (opcode, num, rex) = match ext_mode {
                    ExtMode::BL => (0x0FBE, 2, RexFlags::clear_w()),
                    ExtMode::BQ => (0x0FBE, 2, RexFlags::set_w()),
                    ExtMode::WL => (0x0FBF, 2, RexFlags::clear_w()),
                    ExtMode::WQ => (0x0FBF, 2, RexFlags::set_w()),
                    ExtMode::LQ => (0x63, 1, RexFlags::set_w()),
                };
                let mut rex = rex;
                let enc_dst = reg_enc(dst.to_reg());
                match src {
                    RegMem::Reg { reg } => {
                        let enc_src = reg_enc(*reg);
                        if matches!(ext_mode, ExtMode::BL | ExtMode::BQ) {
                            rex.always_emit_if_8bit_needed(enc_src);
                        }
                        emit_std_reg_reg(
                            sink,
                            LegacyPrefixes::None,
                            opcode,
                            num,
                            enc_dst,
                            enc_src,
                            rex,
                        );
                    }
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            LegacyPrefixes::None,
                            opcode,
                            num,
                            enc_dst,
                            &amode,
                            rex,
                        );
                    }
                }
            }

            Inst::Mov64MR { src, dst } => {
                let amode = amode_finalize(src, state);
                emit_std_reg_mem(
                    sink,
                    LegacyPrefixes::None,
                    0x8B,
                    1,
                    reg_enc(dst.to_reg()),
                    &amode,
                    RexFlags::set_w(),
                );
            }

            Inst::MovRM { size, src, dst } => {
                let amode = amode_finalize(dst, state);
                let enc_src = reg_enc(*src);
                match size {
                    OperandSize::Size8 => {
                        let mut rex = RexFlags::clear_w();
                        rex.always_emit_if_8bit_needed(enc_src);
                        emit_std_reg_mem(
                            sink,
                            LegacyPrefixes::None,
                            0x88,
                            1,
                            enc_src,
                            &amode,
                            rex,
                        );
                    }
                    OperandSize::Size16 => emit_std_reg_mem(
                        sink,
                        LegacyPrefixes::_66,
                        0x89,
                        1,
                        enc_src,
                        &amode,
                        RexFlags::clear_w(),
                    ),
                    OperandSize::Size32 => emit_std_reg_mem(
                        sink,
                        LegacyPrefixes::None,
                        0x89,
                        1,
                        enc_src,
                        &amode,
                        RexFlags::clear_w(),
                    ),
                    OperandSize::Size64 => emit_std_reg_mem(
                        sink,
                        LegacyPrefixes::None,
                        0x89,
                        1,
                        enc_src,
                        &amode,
                        RexFlags::set_w(),
                    ),
                }
            }

            Inst::ShiftR {
                size,
                kind,
                num_bits,
                dst,
                ..
            } => {
                let rex = if size.rex_w() {
                    RexFlags::set_w()
                } else {
                    RexFlags::clear_w()
                };
                let digit = match kind {
                    ShiftKind::RotateLeft => 0,
                    ShiftKind::RotateRight => 1,
                    ShiftKind::ShiftLeft => 4,
                    ShiftKind::ShiftRightLogical => 5,
                    ShiftKind::ShiftRightArithmetic => 7,
                };
                let enc_dst = reg_enc(dst.to_reg());
                match num_bits {
                    Imm8Reg::Reg { .. } => {
                        // The count is in CL.
                        emit_std_reg_reg(
                            sink,
                            LegacyPrefixes::None,
                            0xD3,
                            1,
                            digit,
                            enc_dst,
                            rex,
                        );
                    }
                    Imm8Reg::Imm8 { imm } => {
                        emit_std_reg_reg(
                            sink,
                            LegacyPrefixes::None,
                            0xC1,
                            1,
                            digit,
                            enc_dst,
                            rex,
                        );
                        sink.put1(*imm);
                    }
                }
            }

            Inst::CmpRmiR { size, src, dst } => {
                emit_cmp_or_test(sink, state, *size, src, *dst, /* is_cmp = */ true);
            }

            Inst::TestRmiR { size, src, dst } => {
                emit_cmp_or_test(sink, state, *size, src, *dst, /* is_cmp = */ false);
            }

            Inst::Setcc { cc, dst } => {
                let enc_dst = reg_enc(dst.to_reg());
                let mut rex = RexFlags::clear_w();
                rex.always_emit_if_8bit_needed(enc_dst);
                emit_std_reg_reg(
                    sink,
                    LegacyPrefixes::None,
                    0x0F90 + cc.get_enc() as u32,
                    2,
                    0,
                    enc_dst,
                    rex,
                );
            }

            Inst::Cmove {
                size,
                cc,
                consequent,
                dst,
                ..
            } => {
                let rex = if size.rex_w() {
                    RexFlags::set_w()
                } else {
                    RexFlags::clear_w()
                };
                let opcode = 0x0F40 + cc.get_enc() as u32;
                let enc_dst = reg_enc(dst.to_reg());
                match consequent {
                    RegMem::Reg { reg } => emit_std_reg_reg(
                        sink,
                        LegacyPrefixes::None,
                        opcode,
                        2,
                        enc_dst,
                        reg_enc(*reg),
                        rex,
                    ),
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            LegacyPrefixes::None,
                            opcode,
                            2,
                            enc_dst,
                            &amode,
                            rex,
                        );
                    }
                }
            }

            Inst::SignExtendData { size, .. } => {
                // cdq / cqo.
                if size.rex_w() {
                    sink.put1(0x48);
                }
                sink.put1(0x99);
            }

            Inst::Div {
                size,
                signed,
                divisor,
                ..
            } => {
                let rex = if size.rex_w() {
                    RexFlags::set_w()
                } else {
                    RexFlags::clear_w()
                };
                let digit = if *signed { 7 } else { 6 };
                // The hardware traps on division by zero; record the trap
                // at the instruction itself.
                sink.add_trap(TrapCode::IntegerDivisionByZero);
                match divisor {
                    RegMem::Reg { reg } => emit_std_reg_reg(
                        sink,
                        LegacyPrefixes::None,
                        0xF7,
                        1,
                        digit,
                        reg_enc(*reg),
                        rex,
                    ),
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            LegacyPrefixes::None,
                            0xF7,
                            1,
                            digit,
                            &amode,
                            rex,
                        );
                    }
                }
            }

            Inst::Push64 { src } => {
                let enc = reg_enc(*src);
                if enc >= 8 {
                    sink.put1(0x41);
                }
                sink.put1(0x50 | (enc & 7));
            }

            Inst::Pop64 { dst } => {
                let enc = reg_enc(dst.to_reg());
                if enc >= 8 {
                    sink.put1(0x41);
                }
                sink.put1(0x58 | (enc & 7));
            }

            Inst::XmmRmR {
                op,
                src1,
                src2,
                dst,
            } => {
                let enc_dst = reg_enc(dst.to_reg());
                let (prefix, opcodes, num) = sse_op_enc(*op);
                let use_vex = info.isa_flags.has_avx && sse_op_vex_ok(*op);
                let use_evex = info.isa_flags.has_avx512 && sse_op_vex_ok(*op);
                match src2 {
                    RegMem::Reg { reg } if use_evex => {
                        EvexInstruction::new()
                            .prefix(prefix)
                            .opcode((opcodes & 0xff) as u8)
                            .reg(enc_dst)
                            .vvvv(reg_enc(*src1))
                            .rm(reg_enc(*reg))
                            .encode(sink);
                    }
                    RegMem::Reg { reg } if use_vex => {
                        VexInstruction::new()
                            .prefix(prefix)
                            .opcode((opcodes & 0xff) as u8)
                            .reg(enc_dst)
                            .vvvv(reg_enc(*src1))
                            .rm(reg_enc(*reg))
                            .encode(sink);
                    }
                    RegMem::Reg { reg } => {
                        emit_std_reg_reg(
                            sink,
                            prefix,
                            opcodes,
                            num,
                            enc_dst,
                            reg_enc(*reg),
                            RexFlags::clear_w(),
                        );
                    }
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            prefix,
                            opcodes,
                            num,
                            enc_dst,
                            &amode,
                            RexFlags::clear_w(),
                        );
                    }
                }
            }

            Inst::XmmUnaryRmR { op, src, dst } => {
                let enc_dst = reg_enc(dst.to_reg());
                let (prefix, opcodes, num) = sse_op_enc(*op);
                match src {
                    RegMem::Reg { reg } => emit_std_reg_reg(
                        sink,
                        prefix,
                        opcodes,
                        num,
                        enc_dst,
                        reg_enc(*reg),
                        RexFlags::clear_w(),
                    ),
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            prefix,
                            opcodes,
                            num,
                            enc_dst,
                            &amode,
                            RexFlags::clear_w(),
                        );
                    }
                }
            }

            Inst::XmmMovRR { src, dst } => {
                // movaps dst, src.
                emit_std_reg_reg(
                    sink,
                    LegacyPrefixes::None,
                    0x0F28,
                    2,
                    reg_enc(dst.to_reg()),
                    reg_enc(*src),
                    RexFlags::clear_w(),
                );
            }

            Inst::XmmMovRM { op, src, dst } => {
                // The store forms: opcode 0x11.
                let (prefix, _, _) = sse_op_enc(*op);
                let amode = amode_finalize(dst, state);
                emit_std_reg_mem(
                    sink,
                    prefix,
                    0x0F11,
                    2,
                    reg_enc(*src),
                    &amode,
                    RexFlags::clear_w(),
                );
            }

            Inst::XmmCmpRmR { op, src, dst } => {
                let (prefix, opcodes, num) = sse_op_enc(*op);
                let enc_dst = reg_enc(*dst);
                match src {
                    RegMem::Reg { reg } => emit_std_reg_reg(
                        sink,
                        prefix,
                        opcodes,
                        num,
                        enc_dst,
                        reg_enc(*reg),
                        RexFlags::clear_w(),
                    ),
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(
                            sink,
                            prefix,
                            opcodes,
                            num,
                            enc_dst,
                            &amode,
                            RexFlags::clear_w(),
                        );
                    }
                }
            }

            Inst::XmmLoadConst {
                const_data,
                is_f64,
                dst,
            } => {
                let bytes = const_data.to_le_bytes();
                let (data, align, op): (&[u8], u32, SseOpcode) = if *is_f64 {
                    (&bytes, 8, SseOpcode::Movsd)
                } else {
                    (&bytes[0..4], 4, SseOpcode::Movss)
                };
                let label = sink.defer_constant(data, align);
                let load = Inst::XmmUnaryRmR {
                    op,
                    src: RegMem::Mem {
                        addr: SyntheticAmode::Real(Amode::RipRelative { target: label }),
                    },
                    dst: *dst,
                };
                load.emit(sink, info, state);
            }

            Inst::XmmToGpr {
                op,
                src,
                dst,
                dst_size,
            } => {
                let rex = if dst_size.rex_w() {
                    RexFlags::set_w()
                } else {
                    RexFlags::clear_w()
                };
                match op {
                    XmmToGprOp::MovdMovq => {
                        // 66 (REX.W) 0F 7E /r, reg field = xmm.
                        emit_std_reg_reg(
                            sink,
                            LegacyPrefixes::_66,
                            0x0F7E,
                            2,
                            reg_enc(*src),
                            reg_enc(dst.to_reg()),
                            rex,
                        );
                    }
                    XmmToGprOp::Cvttss2si => emit_std_reg_reg(
                        sink,
                        LegacyPrefixes::_F3,
                        0x0F2C,
                        2,
                        reg_enc(dst.to_reg()),
                        reg_enc(*src),
                        rex,
                    ),
                    XmmToGprOp::Cvttsd2si => emit_std_reg_reg(
                        sink,
                        LegacyPrefixes::_F2,
                        0x0F2C,
                        2,
                        reg_enc(dst.to_reg()),
                        reg_enc(*src),
                        rex,
                    ),
                }
            }

            Inst::GprToXmm {
                op,
                src,
                dst,
                src_size,
            } => {
                let rex = if src_size.rex_w() {
                    RexFlags::set_w()
                } else {
                    RexFlags::clear_w()
                };
                let (prefix, opcodes) = match op {
                    GprToXmmOp::MovdMovq => (LegacyPrefixes::_66, 0x0F6E),
                    GprToXmmOp::Cvtsi2ss => (LegacyPrefixes::_F3, 0x0F2A),
                    GprToXmmOp::Cvtsi2sd => (LegacyPrefixes::_F2, 0x0F2A),
                };
                let enc_dst = reg_enc(dst.to_reg());
                match src {
                    RegMem::Reg { reg } => emit_std_reg_reg(
                        sink,
                        prefix,
                        opcodes,
                        2,
                        enc_dst,
                        reg_enc(*reg),
                        rex,
                    ),
                    RegMem::Mem { addr } => {
                        let amode = amode_finalize(addr, state);
                        emit_std_reg_mem(sink, prefix, opcodes, 2, enc_dst, &amode, rex);
                    }
                }
            }

            Inst::XmmCmove {
                cc,
                consequent,
                dst,
                ..
            } => {
                // dst already holds the alternative (tied operand); jump
                // over the move when the condition does not hold.
                let done = sink.get_label();
                one_way_jmp(sink, cc.invert(), done);
                Inst::XmmMovRR {
                    src: *consequent,
                    dst: *dst,
                }
                .emit(sink, info, state);
                sink.bind_label(done);
            }

            Inst::XmmMinMaxSeq {
                is_f64,
                is_min,
                lhs,
                dst,
                ..
            } => {
                // dst already holds rhs (tied operand).
                let (cmp_op, merge_op, minmax_op, add_op) = if *is_f64 {
                    (
                        SseOpcode::Ucomisd,
                        if *is_min {
                            SseOpcode::Orpd
                        } else {
                            SseOpcode::Andpd
                        },
                        if *is_min {
                            SseOpcode::Minsd
                        } else {
                            SseOpcode::Maxsd
                        },
                        SseOpcode::Addsd,
                    )
                } else {
                    (
                        SseOpcode::Ucomiss,
                        if *is_min {
                            SseOpcode::Orps
                        } else {
                            SseOpcode::Andps
                        },
                        if *is_min {
                            SseOpcode::Minss
                        } else {
                            SseOpcode::Maxss
                        },
                        SseOpcode::Addss,
                    )
                };
                let do_min_max = sink.get_label();
                let propagate_nan = sink.get_label();
                let done = sink.get_label();

                Inst::XmmCmpRmR {
                    op: cmp_op,
                    src: RegMem::reg(dst.to_reg()),
                    dst: *lhs,
                }
                .emit(sink, info, state);
                one_way_jmp(sink, CC::NZ, do_min_max);
                one_way_jmp(sink, CC::P, propagate_nan);
                // Equal: merge the sign bits so the right zero wins.
                Inst::XmmRmR {
                    op: merge_op,
                    src1: dst.to_reg(),
                    src2: RegMem::reg(*lhs),
                    dst: *dst,
                }
                .emit(sink, info, state);
                sink.put1(0xEB); // jmp short done
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, done, LabelUse::PCRel8);
                sink.put1(0);

                sink.bind_label(propagate_nan);
                // NaN + x produces a canonical NaN.
                Inst::XmmRmR {
                    op: add_op,
                    src1: dst.to_reg(),
                    src2: RegMem::reg(*lhs),
                    dst: *dst,
                }
                .emit(sink, info, state);
                sink.put1(0xEB);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, done, LabelUse::PCRel8);
                sink.put1(0);

                sink.bind_label(do_min_max);
                Inst::XmmRmR {
                    op: minmax_op,
                    src1: dst.to_reg(),
                    src2: RegMem::reg(*lhs),
                    dst: *dst,
                }
                .emit(sink, info, state);
                sink.bind_label(done);
            }

            Inst::CvtUint64ToFloatSeq {
                dst_is_f64,
                src,
                dst,
                tmp_gpr1,
                tmp_gpr2,
            } => {
                let cvt_op = if *dst_is_f64 {
                    GprToXmmOp::Cvtsi2sd
                } else {
                    GprToXmmOp::Cvtsi2ss
                };
                let add_op = if *dst_is_f64 {
                    SseOpcode::Addsd
                } else {
                    SseOpcode::Addss
                };
                let handle_neg = sink.get_label();
                let done = sink.get_label();

                // If the top bit is clear, a signed conversion suffices.
                Inst::TestRmiR {
                    size: OperandSize::Size64,
                    src: RegMemImm::reg(*src),
                    dst: *src,
                }
                .emit(sink, info, state);
                one_way_jmp(sink, CC::S, handle_neg);
                Inst::GprToXmm {
                    op: cvt_op,
                    src: RegMem::reg(*src),
                    dst: *dst,
                    src_size: OperandSize::Size64,
                }
                .emit(sink, info, state);
                sink.put1(0xE9);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, done, LabelUse::JmpRel32);
                sink.put4(0);

                // Otherwise halve with the low bit folded in (so rounding
                // is preserved), convert, and double.
                sink.bind_label(handle_neg);
                Inst::MovRR {
                    size: OperandSize::Size64,
                    src: *src,
                    dst: *tmp_gpr1,
                }
                .emit(sink, info, state);
                Inst::ShiftR {
                    size: OperandSize::Size64,
                    kind: ShiftKind::ShiftRightLogical,
                    src1: tmp_gpr1.to_reg(),
                    num_bits: Imm8Reg::Imm8 { imm: 1 },
                    dst: *tmp_gpr1,
                }
                .emit(sink, info, state);
                Inst::MovRR {
                    size: OperandSize::Size64,
                    src: *src,
                    dst: *tmp_gpr2,
                }
                .emit(sink, info, state);
                Inst::AluRmiR {
                    size: OperandSize::Size64,
                    op: AluRmiROpcode::And,
                    src1: tmp_gpr2.to_reg(),
                    src2: RegMemImm::imm(1),
                    dst: *tmp_gpr2,
                }
                .emit(sink, info, state);
                Inst::AluRmiR {
                    size: OperandSize::Size64,
                    op: AluRmiROpcode::Or,
                    src1: tmp_gpr1.to_reg(),
                    src2: RegMemImm::reg(tmp_gpr2.to_reg()),
                    dst: *tmp_gpr1,
                }
                .emit(sink, info, state);
                Inst::GprToXmm {
                    op: cvt_op,
                    src: RegMem::reg(tmp_gpr1.to_reg()),
                    dst: *dst,
                    src_size: OperandSize::Size64,
                }
                .emit(sink, info, state);
                Inst::XmmRmR {
                    op: add_op,
                    src1: dst.to_reg(),
                    src2: RegMem::reg(dst.to_reg()),
                    dst: *dst,
                }
                .emit(sink, info, state);
                sink.bind_label(done);
            }

            Inst::CvtFloatToSintSeq {
                src_is_f64,
                dst_size,
                src,
                dst,
                tmp_gpr: _,
                tmp_xmm,
            } => {
                let trunc_op = if *src_is_f64 {
                    XmmToGprOp::Cvttsd2si
                } else {
                    XmmToGprOp::Cvttss2si
                };
                let cmp_op = if *src_is_f64 {
                    SseOpcode::Ucomisd
                } else {
                    SseOpcode::Ucomiss
                };
                let back_cvt_op = if *src_is_f64 {
                    GprToXmmOp::Cvtsi2sd
                } else {
                    GprToXmmOp::Cvtsi2ss
                };
                let done = sink.get_label();
                let not_nan = sink.get_label();

                Inst::XmmToGpr {
                    op: trunc_op,
                    src: *src,
                    dst: *dst,
                    dst_size: *dst_size,
                }
                .emit(sink, info, state);
                // The saturating sentinel is INT_MIN; `cmp dst, 1` sets OF
                // exactly for that value.
                Inst::CmpRmiR {
                    size: *dst_size,
                    src: RegMemImm::imm(1),
                    dst: dst.to_reg(),
                }
                .emit(sink, info, state);
                one_way_jmp(sink, CC::NO, done);

                // Sentinel: distinguish NaN, true overflow, and an exact
                // INT_MIN input.
                Inst::XmmCmpRmR {
                    op: cmp_op,
                    src: RegMem::reg(*src),
                    dst: *src,
                }
                .emit(sink, info, state);
                one_way_jmp(sink, CC::NP, not_nan);
                sink.add_trap(TrapCode::BadConversionToInteger);
                sink.put1(0x0F);
                sink.put1(0x0B);

                sink.bind_label(not_nan);
                // Convert the sentinel back to float; an exact match means
                // the input was exactly INT_MIN and is valid.
                Inst::GprToXmm {
                    op: back_cvt_op,
                    src: RegMem::reg(dst.to_reg()),
                    dst: *tmp_xmm,
                    src_size: *dst_size,
                }
                .emit(sink, info, state);
                Inst::XmmCmpRmR {
                    op: cmp_op,
                    src: RegMem::reg(tmp_xmm.to_reg()),
                    dst: *src,
                }
                .emit(sink, info, state);
                one_way_jmp(sink, CC::Z, done);
                sink.add_trap(TrapCode::IntegerOverflow);
                sink.put1(0x0F);
                sink.put1(0x0B);

                sink.bind_label(done);
            }

            Inst::CvtFloatToUintSeq {
                src_is_f64,
                src,
                dst,
                tmp_gpr,
                tmp_xmm,
            } => {
                let cmp_op = if *src_is_f64 {
                    SseOpcode::Ucomisd
                } else {
                    SseOpcode::Ucomiss
                };
                let sub_op = if *src_is_f64 {
                    SseOpcode::Subsd
                } else {
                    SseOpcode::Subss
                };
                let trunc_op = if *src_is_f64 {
                    XmmToGprOp::Cvttsd2si
                } else {
                    XmmToGprOp::Cvttss2si
                };
                let threshold: u64 = if *src_is_f64 {
                    9223372036854775808.0f64.to_bits()
                } else {
                    9223372036854775808.0f32.to_bits() as u64
                };
                let not_nan = sink.get_label();
                let large = sink.get_label();
                let add_back = sink.get_label();
                let done = sink.get_label();

                // NaN check.
                Inst::XmmCmpRmR {
                    op: cmp_op,
                    src: RegMem::reg(*src),
                    dst: *src,
                }
                .emit(sink, info, state);
                one_way_jmp(sink, CC::NP, not_nan);
                sink.add_trap(TrapCode::BadConversionToInteger);
                sink.put1(0x0F);
                sink.put1(0x0B);
                sink.bind_label(not_nan);

                // Compare against 2^63.
                Inst::XmmLoadConst {
                    const_data: threshold,
                    is_f64: *src_is_f64,
                    dst: *tmp_xmm,
                }
                .emit(sink, info, state);
                Inst::XmmCmpRmR {
                    op: cmp_op,
                    src: RegMem::reg(tmp_xmm.to_reg()),
                    dst: *src,
                }
                .emit(sink, info, state);
                one_way_jmp(sink, CC::NB, large);

                // Small path: a signed conversion is exact. Inputs at or
                // below -1.0 produce a negative result and trap; inputs in
                // (-1, 0) truncate to zero.
                Inst::XmmToGpr {
                    op: trunc_op,
                    src: *src,
                    dst: *dst,
                    dst_size: OperandSize::Size64,
                }
                .emit(sink, info, state);
                Inst::TestRmiR {
                    size: OperandSize::Size64,
                    src: RegMemImm::reg(dst.to_reg()),
                    dst: dst.to_reg(),
                }
                .emit(sink, info, state);
                one_way_jmp(sink, CC::NS, done);
                sink.add_trap(TrapCode::IntegerOverflow);
                sink.put1(0x0F);
                sink.put1(0x0B);

                // Large path: convert src - 2^63, then add 2^63 back in
                // the integer domain. A negative intermediate result means
                // the input was >= 2^64.
                sink.bind_label(large);
                Inst::XmmMovRR {
                    src: *src,
                    dst: *tmp_xmm,
                }
                .emit(sink, info, state);
                let threshold_label = if *src_is_f64 {
                    sink.defer_constant(&threshold.to_le_bytes(), 8)
                } else {
                    sink.defer_constant(&(threshold as u32).to_le_bytes(), 4)
                };
                Inst::XmmRmR {
                    op: sub_op,
                    src1: tmp_xmm.to_reg(),
                    src2: RegMem::Mem {
                        addr: SyntheticAmode::Real(Amode::RipRelative {
                            target: threshold_label,
                        }),
                    },
                    dst: *tmp_xmm,
                }
                .emit(sink, info, state);
                Inst::XmmToGpr {
                    op: trunc_op,
                    src: tmp_xmm.to_reg(),
                    dst: *dst,
                    dst_size: OperandSize::Size64,
                }
                .emit(sink, info, state);
                Inst::TestRmiR {
                    size: OperandSize::Size64,
                    src: RegMemImm::reg(dst.to_reg()),
                    dst: dst.to_reg(),
                }
                .emit(sink, info, state);
                one_way_jmp(sink, CC::NS, add_back);
                sink.add_trap(TrapCode::IntegerOverflow);
                sink.put1(0x0F);
                sink.put1(0x0B);
                sink.bind_label(add_back);
                Inst::Imm {
                    dst_size: OperandSize::Size64,
                    simm64: 0x8000_0000_0000_0000,
                    dst: *tmp_gpr,
                }
                .emit(sink, info, state);
                Inst::AluRmiR {
                    size: OperandSize::Size64,
                    op: AluRmiROpcode::Add,
                    src1: dst.to_reg(),
                    src2: RegMemImm::reg(tmp_gpr.to_reg()),
                    dst: *dst,
                }
                .emit(sink, info, state);
                sink.bind_label(done);
            }

            Inst::CallKnown { info: call_info } => {
                sink.put1(0xE8);
                sink.add_reloc(Reloc::X86CallPLTRel4, &call_info.dest, -4);
                sink.put4(0);
                sink.add_call_site();
            }

            Inst::CallUnknown { info: call_info } => {
                let enc = reg_enc(call_info.rn);
                RexFlags::clear_w().emit_two_op(sink, 2, enc);
                sink.put1(0xFF);
                sink.put1(encode_modrm(3, 2, enc));
                sink.add_call_site();
            }

            Inst::Args { .. } => {}

            Inst::Rets { .. } => {
                let frame = state.frame_layout().clone();
                emit_epilogue(sink, info, state, &frame);
            }

            Inst::JmpKnown { dst } => {
                let start = sink.cur_offset();
                sink.put1(0xE9);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, *dst, LabelUse::JmpRel32);
                sink.put4(0);
                sink.add_uncond_branch(start, sink.cur_offset(), *dst);
            }

            Inst::JmpCond {
                cc,
                taken,
                not_taken,
            } => {
                one_way_jmp(sink, *cc, *taken);
                let start = sink.cur_offset();
                sink.put1(0xE9);
                let off = sink.cur_offset();
                sink.use_label_at_offset(off, *not_taken, LabelUse::JmpRel32);
                sink.put4(0);
                sink.add_uncond_branch(start, sink.cur_offset(), *not_taken);
            }

            Inst::OneWayJmpCond { cc, target } => {
                one_way_jmp(sink, *cc, *target);
            }

            Inst::JmpTableSeq {
                idx,
                tmp1,
                tmp2,
                targets,
            } => {
                let table = sink.get_label();
                // lea tmp1, [rip + table]
                emit_std_reg_mem(
                    sink,
                    LegacyPrefixes::None,
                    0x8D,
                    1,
                    reg_enc(tmp1.to_reg()),
                    &Amode::RipRelative { target: table },
                    RexFlags::set_w(),
                );
                // lea tmp1, [tmp1 + idx*4]  (the entry's own address)
                emit_std_reg_mem(
                    sink,
                    LegacyPrefixes::None,
                    0x8D,
                    1,
                    reg_enc(tmp1.to_reg()),
                    &Amode::ImmRegRegShift {
                        simm32: 0,
                        base: tmp1.to_reg(),
                        index: *idx,
                        shift: 2,
                    },
                    RexFlags::set_w(),
                );
                // movsxd tmp2, dword [tmp1]
                emit_std_reg_mem(
                    sink,
                    LegacyPrefixes::None,
                    0x63,
                    1,
                    reg_enc(tmp2.to_reg()),
                    &Amode::ImmReg {
                        simm32: 0,
                        base: tmp1.to_reg(),
                    },
                    RexFlags::set_w(),
                );
                // add tmp1, tmp2
                Inst::AluRmiR {
                    size: OperandSize::Size64,
                    op: AluRmiROpcode::Add,
                    src1: tmp1.to_reg(),
                    src2: RegMemImm::reg(tmp2.to_reg()),
                    dst: *tmp1,
                }
                .emit(sink, info, state);
                // jmp *tmp1
                let enc = reg_enc(tmp1.to_reg());
                RexFlags::clear_w().emit_two_op(sink, 4, enc);
                sink.put1(0xFF);
                sink.put1(encode_modrm(3, 4, enc));
                // The table: entries are offsets from their own address.
                sink.bind_label(table);
                for target in targets {
                    let entry_off = sink.cur_offset();
                    sink.use_label_at_offset(entry_off, *target, LabelUse::PCRel32);
                    sink.put4(0);
                }
            }

            Inst::TrapIf { cc, trap_code } => {
                // jcc-inverted over the ud2.
                sink.put1(0x70 + cc.invert().get_enc());
                sink.put1(0x02);
                sink.add_trap(*trap_code);
                sink.put1(0x0F);
                sink.put1(0x0B);
            }

            Inst::Ud2 { trap_code } => {
                sink.add_trap(*trap_code);
                sink.put1(0x0F);
                sink.put1(0x0B);
            }
        }
    }
}

fn emit_cmp_or_test(
    sink: &mut MachBuffer<Inst>,
    state: &EmitState,
    size: OperandSize,
    src: &RegMemImm,
    dst: Reg,
    is_cmp: bool,
) {
    let rex = if size.rex_w() {
        RexFlags::set_w()
    } else {
        RexFlags::clear_w()
    };
    let enc_dst = reg_enc(dst);
    match src {
        RegMemImm::Reg { reg } => {
            // cmp: 3B reg <- rm; test: 85 rm, reg.
            if is_cmp {
                emit_std_reg_reg(
                    sink,
                    LegacyPrefixes::None,
                    0x3B,
                    1,
                    enc_dst,
                    reg_enc(*reg),
                    rex,
                );
            } else {
                emit_std_reg_reg(
                    sink,
                    LegacyPrefixes::None,
                    0x85,
                    1,
                    reg_enc(*reg),
                    enc_dst,
                    rex,
                );
            }
        }
        RegMemImm::Mem { addr } => {
            let amode = amode_finalize(addr, state);
            let opcode = if is_cmp { 0x3B } else { 0x85 };
            emit_std_reg_mem(sink, LegacyPrefixes::None, opcode, 1, enc_dst, &amode, rex);
        }
        RegMemImm::Imm { simm32 } => {
            if is_cmp {
                if let Ok(imm8) = i8::try_from(*simm32) {
                    emit_std_reg_reg(sink, LegacyPrefixes::None, 0x83, 1, 7, enc_dst, rex);
                    sink.put1(imm8 as u8);
                } else {
                    emit_std_reg_reg(sink, LegacyPrefixes::None, 0x81, 1, 7, enc_dst, rex);
                    sink.put4(*simm32 as u32);
                }
            } else {
                emit_std_reg_reg(sink, LegacyPrefixes::None, 0xF7, 1, 0, enc_dst, rex);
                sink.put4(*simm32 as u32);
            }
        }
    }
}

fn emit_epilogue(
    sink: &mut MachBuffer<Inst>,
    info: &EmitInfo,
    state: &mut EmitState,
    frame: &FrameLayout,
) {
    // Restore clobbered callee-saves.
    let base = (frame.frame_size() - frame.clobber_size) as i64;
    for (i, reg) in frame.clobbered_callee_saves.iter().enumerate() {
        let off = base + (i as i64) * 8;
        let addr = SyntheticAmode::SPOffset { off };
        let inst = match reg.class() {
            crate::machinst::RegClass::Int => Inst::Mov64MR {
                src: addr,
                dst: crate::machinst::Writable::from_reg(Reg::from_real(*reg)),
            },
            _ => Inst::XmmUnaryRmR {
                op: SseOpcode::Movsd,
                src: RegMem::Mem { addr },
                dst: crate::machinst::Writable::from_reg(Reg::from_real(*reg)),
            },
        };
        inst.emit(sink, info, state);
    }
    // add rsp, frame_size
    let amt = frame.frame_size();
    if amt > 0 {
        Inst::AluRmiR {
            size: OperandSize::Size64,
            op: AluRmiROpcode::Add,
            src1: rsp(),
            src2: RegMemImm::imm(amt as i32),
            dst: writable_rsp(),
        }
        .emit(sink, info, state);
    }
    // pop rbp; ret
    sink.put1(0x5D);
    sink.put1(0xC3);
}
