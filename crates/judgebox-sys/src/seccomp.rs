//! Seccomp-BPF syscall filtering.
//!
//! Seccomp-BPF filters syscalls with a classic Berkeley Packet Filter program
//! that the kernel runs on every syscall entry. This module builds such a
//! program from a list of allow rules and installs it.
//!
//! ## Filter Structure
//!
//! ```text
//! [0-2]   Architecture check (x86_64, default action otherwise)
//! [3]     Load syscall number
//! [4..N]  One block per rule, in insertion order
//! [N+1]   RET default action
//! ```
//!
//! An unconditional rule is two instructions:
//!
//! ```text
//! JEQ nr, 0, 1
//! RET ALLOW
//! ```
//!
//! A conditional rule loads the constrained argument one 32-bit word at a
//! time (low word first), optionally masks it, and compares it:
//!
//! ```text
//! JEQ nr, 0, <skip block>
//! LD  args[i].lo          ; AND mask.lo ; JEQ value.lo, 0, <deny>
//! LD  args[i].hi          ; AND mask.hi ; JEQ value.hi, 0, <deny>
//! RET ALLOW
//! RET <default>           ; <deny>
//! ```
//!
//! Every jump is local to its block, so offsets never approach the `u8`
//! limit of BPF jump fields no matter how many rules are added.
//!
//! ## Security Notes
//!
//! - Filter is permanent - cannot be removed once applied
//! - `PR_SET_NO_NEW_PRIVS` is set before loading
//! - Argument comparisons see raw register values; a pointer argument is
//!   compared by address, never by the string it points to

use rustix::io::Errno;
use thiserror::Error;

use crate::last_errno;

// Seccomp constants
const SECCOMP_SET_MODE_FILTER: u32 = 1;
const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
const SECCOMP_RET_KILL_THREAD: u32 = 0x0000_0000;
const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

// BPF instruction classes
const BPF_LD: u16 = 0x00;
const BPF_ALU: u16 = 0x04;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;

// BPF ld/ldx fields
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;

// BPF alu/jmp fields
const BPF_AND: u16 = 0x50;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;

// seccomp_data offsets (x86_64, little endian)
const OFFSET_SYSCALL_NR: u32 = 0;
const OFFSET_ARCH: u32 = 4;
const OFFSET_ARGS: u32 = 16;

/// Kernel limit on program length.
const BPF_MAXINSNS: usize = 4096;

/// Syscalls take at most six arguments.
const MAX_ARG_INDEX: u8 = 5;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SockFilter {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl SockFilter {
    #[inline]
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self {
            code,
            jt: 0,
            jf: 0,
            k,
        }
    }

    #[inline]
    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }
}

#[repr(C)]
#[derive(Debug)]
pub struct SockFprog {
    pub len: u16,
    pub filter: *const SockFilter,
}

/// What the kernel does when a rule (or the default) matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Kill the whole process with SIGSYS.
    KillProcess,
    /// Kill only the calling thread with SIGSYS.
    KillThread,
    /// Fail the syscall with the given errno.
    Errno(u16),
    /// Let the syscall through.
    Allow,
}

impl Action {
    const fn ret(self) -> u32 {
        match self {
            Self::KillProcess => SECCOMP_RET_KILL_PROCESS,
            Self::KillThread => SECCOMP_RET_KILL_THREAD,
            Self::Errno(errno) => SECCOMP_RET_ERRNO | errno as u32,
            Self::Allow => SECCOMP_RET_ALLOW,
        }
    }
}

/// Constraint on a single syscall argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgCmp {
    /// `args[index] == value`
    Equal { index: u8, value: u64 },
    /// `args[index] & mask == value`
    MaskedEqual { index: u8, mask: u64, value: u64 },
}

impl ArgCmp {
    pub const fn eq(index: u8, value: u64) -> Self {
        Self::Equal { index, value }
    }

    pub const fn masked_eq(index: u8, mask: u64, value: u64) -> Self {
        Self::MaskedEqual { index, mask, value }
    }

    const fn index(self) -> u8 {
        match self {
            Self::Equal { index, .. } | Self::MaskedEqual { index, .. } => index,
        }
    }

    /// Split into per-word checks, low word first.
    fn word_checks(self) -> Vec<WordCheck> {
        let lo = OFFSET_ARGS + 8 * u32::from(self.index());
        let hi = lo + 4;
        match self {
            Self::Equal { value, .. } => vec![
                WordCheck {
                    offset: lo,
                    mask: None,
                    value: value as u32,
                },
                WordCheck {
                    offset: hi,
                    mask: None,
                    value: (value >> 32) as u32,
                },
            ],
            Self::MaskedEqual { mask, value, .. } => [
                (lo, mask as u32, value as u32),
                (hi, (mask >> 32) as u32, (value >> 32) as u32),
            ]
            .into_iter()
            // A zero mask word compared against zero always matches.
            .filter(|&(_, mask, value)| mask != 0 || value != 0)
            .map(|(offset, mask, value)| WordCheck {
                offset,
                mask: Some(mask),
                value,
            })
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WordCheck {
    offset: u32,
    mask: Option<u32>,
    value: u32,
}

impl WordCheck {
    const fn len(&self) -> usize {
        if self.mask.is_some() { 3 } else { 2 }
    }
}

/// Error while building or loading a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid syscall number {0}")]
    InvalidSyscall(i64),

    #[error("syscall {0} already has a rule")]
    DuplicateRule(i64),

    #[error("argument index {0} out of range (max 5)")]
    ArgIndex(u8),

    #[error("filter too long: {0} instructions (max 4096)")]
    TooLong(usize),

    #[error("load: {0}")]
    Load(Errno),
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    nr: i64,
    cond: Option<ArgCmp>,
}

/// Collects rules for a filter whose unmatched syscalls get `default_action`.
#[derive(Debug, Clone)]
pub struct FilterContext {
    default_action: Action,
    rules: Vec<Rule>,
}

impl FilterContext {
    pub fn new(default_action: Action) -> Self {
        Self {
            default_action,
            rules: Vec::new(),
        }
    }

    pub fn default_action(&self) -> Action {
        self.default_action
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Allow `nr` with no argument constraints.
    pub fn allow(&mut self, nr: i64) -> Result<&mut Self, FilterError> {
        self.push(Rule { nr, cond: None })
    }

    /// Allow `nr` only when `cmp` holds; otherwise the default action applies.
    pub fn allow_if(&mut self, nr: i64, cmp: ArgCmp) -> Result<&mut Self, FilterError> {
        if cmp.index() > MAX_ARG_INDEX {
            return Err(FilterError::ArgIndex(cmp.index()));
        }
        self.push(Rule {
            nr,
            cond: Some(cmp),
        })
    }

    fn push(&mut self, rule: Rule) -> Result<&mut Self, FilterError> {
        if u32::try_from(rule.nr).is_err() {
            return Err(FilterError::InvalidSyscall(rule.nr));
        }
        if self.rules.iter().any(|r| r.nr == rule.nr) {
            return Err(FilterError::DuplicateRule(rule.nr));
        }
        self.rules.push(rule);
        Ok(self)
    }

    /// Lower the rules to a BPF program.
    pub fn compile(&self) -> Result<CompiledFilter, FilterError> {
        let deny = self.default_action.ret();
        let mut program = Vec::with_capacity(5 + self.rules.len() * 2);

        // === Architecture check ===
        program.push(SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARCH));
        program.push(SockFilter::jump(
            BPF_JMP | BPF_JEQ | BPF_K,
            AUDIT_ARCH_X86_64,
            1,
            0,
        ));
        program.push(SockFilter::stmt(BPF_RET | BPF_K, deny));

        // === Load syscall number ===
        program.push(SockFilter::stmt(
            BPF_LD | BPF_W | BPF_ABS,
            OFFSET_SYSCALL_NR,
        ));

        for rule in &self.rules {
            emit_rule(&mut program, rule, deny);
        }

        // === Default ===
        program.push(SockFilter::stmt(BPF_RET | BPF_K, deny));

        if program.len() > BPF_MAXINSNS {
            return Err(FilterError::TooLong(program.len()));
        }
        Ok(CompiledFilter { program })
    }
}

fn emit_rule(program: &mut Vec<SockFilter>, rule: &Rule, deny: u32) {
    let checks = rule.cond.map(ArgCmp::word_checks).unwrap_or_default();
    let body_len = if checks.is_empty() {
        1
    } else {
        checks.iter().map(WordCheck::len).sum::<usize>() + 2
    };

    // Syscall number still in the accumulator; skip the body on mismatch.
    program.push(SockFilter::jump(
        BPF_JMP | BPF_JEQ | BPF_K,
        rule.nr as u32,
        0,
        body_len as u8,
    ));

    let body_start = program.len();
    for check in &checks {
        program.push(SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, check.offset));
        if let Some(mask) = check.mask {
            program.push(SockFilter::stmt(BPF_ALU | BPF_AND | BPF_K, mask));
        }
        // jf lands on the trailing RET <deny> of this block.
        let pos = program.len() - body_start;
        program.push(SockFilter::jump(
            BPF_JMP | BPF_JEQ | BPF_K,
            check.value,
            0,
            (body_len - pos - 2) as u8,
        ));
    }

    program.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW));
    if !checks.is_empty() {
        program.push(SockFilter::stmt(BPF_RET | BPF_K, deny));
    }
}

/// A BPF program ready to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFilter {
    program: Vec<SockFilter>,
}

impl CompiledFilter {
    pub fn instructions(&self) -> &[SockFilter] {
        &self.program
    }

    pub fn len(&self) -> usize {
        self.program.len()
    }

    pub fn is_empty(&self) -> bool {
        self.program.is_empty()
    }

    /// Install the filter into the calling process.
    ///
    /// Does not allocate, so it is usable between `fork` and `execve`.
    pub fn load(&self) -> Result<(), FilterError> {
        let fprog = SockFprog {
            len: self.program.len() as u16,
            filter: self.program.as_ptr(),
        };
        // SAFETY: fprog points at a live program whose length was bounded by compile().
        unsafe { seccomp_set_mode_filter(&fprog) }.map_err(FilterError::Load)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl CompiledFilter {
    /// Decide `nr(args)` the way the kernel would on x86_64.
    #[doc(hidden)]
    pub fn evaluate(&self, nr: i64, args: [u64; 6]) -> Action {
        Action::from_ret(interpret(&self.program, nr, AUDIT_ARCH_X86_64, args))
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Action {
    fn from_ret(ret: u32) -> Self {
        match ret {
            SECCOMP_RET_ALLOW => Self::Allow,
            SECCOMP_RET_KILL_PROCESS => Self::KillProcess,
            SECCOMP_RET_KILL_THREAD => Self::KillThread,
            r if r & 0xffff_0000 == SECCOMP_RET_ERRNO => Self::Errno(r as u16),
            other => panic!("unexpected return value {other:#x}"),
        }
    }
}

/// Minimal classic-BPF interpreter covering the opcodes `compile` emits.
#[cfg(any(test, feature = "test-support"))]
fn interpret(filter: &[SockFilter], nr: i64, arch: u32, args: [u64; 6]) -> u32 {
    let mut data = [0u8; 64];
    data[0..4].copy_from_slice(&(nr as u32).to_le_bytes());
    data[4..8].copy_from_slice(&arch.to_le_bytes());
    for (i, arg) in args.iter().enumerate() {
        let off = 16 + 8 * i;
        data[off..off + 8].copy_from_slice(&arg.to_le_bytes());
    }

    let mut acc: u32 = 0;
    let mut pc = 0usize;
    loop {
        let insn = filter[pc];
        match insn.code {
            c if c == BPF_LD | BPF_W | BPF_ABS => {
                let off = insn.k as usize;
                let mut word = [0u8; 4];
                word.copy_from_slice(&data[off..off + 4]);
                acc = u32::from_le_bytes(word);
                pc += 1;
            }
            c if c == BPF_ALU | BPF_AND | BPF_K => {
                acc &= insn.k;
                pc += 1;
            }
            c if c == BPF_JMP | BPF_JEQ | BPF_K => {
                let skip = if acc == insn.k { insn.jt } else { insn.jf };
                pc += 1 + skip as usize;
            }
            c if c == BPF_RET | BPF_K => return insn.k,
            other => panic!("unexpected opcode {other:#x}"),
        }
    }
}

/// Applies a seccomp-BPF filter to the current thread.
///
/// # Safety
///
/// This permanently restricts syscalls for this thread. The filter must be valid.
///
/// # Errors
///
/// Returns `Errno` if the filter cannot be applied.
pub unsafe fn seccomp_set_mode_filter(fprog: &SockFprog) -> Result<(), Errno> {
    let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if ret != 0 {
        return Err(last_errno());
    }

    let ret = unsafe {
        libc::syscall(
            libc::SYS_seccomp,
            SECCOMP_SET_MODE_FILTER,
            0u32,
            fprog as *const _,
        )
    };
    if ret != 0 { Err(last_errno()) } else { Ok(()) }
}
