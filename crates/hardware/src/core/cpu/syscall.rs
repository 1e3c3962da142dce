//! ECALL dispatch: a minimal syscall ABI for programs to talk to the
//! console and end their own execution.
//!
//! a7 names the syscall number, a0-a5 carry up to six arguments, and the
//! return value is written back to a0 — the same convention RISC-V
//! software uses, just with a much smaller syscall table.

use tracing::trace;

use crate::core::engine::slot::FaultInfo;
use crate::core::regfile::RegValue;
use crate::word::Word;

use super::Cpu;

/// Register holding the syscall number.
const REG_A7: usize = 17;
/// First argument register; arguments occupy `REG_A0..REG_A0+6`.
const REG_A0: usize = 10;

/// Largest buffer `read`/`write` will move in one call.
const MAX_READWRITE: u32 = 4096;

const SYS_EXIT: i32 = -1;
const SYS_WRITE: i32 = -2;
const SYS_READ: i32 = -3;
const ENOSYS: i32 = -38;
const EFAULT: i32 = -14;

/// Reads a register, which by the time a serializing instruction retires
/// must already hold a concrete value (every producer ahead of it has
/// retired).
///
/// # Panics
///
/// Panics if the register still holds a pending `SlotRef` — a sign the
/// serializing-instruction ordering invariant was violated upstream.
fn get_register(cpu: &Cpu, regno: usize) -> Word {
    match cpu.state.engine.reg(regno) {
        RegValue::Word(w) => w,
        RegValue::SlotRef(_) => panic!("register {regno} unresolved at ecall retirement"),
    }
}

fn set_register(cpu: &mut Cpu, regno: usize, value: Word) {
    cpu.state.engine.set_reg(regno, value);
}

fn get_arg(cpu: &Cpu, index: usize) -> Word {
    get_register(cpu, REG_A0 + index)
}

fn set_return(cpu: &mut Cpu, value: Word) {
    set_register(cpu, REG_A0, value);
}

/// Repositions the frontend's PC, as a syscall does when it resumes
/// execution somewhere other than the instruction after the `ecall`.
///
/// # Panics
///
/// Panics if the frontend's queue is non-empty — serializing instructions
/// stall fetch, so this should never fire.
fn set_pc(cpu: &mut Cpu, addr: u32) {
    let frontend = cpu.state.frontend.as_mut().expect("ecall only retires with a loaded program");
    assert_eq!(frontend.queue_len(), 0, "ecall retires with instructions still queued");
    frontend.set_pc(addr);
}

fn sys_exit(cpu: &mut Cpu) {
    cpu.state.exit_status = Some(i64::from(get_arg(cpu, 0).signed_value()));
    let (_, upper) = cpu.state.frontend.as_ref().unwrap().pc_bounds();
    set_pc(cpu, upper);
}

fn sys_write(cpu: &mut Cpu) {
    let buf_addr = get_arg(cpu, 0).value();
    let buf_size = get_arg(cpu, 1).value().min(MAX_READWRITE);

    let mut text = Vec::with_capacity(buf_size as usize);
    for i in 0..buf_size {
        let result = cpu.state.memory.read_byte(buf_addr + i, true);
        if result.fault {
            set_return(cpu, Word::from_i64(i64::from(EFAULT)));
            return;
        }
        text.push(result.value as u8);
    }

    let len = text.len();
    cpu.state.console.add_output(&text);
    set_return(cpu, Word::new(len as u32));
}

fn sys_read(cpu: &mut Cpu, fault_info: &FaultInfo) {
    let buf_addr = get_arg(cpu, 0).value();
    let buf_size = get_arg(cpu, 1).value().min(MAX_READWRITE);

    if !cpu.state.console.has_input() {
        // "Block" by retrying the same `ecall` once more input arrives.
        cpu.state.console.need_input = true;
        set_pc(cpu, fault_info.instr.addr);
        return;
    }

    let received = cpu.state.console.read_input(buf_size as usize);
    for (i, &b) in received.iter().enumerate() {
        let result = cpu.state.memory.write_byte(buf_addr + i as u32, b, true);
        if result.fault {
            // The bytes already written are not un-written; a partial read
            // that then faults simply loses the remainder.
            set_return(cpu, Word::from_i64(i64::from(EFAULT)));
            return;
        }
    }

    set_return(cpu, Word::new(received.len() as u32));
}

/// Looks up the syscall named by a7 and carries out its effect, or writes
/// `ENOSYS` to a0 if the number is not recognized.
pub(super) fn dispatch_syscall(cpu: &mut Cpu, fault_info: &FaultInfo) {
    let number = get_register(cpu, REG_A7).signed_value();
    trace!(number, "ecall");
    match number {
        SYS_EXIT => sys_exit(cpu),
        SYS_WRITE => sys_write(cpu),
        SYS_READ => sys_read(cpu, fault_info),
        _ => set_return(cpu, Word::from_i64(i64::from(ENOSYS))),
    }
}
