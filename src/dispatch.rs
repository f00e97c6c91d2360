//! Frame dispatcher (spec §4.5): built-in system commands plus the two
//! user callback slots, invoked synchronously from the edge ISR.

use crate::address::{Address, Priority};
use crate::command::Command;
use crate::frame::Frame;
use crate::hal::ClunetHal;
use crate::state::{Registers, TxPhase};
use crate::tx;

/// Forwards a frame's source, destination, command and payload. Plain
/// function pointers rather than closures, so no storage beyond a single
/// `Option` is needed (spec §9 "Function-pointer callbacks as
/// polymorphism").
pub type DataCallback = fn(src: Address, dst: Address, command: Command, payload: &[u8]);

/// Forwards a `BOOT_CONTROL` frame to the boot-loader collaborator.
pub type BootControlCallback = fn(src: Address, payload: &[u8]);

/// The two optional capabilities a station may register (spec §6.3, §9).
#[derive(Default, Clone, Copy)]
pub struct Callbacks {
    pub on_data_received: Option<DataCallback>,
    pub on_data_received_sniff: Option<DataCallback>,
    pub on_boot_control: Option<BootControlCallback>,
}

/// Run the dispatcher over a just-validated frame. `regs` is still held
/// under the caller's critical section; auto-replies are staged directly
/// into `tx_buf` here rather than re-entering `send`.
#[allow(clippy::too_many_arguments)]
pub fn run<H: ClunetHal, const S: usize, const R: usize>(
    hal: &mut H,
    regs: &mut Registers<S, R>,
    device_id: Address,
    device_name: &[u8],
    bit_period: u8,
    callbacks: &Callbacks,
    frame: Frame<'_>,
) {
    if let Some(sniff) = callbacks.on_data_received_sniff {
        sniff(frame.src, frame.dst, frame.command, frame.payload);
    }

    let addressed_to_us = frame.dst == device_id || frame.dst.is_broadcast();
    if !addressed_to_us || frame.src == device_id {
        return;
    }

    match frame.command {
        Command::Reboot => hal.enable_watchdog_reboot(),
        Command::Discovery => reply(
            hal,
            regs,
            device_id,
            frame.src,
            Command::DiscoveryResponse,
            Priority::MESSAGE,
            device_name,
            bit_period,
        ),
        Command::Ping => reply(
            hal,
            regs,
            device_id,
            frame.src,
            Command::PingReply,
            Priority::COMMAND,
            frame.payload,
            bit_period,
        ),
        Command::BootControl => {
            if let Some(cb) = callbacks.on_boot_control {
                cb(frame.src, frame.payload);
            }
        }
        _ => {
            if let Some(cb) = callbacks.on_data_received {
                cb(frame.src, frame.dst, frame.command, frame.payload);
            }
        }
    }
}

/// Spec §4.5 bullet 3: a pending transmission more urgent than `MESSAGE`
/// is never preempted by a routine auto-reply.
fn auto_replies_suppressed<const S: usize, const R: usize>(regs: &Registers<S, R>) -> bool {
    regs.tx_phase != TxPhase::Idle && regs.tx_priority.get() > Priority::MESSAGE.get()
}

fn reply<H: ClunetHal, const S: usize, const R: usize>(
    hal: &mut H,
    regs: &mut Registers<S, R>,
    device_id: Address,
    dst: Address,
    command: Command,
    priority: Priority,
    payload: &[u8],
    bit_period: u8,
) {
    if auto_replies_suppressed(regs) {
        return;
    }
    if tx::stage(regs, device_id, dst, command, priority, payload).is_err() {
        return;
    }
    hal.enable_compare();
    hal.schedule_compare_in(tx::INTERFRAME_GAP_BITS * bit_period);
}
