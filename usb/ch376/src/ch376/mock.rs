//! A scripted CH376 for the packet engine tests.
//!
//! Operations that complete with an interrupt pop their status from `statuses` (success when
//! empty). TEST_CONNECT answers on the data port instead. A successful IN token, GET_DESCR,
//! DISK_MOUNT or DISK_QUERY loads the next entry of `in_packets` into the chip buffer, which
//! RD_USB_DATA0 then returns.

use std::collections::{BTreeMap, VecDeque};

use super::cmd::{Cmd, Pid, CMD_RET_SUCCESS};
use super::ports::Ch376Ports;
use super::status::{USB_INT_CONNECT, USB_INT_SUCCESS};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub flags: u8,
    pub endpoint: u8,
    pub pid: u8,
    /// Contents of the chip buffer when an OUT or SETUP token was issued.
    pub payload: Vec<u8>,
}

impl Token {
    pub fn is(&self, pid: Pid) -> bool {
        self.pid == pid as u8
    }
}

#[derive(Default)]
pub struct MockChip {
    pub statuses: VecDeque<u8>,
    pub in_packets: VecDeque<Vec<u8>>,
    /// Reply to SET_USB_MODE.
    pub mode_reply: Option<u8>,
    /// Polls of the interrupt line that stay inactive after each completion.
    pub int_delay: u32,
    pub ic_version: u8,
    /// Reply to TEST_CONNECT, connected when `None`.
    pub connect_reply: Option<u8>,
    /// Zero bytes read back before the TEST_CONNECT reply.
    pub connect_reply_delay: usize,
    pub vars: BTreeMap<u8, u8>,

    pub commands: Vec<u8>,
    pub tokens: Vec<Token>,
    pub addresses: Vec<u8>,
    pub modes: Vec<u8>,
    pub cleared_stalls: Vec<u8>,
    pub descriptor_requests: Vec<u8>,

    command: u8,
    args: Vec<u8>,
    host_buffer: Vec<u8>,
    usb_buffer: Vec<u8>,
    read_queue: VecDeque<u8>,
    pending_status: Option<u8>,
    int_wait: u32,
}

impl MockChip {
    pub fn new() -> Self {
        Self {
            ic_version: 0x43,
            ..Self::default()
        }
    }

    pub fn with_statuses(statuses: &[u8]) -> Self {
        let mut chip = Self::new();
        chip.statuses.extend(statuses.iter().copied());
        chip
    }

    /// Makes the chip report an interrupt without any command, as on attach/detach.
    pub fn raise(&mut self, status: u8) {
        self.pending_status = Some(status);
        self.int_wait = 0;
    }

    fn complete(&mut self, loads_buffer: bool) {
        let status = self.statuses.pop_front().unwrap_or(USB_INT_SUCCESS);
        if status == USB_INT_SUCCESS && loads_buffer {
            self.usb_buffer = self.in_packets.pop_front().unwrap_or_default();
        }
        self.pending_status = Some(status);
        self.int_wait = self.int_delay;
    }

    fn on_args(&mut self) {
        let command = self.command;
        let args = self.args.clone();
        match (command, args.as_slice()) {
            (c, &[address]) if c == Cmd::SetUsbAddr as u8 => self.addresses.push(address),
            (c, &[mode]) if c == Cmd::SetUsbMode as u8 => {
                self.modes.push(mode);
                self.read_queue
                    .push_back(self.mode_reply.unwrap_or(CMD_RET_SUCCESS));
            }
            (c, &[flags, target]) if c == Cmd::IssueTknX as u8 => {
                let pid = target & 0x0F;
                let payload = if pid == Pid::In as u8 {
                    Vec::new()
                } else {
                    self.host_buffer.clone()
                };
                self.tokens.push(Token {
                    flags,
                    endpoint: target >> 4,
                    pid,
                    payload,
                });
                self.complete(pid == Pid::In as u8);
            }
            (c, &[endpoint]) if c == Cmd::ClrStall as u8 => {
                self.cleared_stalls.push(endpoint);
                self.complete(false);
            }
            (c, &[kind]) if c == Cmd::GetDescr as u8 => {
                self.descriptor_requests.push(kind);
                self.complete(true);
            }
            (c, &[var]) if c == Cmd::ReadVar8 as u8 => {
                let value = self.vars.get(&var).copied().unwrap_or(0);
                self.read_queue.push_back(value);
            }
            (c, &[var, value]) if c == Cmd::WriteVar8 as u8 => {
                self.vars.insert(var, value);
            }
            (c, &[len, ref data @ ..]) if c == Cmd::WrHostData as u8 && data.len() == len as usize => {
                self.host_buffer = data.to_vec();
            }
            _ => (),
        }
    }
}

impl Ch376Ports for MockChip {
    fn write_command(&mut self, command: u8) {
        self.commands.push(command);
        self.command = command;
        self.args.clear();
        self.read_queue.clear();

        match command {
            c if c == Cmd::GetStatus as u8 => {
                let status = self.pending_status.take().unwrap_or(0);
                self.read_queue.push_back(status);
            }
            c if c == Cmd::RdUsbData0 as u8 => {
                let data = std::mem::take(&mut self.usb_buffer);
                self.read_queue.push_back(data.len() as u8);
                self.read_queue.extend(data);
            }
            c if c == Cmd::GetIcVer as u8 => self.read_queue.push_back(self.ic_version),
            c if c == Cmd::WrHostData as u8 => self.host_buffer.clear(),
            c if c == Cmd::TestConnect as u8 => {
                self.read_queue.extend(std::iter::repeat(0).take(self.connect_reply_delay));
                self.read_queue
                    .push_back(self.connect_reply.unwrap_or(USB_INT_CONNECT));
            }
            c if c == Cmd::DiskMount as u8 || c == Cmd::DiskQuery as u8 => self.complete(true),
            _ => (),
        }
    }
    fn write_data(&mut self, data: u8) {
        self.args.push(data);
        self.on_args();
    }
    fn read_data(&mut self) -> u8 {
        self.read_queue.pop_front().unwrap_or(0)
    }
    fn read_status(&mut self) -> u8 {
        if self.int_is_active() {
            0
        } else {
            0x80
        }
    }
    fn int_is_active(&mut self) -> bool {
        if self.pending_status.is_none() {
            return false;
        }
        if self.int_wait > 0 {
            self.int_wait -= 1;
            return false;
        }
        true
    }
}
