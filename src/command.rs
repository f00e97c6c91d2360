//! Built-in system commands (spec §6.3).

/// Discover other stations on the bus. No payload.
pub const DISCOVERY: u8 = 0x00;
/// Reply to [`DISCOVERY`], payload is the device name if configured.
pub const DISCOVERY_RESPONSE: u8 = 0x01;
/// Sub-protocol reserved for the bootloader, forwarded to a collaborator.
pub const BOOT_CONTROL: u8 = 0x02;
/// Reboot the addressed station into its bootloader.
pub const REBOOT: u8 = 0x03;
/// Sent once at startup, payload is the platform reset-cause byte.
pub const BOOT_COMPLETED: u8 = 0x04;
/// Echo request; the payload is returned verbatim in [`PING_REPLY`].
pub const PING: u8 = 0xFE;
/// Reply to [`PING`].
pub const PING_REPLY: u8 = 0xFF;

/// A recognized built-in command, or an application-defined one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Discovery,
    DiscoveryResponse,
    BootControl,
    Reboot,
    BootCompleted,
    Ping,
    PingReply,
    /// Any command byte not reserved by the built-ins above.
    Custom(u8),
}

impl Command {
    pub const fn from_byte(byte: u8) -> Command {
        match byte {
            DISCOVERY => Command::Discovery,
            DISCOVERY_RESPONSE => Command::DiscoveryResponse,
            BOOT_CONTROL => Command::BootControl,
            REBOOT => Command::Reboot,
            BOOT_COMPLETED => Command::BootCompleted,
            PING => Command::Ping,
            PING_REPLY => Command::PingReply,
            other => Command::Custom(other),
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            Command::Discovery => DISCOVERY,
            Command::DiscoveryResponse => DISCOVERY_RESPONSE,
            Command::BootControl => BOOT_CONTROL,
            Command::Reboot => REBOOT,
            Command::BootCompleted => BOOT_COMPLETED,
            Command::Ping => PING,
            Command::PingReply => PING_REPLY,
            Command::Custom(byte) => byte,
        }
    }
}
