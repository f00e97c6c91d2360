//! Station configuration (spec §4.1, §6.3; C `clunet_config.h`).

use heapless::Vec;

use crate::address::Address;

/// Device name capacity, matching the reference implementation's short,
/// human-readable `CLUNET_DEVICE_NAME` strings.
pub const MAX_DEVICE_NAME_LEN: usize = 16;

/// A bit period outside the protocol's supported `8..=24` tick range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("bit period {0} out of range 8..=24")]
pub struct InvalidBitPeriodError(pub u8);

/// A device name that doesn't fit in [`MAX_DEVICE_NAME_LEN`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("device name longer than {MAX_DEVICE_NAME_LEN} bytes")]
pub struct DeviceNameTooLongError;

/// Station configuration, validated once at construction time rather than
/// re-checked inside the ISRs.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub(crate) device_id: Address,
    pub(crate) bit_period: u8,
    pub(crate) device_name: Vec<u8, MAX_DEVICE_NAME_LEN>,
}

impl Config {
    /// Start building a configuration for the given device address, with
    /// the nominal ~64 µs bit period (`T = 16`) and no device name.
    pub fn new(device_id: Address) -> Self {
        Config {
            device_id,
            bit_period: 16,
            device_name: Vec::new(),
        }
    }

    /// Override the bit period, in timer ticks. Must be `8..=24`.
    pub fn bit_period(mut self, ticks: u8) -> Result<Self, InvalidBitPeriodError> {
        if !(8..=24).contains(&ticks) {
            return Err(InvalidBitPeriodError(ticks));
        }
        self.bit_period = ticks;
        Ok(self)
    }

    /// Set the device name advertised in `DISCOVERY_RESPONSE` frames.
    pub fn device_name(mut self, name: &[u8]) -> Result<Self, DeviceNameTooLongError> {
        self.device_name = Vec::from_slice(name).map_err(|()| DeviceNameTooLongError)?;
        Ok(self)
    }

    pub fn device_id(&self) -> Address {
        self.device_id
    }

    pub fn bit_period_ticks(&self) -> u8 {
        self.bit_period
    }

    pub fn device_name_bytes(&self) -> &[u8] {
        &self.device_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bit_period_is_valid() {
        let cfg = Config::new(Address(1));
        assert_eq!(cfg.bit_period_ticks(), 16);
    }

    #[test]
    fn bit_period_rejects_out_of_range() {
        assert!(Config::new(Address(1)).bit_period(7).is_err());
        assert!(Config::new(Address(1)).bit_period(25).is_err());
        assert!(Config::new(Address(1)).bit_period(8).is_ok());
        assert!(Config::new(Address(1)).bit_period(24).is_ok());
    }

    #[test]
    fn device_name_roundtrip() {
        let cfg = Config::new(Address(1)).device_name(b"probe").unwrap();
        assert_eq!(cfg.device_name_bytes(), b"probe");
    }

    #[test]
    fn device_name_too_long_is_rejected() {
        let too_long = [b'x'; MAX_DEVICE_NAME_LEN + 1];
        assert!(Config::new(Address(1)).device_name(&too_long).is_err());
    }
}
