//! Device configuration record and factory profiles

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::limits::{
    SETPOINT_HUMIDITY_MAX, SETPOINT_HUMIDITY_MIN, SETPOINT_TEMPERATURE_MAX,
    SETPOINT_TEMPERATURE_MIN,
};

/// Reasons a configuration record is refused
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Temperature setpoint {value} out of range [{min}, {max}]")]
    TemperatureOutOfRange { value: f64, min: f64, max: f64 },

    #[error("Humidity setpoint {value} out of range [{min}, {max}]")]
    HumidityOutOfRange { value: f64, min: f64, max: f64 },

    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(Ipv4Addr),

    #[error("Invalid subnet mask: {0}")]
    InvalidSubnetMask(Ipv4Addr),

    #[error("MAC address is fixed for this unit ({active}), got {requested}")]
    MacAddressChanged {
        active: MacAddress,
        requested: MacAddress,
    },

    #[error("Unit id is fixed ({active}), got {requested}")]
    UnitIdChanged { active: u32, requested: u32 },

    #[error("Cannot parse {field} from {value:?}")]
    UnparseableField { field: &'static str, value: String },

    #[error("No settings supplied")]
    NothingToSave,
}

/// Hardware network identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// The active operating configuration of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    pub id: u32,
    /// Target temperature in °C
    pub setpoint_temperature: f64,
    /// Target relative humidity in %RH
    pub setpoint_humidity: f64,
    pub ip_address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub mac_address: MacAddress,
}

impl DeviceConfiguration {
    /// Compiled-in defaults for a unit. Ids without a profile get profile 0's
    /// values under their own id.
    pub fn factory_default(id: u32) -> Self {
        match DefaultProfile::lookup(id) {
            Some(profile) => profile.to_configuration(),
            None => DeviceConfiguration {
                id,
                ..FACTORY_PROFILES[0].to_configuration()
            },
        }
    }

    /// Check setpoint bands and network fields
    pub fn validate(&self) -> Result<(), ValidationError> {
        // NaN fails both comparisons, so it is rejected along with out-of-band values
        if !(SETPOINT_TEMPERATURE_MIN..=SETPOINT_TEMPERATURE_MAX)
            .contains(&self.setpoint_temperature)
        {
            return Err(ValidationError::TemperatureOutOfRange {
                value: self.setpoint_temperature,
                min: SETPOINT_TEMPERATURE_MIN,
                max: SETPOINT_TEMPERATURE_MAX,
            });
        }

        if !(SETPOINT_HUMIDITY_MIN..=SETPOINT_HUMIDITY_MAX).contains(&self.setpoint_humidity) {
            return Err(ValidationError::HumidityOutOfRange {
                value: self.setpoint_humidity,
                min: SETPOINT_HUMIDITY_MIN,
                max: SETPOINT_HUMIDITY_MAX,
            });
        }

        let ip = self.ip_address;
        if ip.is_unspecified() || ip.is_broadcast() || ip.is_multicast() || ip.is_loopback() {
            return Err(ValidationError::InvalidIpAddress(ip));
        }

        if !is_valid_subnet_mask(self.subnet_mask) {
            return Err(ValidationError::InvalidSubnetMask(self.subnet_mask));
        }

        Ok(())
    }

    /// Validate `self` as a replacement for `active`. The unit id and MAC
    /// address must match the active record.
    pub fn validate_replacement(&self, active: &DeviceConfiguration) -> Result<(), ValidationError> {
        if self.id != active.id {
            return Err(ValidationError::UnitIdChanged {
                active: active.id,
                requested: self.id,
            });
        }
        if self.mac_address != active.mac_address {
            return Err(ValidationError::MacAddressChanged {
                active: active.mac_address,
                requested: self.mac_address,
            });
        }
        self.validate()
    }
}

/// A mask is valid when its set bits are contiguous from the top
fn is_valid_subnet_mask(mask: Ipv4Addr) -> bool {
    let bits = u32::from(mask);
    bits != 0 && bits.leading_ones() + bits.trailing_zeros() == 32
}

/// Named factory configuration for a unit id
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultProfile {
    pub id: u32,
    pub name: &'static str,
    pub setpoint_temperature: f64,
    pub setpoint_humidity: f64,
    pub ip_address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub mac_address: MacAddress,
}

const DEFAULT_IP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 60, 177);
const DEFAULT_SUBNET_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 254, 0);
const DEFAULT_MAC_ADDRESS: MacAddress = MacAddress([0x90, 0xA2, 0xDA, 0x00, 0x52, 0xC7]);

/// Profiles shipped with the firmware. Which one a unit boots with is
/// decided at provisioning time.
pub const FACTORY_PROFILES: [DefaultProfile; 2] = [
    DefaultProfile {
        id: 0,
        name: "standard",
        setpoint_temperature: 30.0,
        setpoint_humidity: 70.0,
        ip_address: DEFAULT_IP_ADDRESS,
        subnet_mask: DEFAULT_SUBNET_MASK,
        mac_address: DEFAULT_MAC_ADDRESS,
    },
    DefaultProfile {
        id: 1,
        name: "warm",
        setpoint_temperature: 31.5,
        setpoint_humidity: 70.0,
        ip_address: DEFAULT_IP_ADDRESS,
        subnet_mask: DEFAULT_SUBNET_MASK,
        mac_address: DEFAULT_MAC_ADDRESS,
    },
];

impl DefaultProfile {
    pub fn lookup(id: u32) -> Option<&'static DefaultProfile> {
        FACTORY_PROFILES.iter().find(|profile| profile.id == id)
    }

    pub fn to_configuration(&self) -> DeviceConfiguration {
        DeviceConfiguration {
            id: self.id,
            setpoint_temperature: self.setpoint_temperature,
            setpoint_humidity: self.setpoint_humidity,
            ip_address: self.ip_address,
            subnet_mask: self.subnet_mask,
            mac_address: self.mac_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_profiles() {
        let standard = DeviceConfiguration::factory_default(0);
        assert_eq!(standard.id, 0);
        assert_eq!(standard.setpoint_temperature, 30.0);
        assert_eq!(standard.setpoint_humidity, 70.0);
        assert_eq!(standard.ip_address, Ipv4Addr::new(192, 168, 60, 177));
        assert_eq!(standard.subnet_mask, Ipv4Addr::new(255, 255, 254, 0));
        assert_eq!(standard.mac_address.to_string(), "90:A2:DA:00:52:C7");

        let warm = DeviceConfiguration::factory_default(1);
        assert_eq!(warm.id, 1);
        assert_eq!(warm.setpoint_temperature, 31.5);
        assert_eq!(warm.setpoint_humidity, 70.0);
    }

    #[test]
    fn test_unknown_unit_falls_back_to_standard_values() {
        let config = DeviceConfiguration::factory_default(7);
        assert_eq!(config.id, 7);
        assert_eq!(config.setpoint_temperature, 30.0);
        assert!(DefaultProfile::lookup(7).is_none());
    }

    #[test]
    fn test_factory_profiles_are_valid() {
        for profile in FACTORY_PROFILES {
            assert!(profile.to_configuration().validate().is_ok(), "{}", profile.name);
        }
    }

    #[test]
    fn test_setpoint_bands() {
        let mut config = DeviceConfiguration::factory_default(0);

        config.setpoint_temperature = 45.0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::TemperatureOutOfRange { .. })
        ));

        config.setpoint_temperature = f64::NAN;
        assert!(config.validate().is_err());

        config.setpoint_temperature = 32.0;
        config.setpoint_humidity = 150.0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::HumidityOutOfRange { .. })
        ));

        config.setpoint_humidity = f64::INFINITY;
        assert!(config.validate().is_err());

        config.setpoint_humidity = 0.0;
        assert!(config.validate().is_ok());
        config.setpoint_humidity = 100.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_network_fields() {
        let mut config = DeviceConfiguration::factory_default(0);

        for ip in [
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(224, 0, 0, 1),
        ] {
            config.ip_address = ip;
            assert_eq!(config.validate(), Err(ValidationError::InvalidIpAddress(ip)));
        }

        config.ip_address = Ipv4Addr::new(10, 0, 0, 5);
        for mask in [
            Ipv4Addr::new(0, 0, 0, 0),
            Ipv4Addr::new(255, 0, 255, 0),
            Ipv4Addr::new(255, 255, 255, 1),
        ] {
            config.subnet_mask = mask;
            assert_eq!(config.validate(), Err(ValidationError::InvalidSubnetMask(mask)));
        }

        for mask in [
            Ipv4Addr::new(255, 0, 0, 0),
            Ipv4Addr::new(255, 255, 254, 0),
            Ipv4Addr::new(255, 255, 255, 255),
        ] {
            config.subnet_mask = mask;
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_replacement_keeps_identity() {
        let active = DeviceConfiguration::factory_default(0);

        let mut candidate = active.clone();
        candidate.mac_address = MacAddress([0, 1, 2, 3, 4, 5]);
        assert!(matches!(
            candidate.validate_replacement(&active),
            Err(ValidationError::MacAddressChanged { .. })
        ));

        let mut candidate = active.clone();
        candidate.id = 1;
        assert!(matches!(
            candidate.validate_replacement(&active),
            Err(ValidationError::UnitIdChanged { .. })
        ));

        let mut candidate = active.clone();
        candidate.setpoint_temperature = 32.0;
        assert!(candidate.validate_replacement(&active).is_ok());
    }

    #[test]
    fn test_mac_display() {
        assert_eq!(MacAddress([0x0a, 0, 0xff, 1, 2, 3]).to_string(), "0A:00:FF:01:02:03");
    }
}
